use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Where a target is, or ended up, in its build lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Building,
    UpToDate,
    Success,
    Failed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Building => "BUILDING",
            TargetStatus::UpToDate => "UP-TO-DATE",
            TargetStatus::Success => "SUCCESS",
            TargetStatus::Failed => "FAILED",
        }
    }
}

impl Display for TargetStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", self.as_str())
    }
}

/// Invoked as `(target name, current, total, status)`. `current` is 1-based
/// and monotonically increasing, but not strictly sequential when workers
/// run in parallel.
pub type ProgressCallback = Arc<dyn Fn(&str, usize, usize, TargetStatus) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_render_as_their_console_tags() {
        assert_eq!("BUILDING", TargetStatus::Building.to_string());
        assert_eq!("UP-TO-DATE", TargetStatus::UpToDate.to_string());
        assert_eq!("SUCCESS", TargetStatus::Success.to_string());
        assert_eq!("FAILED", TargetStatus::Failed.to_string());
    }
}
