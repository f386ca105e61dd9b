/// Aggregate counters for one build run. Emitted even when the build fails,
/// so the front end can always print what happened.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BuildStats {
    /// Every target the topological order contained.
    pub total_targets: usize,

    /// Targets whose command ran and succeeded.
    pub built_targets: usize,

    /// Targets skipped because outputs existed and signatures matched.
    pub skipped_targets: usize,

    /// Targets whose command failed.
    pub failed_targets: usize,

    /// Wall clock from entry to return of the execute call.
    pub elapsed_seconds: f64,
}
