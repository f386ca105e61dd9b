use std::fmt;
use std::fmt::{Display, Formatter};

/// A Target is one named build rule: the files it reads, the files it is
/// expected to produce, the shell command that produces them, and the names
/// of the targets that must finish first.
///
/// The name is the only identity. Input order matters — it participates in
/// the target signature — while output and dependency order is only cosmetic.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    /// The unique name of this target within a graph.
    pub name: String,

    /// The input files, in the order they contribute to the signature.
    pub inputs: Vec<String>,

    /// The files this target is expected to produce.
    pub outputs: Vec<String>,

    /// The shell command that builds this target.
    pub command: String,

    /// The names of the targets this one depends on.
    pub deps: Vec<String>,

    /// The last signature this target was known to build with. Informational
    /// only; the signature cache is authoritative.
    pub signature: Option<String>,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Target {
        Target {
            name: name.into(),
            ..Target::default()
        }
    }

    /// A target without a name can never enter a graph.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn has_inputs(&self) -> bool {
        !self.inputs.is_empty()
    }

    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }

    pub fn has_deps(&self) -> bool {
        !self.deps.is_empty()
    }
}

impl Display for Target {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "target(name = \"{}\")", self.name)
    }
}
