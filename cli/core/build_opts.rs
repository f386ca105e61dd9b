/// Knobs for a single build run.
#[derive(Debug, Copy, Clone)]
pub struct BuildOpts {
    /// Worker thread count; anything up to 1 stays on the calling thread.
    pub num_threads: usize,

    /// Pretend every command succeeded without running it. The signature
    /// cache is still updated, so repeated dry runs are idempotent.
    pub dry_run: bool,

    /// Include each command in the status output.
    pub verbose: bool,

    /// Stop handing out new targets after the first failure. Workers finish
    /// whatever they already claimed.
    pub stop_on_error: bool,

    /// ANSI colors in the status output.
    pub color_output: bool,
}

impl Default for BuildOpts {
    fn default() -> BuildOpts {
        BuildOpts {
            num_threads: 1,
            dry_run: false,
            verbose: false,
            stop_on_error: true,
            color_output: true,
        }
    }
}
