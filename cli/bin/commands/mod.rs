mod build;
mod clean;

pub use build::*;
pub use clean::*;

use mimir_core::BuildOpts;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone)]
pub enum Command {
    #[structopt(name = "build", about = "Build every out-of-date target (the default)")]
    Build(BuildCommand),

    #[structopt(name = "clean", about = "Remove the signature cache")]
    Clean(CleanCommand),
}

#[derive(Debug, Clone, StructOpt)]
pub struct Flags {
    #[structopt(
        help = r"The rule file to build from. YAML-flavoured (.yaml/.yml) and
TOML-flavoured (.toml) files are recognised by extension.",
        short = "f",
        long = "file",
        default_value = "build.yaml"
    )]
    pub(crate) file: PathBuf,

    #[structopt(
        help = r"The number of parallel jobs. 0 means one per CPU.",
        short = "j",
        long = "jobs",
        default_value = "1"
    )]
    pub(crate) jobs: usize,

    #[structopt(
        help = r"Report what would be built without running any command.",
        short = "n",
        long = "dry-run"
    )]
    pub(crate) dry_run: bool,

    #[structopt(help = r"Include each command in the status output.", short = "v", long = "verbose")]
    pub(crate) verbose: bool,

    #[structopt(
        help = r"Keep building targets that do not depend on a failed one.",
        short = "k",
        long = "keep-going"
    )]
    pub(crate) keep_going: bool,

    #[structopt(help = r"Disable ANSI colors in the status output.", long = "no-color")]
    pub(crate) no_color: bool,
}

impl From<&Flags> for BuildOpts {
    fn from(flags: &Flags) -> BuildOpts {
        BuildOpts {
            num_threads: if flags.jobs == 0 { num_cpus::get() } else { flags.jobs },
            dry_run: flags.dry_run,
            verbose: flags.verbose,
            stop_on_error: !flags.keep_going,
            color_output: !flags.no_color,
        }
    }
}
