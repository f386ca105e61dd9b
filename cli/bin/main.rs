mod commands;

use commands::*;
use structopt::StructOpt;
use tracing::*;

#[derive(StructOpt, Debug, Clone)]
#[structopt(
    name = "mimir",
    setting = structopt::clap::AppSettings::ColoredHelp,
    about = "An incremental build runner: declarative targets, content signatures, parallel execution"
)]
struct Mimir {
    #[structopt(subcommand, help = "the command to run (defaults to build)")]
    cmd: Option<Command>,

    #[structopt(flatten)]
    flags: Flags,
}

impl Mimir {
    fn run(self) -> Result<(), anyhow::Error> {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_env("MIMIR_LOG"))
            .with_writer(std::io::stderr)
            .init();

        let result = self.start();
        if let Err(ref err) = result {
            error!("{:?}", err);
        }
        result
    }

    #[tracing::instrument(name = "Mimir::start", skip(self))]
    fn start(self) -> Result<(), anyhow::Error> {
        match self.cmd {
            Some(Command::Build(cmd)) => cmd.run(&self.flags),
            Some(Command::Clean(cmd)) => cmd.run(&self.flags),
            None => BuildCommand::default().run(&self.flags),
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    Mimir::from_args().run()
}
