use super::Flags;
use anyhow::Context;
use mimir_core::DEFAULT_CACHE_DIR;
use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone, Default)]
#[structopt(
    name = "clean",
    setting = structopt::clap::AppSettings::ColoredHelp,
    about = "Remove the signature cache so the next build starts from scratch"
)]
pub struct CleanCommand {}

impl CleanCommand {
    #[tracing::instrument(name = "CleanCommand::run", skip(self, _flags))]
    pub fn run(self, _flags: &Flags) -> Result<(), anyhow::Error> {
        println!("Cleaning cache...");
        match std::fs::remove_dir_all(DEFAULT_CACHE_DIR) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).context("Could not remove the cache directory");
            }
        }
        println!("Cache cleaned.");
        Ok(())
    }
}
