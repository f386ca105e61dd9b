use super::Flags;
use anyhow::{anyhow, Context};
use mimir_core::*;
use structopt::StructOpt;
use tracing::*;

#[derive(StructOpt, Debug, Clone, Default)]
#[structopt(
    name = "build",
    setting = structopt::clap::AppSettings::ColoredHelp,
    about = "Build every out-of-date target in the rule file"
)]
pub struct BuildCommand {}

impl BuildCommand {
    #[tracing::instrument(name = "BuildCommand::run", skip(self, flags))]
    pub fn run(self, flags: &Flags) -> Result<(), anyhow::Error> {
        let buildfile = Buildfile::from_file(&flags.file)
            .with_context(|| format!("Could not read rule file {:?}", flags.file))?;

        let mut graph = DepGraph::new();
        for target in buildfile.targets {
            let name = target.name.clone();
            if !graph.add_target(target) {
                return Err(anyhow!("Duplicate or unnamed target: {:?}", name));
            }
        }
        debug!("Assembled a graph of {} targets", graph.len());

        let missing = graph.validate_dependencies();
        if !missing.is_empty() {
            return Err(anyhow!(
                "Unknown dependencies referenced: {}",
                missing.join(", ")
            ));
        }

        let cycles = graph.detect_cycles();
        if cycles.has_cycle {
            return Err(anyhow!(
                "Dependency cycle detected: {}",
                cycles.cycle.join(" -> ")
            ));
        }

        let cache = SignatureCache::default();
        if !cache.load() {
            debug!("No prior signature cache; building everything");
        }

        let executor = BuildExecutor::with_opts(BuildOpts::from(flags));
        let (success, stats) = executor.execute_with_stats(&graph, &cache);

        if !cache.save() {
            warn!("Could not persist the signature cache to {:?}", cache.cache_file());
        }

        print_build_stats(&stats);

        if success {
            Ok(())
        } else if stats.failed_targets > 0 {
            Err(anyhow!(
                "{} of {} targets failed",
                stats.failed_targets,
                stats.total_targets
            ))
        } else {
            Err(anyhow!("Build did not complete"))
        }
    }
}

fn print_build_stats(stats: &BuildStats) {
    println!();
    println!("Build Statistics:");
    println!("  Total targets:   {}", stats.total_targets);
    println!("  Built:           {}", stats.built_targets);
    println!("  Skipped:         {}", stats.skipped_targets);
    println!("  Failed:          {}", stats.failed_targets);
    println!("  Elapsed time:    {:.2}s", stats.elapsed_seconds);
}
