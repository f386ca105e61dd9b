use super::*;
use fxhash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::*;

const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_RED: &str = "\x1b[31m";
const COLOR_YELLOW: &str = "\x1b[33m";
const COLOR_RESET: &str = "\x1b[0m";

/// How long a parked worker sleeps before re-checking for cancellation.
/// `cancel()` can be called from outside the build, where the build-local
/// condvar is unreachable, so waits must be bounded.
const WORKER_PARK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Skipped,
    Built,
    Failed,
}

impl Outcome {
    fn status(&self) -> TargetStatus {
        match self {
            Outcome::Skipped => TargetStatus::UpToDate,
            Outcome::Built => TargetStatus::Success,
            Outcome::Failed => TargetStatus::Failed,
        }
    }
}

/// The BuildExecutor drives a build: it walks the graph in dependency
/// order, consults the signature cache to skip targets that are already
/// up to date, hands stale commands to the command runner, and records the
/// new signatures of whatever built successfully.
///
/// With more than one worker thread, scheduling is a claim/complete loop
/// over shared bookkeeping: a worker claims the first target in the
/// topological order whose dependencies have all completed, runs it outside
/// the lock, then marks it completed and wakes the others.
///
pub struct BuildExecutor {
    opts: BuildOpts,
    command_runner: Arc<dyn CommandRunner>,
    progress_callback: Option<ProgressCallback>,
    cancelled: AtomicBool,
    output_lock: Mutex<()>,
}

impl BuildExecutor {
    pub fn new(num_threads: usize) -> BuildExecutor {
        BuildExecutor::with_opts(BuildOpts {
            num_threads,
            ..BuildOpts::default()
        })
    }

    pub fn with_opts(opts: BuildOpts) -> BuildExecutor {
        BuildExecutor::with_runner(opts, Arc::new(SystemCommandRunner))
    }

    pub fn with_runner(opts: BuildOpts, command_runner: Arc<dyn CommandRunner>) -> BuildExecutor {
        BuildExecutor {
            opts,
            command_runner,
            progress_callback: None,
            cancelled: AtomicBool::new(false),
            output_lock: Mutex::new(()),
        }
    }

    pub fn opts(&self) -> &BuildOpts {
        &self.opts
    }

    pub fn set_opts(&mut self, opts: BuildOpts) {
        self.opts = opts;
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress_callback = Some(callback);
    }

    /// Stop handing out targets. Commands already running are not
    /// interrupted; the build returns false once they finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn reset_cancelled(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn execute(&self, graph: &DepGraph, cache: &SignatureCache) -> bool {
        self.execute_with_stats(graph, cache).0
    }

    #[tracing::instrument(name = "BuildExecutor::execute_with_stats", skip_all)]
    pub fn execute_with_stats(
        &self,
        graph: &DepGraph,
        cache: &SignatureCache,
    ) -> (bool, BuildStats) {
        let started_at = Instant::now();
        let mut stats = BuildStats::default();

        let success = if self.opts.num_threads <= 1 {
            self.execute_single_threaded(graph, cache, &mut stats)
        } else {
            self.execute_multi_threaded(graph, cache, &mut stats)
        };

        stats.elapsed_seconds = started_at.elapsed().as_secs_f64();
        (success, stats)
    }

    /// One-off entry point for building a single target against the cache.
    pub fn execute_target(&self, target: &Target, cache: &SignatureCache) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.build_target(target, cache) != Outcome::Failed
    }

    fn is_out_of_date(&self, target: &Target, cache: &SignatureCache) -> bool {
        let current = target_signature(&target.command, &target.inputs);
        cache.needs_rebuild(&target.name, &current)
    }

    /// Declared outputs must all be present as regular files; a directory
    /// or dangling symlink at an output path reads as missing.
    fn outputs_exist(target: &Target) -> bool {
        target
            .outputs
            .iter()
            .all(|output| std::fs::metadata(output).map(|meta| meta.is_file()).unwrap_or(false))
    }

    fn run_command(&self, command: &str) -> bool {
        if self.opts.dry_run {
            return true;
        }
        self.command_runner.run_simple(command)
    }

    /// The per-target decision: skip when outputs are present and the
    /// signature matches the cache; otherwise run the command and, on
    /// success, record the new signature.
    fn build_target(&self, target: &Target, cache: &SignatureCache) -> Outcome {
        if Self::outputs_exist(target) && !self.is_out_of_date(target, cache) {
            self.print_status(TargetStatus::UpToDate, target);
            return Outcome::Skipped;
        }

        self.print_status(TargetStatus::Building, target);
        if !self.run_command(&target.command) {
            self.print_status(TargetStatus::Failed, target);
            return Outcome::Failed;
        }

        let signature = target_signature(&target.command, &target.inputs);
        cache.set_signature(&target.name, signature);
        self.print_status(TargetStatus::Success, target);
        Outcome::Built
    }

    fn report_progress(&self, name: &str, current: usize, total: usize, status: TargetStatus) {
        if let Some(callback) = &self.progress_callback {
            callback(name, current, total, status);
        }
    }

    fn print_status(&self, status: TargetStatus, target: &Target) {
        // The console tag for an in-flight target is the short imperative.
        let tag = match status {
            TargetStatus::Building => "BUILD",
            other => other.as_str(),
        };
        let mut line = format!("[ {} ] {}", tag, target.name);
        if status == TargetStatus::Building && self.opts.verbose && !target.command.is_empty() {
            line.push_str("\n  ");
            line.push_str(&target.command);
        }

        let _guard = self.output_lock.lock().unwrap();
        if self.opts.color_output {
            let color = match status {
                TargetStatus::Success | TargetStatus::UpToDate => COLOR_GREEN,
                TargetStatus::Failed => COLOR_RED,
                TargetStatus::Building => COLOR_YELLOW,
            };
            println!("{}{}{}", color, line, COLOR_RESET);
        } else {
            println!("{}", line);
        }
    }

    fn execute_single_threaded(
        &self,
        graph: &DepGraph,
        cache: &SignatureCache,
        stats: &mut BuildStats,
    ) -> bool {
        let order = graph.topological_sort();
        stats.total_targets = order.len();

        for (index, name) in order.iter().enumerate() {
            if self.is_cancelled() {
                return false;
            }
            let target = match graph.get_target(name) {
                Some(target) => target,
                None => continue,
            };

            let current = index + 1;
            self.report_progress(name, current, stats.total_targets, TargetStatus::Building);

            let outcome = self.build_target(target, cache);
            self.report_progress(name, current, stats.total_targets, outcome.status());
            match outcome {
                Outcome::Skipped => stats.skipped_targets += 1,
                Outcome::Built => stats.built_targets += 1,
                Outcome::Failed => {
                    stats.failed_targets += 1;
                    if self.opts.stop_on_error {
                        return false;
                    }
                }
            }
        }

        stats.failed_targets == 0
    }

    fn execute_multi_threaded(
        &self,
        graph: &DepGraph,
        cache: &SignatureCache,
        stats: &mut BuildStats,
    ) -> bool {
        let order = graph.topological_sort();
        stats.total_targets = order.len();

        let schedule = BuildSchedule::new(graph, order);
        std::thread::scope(|scope| {
            for _ in 0..self.opts.num_threads {
                scope.spawn(|| self.worker_loop(&schedule, cache));
            }
        });

        let state = schedule.state.into_inner().unwrap();
        stats.built_targets = state.stats.built_targets;
        stats.skipped_targets = state.stats.skipped_targets;
        stats.failed_targets = state.stats.failed_targets;

        !state.failed && !self.is_cancelled()
    }

    fn worker_loop(&self, schedule: &BuildSchedule<'_>, cache: &SignatureCache) {
        let total = schedule.order.len();
        loop {
            if self.is_cancelled() {
                return;
            }
            let name = match schedule.claim_next(self.opts.stop_on_error, &self.cancelled) {
                Some(name) => name,
                None => return,
            };
            let target = match schedule.graph.get_target(&name) {
                Some(target) => target,
                None => {
                    schedule.finish(&name, Outcome::Skipped);
                    continue;
                }
            };

            let current = schedule.processed.fetch_add(1, Ordering::SeqCst) + 1;
            self.report_progress(&name, current, total, TargetStatus::Building);

            let outcome = self.build_target(target, cache);
            self.report_progress(&name, current, total, outcome.status());
            schedule.finish(&name, outcome);
        }
    }
}

#[derive(Default)]
struct ScheduleState {
    completed: FxHashMap<String, bool>,
    in_progress: FxHashMap<String, bool>,
    failed: bool,
    stats: BuildStats,
}

/// Shared worker-pool bookkeeping: one mutex over completion state, one
/// condvar workers park on while nothing is ready. The topological order is
/// read-only and doubles as the claim scan order, so no separate ready
/// queue is needed at the graph sizes this engine serves.
struct BuildSchedule<'a> {
    graph: &'a DepGraph,
    order: Vec<String>,
    state: Mutex<ScheduleState>,
    ready: Condvar,
    processed: AtomicUsize,
}

impl<'a> BuildSchedule<'a> {
    fn new(graph: &'a DepGraph, order: Vec<String>) -> BuildSchedule<'a> {
        let mut state = ScheduleState::default();
        for name in &order {
            state.completed.insert(name.clone(), false);
            state.in_progress.insert(name.clone(), false);
        }
        BuildSchedule {
            graph,
            order,
            state: Mutex::new(state),
            ready: Condvar::new(),
            processed: AtomicUsize::new(0),
        }
    }

    fn is_ready(&self, state: &ScheduleState, target: &Target) -> bool {
        target
            .deps
            .iter()
            .all(|dep| state.completed.get(dep).copied().unwrap_or(false))
            && !state.in_progress.get(&target.name).copied().unwrap_or(false)
    }

    /// Blocks until a target can be claimed, then claims it. Returns None
    /// when the build is drained: everything completed, a failure under
    /// stop-on-error, or cancellation.
    fn claim_next(&self, stop_on_error: bool, cancelled: &AtomicBool) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        loop {
            if cancelled.load(Ordering::SeqCst) {
                return None;
            }
            if state.failed && stop_on_error {
                return None;
            }
            if state.completed.values().all(|done| *done) {
                return None;
            }

            let claimable = self.order.iter().find(|name| {
                !state.completed.get(name.as_str()).copied().unwrap_or(false)
                    && self
                        .graph
                        .get_target(name.as_str())
                        .map(|target| self.is_ready(&state, target))
                        .unwrap_or(false)
            });
            if let Some(name) = claimable {
                let name = name.clone();
                state.in_progress.insert(name.clone(), true);
                return Some(name);
            }

            let (next, _timed_out) = self.ready.wait_timeout(state, WORKER_PARK).unwrap();
            state = next;
        }
    }

    /// Completion unblocks dependents whether the target succeeded or not;
    /// the failure flag is what stops the build under stop-on-error.
    fn finish(&self, name: &str, outcome: Outcome) {
        let mut state = self.state.lock().unwrap();
        state.in_progress.insert(name.to_string(), false);
        state.completed.insert(name.to_string(), true);
        match outcome {
            Outcome::Skipped => state.stats.skipped_targets += 1,
            Outcome::Built => state.stats.built_targets += 1,
            Outcome::Failed => {
                state.stats.failed_targets += 1;
                state.failed = true;
            }
        }
        drop(state);
        self.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn target(name: &str, command: &str, deps: &[&str]) -> Target {
        let mut target = Target::new(name);
        target.command = command.to_string();
        target.deps = deps.iter().map(|dep| dep.to_string()).collect();
        target
    }

    fn quiet_opts(num_threads: usize) -> BuildOpts {
        BuildOpts {
            num_threads,
            color_output: false,
            ..BuildOpts::default()
        }
    }

    fn cache_in(dir: &tempfile::TempDir) -> SignatureCache {
        SignatureCache::new(dir.path().join("cache"))
    }

    #[test]
    fn an_empty_graph_builds_successfully() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let graph = DepGraph::new();

        let executor = BuildExecutor::with_opts(quiet_opts(1));
        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(success);
        assert_eq!(0, stats.total_targets);
    }

    #[test]
    fn an_empty_graph_builds_successfully_with_many_workers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let graph = DepGraph::new();

        let executor = BuildExecutor::with_opts(quiet_opts(4));
        assert!(executor.execute(&graph, &cache));
    }

    #[test]
    fn a_successful_build_updates_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        graph.add_target(target("app", "fake build command", &[]));

        let mock = Arc::new(MockCommandRunner::new());
        let executor = BuildExecutor::with_runner(quiet_opts(1), mock.clone());

        assert_eq!(None, cache.find_signature("app"));
        assert!(executor.execute(&graph, &cache));
        assert!(cache.find_signature("app").is_some());
        assert_eq!(1, mock.command_count());
        assert_eq!("fake build command", mock.last_command());
    }

    #[test]
    fn a_failing_command_fails_the_build_and_leaves_the_cache_alone() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        graph.add_target(target("app", "make app", &[]));

        let mock = Arc::new(MockCommandRunner::new());
        mock.set_default_result(CommandResult {
            exit_code: 1,
            ..CommandResult::default()
        });
        let executor = BuildExecutor::with_runner(quiet_opts(1), mock);

        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(!success);
        assert_eq!(1, stats.failed_targets);
        assert_eq!(0, stats.built_targets);
        assert_eq!(None, cache.find_signature("app"));
    }

    #[test]
    fn stats_count_each_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        graph.add_target(target("one", "cmd one", &[]));
        graph.add_target(target("two", "cmd two", &[]));
        graph.add_target(target("three", "cmd three", &[]));

        let mock = Arc::new(MockCommandRunner::new());
        let executor = BuildExecutor::with_runner(quiet_opts(1), mock);

        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(success);
        assert_eq!(3, stats.total_targets);
        assert_eq!(3, stats.built_targets);
        assert_eq!(0, stats.skipped_targets);
        assert_eq!(0, stats.failed_targets);
        assert!(stats.elapsed_seconds >= 0.0);
    }

    #[test]
    fn stop_on_error_halts_before_later_targets_run() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        graph.add_target(target("t1", "cmd1", &[]));
        graph.add_target(target("t2", "cmd2", &[]));
        graph.add_target(target("t3", "cmd3", &[]));

        let mock = Arc::new(MockCommandRunner::new());
        mock.set_result_for(
            "cmd2",
            CommandResult {
                exit_code: 1,
                ..CommandResult::default()
            },
        );
        let executor = BuildExecutor::with_runner(quiet_opts(1), mock.clone());

        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(!success);
        assert_eq!(1, stats.built_targets);
        assert_eq!(1, stats.failed_targets);
        assert_eq!(vec!["cmd1".to_string(), "cmd2".to_string()], mock.commands());
    }

    #[test]
    fn keep_going_still_builds_unrelated_targets() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        graph.add_target(target("t1", "cmd1", &[]));
        graph.add_target(target("t2", "cmd2", &[]));
        graph.add_target(target("t3", "cmd3", &[]));

        let mock = Arc::new(MockCommandRunner::new());
        mock.set_result_for(
            "cmd2",
            CommandResult {
                exit_code: 1,
                ..CommandResult::default()
            },
        );
        let opts = BuildOpts {
            stop_on_error: false,
            ..quiet_opts(1)
        };
        let executor = BuildExecutor::with_runner(opts, mock.clone());

        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(!success);
        assert_eq!(2, stats.built_targets);
        assert_eq!(1, stats.failed_targets);
        assert_eq!(3, mock.command_count());
    }

    #[test]
    fn workers_respect_dependency_order() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        graph.add_target(target("a", "build a", &[]));
        graph.add_target(target("b", "build b", &["a"]));
        graph.add_target(target("c", "build c", &["a"]));
        graph.add_target(target("d", "build d", &["b", "c"]));

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let mock = Arc::new(MockCommandRunner::new());
        mock.set_handler(Box::new({
            let seen = seen.clone();
            move |command, _options| {
                seen.lock().unwrap().push(command.to_string());
                CommandResult::default()
            }
        }));
        let executor = BuildExecutor::with_runner(quiet_opts(4), mock);

        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(success);
        assert_eq!(4, stats.built_targets);

        let seen = seen.lock().unwrap();
        let position = |command: &str| seen.iter().position(|c| c == command).unwrap();
        assert!(position("build a") < position("build b"));
        assert!(position("build a") < position("build c"));
        assert!(position("build b") < position("build d"));
        assert!(position("build c") < position("build d"));
    }

    #[test]
    fn a_dependency_chain_serializes_across_workers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        graph.add_target(target("a", "run a", &[]));
        graph.add_target(target("b", "run b", &["a"]));
        graph.add_target(target("c", "run c", &["b"]));

        let mock = Arc::new(MockCommandRunner::new());
        let executor = BuildExecutor::with_runner(quiet_opts(3), mock.clone());

        assert!(executor.execute(&graph, &cache));
        assert_eq!(
            vec!["run a".to_string(), "run b".to_string(), "run c".to_string()],
            mock.commands()
        );
    }

    #[test]
    fn a_parallel_failure_under_stop_on_error_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        graph.add_target(target("bad", "explode", &[]));
        graph.add_target(target("after", "run after", &["bad"]));

        let mock = Arc::new(MockCommandRunner::new());
        mock.set_result_for(
            "explode",
            CommandResult {
                exit_code: 1,
                ..CommandResult::default()
            },
        );
        let executor = BuildExecutor::with_runner(quiet_opts(2), mock);

        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(!success);
        assert_eq!(1, stats.failed_targets);
    }

    #[test]
    fn cancelling_before_execution_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        graph.add_target(target("app", "build app", &[]));

        let mock = Arc::new(MockCommandRunner::new());
        let executor = BuildExecutor::with_runner(quiet_opts(1), mock.clone());
        executor.cancel();

        assert!(!executor.execute(&graph, &cache));
        assert_eq!(0, mock.command_count());

        executor.reset_cancelled();
        assert!(!executor.is_cancelled());
        assert!(executor.execute(&graph, &cache));
    }

    #[test]
    fn cancelling_mid_build_stops_further_claims() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        graph.add_target(target("t1", "cmd1", &[]));
        graph.add_target(target("t2", "cmd2", &[]));
        graph.add_target(target("t3", "cmd3", &[]));

        let mock = Arc::new(MockCommandRunner::new());
        let executor = Arc::new(BuildExecutor::with_runner(quiet_opts(1), mock.clone()));
        mock.set_handler(Box::new({
            let executor = executor.clone();
            move |_command, _options| {
                executor.cancel();
                CommandResult::default()
            }
        }));

        assert!(!executor.execute(&graph, &cache));
        assert_eq!(1, mock.command_count());
    }

    #[test]
    fn dry_run_skips_commands_but_still_records_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let out_file = dir.path().join("out.txt");
        let mut graph = DepGraph::new();

        let mut app = target("app", &format!("echo built > {}", out_file.display()), &[]);
        app.outputs.push(out_file.to_string_lossy().into_owned());
        graph.add_target(app);

        let opts = BuildOpts {
            dry_run: true,
            ..quiet_opts(1)
        };
        let executor = BuildExecutor::with_opts(opts);

        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(success);
        assert_eq!(1, stats.built_targets);
        assert!(!out_file.exists());
        assert!(cache.find_signature("app").is_some());
    }

    #[test]
    fn a_missing_output_forces_a_rebuild_even_with_a_fresh_signature() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        let mut app = target("app", "pretend to build", &[]);
        app.outputs.push(
            dir.path()
                .join("never-created.txt")
                .to_string_lossy()
                .into_owned(),
        );
        let signature = target_signature(&app.command, &app.inputs);
        cache.set_signature("app", signature);
        graph.add_target(app);

        let mock = Arc::new(MockCommandRunner::new());
        let executor = BuildExecutor::with_runner(quiet_opts(1), mock.clone());

        assert!(executor.execute(&graph, &cache));
        assert_eq!(1, mock.command_count());
    }

    #[test]
    fn a_chain_of_file_targets_builds_then_skips_then_rebuilds_downstream() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let a = dir.path().join("a");
        let b = dir.path().join("b");

        let mut graph = DepGraph::new();
        let mut t1 = target("t1", &format!("printf 'A' > {}", a.display()), &[]);
        t1.outputs.push(a.to_string_lossy().into_owned());
        let mut t2 = target("t2", &format!("cp {} {}", a.display(), b.display()), &["t1"]);
        t2.inputs.push(a.to_string_lossy().into_owned());
        t2.outputs.push(b.to_string_lossy().into_owned());
        graph.add_target(t1);
        graph.add_target(t2);

        let executor = BuildExecutor::with_opts(quiet_opts(1));

        // First build: everything is stale.
        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(success);
        assert_eq!(2, stats.built_targets);
        assert_eq!("A", std::fs::read_to_string(&b).unwrap());

        // Second build: nothing changed, everything skips.
        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(success);
        assert_eq!(0, stats.built_targets);
        assert_eq!(2, stats.skipped_targets);

        // Mutating the upstream file re-runs its dependent.
        std::fs::write(&a, "B").unwrap();
        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(success);
        assert_eq!(1, stats.built_targets);
        assert_eq!("B", std::fs::read_to_string(&b).unwrap());
    }

    #[test]
    fn parallel_incremental_builds_skip_everything_on_the_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        for i in 0..6 {
            graph.add_target(target(&format!("t{}", i), &format!("cmd{}", i), &[]));
        }

        let mock = Arc::new(MockCommandRunner::new());
        let executor = BuildExecutor::with_runner(quiet_opts(4), mock.clone());

        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(success);
        assert_eq!(6, stats.built_targets);

        let (success, stats) = executor.execute_with_stats(&graph, &cache);
        assert!(success);
        assert_eq!(0, stats.built_targets);
        assert_eq!(6, stats.skipped_targets);
        assert_eq!(6, mock.command_count());
    }

    #[test]
    fn progress_reports_every_target_with_a_final_status() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut graph = DepGraph::new();
        graph.add_target(target("one", "cmd one", &[]));
        graph.add_target(target("two", "cmd two", &[]));

        let events: Arc<Mutex<Vec<(String, usize, usize, TargetStatus)>>> =
            Arc::new(Mutex::new(vec![]));
        let mock = Arc::new(MockCommandRunner::new());
        let mut executor = BuildExecutor::with_runner(quiet_opts(1), mock);
        executor.set_progress_callback(Arc::new({
            let events = events.clone();
            move |name, current, total, status| {
                events
                    .lock()
                    .unwrap()
                    .push((name.to_string(), current, total, status));
            }
        }));

        assert!(executor.execute(&graph, &cache));

        let events = events.lock().unwrap();
        assert_eq!(4, events.len());
        assert_eq!(("one".to_string(), 1, 2, TargetStatus::Building), events[0]);
        assert_eq!(("one".to_string(), 1, 2, TargetStatus::Success), events[1]);
        assert_eq!(("two".to_string(), 2, 2, TargetStatus::Building), events[2]);
        assert_eq!(("two".to_string(), 2, 2, TargetStatus::Success), events[3]);
    }
}
