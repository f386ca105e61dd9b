use fxhash::FxHashMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::*;
use tracing::*;

#[derive(Error, Debug)]
pub enum CommandRunnerError {
    #[error("Could not spawn `{command}`: {err:?}")]
    SpawnError { command: String, err: std::io::Error },

    #[error("Could not wait on `{command}`: {err:?}")]
    WaitError { command: String, err: std::io::Error },
}

/// The observable outcome of one command invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Where to run the command; `None` means the current directory.
    pub working_dir: Option<PathBuf>,

    /// Kill the command once this much wall clock has passed.
    pub timeout: Option<Duration>,

    /// Capture stdout/stderr into the result instead of inheriting ours.
    pub capture_output: bool,

    /// Whether the command sees our environment.
    pub inherit_environment: bool,
}

impl Default for CommandOptions {
    fn default() -> CommandOptions {
        CommandOptions {
            working_dir: None,
            timeout: None,
            capture_output: false,
            inherit_environment: true,
        }
    }
}

/// The seam between the executor and the operating system: something that
/// turns a command string into an exit status. The executor only ever sees
/// this trait, which is what lets the scheduling tests script outcomes.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> Result<CommandResult, CommandRunnerError>;

    /// Success/failure view of `run` with default options. A command that
    /// cannot even spawn counts as a failed command.
    fn run_simple(&self, command: &str) -> bool {
        self.run(command, &CommandOptions::default())
            .map(|result| result.success())
            .unwrap_or(false)
    }
}

/// Runs commands through `sh -c`, the way a build rule expects.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    fn shell(&self, command: &str, options: &CommandOptions) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }
        if !options.inherit_environment {
            cmd.env_clear();
        }
        cmd
    }
}

impl CommandRunner for SystemCommandRunner {
    #[tracing::instrument(name = "SystemCommandRunner::run", skip(self, options))]
    fn run(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> Result<CommandResult, CommandRunnerError> {
        let mut cmd = self.shell(command, options);
        if options.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        let mut child = cmd.spawn().map_err(|err| CommandRunnerError::SpawnError {
            command: command.to_string(),
            err,
        })?;

        // Drain the pipes off-thread so a chatty command cannot fill the
        // pipe buffer and wedge against our wait loop.
        let stdout_reader = child.stdout.take().map(|mut out| {
            std::thread::spawn(move || {
                let mut buffer = String::new();
                let _ = out.read_to_string(&mut buffer);
                buffer
            })
        });
        let stderr_reader = child.stderr.take().map(|mut err| {
            std::thread::spawn(move || {
                let mut buffer = String::new();
                let _ = err.read_to_string(&mut buffer);
                buffer
            })
        });

        let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
        let mut timed_out = false;
        let status = loop {
            let polled = child.try_wait().map_err(|err| CommandRunnerError::WaitError {
                command: command.to_string(),
                err,
            })?;
            if let Some(status) = polled {
                break status;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    debug!("Command timed out, killing: {}", command);
                    let _ = child.kill();
                    timed_out = true;
                    break child.wait().map_err(|err| CommandRunnerError::WaitError {
                        command: command.to_string(),
                        err,
                    })?;
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        };

        let stdout = stdout_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        Ok(CommandResult {
            // A signal death has no exit code; report it as failure.
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            timed_out,
        })
    }
}

pub type MockHandler = Box<dyn Fn(&str, &CommandOptions) -> CommandResult + Send + Sync>;

#[derive(Default)]
struct MockState {
    default_result: CommandResult,
    results: FxHashMap<String, CommandResult>,
    commands: Vec<String>,
    handler: Option<MockHandler>,
}

/// A scripted runner for tests: records every command it is asked to run
/// and replays canned results. State sits behind a mutex so one mock can be
/// shared across executor worker threads.
#[derive(Default)]
pub struct MockCommandRunner {
    state: Mutex<MockState>,
}

impl MockCommandRunner {
    pub fn new() -> MockCommandRunner {
        MockCommandRunner::default()
    }

    pub fn set_default_result(&self, result: CommandResult) {
        self.state.lock().unwrap().default_result = result;
    }

    pub fn set_result_for(&self, command: impl Into<String>, result: CommandResult) {
        self.state.lock().unwrap().results.insert(command.into(), result);
    }

    pub fn set_handler(&self, handler: MockHandler) {
        self.state.lock().unwrap().handler = Some(handler);
    }

    pub fn last_command(&self) -> String {
        self.state.lock().unwrap().commands.last().cloned().unwrap_or_default()
    }

    pub fn command_count(&self) -> usize {
        self.state.lock().unwrap().commands.len()
    }

    /// Every command seen so far, in invocation order.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        *state = MockState::default();
    }
}

impl CommandRunner for MockCommandRunner {
    fn run(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> Result<CommandResult, CommandRunnerError> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.to_string());

        if let Some(handler) = &state.handler {
            return Ok(handler(command, options));
        }

        if let Some(result) = state.results.get(command) {
            return Ok(result.clone());
        }
        Ok(state.default_result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_system_runner_reports_success_and_failure() {
        let runner = SystemCommandRunner;
        assert!(runner.run_simple("true"));
        assert!(!runner.run_simple("false"));
    }

    #[test]
    fn the_system_runner_goes_through_a_shell() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("made-by-shell.txt");
        let runner = SystemCommandRunner;
        assert!(runner.run_simple(&format!("echo hello > {}", file.display())));
        assert!(file.exists());
    }

    #[test]
    fn captured_output_lands_in_the_result() {
        let runner = SystemCommandRunner;
        let options = CommandOptions {
            capture_output: true,
            ..CommandOptions::default()
        };
        let result = runner.run("echo out; echo err 1>&2", &options).unwrap();
        assert!(result.success());
        assert_eq!("out\n", result.stdout);
        assert_eq!("err\n", result.stderr);
    }

    #[test]
    fn nonzero_exits_are_reported_verbatim() {
        let runner = SystemCommandRunner;
        let result = runner.run("exit 3", &CommandOptions::default()).unwrap();
        assert_eq!(3, result.exit_code);
        assert!(!result.success());
    }

    #[test]
    fn the_working_dir_option_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemCommandRunner;
        let options = CommandOptions {
            working_dir: Some(dir.path().to_path_buf()),
            capture_output: true,
            ..CommandOptions::default()
        };
        let result = runner.run("pwd", &options).unwrap();
        assert!(result.success());
        let reported = result.stdout.trim();
        assert_eq!(
            dir.path().canonicalize().unwrap(),
            PathBuf::from(reported).canonicalize().unwrap()
        );
    }

    #[test]
    fn a_slow_command_is_killed_at_the_deadline() {
        let runner = SystemCommandRunner;
        let options = CommandOptions {
            timeout: Some(Duration::from_millis(100)),
            ..CommandOptions::default()
        };
        let started = Instant::now();
        let result = runner.run("sleep 5", &options).unwrap();
        assert!(result.timed_out);
        assert!(!result.success());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn the_mock_defaults_to_success() {
        let mock = MockCommandRunner::new();
        assert!(mock.run_simple("anything at all"));
    }

    #[test]
    fn the_mock_default_result_is_configurable() {
        let mock = MockCommandRunner::new();
        mock.set_default_result(CommandResult {
            exit_code: 1,
            ..CommandResult::default()
        });
        assert!(!mock.run_simple("anything at all"));
    }

    #[test]
    fn per_command_results_win_over_the_default() {
        let mock = MockCommandRunner::new();
        mock.set_result_for(
            "make broken",
            CommandResult {
                exit_code: 2,
                stderr: "boom".to_string(),
                ..CommandResult::default()
            },
        );
        assert!(mock.run_simple("make fine"));
        assert!(!mock.run_simple("make broken"));
        let result = mock.run("make broken", &CommandOptions::default()).unwrap();
        assert_eq!("boom", result.stderr);
    }

    #[test]
    fn the_mock_records_commands_in_order() {
        let mock = MockCommandRunner::new();
        mock.run_simple("first");
        mock.run_simple("second");
        assert_eq!(2, mock.command_count());
        assert_eq!("second", mock.last_command());
        assert_eq!(vec!["first".to_string(), "second".to_string()], mock.commands());
    }

    #[test]
    fn reset_forgets_everything() {
        let mock = MockCommandRunner::new();
        mock.set_default_result(CommandResult {
            exit_code: 1,
            ..CommandResult::default()
        });
        mock.run_simple("something");
        mock.reset();
        assert_eq!(0, mock.command_count());
        assert_eq!("", mock.last_command());
        assert!(mock.run_simple("something"));
    }

    #[test]
    fn a_handler_sees_every_invocation() {
        let mock = MockCommandRunner::new();
        mock.set_handler(Box::new(|command, _options| CommandResult {
            exit_code: if command.contains("fail") { 1 } else { 0 },
            ..CommandResult::default()
        }));
        assert!(mock.run_simple("build ok"));
        assert!(!mock.run_simple("build fail"));
    }

    #[test]
    fn success_requires_exit_zero_and_no_timeout() {
        let ok = CommandResult::default();
        assert!(ok.success());

        let bad_exit = CommandResult {
            exit_code: 1,
            ..CommandResult::default()
        };
        assert!(!bad_exit.success());

        let timed_out = CommandResult {
            timed_out: true,
            ..CommandResult::default()
        };
        assert!(!timed_out.success());
    }

    #[test]
    fn command_options_default_to_the_reference_behaviour() {
        let options = CommandOptions::default();
        assert!(options.working_dir.is_none());
        assert!(options.timeout.is_none());
        assert!(!options.capture_output);
        assert!(options.inherit_environment);
    }
}
