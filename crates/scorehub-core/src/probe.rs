use crate::probe_protocol::ProbeVerdict;
use crate::process::{CommandResult, CommandRunner, ProcessRunner, PROBE_TIMEOUT};
use crate::settings::HubConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeTarget {
    pub broker: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProbeTarget {
    pub fn new(broker: impl Into<String>, port: u16) -> Self {
        Self {
            broker: broker.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    pub fn probe_args(&self) -> Vec<String> {
        let mut args = vec![self.broker.clone(), self.port.to_string()];
        if let Some((user, pass)) = self.credentials() {
            args.extend([
                "-u".to_string(),
                user.to_string(),
                "-p".to_string(),
                pass.to_string(),
            ]);
        }
        args
    }
}

/// Same shape as [`CommandResult`]; `success` reflects the probe verdict.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub output: String,
}

/// Only the probe's stdout carries the verdict; stderr is diagnostics.
pub fn interpret_probe(result: &CommandResult) -> bool {
    result.success && ProbeVerdict::from_output(&result.stdout) == ProbeVerdict::Yes
}

/// Runs the broker connectivity probe as a separate, time-bounded process.
pub struct ProbeRunner {
    probe_exec: String,
    cwd: PathBuf,
    timeout: Duration,
    runner: Box<dyn CommandRunner>,
}

impl ProbeRunner {
    pub fn new(config: &HubConfig) -> Self {
        Self::with_runner(
            config.probe_exec(),
            config.scoreboard_dir.clone(),
            Box::new(ProcessRunner::new()),
        )
    }

    pub fn with_runner(
        probe_exec: impl Into<String>,
        cwd: impl Into<PathBuf>,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            probe_exec: probe_exec.into(),
            cwd: cwd.into(),
            timeout: PROBE_TIMEOUT,
            runner,
        }
    }

    pub fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        if target.broker.trim().is_empty() || target.port == 0 {
            return ProbeOutcome {
                success: false,
                output: "Error: \"broker\" and \"port\" are required.".to_string(),
            };
        }

        // Bare names are left to PATH lookup.
        let exec = Path::new(&self.probe_exec);
        let is_path = exec.parent().is_some_and(|dir| !dir.as_os_str().is_empty());
        if is_path && !exec.is_file() {
            tracing::error!(path = %exec.display(), "broker probe executable not found");
            return ProbeOutcome {
                success: false,
                output: format!("Error: Script not found at {}", exec.display()),
            };
        }

        let mut argv = vec![self.probe_exec.clone()];
        argv.extend(target.probe_args());

        let result = self.runner.run(&argv, &self.cwd, self.timeout);
        let success = interpret_probe(&result);
        tracing::info!(broker = %target.broker, port = target.port, success, "broker probe finished");
        ProbeOutcome {
            success,
            output: result.output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct FixedRunner {
        result: CommandResult,
        seen: Rc<RefCell<Vec<Vec<String>>>>,
    }

    impl CommandRunner for FixedRunner {
        fn run(&self, argv: &[String], _cwd: &Path, timeout: Duration) -> CommandResult {
            assert_eq!(timeout, PROBE_TIMEOUT);
            self.seen.borrow_mut().push(argv.to_vec());
            self.result.clone()
        }
    }

    fn probe_with(result: CommandResult, target: &ProbeTarget) -> (ProbeOutcome, Vec<Vec<String>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let runner = ProbeRunner::with_runner(
            "scorehub-probe",
            ".",
            Box::new(FixedRunner {
                result,
                seen: seen.clone(),
            }),
        );
        let outcome = runner.probe(target);
        let calls = seen.borrow().clone();
        (outcome, calls)
    }

    #[test]
    fn verdict_requires_success_and_yes() {
        let target = ProbeTarget::new("broker.local", 1883);
        assert!(probe_with(CommandResult::ok("yes\n"), &target).0.success);
        assert!(!probe_with(CommandResult::ok("no\n"), &target).0.success);
        assert!(!probe_with(CommandResult::failed(""), &target).0.success);
        assert!(!probe_with(CommandResult::failed("yes\n"), &target).0.success);
    }

    #[test]
    fn credentials_passed_only_when_both_present() {
        let partial = ProbeTarget::new("broker.local", 1883)
            .with_credentials(Some("user".to_string()), None);
        let (_, calls) = probe_with(CommandResult::ok("yes"), &partial);
        assert_eq!(calls[0], vec!["scorehub-probe", "broker.local", "1883"]);

        let full = ProbeTarget::new("broker.local", 1883)
            .with_credentials(Some("user".to_string()), Some("secret".to_string()));
        let (_, calls) = probe_with(CommandResult::ok("yes"), &full);
        assert_eq!(
            calls[0],
            vec!["scorehub-probe", "broker.local", "1883", "-u", "user", "-p", "secret"]
        );
    }

    #[test]
    fn missing_broker_is_rejected_without_spawning() {
        let (outcome, calls) = probe_with(CommandResult::ok("yes"), &ProbeTarget::new(" ", 1883));
        assert!(!outcome.success);
        assert!(calls.is_empty());
    }

    #[test]
    fn missing_probe_executable_is_reported_without_spawning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exec = dir.path().join("scorehub-probe");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let runner = ProbeRunner::with_runner(
            exec.to_string_lossy().into_owned(),
            dir.path(),
            Box::new(FixedRunner {
                result: CommandResult::ok("yes"),
                seen: seen.clone(),
            }),
        );

        let outcome = runner.probe(&ProbeTarget::new("broker.local", 1883));
        assert!(!outcome.success);
        assert_eq!(
            outcome.output,
            format!("Error: Script not found at {}", exec.display())
        );
        assert!(seen.borrow().is_empty());
    }
}
