//! Check-in notifications.
//!
//! Notifications never block the caller and their failures are only logged.

use std::process::{Command, Stdio};

pub trait Notifier: Send + Sync {
    /// Announce that `name` was recognized.
    fn notify(&self, name: &str);
}

/// Runs a shell command on a detached thread with `PRESENCE_NAME` set.
pub struct CommandNotifier {
    command: String,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn build(&self, name: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .env("PRESENCE_NAME", name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, name: &str) {
        let mut cmd = self.build(name);
        let name = name.to_string();
        let spawned = std::thread::Builder::new()
            .name("presence-notify".into())
            .spawn(move || match cmd.status() {
                Ok(status) if status.success() => {}
                Ok(status) => tracing::warn!(%name, %status, "notify command failed"),
                Err(e) => tracing::warn!(%name, error = %e, "notify command did not run"),
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to spawn notify thread");
        }
    }
}

/// Fallback when no command is configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, name: &str) {
        tracing::info!(name, "check-in validated");
    }
}

pub fn from_config(command: Option<&str>) -> Box<dyn Notifier> {
    match command {
        Some(cmd) => Box::new(CommandNotifier::new(cmd)),
        None => Box::new(LogNotifier),
    }
}
