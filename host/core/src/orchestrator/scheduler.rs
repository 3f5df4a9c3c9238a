//! Periodic scheduler subsystem
//!
//! Runs the backend program with the scheduler arguments once per interval,
//! under the same settings and session environment as the backend itself.
//! The first run happens one interval after start.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::backend::session_env;
use super::error::SubsystemError;
use super::subsystem::{Subsystem, SubsystemContext, SubsystemHandle};
use crate::config::SchedulerConfig;

/// Scheduler subsystem
#[derive(Clone, Debug)]
pub struct Scheduler {
    program: String,
    args: Vec<String>,
    interval: Duration,
    working_dir: Option<PathBuf>,
}

impl Scheduler {
    /// Scheduler running `program` with the configured arguments
    #[must_use]
    pub fn new(program: impl Into<String>, config: &SchedulerConfig) -> Self {
        Self {
            program: program.into(),
            args: config.args.clone(),
            interval: config.interval,
            working_dir: None,
        }
    }

    /// Run in `dir`
    #[must_use]
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Time between runs
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arguments of a single run: settings flags, then the scheduler arguments
    #[must_use]
    pub fn command_line(&self, ctx: &SubsystemContext) -> Vec<String> {
        let mut args = ctx.settings().to_flags();
        args.extend(self.args.iter().cloned());
        args
    }

    async fn run_once(&self, args: &[String], env: &[(String, String)]) {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        match command.output().await {
            Ok(output) if output.status.success() => {
                debug!(program = %self.program, "Scheduled run completed");
            }
            Ok(output) => {
                warn!(
                    program = %self.program,
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Scheduled run failed"
                );
            }
            Err(e) => {
                warn!(program = %self.program, error = %e, "Failed to spawn scheduled run");
            }
        }
    }
}

#[async_trait]
impl Subsystem for Scheduler {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    async fn start(&self, ctx: SubsystemContext) -> Result<SubsystemHandle, SubsystemError> {
        let args = self.command_line(&ctx);
        let env = session_env(ctx.secret(), &ctx.api_url());
        let scheduler = self.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + scheduler.interval, scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => scheduler.run_once(&args, &env).await,
                }
            }
            debug!("Scheduler loop ended");
        });

        info!(
            interval_secs = self.interval.as_secs(),
            program = %self.program,
            "Scheduler started"
        );
        Ok(SubsystemHandle::new(self.name(), shutdown_tx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::ExtensionSet;
    use crate::session::{BackendSettings, Session};
    use std::sync::Arc;

    fn ready_context() -> SubsystemContext {
        let session = Arc::new(Session::new(
            4000,
            BackendSettings::new().with("memory_limit", "256M"),
        ));
        session.bind_backend_port(8100).unwrap();
        SubsystemContext::new(session, ExtensionSet::default()).unwrap()
    }

    #[test]
    fn test_command_line_prepends_settings() {
        let scheduler = Scheduler::new("php", &SchedulerConfig::default());
        assert_eq!(
            scheduler.command_line(&ready_context()),
            vec!["-d", "memory_limit=256M", "artisan", "schedule:run"]
        );
        assert_eq!(scheduler.interval(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let scheduler = Scheduler::new("definitely-not-a-real-program", &SchedulerConfig::default());
        let handle = scheduler.start(ready_context()).await.unwrap();
        assert_eq!(handle.name(), "scheduler");
        assert!(!handle.is_finished());
        handle.stop().await;
    }
}
