//! Worker process supervision.
//!
//! The supervisor starts one child process per [`WorkerSpec`] and keeps it
//! running: when a child exits for any reason it is logged and started
//! again on the same port after the restart delay. Sessions held by the
//! dead process are gone; the front router answers `not_found` for them.

use std::ffi::OsString;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Program and arguments used to launch a worker.
///
/// `worker --index <i> --port <p>` is appended to the configured arguments
/// for each child.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Re-launch the running executable.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn spawn(&self, spec: &WorkerSpec) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .arg("worker")
            .arg("--index")
            .arg(spec.index.to_string())
            .arg("--port")
            .arg(spec.port.to_string())
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

/// One supervised worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSpec {
    pub index: u16,
    pub port: u16,
}

impl WorkerSpec {
    /// `count` workers on consecutive ports starting at `base_port`.
    pub fn sequence(count: usize, base_port: u16) -> Vec<WorkerSpec> {
        (0..count)
            .map(|i| WorkerSpec {
                index: i as u16,
                port: base_port.saturating_add(i as u16),
            })
            .collect()
    }
}

/// Starts and restarts worker processes.
pub struct Supervisor {
    command: WorkerCommand,
    workers: Vec<WorkerSpec>,
    restart_delay: Duration,
}

impl Supervisor {
    pub fn new(command: WorkerCommand, workers: Vec<WorkerSpec>) -> Self {
        Self {
            command,
            workers,
            restart_delay: Duration::from_millis(
                reframe_types::config_defaults::RESTART_DELAY_MS,
            ),
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn workers(&self) -> &[WorkerSpec] {
        &self.workers
    }

    /// Launch every worker and return a handle that stops them.
    pub fn start(self) -> SupervisorHandle {
        let token = CancellationToken::new();
        let restarts = Arc::new(AtomicU64::new(0));
        let command = Arc::new(self.command);

        let tasks = self
            .workers
            .into_iter()
            .map(|spec| {
                tokio::spawn(supervise(
                    Arc::clone(&command),
                    spec,
                    self.restart_delay,
                    token.clone(),
                    Arc::clone(&restarts),
                ))
            })
            .collect();

        SupervisorHandle {
            token,
            tasks,
            restarts,
        }
    }
}

async fn supervise(
    command: Arc<WorkerCommand>,
    spec: WorkerSpec,
    restart_delay: Duration,
    token: CancellationToken,
    restarts: Arc<AtomicU64>,
) {
    loop {
        match command.spawn(&spec) {
            Ok(mut child) => {
                info!(
                    worker = spec.index,
                    port = spec.port,
                    pid = child.id(),
                    "Worker started"
                );

                tokio::select! {
                    _ = token.cancelled() => {
                        if let Err(e) = child.kill().await {
                            warn!(worker = spec.index, error = %e, "Failed to kill worker");
                        }
                        info!(worker = spec.index, "Worker stopped");
                        return;
                    }
                    status = child.wait() => {
                        match status {
                            Ok(status) => warn!(worker = spec.index, %status, "Worker exited"),
                            Err(e) => error!(worker = spec.index, error = %e, "Lost track of worker"),
                        }
                    }
                }
            }
            Err(e) => {
                error!(worker = spec.index, port = spec.port, error = %e, "Failed to start worker");
            }
        }

        restarts.fetch_add(1, Ordering::Relaxed);
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(restart_delay) => {}
        }
        info!(worker = spec.index, "Restarting worker");
    }
}

/// Handle to running workers.
pub struct SupervisorHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    restarts: Arc<AtomicU64>,
}

impl SupervisorHandle {
    /// Number of times any worker had to be started again.
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// Kill every worker and wait for the supervision tasks to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Supervisor task failed");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_worker_sequence() {
        let specs = WorkerSpec::sequence(3, 9000);
        assert_eq!(
            specs,
            vec![
                WorkerSpec { index: 0, port: 9000 },
                WorkerSpec { index: 1, port: 9001 },
                WorkerSpec { index: 2, port: 9002 },
            ]
        );
    }

    #[tokio::test]
    async fn test_exited_worker_is_restarted() {
        // The appended worker arguments become positional parameters of the script.
        let command = WorkerCommand::new("sh").args(["-c", "exit 3"]);
        let handle = Supervisor::new(command, WorkerSpec::sequence(1, 1))
            .with_restart_delay(Duration::from_millis(10))
            .start();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(handle.restarts() >= 2);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_kills_running_workers() {
        let command = WorkerCommand::new("sh").args(["-c", "sleep 30"]);
        let handle = Supervisor::new(command, WorkerSpec::sequence(2, 1)).start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.restarts(), 0);

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_program_keeps_retrying() {
        let command = WorkerCommand::new("/nonexistent/reframe-worker");
        let handle = Supervisor::new(command, WorkerSpec::sequence(1, 1))
            .with_restart_delay(Duration::from_millis(10))
            .start();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(handle.restarts() >= 1);

        handle.shutdown().await;
    }
}
