use std::{
    io::{self, BufRead, BufReader},
    net::TcpListener,
    path::PathBuf,
    process::ExitStatus,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use harness_core::{
    HarnessConfig, Readiness, Role, circuit::CircuitCase, network::RendezvousAddr,
    trial::RunResult,
};
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to launch {role} at {path}: {source}")]
    Launch {
        role: Role,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{role} did not finish within {timeout:?}")]
    Timeout { role: Role, timeout: Duration },
    #[error("garbler did not signal readiness: {reason}")]
    NotReady { reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Runs one paired garbler/evaluator trial.
#[async_trait]
pub trait TrialRunner {
    /// Runs `case` once using the executables built as `version`.
    async fn run_trial(&mut self, case: &CircuitCase, version: &str)
    -> Result<RunResult, RunError>;
}

/// Launches the protocol executables as OS processes.
///
/// Trials must not overlap when a fixed rendezvous port is configured.
#[derive(Debug, Clone)]
pub struct Executor {
    config: HarnessConfig,
}

impl Executor {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    fn rendezvous(&self) -> io::Result<RendezvousAddr> {
        let addr = &self.config.rendezvous;
        if !self.config.ephemeral_port {
            return Ok(addr.clone());
        }

        // The port is released again when the listener is dropped, before the
        // garbler binds it.
        let listener = TcpListener::bind((addr.host.as_str(), 0))?;
        Ok(addr.with_port(listener.local_addr()?.port()))
    }

    fn command(
        &self,
        role: Role,
        case: &CircuitCase,
        version: &str,
        addr: &RendezvousAddr,
    ) -> (PathBuf, duct::Expression) {
        let path = self.config.executable(role, version);
        let expr = duct::cmd(
            &path,
            [
                case.circuit_path().into_os_string(),
                case.input_path(role).into_os_string(),
                addr.host.clone().into(),
                addr.port.to_string().into(),
            ],
        )
        .unchecked();

        (path, own_process_group(expr))
    }
}

#[async_trait]
impl TrialRunner for Executor {
    async fn run_trial(
        &mut self,
        case: &CircuitCase,
        version: &str,
    ) -> Result<RunResult, RunError> {
        let circuit = case.name();
        let addr = self.rendezvous()?;
        let mut trial = Trial::default();

        debug!(circuit, version, %addr, "starting garbler");
        let (path, garbler) = self.command(Role::Garbler, case, version, &addr);
        let garbler = garbler.stderr_null();
        let launch_failed = |source| RunError::Launch {
            role: Role::Garbler,
            path,
            source,
        };
        match &self.config.readiness {
            Readiness::Delay { grace_ms } => {
                let handle = garbler.stdout_null().start().map_err(launch_failed)?;
                trial.garbler = Some(Garbler::Silent(handle));

                tokio::time::sleep(Duration::from_millis(*grace_ms)).await;
            }
            Readiness::Marker { marker, timeout_ms } => {
                let reader = Arc::new(garbler.reader().map_err(launch_failed)?);
                trial.garbler = Some(Garbler::Streamed(reader.clone()));

                await_marker(reader, marker.clone(), Duration::from_millis(*timeout_ms)).await?;
            }
        }

        debug!(circuit, version, %addr, "starting evaluator");
        let (path, evaluator) = self.command(Role::Evaluator, case, version, &addr);
        let timeout = self.config.evaluator_timeout();

        let start = Instant::now();
        let handle = Arc::new(
            evaluator
                .stdout_capture()
                .stderr_capture()
                .start()
                .map_err(|source| RunError::Launch {
                    role: Role::Evaluator,
                    path,
                    source,
                })?,
        );
        trial.evaluator = Some(handle.clone());

        let wait = tokio::task::spawn_blocking(move || {
            let output = handle.wait().cloned();
            (output, start.elapsed())
        });

        let (output, elapsed) = match tokio::time::timeout(timeout, wait).await {
            Ok(joined) => joined.map_err(io::Error::other)?,
            Err(_) => {
                warn!(circuit, version, ?timeout, "evaluator timed out, killing trial");
                trial.shutdown();
                return Err(RunError::Timeout {
                    role: Role::Evaluator,
                    timeout,
                });
            }
        };
        let output = output?;

        match trial.garbler_status() {
            Ok(Some(status)) if !status.success() => {
                warn!(circuit, version, %status, "garbler exited unsuccessfully")
            }
            Ok(Some(_)) => {}
            Ok(None) => debug!(circuit, version, "garbler still running after evaluator"),
            Err(e) => warn!(circuit, version, "failed to check garbler status: {e}"),
        }

        if !output.status.success() {
            warn!(
                circuit,
                version,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "evaluator exited unsuccessfully"
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let result = RunResult::new(stdout.trim(), elapsed, output.status.success());

        debug!(circuit, version, ?elapsed, "trial finished");

        Ok(result)
    }
}

/// Waits until the garbler prints a line containing `marker`.
///
/// The garbler's stdout keeps being drained afterwards so it never blocks on
/// a full pipe.
async fn await_marker(
    reader: Arc<duct::ReaderHandle>,
    marker: String,
    timeout: Duration,
) -> Result<(), RunError> {
    let (tx, rx) = oneshot::channel();

    std::thread::spawn(move || {
        let mut lines = BufReader::new(&*reader);
        let mut tx = Some(tx);
        let mut line = String::new();
        loop {
            line.clear();
            match lines.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if line.contains(&marker) {
                        if let Some(tx) = tx.take() {
                            _ = tx.send(());
                        }
                    }
                }
            }
        }
    });

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(RunError::NotReady {
            reason: "garbler closed its output before becoming ready".to_string(),
        }),
        Err(_) => Err(RunError::NotReady {
            reason: format!("no readiness marker within {timeout:?}"),
        }),
    }
}

#[cfg(unix)]
fn own_process_group(expr: duct::Expression) -> duct::Expression {
    use std::os::unix::process::CommandExt;

    expr.before_spawn(|cmd| {
        cmd.process_group(0);
        Ok(())
    })
}

#[cfg(not(unix))]
fn own_process_group(expr: duct::Expression) -> duct::Expression {
    expr
}

/// Kills the process group led by each of `pids`, including any children the
/// leaders forked.
#[cfg(unix)]
fn kill_process_groups(pids: &[u32]) {
    for &pid in pids {
        let Ok(pgid) = libc::pid_t::try_from(pid) else {
            continue;
        };

        // SAFETY: killpg takes no pointers and only sends a signal.
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!(pgid, "failed to kill process group: {err}");
            }
        }
    }
}

enum Garbler {
    /// Output discarded.
    Silent(duct::Handle),
    /// Output streamed for readiness detection.
    Streamed(Arc<duct::ReaderHandle>),
}

impl Garbler {
    /// Never blocks, no output is captured into memory.
    fn try_status(&self) -> io::Result<Option<ExitStatus>> {
        let output = match self {
            Garbler::Silent(handle) => handle.try_wait()?,
            Garbler::Streamed(reader) => reader.try_wait()?,
        };

        Ok(output.map(|output| output.status))
    }

    fn shutdown(self) {
        #[cfg(unix)]
        kill_process_groups(&match &self {
            Garbler::Silent(handle) => handle.pids(),
            Garbler::Streamed(reader) => reader.pids(),
        });

        match self {
            Garbler::Silent(handle) => {
                #[cfg(not(unix))]
                let _ = handle.kill();

                std::thread::spawn(move || {
                    _ = handle.wait();
                });
            }
            // The drain thread reaps the process once its output closes.
            Garbler::Streamed(_reader) => {
                #[cfg(not(unix))]
                let _ = _reader.kill();
            }
        }
    }
}

/// Owns the processes of a single trial.
///
/// Dropping the trial kills the process group of both parties. Nothing here
/// waits: the evaluator is reaped by the task waiting on it and the garbler on
/// a detached thread.
#[derive(Default)]
struct Trial {
    garbler: Option<Garbler>,
    evaluator: Option<Arc<duct::Handle>>,
}

impl Trial {
    fn garbler_status(&self) -> io::Result<Option<ExitStatus>> {
        match &self.garbler {
            Some(garbler) => garbler.try_status(),
            None => Ok(None),
        }
    }

    fn shutdown(&mut self) {
        if let Some(evaluator) = self.evaluator.take() {
            #[cfg(unix)]
            kill_process_groups(&evaluator.pids());
            #[cfg(not(unix))]
            let _ = evaluator.kill();
        }

        if let Some(garbler) = self.garbler.take() {
            garbler.shutdown();
        }
    }
}

impl Drop for Trial {
    fn drop(&mut self) {
        self.shutdown();
    }
}
