#![allow(dead_code)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use harness_core::{HarnessConfig, Readiness, Role};
use tempfile::TempDir;
use tokio::sync::{Mutex, MutexGuard};

/// Serializes tests that write and execute stub executables.
///
/// Executing a script while another thread still holds it open for writing
/// fails with `ETXTBSY`.
static STUBS: Mutex<()> = Mutex::const_new(());

pub async fn lock() -> MutexGuard<'static, ()> {
    STUBS.lock().await
}

/// A project root with a circuit catalog and stub protocol executables.
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("circuits")).unwrap();
        fs::create_dir(dir.path().join("archive")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes a circuit description and both party inputs.
    pub fn circuit(&self, name: &str) -> &Self {
        let circuits = self.root().join("circuits");
        fs::write(circuits.join(format!("{name}.txt")), "circuit").unwrap();
        fs::write(circuits.join(format!("{name}-input-1.txt")), "1").unwrap();
        fs::write(circuits.join(format!("{name}-input-2.txt")), "2").unwrap();
        self
    }

    /// Writes a shell script as the `role` executable of `version`.
    pub fn stub(&self, role: Role, version: &str, body: &str) -> &Self {
        let path = self.executable(role, version);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        self
    }

    /// Writes a garbler that exits right away and an evaluator running `body`.
    pub fn version(&self, version: &str, evaluator: &str) -> &Self {
        self.stub(Role::Garbler, version, "exit 0")
            .stub(Role::Evaluator, version, evaluator)
    }

    pub fn executable(&self, role: Role, version: &str) -> PathBuf {
        self.root()
            .join("archive")
            .join(format!("yaos_{role}_{version}"))
    }

    /// Config rooted at the project with a short grace period.
    pub fn config(&self) -> HarnessConfig {
        HarnessConfig::builder()
            .root(self.root())
            .readiness(Readiness::Delay { grace_ms: 20 })
            .evaluator_timeout_secs(10)
            .build()
    }
}

/// Reads a pid written by a stub, waiting for the stub to write it.
pub async fn read_pid(path: &Path) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(pid) = fs::read_to_string(path)
            .ok()
            .and_then(|content| content.trim().parse().ok())
        {
            return pid;
        }
        assert!(Instant::now() < deadline, "no pid in {}", path.display());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Returns `true` once `pid` has exited, zombies count as exited.
#[cfg(target_os = "linux")]
pub async fn exits_within(pid: u32, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        let running = fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let (_, rest) = stat.rsplit_once(')')?;
                rest.trim_start().chars().next()
            })
            .is_some_and(|state| state != 'Z' && state != 'X');
        if !running {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
