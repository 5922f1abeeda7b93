//! Bounded pool of exclusive sandbox slots.
//!
//! Slot ids come from an explicit free-list guarded by a mutex, with a
//! semaphore bounding concurrent holders, so an id in use can never be
//! handed out twice.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, warn};

use crate::error::Error;
use crate::launcher::SandboxLauncher;
use crate::Result;

const STDIN_FILE: &str = "stdin.txt";
const STDOUT_FILE: &str = "stdout.txt";
const STDERR_FILE: &str = "stderr.txt";
const REPORT_FILE: &str = "metadata.txt";
const COMPILE_OUTPUT_FILE: &str = "compile_output.txt";

/// One provisioned isolation slot, exclusively owned by a single in-flight
/// job. Releasing consumes the session, so a double release does not
/// compile.
#[derive(Debug)]
pub struct SandboxSession {
    pub slot_id: u32,
    pub workdir: PathBuf,
    /// Directory visible to the boxed process; source is staged here
    pub boxdir: PathBuf,
    pub stdin_path: PathBuf,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub report_path: PathBuf,
    pub compile_output_path: PathBuf,
}

pub struct SlotPool {
    launcher: Arc<dyn SandboxLauncher>,
    free: Mutex<Vec<u32>>,
    permits: Semaphore,
    capacity: u32,
}

impl SlotPool {
    pub fn new(launcher: Arc<dyn SandboxLauncher>, capacity: u32) -> Self {
        Self {
            launcher,
            free: Mutex::new((0..capacity).rev().collect()),
            permits: Semaphore::new(capacity as usize),
            capacity,
        }
    }

    pub fn launcher(&self) -> &dyn SandboxLauncher {
        self.launcher.as_ref()
    }

    /// Acquire a slot, waiting until one is free, then provision its
    /// filesystem. On staging failure the slot returns to the free set.
    pub async fn acquire(&self) -> Result<SandboxSession> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::PoolExhausted)?;
        permit.forget();
        self.provision().await
    }

    /// Like [`acquire`](Self::acquire) but fails immediately with
    /// `PoolExhausted` when every slot is held.
    pub async fn try_acquire(&self) -> Result<SandboxSession> {
        let permit = self
            .permits
            .try_acquire()
            .map_err(|_| Error::PoolExhausted)?;
        permit.forget();
        self.provision().await
    }

    async fn provision(&self) -> Result<SandboxSession> {
        // A permit is held, so the free list cannot be empty here
        let slot_id = match self.free.lock().await.pop() {
            Some(id) => id,
            None => {
                self.permits.add_permits(1);
                return Err(Error::PoolExhausted);
            }
        };

        match self.stage(slot_id).await {
            Ok(session) => Ok(session),
            Err(e) => {
                if let Err(cleanup_err) = self.launcher.cleanup(slot_id).await {
                    warn!(slot_id, error = %cleanup_err, "cleanup after failed staging");
                }
                self.free.lock().await.push(slot_id);
                self.permits.add_permits(1);
                Err(e)
            }
        }
    }

    async fn stage(&self, slot_id: u32) -> Result<SandboxSession> {
        let workdir = self.launcher.init(slot_id).await?;
        let boxdir = workdir.join("box");

        let session = SandboxSession {
            slot_id,
            stdin_path: workdir.join(STDIN_FILE),
            stdout_path: workdir.join(STDOUT_FILE),
            stderr_path: workdir.join(STDERR_FILE),
            report_path: workdir.join(REPORT_FILE),
            compile_output_path: workdir.join(COMPILE_OUTPUT_FILE),
            workdir,
            boxdir,
        };

        for path in [
            &session.stdin_path,
            &session.stdout_path,
            &session.stderr_path,
            &session.report_path,
            &session.compile_output_path,
        ] {
            init_file(path).await?;
        }

        Ok(session)
    }

    /// Return a slot to the free set, tearing the slot's filesystem down
    /// first. Cleanup failure is logged but never withholds the slot.
    pub async fn release(&self, session: SandboxSession) {
        if let Err(e) = self.launcher.cleanup(session.slot_id).await {
            error!(slot_id = session.slot_id, error = %e, "sandbox cleanup failed");
        }

        let mut free = self.free.lock().await;
        if free.contains(&session.slot_id) {
            warn!(slot_id = session.slot_id, "slot already in free set");
            return;
        }
        free.push(session.slot_id);
        self.permits.add_permits(1);
    }

    /// Number of slots currently held.
    pub async fn active(&self) -> usize {
        self.capacity as usize - self.free.lock().await.len()
    }
}

/// Create an empty stage file the boxed process can write into.
async fn init_file(path: &Path) -> Result<()> {
    fs::write(path, "").await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).await?.permissions();
        perms.set_mode(0o666);
        fs::set_permissions(path, perms).await?;
    }
    Ok(())
}
