//! Typed invocation boundary for the external sandbox launcher.
//!
//! The launcher (isolate) is a trusted utility that enforces CPU-time,
//! wall-clock, memory, and process-count limits and writes an accounting
//! report. This module's job is correct invocation and stream redirection,
//! never the isolation itself.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::Error;
use crate::types::RunLimits;
use crate::Result;

/// Environment allowlist passed into every boxed invocation.
const SANDBOX_PATH: &str =
    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Resource envelope for one launcher invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub time_secs: u64,
    pub wall_secs: u64,
    /// Address-space limit in kilobytes
    pub memory_kb: Option<u64>,
    /// Stack limit in kilobytes
    pub stack_kb: Option<u64>,
    pub process_limit: u32,
    /// File-size limit in kilobytes
    pub fsize_kb: Option<u64>,
}

impl Envelope {
    /// Fixed generous envelope for compilers: they need far more time,
    /// processes, and stack than the user program is granted.
    pub fn compile() -> Self {
        Self {
            time_secs: 30,
            wall_secs: 60,
            memory_kb: None,
            stack_kb: Some(64_000),
            process_limit: 30,
            fsize_kb: Some(1_000),
        }
    }

    /// Envelope for the run stage from caller-supplied limits.
    pub fn run(limits: RunLimits) -> Self {
        Self {
            time_secs: limits.time_secs,
            wall_secs: limits.wall_secs(),
            memory_kb: Some(limits.memory_kb),
            stack_kb: None,
            process_limit: limits.process_limit,
            fsize_kb: None,
        }
    }
}

/// One fully-specified launcher invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub slot_id: u32,
    pub report_path: PathBuf,
    pub envelope: Envelope,
    pub sandbox_opts: Vec<String>,
    pub stdin: Option<PathBuf>,
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
    /// Program and arguments executed inside the box
    pub command: Vec<String>,
}

/// Outcome of a launcher invocation that actually ran.
///
/// `success` is the launcher's own exit status. The launcher exits non-zero
/// whenever the boxed program fails, so a `false` here is not an
/// infrastructure error; the accounting report is authoritative.
#[derive(Debug, Clone, Copy)]
pub struct LaunchStatus {
    pub success: bool,
}

#[async_trait]
pub trait SandboxLauncher: Send + Sync {
    /// Provision the isolation slot; returns its working directory.
    async fn init(&self, slot_id: u32) -> Result<PathBuf>;

    /// Execute one invocation to completion. The launcher enforces the wall
    /// clock itself; callers simply wait.
    async fn run(&self, invocation: &Invocation) -> Result<LaunchStatus>;

    /// Tear the slot down. Must be safe to call after a failed run.
    async fn cleanup(&self, slot_id: u32) -> Result<()>;
}

/// Launcher implementation shelling out to `isolate`.
pub struct IsolateLauncher {
    binary: PathBuf,
}

impl IsolateLauncher {
    /// Locate the isolate binary, preferring an explicit path from config.
    pub fn new(binary: Option<PathBuf>) -> Result<Self> {
        let binary = match binary {
            Some(path) => path,
            None => which::which("isolate")
                .map_err(|e| Error::Launcher(format!("isolate binary not found: {e}")))?,
        };
        debug!(binary = %binary.display(), "using sandbox launcher");
        Ok(Self { binary })
    }
}

/// Flatten an invocation into the isolate argument list.
fn build_args(invocation: &Invocation) -> Vec<String> {
    let envelope = &invocation.envelope;
    let mut args = vec![
        "--box-id".to_string(),
        invocation.slot_id.to_string(),
        "--meta".to_string(),
        invocation.report_path.display().to_string(),
        "-s".to_string(),
        "-t".to_string(),
        envelope.time_secs.to_string(),
        "-w".to_string(),
        envelope.wall_secs.to_string(),
        format!("-p{}", envelope.process_limit),
    ];
    if let Some(kb) = envelope.memory_kb {
        args.push("-m".to_string());
        args.push(kb.to_string());
    }
    if let Some(kb) = envelope.stack_kb {
        args.push("-k".to_string());
        args.push(kb.to_string());
    }
    if let Some(kb) = envelope.fsize_kb {
        args.push(format!("-f{kb}"));
    }
    args.push("-E".to_string());
    args.push(SANDBOX_PATH.to_string());
    args.extend(invocation.sandbox_opts.iter().cloned());
    args.push("--run".to_string());
    args.push("--".to_string());
    args.extend(invocation.command.iter().cloned());
    args
}

fn open_read(path: &Path) -> Result<Stdio> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Launcher(format!("cannot open {}: {e}", path.display())))?;
    Ok(Stdio::from(file))
}

fn open_write(path: &Path) -> Result<Stdio> {
    let file = std::fs::File::create(path)
        .map_err(|e| Error::Launcher(format!("cannot open {}: {e}", path.display())))?;
    Ok(Stdio::from(file))
}

#[async_trait]
impl SandboxLauncher for IsolateLauncher {
    async fn init(&self, slot_id: u32) -> Result<PathBuf> {
        let output = Command::new(&self.binary)
            .arg("--box-id")
            .arg(slot_id.to_string())
            .arg("--init")
            .output()
            .await
            .map_err(|e| Error::Launcher(format!("isolate --init: {e}")))?;

        if !output.status.success() {
            return Err(Error::Launcher(format!(
                "isolate --init failed for box {slot_id}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(PathBuf::from(
            String::from_utf8_lossy(&output.stdout).trim(),
        ))
    }

    async fn run(&self, invocation: &Invocation) -> Result<LaunchStatus> {
        let args = build_args(invocation);
        debug!(slot_id = invocation.slot_id, ?args, "launching sandboxed command");

        let mut command = Command::new(&self.binary);
        command.args(&args);

        command.stdin(match &invocation.stdin {
            Some(path) => open_read(path)?,
            None => Stdio::null(),
        });
        command.stdout(match &invocation.stdout {
            Some(path) => open_write(path)?,
            None => Stdio::null(),
        });
        command.stderr(match &invocation.stderr {
            Some(path) => open_write(path)?,
            None => Stdio::null(),
        });

        let status = command
            .status()
            .await
            .map_err(|e| Error::Launcher(format!("isolate --run: {e}")))?;

        Ok(LaunchStatus {
            success: status.success(),
        })
    }

    async fn cleanup(&self, slot_id: u32) -> Result<()> {
        let output = Command::new(&self.binary)
            .arg("--box-id")
            .arg(slot_id.to_string())
            .arg("--cleanup")
            .output()
            .await
            .map_err(|e| Error::Launcher(format!("isolate --cleanup: {e}")))?;

        if !output.status.success() {
            return Err(Error::Launcher(format!(
                "isolate --cleanup failed for box {slot_id}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
