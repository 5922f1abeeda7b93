//! The compile → run → collect pipeline.
//!
//! One `Pipeline` value is constructed per job and holds no mutable state
//! of its own; the only shared resource is the slot pool. Stages run
//! strictly sequentially and the acquired slot is released on every exit
//! path.

use tokio::fs;
use tracing::{debug, info};

use crate::classify;
use crate::error::Error;
use crate::launcher::{Envelope, Invocation};
use crate::pool::{SandboxSession, SlotPool};
use crate::toolchain::{self, ToolchainDescriptor};
use crate::types::{ExecutionResult, Job, RunLimits};
use crate::Result;

pub struct Pipeline<'a> {
    pool: &'a SlotPool,
}

impl<'a> Pipeline<'a> {
    pub fn new(pool: &'a SlotPool) -> Self {
        Self { pool }
    }

    /// Execute one job to a classified result.
    ///
    /// Validation happens before any sandbox resource is touched. Exactly
    /// one result is produced per attempt; infrastructure failures
    /// propagate as errors for the queue layer to redeliver.
    pub async fn run(&self, job: &Job) -> Result<ExecutionResult> {
        let toolchain = toolchain::resolve(&job.language)?;
        if job.code.trim().is_empty() {
            return Err(Error::EmptyCode);
        }

        let session = self.pool.acquire().await?;
        debug!(job_id = %job.id, slot_id = session.slot_id, "sandbox slot acquired");

        // Single release point covering success, classified failure, and
        // infrastructure errors alike.
        let outcome = self.run_staged(job, toolchain, &session).await;
        self.pool.release(session).await;

        if let Ok(result) = &outcome {
            info!(job_id = %job.id, verdict = %result.verdict, time_ms = result.time, "run classified");
        }
        outcome
    }

    async fn run_staged(
        &self,
        job: &Job,
        toolchain: &ToolchainDescriptor,
        session: &SandboxSession,
    ) -> Result<ExecutionResult> {
        self.stage(job, toolchain, session).await?;

        if let Some(compile_command) = toolchain.compile_command {
            if let Some(ce) = self.compile(job, toolchain, compile_command, session).await? {
                return Ok(ce);
            }
        }

        self.execute(job, toolchain, session).await
    }

    /// Write the (possibly preprocessed) source and the caller's stdin into
    /// the session.
    async fn stage(
        &self,
        job: &Job,
        toolchain: &ToolchainDescriptor,
        session: &SandboxSession,
    ) -> Result<()> {
        let source = toolchain::preprocess(&job.language, &job.code);
        fs::write(session.boxdir.join(toolchain.source_file_name), source.as_bytes()).await?;
        fs::write(&session.stdin_path, &job.stdin).await?;
        Ok(())
    }

    /// Run the compiler under its fixed generous envelope. Returns a CE
    /// result when diagnostics appear or the compiler fails; `None` means
    /// compilation succeeded and the run stage may proceed.
    async fn compile(
        &self,
        job: &Job,
        toolchain: &ToolchainDescriptor,
        compile_command: &str,
        session: &SandboxSession,
    ) -> Result<Option<ExecutionResult>> {
        let invocation = Invocation {
            slot_id: session.slot_id,
            report_path: session.report_path.clone(),
            envelope: Envelope::compile(),
            sandbox_opts: sandbox_opts(toolchain),
            stdin: None,
            stdout: None,
            stderr: Some(session.compile_output_path.clone()),
            command: split_command(compile_command),
        };

        let status = self.pool.launcher().run(&invocation).await?;
        let diagnostics = fs::read_to_string(&session.compile_output_path).await?;

        if !status.success || !diagnostics.trim().is_empty() {
            debug!(job_id = %job.id, "compilation failed");
            return Ok(Some(classify::compile_error_result(
                &job.language,
                diagnostics,
            )));
        }
        Ok(None)
    }

    /// Run the program under the caller's limits, then decode and classify.
    async fn execute(
        &self,
        job: &Job,
        toolchain: &ToolchainDescriptor,
        session: &SandboxSession,
    ) -> Result<ExecutionResult> {
        let limits = RunLimits::for_job(job);
        let invocation = Invocation {
            slot_id: session.slot_id,
            report_path: session.report_path.clone(),
            envelope: Envelope::run(limits),
            sandbox_opts: sandbox_opts(toolchain),
            stdin: Some(session.stdin_path.clone()),
            stdout: Some(session.stdout_path.clone()),
            stderr: Some(session.stderr_path.clone()),
            command: split_command(toolchain.run_command),
        };

        if let Err(err) = self.pool.launcher().run(&invocation).await {
            // The launcher invocation itself failed. Salvage a best-effort
            // result from whatever report it managed to write; with no
            // report there is nothing to classify.
            let raw = fs::read_to_string(&session.report_path)
                .await
                .unwrap_or_default();
            if raw.trim().is_empty() {
                return Err(err);
            }
        }

        let raw = fs::read_to_string(&session.report_path).await?;
        let report = crate::report::AccountingReport::parse(&raw)?;
        let stdout = fs::read_to_string(&session.stdout_path)
            .await
            .unwrap_or_default();
        let stderr = fs::read_to_string(&session.stderr_path)
            .await
            .unwrap_or_default();

        Ok(classify::build_result(&job.language, &report, stdout, stderr))
    }
}

fn sandbox_opts(toolchain: &ToolchainDescriptor) -> Vec<String> {
    toolchain
        .sandbox_opts
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(String::from).collect()
}
