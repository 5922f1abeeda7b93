//! Deterministic mapping from stage outcome + accounting report to a verdict.

use crate::report::{AccountingReport, SandboxStatus};
use crate::toolchain;
use crate::types::{ExecutionResult, Verdict};

const SIGKILL: i32 = 9;

/// Ordered classification rules for a completed run stage. A compile
/// failure short-circuits to CE in the pipeline before this is reached.
pub fn classify(report: &AccountingReport) -> Verdict {
    if report.exitcode == Some(0) && report.status.is_none() {
        return Verdict::Ok;
    }
    match report.status {
        Some(SandboxStatus::Re) => Verdict::Re,
        Some(SandboxStatus::Sg) => Verdict::Sg,
        Some(SandboxStatus::To) => Verdict::To,
        Some(SandboxStatus::Xx) => Verdict::Xx,
        // Non-zero exit without an explicit status
        None => Verdict::Re,
    }
}

/// Substitute a human-readable message when the run left no useful stderr.
///
/// SG covers both OOM kills and plain signal deaths; the OOM flag (or a
/// SIGKILL with no flag, which is what the kernel's OOM killer delivers)
/// distinguishes a memory violation from an ordinary signal death.
pub fn synthesize_stderr(
    verdict: Verdict,
    stderr: String,
    report: &AccountingReport,
) -> String {
    match verdict {
        Verdict::Re => {
            if !stderr.is_empty() {
                stderr
            } else {
                report
                    .message
                    .clone()
                    .unwrap_or_else(|| "Runtime Error".to_string())
            }
        }
        Verdict::To => "Time limit exceeded".to_string(),
        Verdict::Sg => match report.exitsig {
            _ if report.cg_oom_killed => "Memory limit exceeded".to_string(),
            Some(SIGKILL) | None => "Memory limit exceeded".to_string(),
            Some(signal) => format!("killed by signal {signal}"),
        },
        Verdict::Xx => report
            .message
            .clone()
            .unwrap_or_else(|| "Internal Error".to_string()),
        Verdict::Ok | Verdict::Ce => stderr,
    }
}

/// Assemble the final result for a run attempt that reached the run stage.
///
/// Time is converted to milliseconds, memory stays in kilobytes. Line-number
/// recovery only applies to error verdicts; a miss is not an error.
pub fn build_result(
    language: &str,
    report: &AccountingReport,
    stdout: String,
    stderr: String,
) -> ExecutionResult {
    let verdict = classify(report);
    let stderr = synthesize_stderr(verdict, stderr, report);
    let line_number = match verdict {
        Verdict::Ce | Verdict::Re => toolchain::error_line(language, &stderr),
        _ => None,
    };

    ExecutionResult {
        verdict,
        time: report.time_ms(),
        memory: report.memory_kb(),
        stdout,
        stderr,
        line_number,
        error_type: report.status.map(|s| s.as_str().to_string()),
        exit_code: report.exitcode,
        exit_signal: report.exitsig,
    }
}

/// Result for a job whose compile stage produced diagnostics. The run stage
/// never happened, so stdout is empty and no resource usage is reported.
pub fn compile_error_result(language: &str, diagnostics: String) -> ExecutionResult {
    let line_number = toolchain::error_line(language, &diagnostics);
    ExecutionResult {
        verdict: Verdict::Ce,
        time: 0,
        memory: 0,
        stdout: String::new(),
        stderr: diagnostics,
        line_number,
        error_type: None,
        exit_code: None,
        exit_signal: None,
    }
}
