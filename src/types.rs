use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A submitted job, immutable once pulled from the queue.
///
/// Limits arrive in the units the caller uses: seconds for time, kilobytes
/// for memory. Absent limits fall back to [`RunLimits`] defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub stdin: String,
    /// Time limit in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u64>,
    /// Memory limit in kilobytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_process_limit: Option<u32>,
}

/// Closed set of outcome classifications. Never free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Successful run
    Ok,
    /// Compile error
    Ce,
    /// Runtime error
    Re,
    /// Died on a signal (memory violations included)
    Sg,
    /// Timed out
    To,
    /// Internal sandbox error
    Xx,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Verdict::Ok => "OK",
            Verdict::Ce => "CE",
            Verdict::Re => "RE",
            Verdict::Sg => "SG",
            Verdict::To => "TO",
            Verdict::Xx => "XX",
        };
        f.write_str(code)
    }
}

/// Classified outcome of one run attempt, produced exactly once per job.
///
/// `time` is milliseconds, `memory` is kilobytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub verdict: Verdict,
    pub time: u64,
    pub memory: u64,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_signal: Option<i32>,
}

/// Lifecycle state published to the result store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Effective resource limits for the run stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// CPU time limit in seconds
    pub time_secs: u64,
    /// Memory limit in kilobytes
    pub memory_kb: u64,
    pub process_limit: u32,
}

impl RunLimits {
    pub const DEFAULT_TIME_SECS: u64 = 1;
    pub const DEFAULT_MEMORY_KB: u64 = 12 * 1024;
    pub const DEFAULT_PROCESS_LIMIT: u32 = 20;

    pub fn for_job(job: &Job) -> Self {
        Self {
            time_secs: job.time_limit.unwrap_or(Self::DEFAULT_TIME_SECS),
            memory_kb: job.memory_limit.unwrap_or(Self::DEFAULT_MEMORY_KB),
            process_limit: job
                .sub_process_limit
                .unwrap_or(Self::DEFAULT_PROCESS_LIMIT),
        }
    }

    /// Wall-clock cap: time limit plus one second of grace.
    pub fn wall_secs(&self) -> u64 {
        self.time_secs + 1
    }
}
