use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::Error;
use crate::Result;

/// Two-letter status code the sandbox launcher writes for abnormal runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxStatus {
    /// Run-time error (non-zero exit)
    Re,
    /// Died on a signal
    Sg,
    /// Timed out
    To,
    /// Internal sandbox error
    Xx,
}

impl SandboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxStatus::Re => "RE",
            SandboxStatus::Sg => "SG",
            SandboxStatus::To => "TO",
            SandboxStatus::Xx => "XX",
        }
    }
}

impl fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SandboxStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "RE" => Ok(SandboxStatus::Re),
            "SG" => Ok(SandboxStatus::Sg),
            "TO" => Ok(SandboxStatus::To),
            "XX" => Ok(SandboxStatus::Xx),
            _ => Err(()),
        }
    }
}

/// Decoded post-run telemetry.
///
/// Absent keys stay `None` so callers can distinguish "no signal" from
/// "signal 0". `time` and `time_wall` are fractional seconds as emitted by
/// the launcher; `max_rss` and `cg_mem` are kilobytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountingReport {
    pub cg_mem: Option<u64>,
    pub cg_oom_killed: bool,
    pub csw_forced: Option<u64>,
    pub csw_voluntary: Option<u64>,
    pub exitcode: Option<i32>,
    pub exitsig: Option<i32>,
    pub killed: bool,
    pub max_rss: Option<u64>,
    pub message: Option<String>,
    pub status: Option<SandboxStatus>,
    pub time: Option<f64>,
    pub time_wall: Option<f64>,
}

impl AccountingReport {
    /// Parse the line-oriented `key:value` report text.
    ///
    /// Unknown keys are logged and skipped so newer launcher versions do not
    /// break decoding. An empty report decodes to an all-absent record; that
    /// happens when the launcher dies before writing one.
    pub fn parse(input: &str) -> Result<Self> {
        let mut report = AccountingReport::default();

        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Report(format!("invalid report line: {line}")))?;
            let key = key.trim();
            let value = value.trim();

            match key {
                "cg-mem" => report.cg_mem = Some(parse_number(key, value)?),
                "csw-forced" => report.csw_forced = Some(parse_number(key, value)?),
                "csw-voluntary" => report.csw_voluntary = Some(parse_number(key, value)?),
                "exitcode" => report.exitcode = Some(parse_number(key, value)?),
                "exitsig" => report.exitsig = Some(parse_number(key, value)?),
                "max-rss" => report.max_rss = Some(parse_number(key, value)?),
                "time" => report.time = Some(parse_number(key, value)?),
                "time-wall" => report.time_wall = Some(parse_number(key, value)?),
                // Presence alone sets the flag
                "cg-oom-killed" => report.cg_oom_killed = true,
                "killed" => report.killed = true,
                "status" => {
                    report.status = Some(value.parse().map_err(|()| {
                        Error::Report(format!("invalid status code: {value}"))
                    })?)
                }
                "message" => report.message = Some(value.to_string()),
                other => warn!(key = other, "unrecognized accounting report key"),
            }
        }

        Ok(report)
    }

    /// Run time converted to milliseconds; zero when unreported.
    pub fn time_ms(&self) -> u64 {
        self.time.map_or(0, |secs| (secs * 1000.0).round() as u64)
    }

    /// Peak memory in kilobytes, falling back to the control-group total.
    pub fn memory_kb(&self) -> u64 {
        self.max_rss.or(self.cg_mem).unwrap_or(0)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Report(format!("invalid {key} value: {value}")))
}
