//! Test doubles: a scriptable sandbox launcher plus in-memory queue and
//! store, so pipeline and consumer behavior is testable without isolate or
//! a broker.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

use crate::error::Error;
use crate::launcher::{Envelope, Invocation, LaunchStatus, SandboxLauncher};
use crate::queue::{Delivery, MessageQueue};
use crate::store::ResultStore;
use crate::types::{ExecutionResult, Job, JobStatus};
use crate::Result;

pub(crate) fn job(language: &str, code: &str) -> Job {
    Job {
        id: Uuid::new_v4(),
        language: language.to_string(),
        code: code.to_string(),
        stdin: String::new(),
        time_limit: None,
        memory_limit: None,
        sub_process_limit: None,
    }
}

#[derive(Default)]
struct FakeState {
    report: String,
    run_stdout: String,
    run_stderr: String,
    compile_stderr: String,
    run_success: bool,
    fail_init: bool,
    unwritable_boxdir: bool,
    fail_run: bool,
    fail_compile: bool,
    fail_cleanup: bool,
    suppress_report_on_failure: bool,
    inits: usize,
    cleanups: Vec<u32>,
    commands: Vec<Vec<String>>,
    envelopes: Vec<Envelope>,
    workdirs: Vec<PathBuf>,
}

/// Scriptable launcher writing its configured report/streams into the
/// session's stage files, with per-stage failure injection.
pub(crate) struct FakeLauncher {
    root: TempDir,
    state: Mutex<FakeState>,
}

impl FakeLauncher {
    pub(crate) fn new() -> Self {
        let state = FakeState {
            run_success: true,
            ..FakeState::default()
        };
        Self {
            root: TempDir::new().unwrap(),
            state: Mutex::new(state),
        }
    }

    pub(crate) fn set_report(&self, report: &str) {
        self.state.lock().unwrap().report = report.to_string();
    }

    pub(crate) fn set_run_stdout(&self, stdout: &str) {
        self.state.lock().unwrap().run_stdout = stdout.to_string();
    }

    pub(crate) fn set_run_stderr(&self, stderr: &str) {
        self.state.lock().unwrap().run_stderr = stderr.to_string();
    }

    pub(crate) fn set_compile_stderr(&self, stderr: &str) {
        self.state.lock().unwrap().compile_stderr = stderr.to_string();
    }

    pub(crate) fn set_run_success(&self, success: bool) {
        self.state.lock().unwrap().run_success = success;
    }

    pub(crate) fn fail_init(&self, fail: bool) {
        self.state.lock().unwrap().fail_init = fail;
    }

    /// Make the next init hand out a workdir whose `box` entry is a plain
    /// file, so writes into the boxdir fail.
    pub(crate) fn unwritable_boxdir(&self, broken: bool) {
        self.state.lock().unwrap().unwritable_boxdir = broken;
    }

    pub(crate) fn fail_run(&self, fail: bool) {
        self.state.lock().unwrap().fail_run = fail;
    }

    pub(crate) fn fail_compile(&self, fail: bool) {
        self.state.lock().unwrap().fail_compile = fail;
    }

    pub(crate) fn fail_cleanup(&self, fail: bool) {
        self.state.lock().unwrap().fail_cleanup = fail;
    }

    pub(crate) fn suppress_report_on_failure(&self, suppress: bool) {
        self.state.lock().unwrap().suppress_report_on_failure = suppress;
    }

    pub(crate) fn inits(&self) -> usize {
        self.state.lock().unwrap().inits
    }

    pub(crate) fn cleanups(&self) -> Vec<u32> {
        self.state.lock().unwrap().cleanups.clone()
    }

    pub(crate) fn commands(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Envelopes of run-stage invocations, in order.
    pub(crate) fn envelopes(&self) -> Vec<Envelope> {
        self.state.lock().unwrap().envelopes.clone()
    }

    /// File name → contents for every file staged under any workdir.
    pub(crate) fn staged_files(&self) -> HashMap<String, String> {
        let workdirs = self.state.lock().unwrap().workdirs.clone();
        let mut files = HashMap::new();
        for workdir in workdirs {
            for dir in [workdir.clone(), workdir.join("box")] {
                let Ok(entries) = std::fs::read_dir(&dir) else {
                    continue;
                };
                for entry in entries.flatten() {
                    if entry.path().is_file() {
                        if let Ok(contents) = std::fs::read_to_string(entry.path()) {
                            files.insert(entry.file_name().to_string_lossy().into_owned(), contents);
                        }
                    }
                }
            }
        }
        files
    }
}

#[async_trait]
impl SandboxLauncher for FakeLauncher {
    async fn init(&self, slot_id: u32) -> Result<PathBuf> {
        let workdir = self.root.path().join(format!("slot-{slot_id}"));
        let unwritable_boxdir = {
            let mut state = self.state.lock().unwrap();
            if state.fail_init {
                return Err(Error::Launcher("injected init failure".to_string()));
            }
            state.inits += 1;
            state.workdirs.push(workdir.clone());
            state.unwritable_boxdir
        };
        if unwritable_boxdir {
            std::fs::create_dir_all(&workdir)?;
            std::fs::write(workdir.join("box"), "")?;
        } else {
            std::fs::create_dir_all(workdir.join("box"))?;
        }
        Ok(workdir)
    }

    async fn run(&self, invocation: &Invocation) -> Result<LaunchStatus> {
        // The compile stage is the one invocation without boxed stdin
        let is_compile = invocation.stdin.is_none();
        let (report, stdout, stderr, success, fail, suppress) = {
            let mut state = self.state.lock().unwrap();
            state.commands.push(invocation.command.clone());
            if !is_compile {
                state.envelopes.push(invocation.envelope);
            }
            (
                state.report.clone(),
                state.run_stdout.clone(),
                if is_compile {
                    state.compile_stderr.clone()
                } else {
                    state.run_stderr.clone()
                },
                state.run_success,
                if is_compile {
                    state.fail_compile
                } else {
                    state.fail_run
                },
                state.suppress_report_on_failure,
            )
        };

        if is_compile {
            if fail {
                return Err(Error::Launcher("injected compile failure".to_string()));
            }
            if let Some(path) = &invocation.stderr {
                std::fs::write(path, &stderr)?;
            }
            return Ok(LaunchStatus {
                success: stderr.trim().is_empty(),
            });
        }

        if fail {
            if !suppress {
                std::fs::write(&invocation.report_path, &report)?;
            }
            return Err(Error::Launcher("injected run failure".to_string()));
        }

        std::fs::write(&invocation.report_path, &report)?;
        if let Some(path) = &invocation.stdout {
            std::fs::write(path, &stdout)?;
        }
        if let Some(path) = &invocation.stderr {
            std::fs::write(path, &stderr)?;
        }
        Ok(LaunchStatus { success })
    }

    async fn cleanup(&self, slot_id: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_cleanup {
            return Err(Error::Launcher("injected cleanup failure".to_string()));
        }
        state.cleanups.push(slot_id);
        Ok(())
    }
}

/// In-memory lease queue recording every ack and nack.
#[derive(Default)]
pub(crate) struct MemoryQueue {
    pending: Mutex<VecDeque<String>>,
    acked: Mutex<Vec<String>>,
    nacked: Mutex<Vec<(String, bool)>>,
}

impl MemoryQueue {
    pub(crate) fn with_jobs(jobs: &[&Job]) -> Self {
        let queue = Self::default();
        {
            let mut pending = queue.pending.lock().unwrap();
            for job in jobs {
                pending.push_back(serde_json::to_string(job).unwrap());
            }
        }
        queue
    }

    pub(crate) fn acked(&self) -> Vec<String> {
        self.acked.lock().unwrap().clone()
    }

    pub(crate) fn nacked(&self) -> Vec<(String, bool)> {
        self.nacked.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive(&self) -> Result<Option<Delivery>> {
        let Some(payload) = self.pending.lock().unwrap().pop_front() else {
            return Ok(None);
        };
        let job = serde_json::from_str(&payload)?;
        Ok(Some(Delivery { job, payload }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.acked.lock().unwrap().push(delivery.payload.clone());
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        self.nacked
            .lock()
            .unwrap()
            .push((delivery.payload.clone(), requeue));
        Ok(())
    }
}

/// In-memory result store keyed by job id.
#[derive(Default)]
pub(crate) struct MemoryStore {
    records: Mutex<HashMap<Uuid, (JobStatus, Option<ExecutionResult>, Option<String>)>>,
}

impl MemoryStore {
    pub(crate) fn status(&self, id: &Uuid) -> Option<JobStatus> {
        self.records.lock().unwrap().get(id).map(|(s, _, _)| *s)
    }

    pub(crate) fn result(&self, id: &Uuid) -> Option<ExecutionResult> {
        self.records
            .lock()
            .unwrap()
            .get(id)
            .and_then(|(_, r, _)| r.clone())
    }

    pub(crate) fn error(&self, id: &Uuid) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .get(id)
            .and_then(|(_, _, e)| e.clone())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn mark_running(&self, job: &Job) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(job.id, (JobStatus::Running, None, None));
        Ok(())
    }

    async fn publish(&self, job: &Job, result: &ExecutionResult) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(job.id, (JobStatus::Completed, Some(result.clone()), None));
        Ok(())
    }

    async fn mark_failed(&self, job: &Job, reason: &str) -> Result<()> {
        self.records.lock().unwrap().insert(
            job.id,
            (JobStatus::Failed, None, Some(reason.to_string())),
        );
        Ok(())
    }
}
