//! Background analysis runs.
//!
//! A run reads the selected ruleset, runs the checker, extracts the
//! supplementary documents, compiles the prompt and asks the completion
//! backend for a report. It always ends in [`JobStatus::Complete`]: every
//! failure along the way becomes text in the result.
//!
//! The worker thread never touches controller state. It sends [`JobEvent`]s
//! over a channel and the foreground applies them in [`AnalysisJob::poll`].

use crate::catalog::read_ruleset_text;
use crate::checker::CheckerInvoker;
use crate::extract::{extract_optional, TextExtractor};
use crate::inference::{CompletionClient, ModelId};
use crate::prompt::{compile, AnalysisScope, PromptDocument, UNSUPPORTED_SCOPE_PLACEHOLDER};
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

/// Prefix of the report produced when the completion call fails.
pub const COMPLETION_ERROR_PREFIX: &str = "Error calling OpenAI: ";

/// Progress markers for status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ReadingRuleset,
    InvokingChecker,
    CallingModel,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::ReadingRuleset => "Reading ruleset...",
            Phase::InvokingChecker => "Running verification...",
            Phase::CallingModel => "Forwarding prompt to LLM...",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Running(Phase),
    Complete,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Idle => f.write_str("Idle"),
            JobStatus::Running(phase) => phase.fmt(f),
            JobStatus::Complete => f.write_str("Analysis Complete."),
        }
    }
}

/// Messages from the worker to the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Phase(Phase),
    Finished(String),
}

impl JobEvent {
    /// Status the foreground shows once this event is applied.
    pub fn status(&self) -> JobStatus {
        match self {
            JobEvent::Phase(phase) => JobStatus::Running(*phase),
            JobEvent::Finished(_) => JobStatus::Complete,
        }
    }
}

/// Paths selected when the run was started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSnapshot {
    pub ruleset: Option<PathBuf>,
    pub assertions: Option<PathBuf>,
    pub reference_spec: Option<PathBuf>,
    pub agent_spec: Option<PathBuf>,
}

/// Collaborators a run needs; shared with the worker thread.
#[derive(Clone)]
pub struct JobServices {
    pub checker: Arc<dyn CheckerInvoker>,
    pub extractor: Arc<dyn TextExtractor>,
    pub completion: Arc<dyn CompletionClient>,
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub snapshot: SelectionSnapshot,
    pub model: ModelId,
    pub scope: AnalysisScope,
}

/// Gather the four inputs and compile the rule-rule prompt.
pub fn assemble_prompt(
    snapshot: &SelectionSnapshot,
    services: &JobServices,
    report: &mut dyn FnMut(Phase),
) -> PromptDocument {
    report(Phase::ReadingRuleset);
    let ruleset = snapshot
        .ruleset
        .as_deref()
        .map(read_ruleset_text)
        .unwrap_or_default();

    report(Phase::InvokingChecker);
    let checker_output = match snapshot.assertions.as_deref() {
        Some(path) => services.checker.invoke(path).text,
        None => String::new(),
    };

    let spec_text = extract_optional(services.extractor.as_ref(), snapshot.reference_spec.as_deref());
    let agent_text = extract_optional(services.extractor.as_ref(), snapshot.agent_spec.as_deref());

    let prompt = compile(&spec_text, &ruleset, &checker_output, &agent_text);
    tracing::debug!(prompt_bytes = prompt.as_str().len(), "compiled prompt");
    prompt
}

/// Run one analysis synchronously and return the result text.
pub fn execute(request: &JobRequest, services: &JobServices, report: &mut dyn FnMut(Phase)) -> String {
    if !request.scope.is_supported() {
        tracing::info!(scope = ?request.scope, "analysis scope not supported; returning placeholder");
        return UNSUPPORTED_SCOPE_PLACEHOLDER.to_string();
    }

    let prompt = assemble_prompt(&request.snapshot, services, report);

    report(Phase::CallingModel);
    match services.completion.complete(request.model, prompt.as_str()) {
        Ok(text) => text.trim().to_string(),
        Err(err) => {
            tracing::warn!(model = %request.model, error = %err, "completion failed");
            format!("{COMPLETION_ERROR_PREFIX}{err}")
        }
    }
}

/// Receiving end of a running worker.
pub struct JobHandle {
    events: Receiver<JobEvent>,
}

impl JobHandle {
    /// Start `request` on a fresh worker thread.
    pub fn spawn(request: JobRequest, services: JobServices) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || run_worker(request, services, tx));
        Self { events: rx }
    }

    fn try_next(&self) -> Option<JobEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(worker_lost()),
        }
    }

    fn next_blocking(&self) -> JobEvent {
        self.events.recv().unwrap_or_else(|_| worker_lost())
    }
}

// The sender was dropped before a result: the worker panicked.
fn worker_lost() -> JobEvent {
    JobEvent::Finished(format!(
        "{COMPLETION_ERROR_PREFIX}analysis worker stopped unexpectedly"
    ))
}

fn run_worker(request: JobRequest, services: JobServices, tx: Sender<JobEvent>) {
    // Send failures only mean the foreground dropped this run.
    let mut report = |phase: Phase| {
        let _ = tx.send(JobEvent::Phase(phase));
    };
    let text = execute(&request, &services, &mut report);
    let _ = tx.send(JobEvent::Finished(text));
}

/// Foreground view of the current run.
pub struct AnalysisJob {
    status: JobStatus,
    result_text: String,
    handle: Option<JobHandle>,
}

impl Default for AnalysisJob {
    fn default() -> Self {
        Self {
            status: JobStatus::Idle,
            result_text: String::new(),
            handle: None,
        }
    }
}

impl AnalysisJob {
    /// Replace any previous run with a new one.
    ///
    /// A run still in flight is abandoned: its channel is dropped and its
    /// later events are discarded.
    pub fn start(request: JobRequest, services: JobServices) -> Self {
        Self {
            status: JobStatus::Running(Phase::ReadingRuleset),
            result_text: String::new(),
            handle: Some(JobHandle::spawn(request, services)),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn result_text(&self) -> &str {
        &self.result_text
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, JobStatus::Running(_))
    }

    /// Apply every event that has already arrived. Returns the applied events.
    pub fn poll(&mut self) -> Vec<JobEvent> {
        let mut applied = Vec::new();
        while let Some(event) = self.handle.as_ref().and_then(JobHandle::try_next) {
            self.apply(&event);
            applied.push(event);
        }
        applied
    }

    /// Block until the run completes, reporting each status change.
    pub fn wait(&mut self, mut on_status: impl FnMut(JobStatus)) {
        while self.is_running() {
            let mut events = self.poll();
            if events.is_empty() {
                let event = match self.handle.as_ref() {
                    Some(handle) => handle.next_blocking(),
                    None => worker_lost(),
                };
                self.apply(&event);
                events.push(event);
            }
            for event in &events {
                on_status(event.status());
            }
        }
    }

    fn apply(&mut self, event: &JobEvent) {
        self.status = event.status();
        if let JobEvent::Finished(text) = event {
            self.result_text = text.clone();
            self.handle = None;
        }
    }
}
