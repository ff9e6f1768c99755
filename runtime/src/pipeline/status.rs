use std::{fmt, time::Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    DocumentRetrieval,
    ContentParsing,
    TextChunking,
    EmbeddingGeneration,
    SimilaritySearch,
    ContextBuilding,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::DocumentRetrieval => "document_retrieval",
            Phase::ContentParsing => "content_parsing",
            Phase::TextChunking => "text_chunking",
            Phase::EmbeddingGeneration => "embedding_generation",
            Phase::SimilaritySearch => "similarity_search",
            Phase::ContextBuilding => "context_building",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    Started,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    RateLimit,
    Timeout,
    Network,
    HttpStatus,
    InvalidResponse,
    DimensionMismatch,
    Cancelled,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub status: PhaseState,
    pub details: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub elapsed_seconds: Option<f64>,
    pub metrics: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip)]
    clock: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WarningRecord {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Final, immutable view of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub run_id: Uuid,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub total_elapsed_seconds: f64,
    pub phases: Vec<PhaseRecord>,
    pub errors: Vec<ErrorRecord>,
    pub warnings: Vec<WarningRecord>,
}

impl StatusReport {
    pub fn phases_named(&self, phase: Phase) -> impl Iterator<Item = &PhaseRecord> {
        self.phases.iter().filter(move |record| record.phase == phase)
    }
}

/// Token for a started phase. Completing a phase consumes it, so a record
/// can leave the `started` state at most once.
#[must_use = "a started phase must be completed with succeed or fail"]
#[derive(Debug)]
pub struct PhaseHandle {
    index: usize,
}

/// Mutable accumulator owned by exactly one pipeline invocation.
#[derive(Debug)]
pub struct PipelineStatus {
    run_id: Uuid,
    scope: Option<String>,
    started: Instant,
    started_at: DateTime<Utc>,
    phases: Vec<PhaseRecord>,
    errors: Vec<ErrorRecord>,
    warnings: Vec<WarningRecord>,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStatus {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scope: None,
            started: Instant::now(),
            started_at: Utc::now(),
            phases: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Empty log for work running off the orchestrator's task. Records
    /// written to it default to `scope` as their subject and are folded
    /// back with [`PipelineStatus::merge`].
    pub fn detached(&self, scope: &str) -> Self {
        Self {
            run_id: self.run_id,
            scope: Some(scope.to_string()),
            started: Instant::now(),
            started_at: Utc::now(),
            phases: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn start(
        &mut self,
        phase: Phase,
        subject: Option<&str>,
        details: impl Into<String>,
    ) -> PhaseHandle {
        let subject = subject.map(str::to_string).or_else(|| self.scope.clone());
        let details = details.into();
        info!(
            phase = %phase,
            subject = subject.as_deref().unwrap_or("-"),
            details = %details,
            "phase started"
        );
        self.phases.push(PhaseRecord {
            phase,
            subject,
            status: PhaseState::Started,
            details,
            start_time: Utc::now(),
            end_time: None,
            elapsed_seconds: None,
            metrics: Map::new(),
            failure: None,
            clock: Instant::now(),
        });
        PhaseHandle {
            index: self.phases.len() - 1,
        }
    }

    pub fn phase_of(&self, handle: &PhaseHandle) -> Option<Phase> {
        self.phases.get(handle.index).map(|record| record.phase)
    }

    pub fn succeed(&mut self, handle: PhaseHandle, details: impl Into<String>, metrics: Value) {
        let Some(record) = self.open_record(handle) else {
            return;
        };
        record.status = PhaseState::Success;
        record.details = details.into();
        record.metrics = into_metrics(metrics);
        let elapsed = close(record);
        info!(
            phase = %record.phase,
            subject = record.subject.as_deref().unwrap_or("-"),
            elapsed_seconds = elapsed,
            details = %record.details,
            "phase completed"
        );
    }

    /// Marks the phase failed without recording a pipeline error. Used for
    /// failures the caller degrades around, and for phases aborted because
    /// an earlier phase already recorded the error.
    pub fn fail(&mut self, handle: PhaseHandle, reason: impl Into<String>) {
        let Some(record) = self.open_record(handle) else {
            return;
        };
        record.status = PhaseState::Failed;
        record.failure = Some(reason.into());
        let elapsed = close(record);
        warn!(
            phase = %record.phase,
            subject = record.subject.as_deref().unwrap_or("-"),
            elapsed_seconds = elapsed,
            reason = record.failure.as_deref().unwrap_or_default(),
            "phase failed"
        );
    }

    /// Marks the phase failed and records an error, which fails the run.
    pub fn fail_with_error(
        &mut self,
        handle: PhaseHandle,
        kind: ErrorKind,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let Some(phase) = self.phase_of(&handle) else {
            return;
        };
        let subject = self.phases[handle.index].subject.clone();
        self.fail(handle, message.clone());
        self.push_error(phase, subject, kind, message);
    }

    pub fn warn(&mut self, phase: Phase, message: impl Into<String>) {
        let message = message.into();
        let subject = self.scope.clone();
        warn!(
            phase = %phase,
            subject = subject.as_deref().unwrap_or("-"),
            message = %message,
            "rag warning"
        );
        self.warnings.push(WarningRecord {
            phase,
            subject,
            message,
            timestamp: Utc::now(),
        });
    }

    /// Appends another log's records after this one's, preserving order.
    pub fn merge(&mut self, other: PipelineStatus) {
        self.phases.extend(other.phases);
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn phases(&self) -> &[PhaseRecord] {
        &self.phases
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn warnings(&self) -> &[WarningRecord] {
        &self.warnings
    }

    /// Closes the run. Any phase still open is failed with an internal
    /// error so the report never carries a dangling `started` record.
    pub fn finish(mut self) -> StatusReport {
        let dangling: Vec<usize> = self
            .phases
            .iter()
            .enumerate()
            .filter(|(_, record)| record.status == PhaseState::Started)
            .map(|(index, _)| index)
            .collect();
        for index in dangling {
            self.fail_with_error(
                PhaseHandle { index },
                ErrorKind::Internal,
                "phase did not complete",
            );
        }

        let success = self.errors.is_empty();
        StatusReport {
            run_id: self.run_id,
            success,
            started_at: self.started_at,
            total_elapsed_seconds: self.started.elapsed().as_secs_f64(),
            phases: self.phases,
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    fn open_record(&mut self, handle: PhaseHandle) -> Option<&mut PhaseRecord> {
        match self.phases.get_mut(handle.index) {
            Some(record) if record.status == PhaseState::Started => Some(record),
            Some(record) => {
                warn!(phase = %record.phase, "ignoring completion of an already closed phase");
                None
            }
            None => {
                warn!(index = handle.index, "ignoring completion of an unknown phase");
                None
            }
        }
    }

    fn push_error(
        &mut self,
        phase: Phase,
        subject: Option<String>,
        kind: ErrorKind,
        message: String,
    ) {
        error!(
            phase = %phase,
            subject = subject.as_deref().unwrap_or("-"),
            kind = ?kind,
            message = %message,
            "rag error"
        );
        self.errors.push(ErrorRecord {
            phase,
            subject,
            kind,
            message,
            timestamp: Utc::now(),
        });
    }
}

fn close(record: &mut PhaseRecord) -> f64 {
    let elapsed = record.clock.elapsed().as_secs_f64();
    record.end_time = Some(Utc::now());
    record.elapsed_seconds = Some(elapsed);
    elapsed
}

fn into_metrics(metrics: Value) -> Map<String, Value> {
    match metrics {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
