use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Interim progress never passes this value; the last 5% belong to assembly
pub const SYNTHESIS_PROGRESS_CEILING: u8 = 95;

/// Notifications emitted while a conversion job runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Overall progress in percent, non-decreasing within a job
    Progress { percent: u8 },
    /// Human-readable notice, e.g. an upcoming retry
    Status { message: String },
    Completed { output_path: PathBuf },
    Failed { reason: String },
}

/// Observer receiving job events
pub trait ProgressSink: Send + Sync {
    fn notify(&self, event: JobEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(JobEvent) + Send + Sync,
{
    fn notify(&self, event: JobEvent) {
        self(event)
    }
}

impl ProgressSink for UnboundedSender<JobEvent> {
    fn notify(&self, event: JobEvent) {
        // receiver gone means nobody is listening anymore
        let _ = self.send(event);
    }
}

/// Sink that drops every event
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn notify(&self, _event: JobEvent) {}
}

/// Turns segment completions into monotonic percentages
pub struct ProgressTracker {
    sink: Arc<dyn ProgressSink>,
    total: usize,
    completed: usize,
    last_percent: u8,
}

impl ProgressTracker {
    pub fn new(sink: Arc<dyn ProgressSink>, total: usize) -> Self {
        Self {
            sink,
            total,
            completed: 0,
            last_percent: 0,
        }
    }

    /// Signal that work has begun
    pub fn start(&mut self) {
        self.emit(1);
    }

    pub fn segment_done(&mut self) {
        self.completed += 1;
        let percent = if self.total == 0 {
            SYNTHESIS_PROGRESS_CEILING
        } else {
            (self.completed * SYNTHESIS_PROGRESS_CEILING as usize / self.total) as u8
        };
        self.emit(percent.min(SYNTHESIS_PROGRESS_CEILING));
    }

    pub fn finish(&mut self) {
        self.emit(100);
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    fn emit(&mut self, percent: u8) {
        let percent = percent.max(self.last_percent);
        self.last_percent = percent;
        self.sink.notify(JobEvent::Progress { percent });
    }
}
