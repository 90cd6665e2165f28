use std::sync::mpsc;

use crate::{EngineEvent, JobId, Progress};

pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: Progress);
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _progress: Progress) {}
}

/// Forwards progress for one job into the engine event channel.
pub struct ChannelProgressSink {
    job_id: JobId,
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(job_id: JobId, tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { job_id, tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, progress: Progress) {
        let _ = self.tx.send(EngineEvent::Progress {
            job_id: self.job_id,
            progress,
        });
    }
}
