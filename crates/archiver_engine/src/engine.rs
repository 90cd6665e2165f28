use std::sync::mpsc;
use std::thread;

use archiver_logging::archiver_error;

use crate::pipeline::{run, RunRequest};
use crate::progress::ChannelProgressSink;
use crate::{EngineEvent, JobId};

enum EngineCommand {
    Run { job_id: JobId, request: RunRequest },
}

/// Runs archive jobs on a background thread with its own tokio runtime.
///
/// A UI collaborator enqueues requests and polls `try_recv` for progress and
/// completion without blocking.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        thread::spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    archiver_error!("Engine runtime failed to start: {err}");
                    while let Ok(EngineCommand::Run { job_id, .. }) = cmd_rx.recv() {
                        let _ = event_tx.send(EngineEvent::JobCompleted {
                            job_id,
                            result: Err(format!("engine runtime unavailable: {err}")),
                        });
                    }
                    return;
                }
            };
            while let Ok(command) = cmd_rx.recv() {
                let event_tx = event_tx.clone();
                runtime.spawn(async move {
                    handle_command(command, event_tx).await;
                });
            }
        });

        Self { cmd_tx, event_rx }
    }

    pub fn enqueue(&self, job_id: JobId, request: RunRequest) {
        let _ = self.cmd_tx.send(EngineCommand::Run { job_id, request });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Block until the next event arrives or the engine thread stops.
    pub fn recv(&self) -> Option<EngineEvent> {
        self.event_rx.recv().ok()
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle_command(command: EngineCommand, event_tx: mpsc::Sender<EngineEvent>) {
    match command {
        EngineCommand::Run { job_id, request } => {
            let sink = ChannelProgressSink::new(job_id, event_tx.clone());
            let result = run(request, &sink).await.map_err(|err| {
                archiver_error!("Job {job_id} failed: {err}");
                err.to_string()
            });
            let _ = event_tx.send(EngineEvent::JobCompleted { job_id, result });
        }
    }
}
