use crate::models::ContentIdentity;
use crate::services::{ProgressSync, SaveOutcome};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

#[derive(Debug, Clone)]
enum WriteRequest {
    Save {
        identity: ContentIdentity,
        position: f64,
        duration: f64,
    },
    Delete {
        identity: ContentIdentity,
    },
}

/// Background queue that applies progress writes in issue order.
///
/// The session loop enqueues and moves on; store latency never stalls playback events.
#[derive(Debug)]
pub struct ProgressWriter {
    sender: Option<mpsc::UnboundedSender<WriteRequest>>,
    task: Option<JoinHandle<()>>,
}

impl ProgressWriter {
    pub fn spawn(sync: ProgressSync) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(sync, receiver));
        Self {
            sender: Some(sender),
            task: Some(task),
        }
    }

    pub fn save(&self, identity: ContentIdentity, position: f64, duration: f64) {
        self.enqueue(WriteRequest::Save {
            identity,
            position,
            duration,
        });
    }

    pub fn delete(&self, identity: ContentIdentity) {
        self.enqueue(WriteRequest::Delete { identity });
    }

    fn enqueue(&self, request: WriteRequest) {
        match &self.sender {
            Some(sender) => {
                if sender.send(request).is_err() {
                    error!("Progress writer stopped, dropping write");
                }
            }
            None => debug!("Progress writer closed, dropping {:?}", request),
        }
    }

    /// Stop accepting writes and wait for the queue to drain.
    pub async fn close(&mut self) {
        self.sender.take();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            error!("Progress writer task failed: {}", e);
        }
    }
}

async fn run(sync: ProgressSync, mut receiver: mpsc::UnboundedReceiver<WriteRequest>) {
    debug!("Progress writer started");

    while let Some(request) = receiver.recv().await {
        match request {
            WriteRequest::Save {
                identity,
                position,
                duration,
            } => match sync.save(&identity, position, duration).await {
                Ok(outcome) => trace!("Save for {} at {:.1}: {:?}", identity, position, outcome),
                Err(e) => error!("Failed to save progress: {}", e),
            },
            WriteRequest::Delete { identity } => {
                if sync.delete(&identity).await == SaveOutcome::Cleared {
                    debug!("Cleared progress for {}", identity);
                }
            }
        }
    }

    debug!("Progress writer stopped");
}
