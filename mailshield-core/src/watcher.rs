use crate::debounce::ScanTrigger;
use crate::dom::MutationRecord;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Turns batches of DOM mutation records into debounced scan requests.
#[derive(Debug, Clone)]
pub struct MutationWatcher {
    trigger: ScanTrigger,
}

impl MutationWatcher {
    pub fn new(trigger: ScanTrigger) -> Self {
        Self { trigger }
    }

    /// Handle one delivered batch. Triggers at most once, and only when the batch
    /// contains a structural (child list) change.
    pub fn on_mutations(&self, batch: &[MutationRecord]) -> bool {
        if !batch.iter().any(MutationRecord::is_structural) {
            return false;
        }
        debug!("Structural change in batch of {} records", batch.len());
        self.trigger.trigger()
    }

    /// Consume batches until the document drops its sender.
    pub fn spawn(self, mut batches: mpsc::UnboundedReceiver<Vec<MutationRecord>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(batch) = batches.recv().await {
                self.on_mutations(&batch);
            }
            debug!("Mutation feed closed");
        })
    }
}
