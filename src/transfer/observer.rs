use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use crate::model::{OrchestratorState, TransferEvent, TransferProgress};

/// Receives everything a transfer reports. Called on the worker thread.
pub(crate) trait TransferObserver: Send + Sync {
    fn on_log(&self, line: &str);
    fn on_progress(&self, progress: &TransferProgress);
    fn on_status_change(&self, state: OrchestratorState);
}

/// Forwards callbacks into a channel drained by the front end's own loop.
/// A dropped receiver is not an error: the transfer keeps going.
pub(crate) struct ChannelObserver {
    tx: Sender<TransferEvent>,
}

impl ChannelObserver {
    pub(crate) fn new(tx: Sender<TransferEvent>) -> Self {
        Self { tx }
    }
}

impl TransferObserver for ChannelObserver {
    fn on_log(&self, line: &str) {
        let _ = self.tx.send(TransferEvent::Log(line.to_string()));
    }

    fn on_progress(&self, progress: &TransferProgress) {
        let _ = self.tx.send(TransferEvent::Progress(progress.clone()));
    }

    fn on_status_change(&self, state: OrchestratorState) {
        let _ = self.tx.send(TransferEvent::Status(state));
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
