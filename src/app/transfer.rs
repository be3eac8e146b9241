use std::sync::Arc;
use std::sync::mpsc::{self, TryRecvError};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::app::App;
use crate::app::constants::{
    NOTICE_INPUT_TITLE, NOTICE_SUCCESS_TITLE, NOTICE_WORKER_LOST_MESSAGE, STATUS_BUSY,
    STATUS_CANCELLING, TRANSFER_WAIT_POLL,
};
use crate::error::{ErrorKind, TransferError};
use crate::host_keys::HostKeyPolicy;
use crate::model::{Notice, OrchestratorState, TransferEvent, TransferSummary};
use crate::storage::save_settings;
use crate::transfer::observer::{CancelToken, ChannelObserver};
use crate::transfer::orchestrator::TransferOrchestrator;
use crate::ui::helpers::format_bytes;

impl App {
    pub(crate) fn start_transfer(&mut self) {
        if self.is_transferring() || self.orchestrator.is_busy() {
            self.set_status(STATUS_BUSY);
            return;
        }
        let (params, request) = match self.form.to_transfer() {
            Ok(values) => values,
            Err(message) => {
                self.notice = Some(Notice {
                    title: NOTICE_INPUT_TITLE.to_string(),
                    message,
                });
                return;
            }
        };

        self.settings.update_from_form(&self.form);
        if let Err(err) = save_settings(&self.settings_path, &self.settings) {
            warn!(error = %err, "failed to save settings");
            self.log_line(&format!("Failed to save settings: {err:#}"));
        }
        self.refresh_orchestrator();

        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let orchestrator = Arc::clone(&self.orchestrator);
        std::thread::spawn(move || {
            let observer = ChannelObserver::new(tx.clone());
            let result = orchestrator.execute(&params, &request, &observer, &worker_cancel);
            let _ = tx.send(TransferEvent::Finished(result));
        });

        self.events = Some(rx);
        self.cancel = Some(cancel);
        self.progress = None;
        self.items_done = 0;
        self.state = OrchestratorState::Idle;
    }

    pub(crate) fn cancel_transfer(&mut self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
            self.set_status(STATUS_CANCELLING);
        }
    }

    /// Keeps draining events until the worker reports back or `limit` passes.
    /// Returns whether the transfer finished in time.
    pub(crate) fn wait_for_transfer(&mut self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while self.is_transferring() && Instant::now() < deadline {
            self.poll_transfer_events();
            if self.is_transferring() {
                std::thread::sleep(TRANSFER_WAIT_POLL);
            }
        }
        !self.is_transferring()
    }

    /// Drains everything the worker sent since the last tick.
    pub(crate) fn poll_transfer_events(&mut self) {
        let Some(rx) = self.events.take() else {
            return;
        };
        let mut done = false;
        loop {
            match rx.try_recv() {
                Ok(TransferEvent::Log(line)) => self.log_line(&line),
                Ok(TransferEvent::Progress(progress)) => {
                    if progress.is_complete() {
                        self.items_done += 1;
                    }
                    self.progress = Some(progress);
                }
                Ok(TransferEvent::Status(state)) => {
                    self.state = state;
                    self.status = state.label().to_string();
                }
                Ok(TransferEvent::Finished(result)) => {
                    self.finish_transfer(result);
                    done = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.finish_transfer(Err(TransferError::TransferIo(
                        NOTICE_WORKER_LOST_MESSAGE.to_string(),
                    )));
                    done = true;
                    break;
                }
            }
        }
        if !done {
            self.events = Some(rx);
        }
    }

    fn finish_transfer(&mut self, result: Result<TransferSummary, TransferError>) {
        self.cancel = None;
        self.notice = Some(match result {
            Ok(summary) => Notice {
                title: NOTICE_SUCCESS_TITLE.to_string(),
                message: format!(
                    "Transfer complete!\n{} item(s), {} in {:.1}s",
                    summary.item_count,
                    format_bytes(summary.total_bytes),
                    summary.elapsed.as_secs_f64()
                ),
            },
            Err(err) => {
                if !self.state.is_terminal() {
                    self.state = match err.kind() {
                        ErrorKind::Cancelled => OrchestratorState::Cancelled,
                        _ => OrchestratorState::Failed,
                    };
                    self.status = self.state.label().to_string();
                }
                Notice {
                    title: err.kind().title().to_string(),
                    message: err.detail(),
                }
            }
        });
    }

    /// Host key mode is picked up on the next start; only rebuilt while idle.
    fn refresh_orchestrator(&mut self) {
        if self.form.host_keys == self.orchestrator_mode {
            return;
        }
        self.orchestrator_mode = self.form.host_keys;
        self.orchestrator = Arc::new(TransferOrchestrator::new(
            Arc::clone(&self.connector),
            HostKeyPolicy::from_mode(self.orchestrator_mode, self.settings.known_hosts.clone()),
        ));
        self.log_line(&format!(
            "Host key checking: {}",
            self.orchestrator.host_keys().label()
        ));
    }
}
