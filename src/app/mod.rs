use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;

use anyhow::Result;

use crate::app::constants::STATUS_READY;
use crate::host_keys::HostKeyPolicy;
use crate::model::{
    FormState, HostKeyMode, Notice, OrchestratorState, TransferEvent, TransferProgress,
};
use crate::ssh::SshConnector;
use crate::storage::{Settings, config_path, load_settings};
use crate::transfer::backend::Connector;
use crate::transfer::observer::CancelToken;
use crate::transfer::orchestrator::TransferOrchestrator;

pub(crate) mod constants;
mod handlers;
mod logging;
mod transfer;

pub(crate) struct App {
    pub(crate) settings_path: PathBuf,
    pub(crate) settings: Settings,
    pub(crate) form: FormState,
    pub(crate) status: String,
    pub(crate) log_lines: VecDeque<String>,
    pub(crate) notice: Option<Notice>,
    pub(crate) state: OrchestratorState,
    pub(crate) progress: Option<TransferProgress>,
    pub(crate) items_done: usize,
    connector: Arc<dyn Connector>,
    orchestrator: Arc<TransferOrchestrator>,
    orchestrator_mode: HostKeyMode,
    events: Option<mpsc::Receiver<TransferEvent>>,
    cancel: Option<CancelToken>,
}

impl App {
    pub(crate) fn load() -> Result<Self> {
        let settings_path = config_path()?;
        let settings = load_settings(&settings_path)?;
        Ok(Self::new(settings_path, settings, Arc::new(SshConnector)))
    }

    pub(crate) fn new(
        settings_path: PathBuf,
        settings: Settings,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let form = settings.to_form();
        let orchestrator_mode = settings.host_key_mode;
        let orchestrator = Arc::new(TransferOrchestrator::new(
            Arc::clone(&connector),
            HostKeyPolicy::from_mode(orchestrator_mode, settings.known_hosts.clone()),
        ));
        let mut app = Self {
            settings_path,
            settings,
            form,
            status: STATUS_READY.to_string(),
            log_lines: VecDeque::new(),
            notice: None,
            state: OrchestratorState::Idle,
            progress: None,
            items_done: 0,
            connector,
            orchestrator,
            orchestrator_mode,
            events: None,
            cancel: None,
        };
        app.set_status(STATUS_READY);
        app
    }

    pub(crate) fn is_transferring(&self) -> bool {
        self.events.is_some()
    }

    pub(crate) fn host_key_label(&self) -> &'static str {
        self.orchestrator.host_keys().label()
    }
}
