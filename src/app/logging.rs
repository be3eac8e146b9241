use tracing::info;

use crate::app::App;
use crate::app::constants::{LOG_MAX_IN_MEMORY, LOG_SEPARATOR, LOG_TIMESTAMP_FORMAT};

impl App {
    pub(crate) fn set_status(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = message.clone();
        self.log_line(&message);
    }

    /// Appends to the log pane and forwards the line to the log file.
    pub(crate) fn log_line(&mut self, message: &str) {
        info!(target: "scpc::form", "{message}");
        let timestamp = chrono::Local::now().format(LOG_TIMESTAMP_FORMAT);
        let line = format!("{timestamp}{LOG_SEPARATOR}{message}");
        self.log_lines.push_back(line);
        while self.log_lines.len() > LOG_MAX_IN_MEMORY {
            self.log_lines.pop_front();
        }
    }
}
