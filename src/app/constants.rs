use std::time::Duration;

pub(crate) const STATUS_READY: &str = "Ready";
pub(crate) const STATUS_CANCELLING: &str = "Cancelling...";
pub(crate) const STATUS_BUSY: &str = "A transfer is already running";

pub(crate) const TRANSFER_WAIT_POLL: Duration = Duration::from_millis(10);
pub(crate) const QUIT_GRACE_PERIOD: Duration = Duration::from_secs(5);

pub(crate) const LOG_TIMESTAMP_FORMAT: &str = "%H:%M:%S";
pub(crate) const LOG_SEPARATOR: &str = " | ";
pub(crate) const LOG_MAX_IN_MEMORY: usize = 100;

pub(crate) const NOTICE_INPUT_TITLE: &str = "Input Error";
pub(crate) const NOTICE_SUCCESS_TITLE: &str = "Success";
pub(crate) const NOTICE_WORKER_LOST_MESSAGE: &str = "The transfer worker stopped unexpectedly.";
