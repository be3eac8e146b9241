use ratatui::layout::Constraint;

pub(crate) const APP_TITLE: &str = concat!("SCP COURIER ", env!("CARGO_PKG_VERSION"));
pub(crate) const HELP_TEXT: &str =
    "Tab/Up/Down move | Left/Right/Space toggle | Enter start | Esc cancel | Ctrl+C quit";

pub(crate) const LABEL_WIDTH: usize = 11;

pub(crate) const HEADER_HEIGHT: u16 = 3;
pub(crate) const STATUS_HEIGHT: u16 = 4;

pub(crate) const BODY_COLUMN_PERCENTAGES: [u16; 2] = [55, 45];

pub(crate) const NOTICE_WIDTH_PERCENT: u16 = 50;

pub(crate) const POPUP_MIN_WIDTH: u16 = 10;
pub(crate) const POPUP_MIN_HEIGHT: u16 = 5;

pub(crate) fn body_columns() -> [Constraint; 2] {
    BODY_COLUMN_PERCENTAGES.map(Constraint::Percentage)
}
