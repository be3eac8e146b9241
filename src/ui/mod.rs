use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout};

use crate::app::App;
use crate::ui::constants::{HEADER_HEIGHT, STATUS_HEIGHT, body_columns};
use crate::ui::modals::draw_notice_modal;
use crate::ui::panels::{draw_app_header, draw_form, draw_logs, draw_status};

pub(crate) mod constants;
pub(crate) mod helpers;
mod modals;
mod panels;

pub(crate) fn draw_ui(frame: &mut Frame<'_>, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(HEADER_HEIGHT),
                Constraint::Min(1),
                Constraint::Length(STATUS_HEIGHT),
            ]
            .as_ref(),
        )
        .split(frame.area());
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(body_columns().as_ref())
        .split(rows[1]);

    draw_app_header(frame, rows[0]);
    draw_form(frame, app, body[0]);
    draw_logs(frame, app, body[1]);
    draw_status(frame, app, rows[2]);

    if app.notice.is_some() {
        draw_notice_modal(frame, app);
    }
}
