use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};

use crate::app::App;
use crate::model::{AuthKind, Field, OrchestratorState};
use crate::ui::constants::{APP_TITLE, HELP_TEXT, LABEL_WIDTH};
use crate::ui::helpers::{
    action_line, choice_line, field_line, format_bytes, render_form_cursor, section_line,
    truncate_text,
};

fn panel_block(title: &str) -> Block<'static> {
    Block::default()
        .title(Line::from(Span::styled(
            title.to_string(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )))
        .borders(Borders::ALL)
}

pub(crate) fn draw_app_header(frame: &mut Frame<'_>, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(24), Constraint::Min(1)].as_ref())
        .split(area);
    let title = Paragraph::new(APP_TITLE)
        .style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(title, columns[0]);
    let help = Paragraph::new(HELP_TEXT)
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::Gray));
    frame.render_widget(help, columns[1]);
}

pub(crate) fn draw_form(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let block = panel_block("Transfer");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let form = &app.form;
    let value_width = (inner.width as usize).saturating_sub(2 + LABEL_WIDTH + 2);
    let mut lines = Vec::new();
    let mut active_row = None;
    lines.push(section_line("Connection"));
    for field in form.active_fields() {
        match field {
            Field::Direction => {
                lines.push(Line::default());
                lines.push(section_line("Transfer settings"));
            }
            Field::LocalPath => {
                lines.push(Line::default());
                lines.push(section_line("Paths"));
            }
            Field::HostKeys => {
                lines.push(Line::default());
                lines.push(section_line("Security"));
            }
            Field::ActionStart => lines.push(Line::default()),
            _ => {}
        }
        let active = form.active_field == field;
        if active {
            active_row = Some(lines.len());
        }
        let line = match field {
            Field::Host => field_line("Host", &form.host, active, false, value_width),
            Field::Port => field_line("Port", &form.port, active, false, value_width),
            Field::User => field_line("Username", &form.user, active, false, value_width),
            Field::AuthType => choice_line("Auth", form.auth_kind.label(), active),
            Field::Password => {
                let label = match form.auth_kind {
                    AuthKind::Password => "Password",
                    AuthKind::PrivateKey => "Passphrase",
                };
                field_line(label, &form.password, active, true, value_width)
            }
            Field::KeyPath => field_line("Key path", &form.key_path, active, false, value_width),
            Field::Direction => choice_line("Direction", form.direction.label(), active),
            Field::Content => choice_line("Content", form.content.label(), active),
            Field::LocalPath => {
                field_line("Local path", &form.local_path, active, false, value_width)
            }
            Field::RemotePath => {
                field_line("Remote path", &form.remote_path, active, false, value_width)
            }
            Field::HostKeys => choice_line("Host keys", form.host_keys.label(), active),
            Field::ActionStart => {
                let label = if app.is_transferring() {
                    "Transferring..."
                } else {
                    "Start transfer"
                };
                action_line(label, active, !app.is_transferring())
            }
        };
        lines.push(line);
    }

    let height = inner.height as usize;
    let scroll = match active_row {
        Some(row) if height > 0 && row >= height => row + 1 - height,
        _ => 0,
    };
    frame.render_widget(Paragraph::new(lines).scroll((scroll as u16, 0)), inner);
    if app.notice.is_none() {
        render_form_cursor(
            frame,
            form,
            inner,
            active_row.map(|row| row - scroll),
            value_width,
        );
    }
}

pub(crate) fn draw_status(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let block = panel_block("Status");
    let inner = block.inner(area);
    frame.render_widget(block, area);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)].as_ref())
        .split(inner);

    let status_style = match app.state {
        OrchestratorState::Completed => Style::default().fg(Color::Green),
        OrchestratorState::Failed => Style::default().fg(Color::Red),
        OrchestratorState::Cancelled => Style::default().fg(Color::Yellow),
        _ => Style::default(),
    };
    let status = Line::from(vec![
        Span::styled(app.status.clone(), status_style.add_modifier(Modifier::BOLD)),
        Span::styled(
            format!(
                "  | items done: {} | host keys: {}",
                app.items_done,
                app.host_key_label()
            ),
            Style::default().fg(Color::Gray),
        ),
    ]);
    frame.render_widget(Paragraph::new(status), rows[0]);

    let (ratio, label) = match &app.progress {
        Some(progress) => {
            let name = truncate_text(&progress.item_name, (inner.width as usize) / 2);
            let label = match progress.percent() {
                Some(percent) => format!(
                    "{name}: {} / {} ({percent:.0}%)",
                    format_bytes(progress.sent_bytes),
                    format_bytes(progress.total_bytes)
                ),
                None => format!("{name}: empty"),
            };
            let ratio = if progress.total_bytes == 0 {
                1.0
            } else {
                progress.ratio()
            };
            (ratio, label)
        }
        None => (0.0, String::from("No transfer yet")),
    };
    let gauge = Gauge::default()
        .ratio(ratio.clamp(0.0, 1.0))
        .label(label)
        .style(Style::default().fg(Color::Gray))
        .gauge_style(Style::default().fg(Color::Green));
    frame.render_widget(gauge, rows[1]);
}

pub(crate) fn draw_logs(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let block = panel_block("Log");
    let inner = block.inner(area);
    frame.render_widget(block, area);
    let height = inner.height as usize;
    let width = inner.width as usize;
    let skip = app.log_lines.len().saturating_sub(height);
    let lines: Vec<Line> = app
        .log_lines
        .iter()
        .skip(skip)
        .map(|line| Line::from(truncate_text(line, width)))
        .collect();
    frame.render_widget(
        Paragraph::new(lines).style(Style::default().fg(Color::Gray)),
        inner,
    );
}
