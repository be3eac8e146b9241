use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::App;
use crate::app::constants::NOTICE_SUCCESS_TITLE;
use crate::ui::constants::NOTICE_WIDTH_PERCENT;
use crate::ui::helpers::{centered_rect_by_height, draw_popup_frame, modal_height};

pub(crate) fn draw_notice_modal(frame: &mut Frame<'_>, app: &App) {
    let notice = match &app.notice {
        Some(notice) => notice,
        None => return,
    };
    let message_lines = notice.message.lines().count().max(1);
    let height = modal_height(message_lines + 2, 1);
    let area = centered_rect_by_height(NOTICE_WIDTH_PERCENT, height, frame.area());
    let color = if notice.title == NOTICE_SUCCESS_TITLE {
        Color::Green
    } else {
        Color::Yellow
    };
    let inner = draw_popup_frame(frame, area, notice.title.as_str(), Style::default().fg(color));

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(2), Constraint::Length(2)].as_ref())
        .split(inner);

    let message = Paragraph::new(notice.message.as_str()).wrap(Wrap { trim: true });
    frame.render_widget(message, layout[0]);

    let footer = Paragraph::new(Line::from(vec![
        Span::raw("Press "),
        Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" to close."),
    ]))
    .style(Style::default().fg(Color::Gray))
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, layout[1]);
}
