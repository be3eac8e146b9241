use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::App;
use crate::model::Field;

impl App {
    /// Ctrl+C is handled by the event loop before keys reach the form.
    pub(crate) fn handle_key(&mut self, key: KeyEvent) {
        if self.notice.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.notice = None;
            }
            return;
        }
        let active = self.form.active_field;
        match key.code {
            KeyCode::Esc => {
                if self.is_transferring() {
                    self.cancel_transfer();
                }
            }
            KeyCode::Tab | KeyCode::Down => self.advance_field(true),
            KeyCode::BackTab | KeyCode::Up => self.advance_field(false),
            KeyCode::Left | KeyCode::Right => {
                if active.is_choice() {
                    self.form.toggle(active);
                }
            }
            KeyCode::Enter => match active {
                Field::ActionStart => self.start_transfer(),
                field if field.is_choice() => self.form.toggle(field),
                _ => self.advance_field(true),
            },
            KeyCode::Char(' ') if active.is_choice() => self.form.toggle(active),
            KeyCode::Backspace => self.edit_active_field(EditAction::Backspace),
            KeyCode::Char(ch) => {
                if key.modifiers.contains(KeyModifiers::CONTROL) {
                    return;
                }
                self.edit_active_field(EditAction::Insert(ch));
            }
            _ => {}
        }
    }

    fn advance_field(&mut self, forward: bool) {
        let fields = self.form.active_fields();
        let pos = fields
            .iter()
            .position(|field| *field == self.form.active_field)
            .unwrap_or(0);
        let next = if forward {
            (pos + 1) % fields.len()
        } else if pos == 0 {
            fields.len() - 1
        } else {
            pos - 1
        };
        self.form.active_field = fields[next];
    }

    fn edit_active_field(&mut self, action: EditAction) {
        let field = self.form.active_field;
        let Some(target) = self.form.text_mut(field) else {
            return;
        };
        match action {
            EditAction::Insert(ch) => {
                if field == Field::Port && !ch.is_ascii_digit() {
                    return;
                }
                target.push(ch);
            }
            EditAction::Backspace => {
                target.pop();
            }
        }
    }
}

enum EditAction {
    Insert(char),
    Backspace,
}
