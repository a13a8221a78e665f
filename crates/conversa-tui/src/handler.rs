use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use crate::app::{App, InputMode, Popup, SettingsField};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Longest message the chat input accepts, in characters.
pub const MAX_INPUT_CHARS: usize = 500;

/// Line editing shared by the chat input and the API key field.
/// Characters past `limit` are dropped. Returns false when the key is not an
/// editing key.
fn edit_line(text: &mut String, cursor: &mut usize, key: KeyEvent, limit: Option<usize>) -> bool {
    match key.code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < text.chars().count() {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            *cursor = cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            *cursor = (*cursor + 1).min(text.chars().count());
        }
        KeyCode::Home => {
            *cursor = 0;
        }
        KeyCode::End => {
            *cursor = text.chars().count();
        }
        KeyCode::Char(_) if limit.is_some_and(|max| text.chars().count() >= max) => {}
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => return false,
    }
    true
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    // Popups take all input while open
    match app.popup {
        Popup::None => {}
        Popup::ConfirmClearChat => {
            if let Some(confirmed) = confirmation(key) {
                app.resolve_clear_chat(confirmed).await;
            }
            return Ok(());
        }
        Popup::ConfirmClearAll => {
            if let Some(confirmed) = confirmation(key) {
                app.resolve_clear_all(confirmed).await;
            }
            return Ok(());
        }
        Popup::Settings => {
            handle_settings(app, key).await;
            return Ok(());
        }
        Popup::Alert { .. } => {
            app.popup = Popup::None;
            return Ok(());
        }
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key).await,
    }

    Ok(())
}

/// `Some(true)` to go ahead, `Some(false)` to back out, `None` to keep asking.
fn confirmation(key: KeyEvent) -> Option<bool> {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Char('s') | KeyCode::Char('S') => {
            Some(true)
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(false),
        _ => None,
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,
        KeyCode::Char('c') => app.open_clear_chat(),
        KeyCode::Char('X') => app.open_clear_all(),
        KeyCode::Char('o') => app.open_settings(),
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('G') | KeyCode::End => app.scroll_to_bottom(),
        KeyCode::Char('g') | KeyCode::Home => {
            app.chat_scroll = 0;
            app.follow_bottom = false;
        }
        _ => {}
    }
}

async fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.submit_input().await;
        }
        KeyCode::Up => app.scroll_up(),
        KeyCode::Down => app.scroll_down(),
        _ => {
            edit_line(&mut app.input, &mut app.cursor, key, Some(MAX_INPUT_CHARS));
        }
    }
}

async fn handle_settings(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.popup = Popup::None;
            return;
        }
        KeyCode::Enter => {
            app.save_settings().await;
            return;
        }
        _ => {}
    }

    let form = &mut app.settings_form;
    match key.code {
        KeyCode::Tab | KeyCode::Down => form.field = form.field.next(),
        KeyCode::BackTab | KeyCode::Up => form.field = form.field.prev(),
        KeyCode::Char(' ') if form.field != SettingsField::ApiKey => form.toggle(),
        _ if form.field == SettingsField::ApiKey => {
            edit_line(&mut form.values.api_key, &mut form.api_key_cursor, key, None);
        }
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(),
        MouseEventKind::ScrollUp => app.scroll_up(),
        _ => {}
    }
}
