use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use crate::app::{App, InputMode, Popup, SettingsField};

/// Colours for the light and dark themes.
struct Palette {
    background: Color,
    text: Color,
    muted: Color,
    user: Color,
    assistant: Color,
    accent: Color,
}

impl Palette {
    fn for_app(app: &App) -> Self {
        if app.settings.dark_mode {
            Self {
                background: Color::Black,
                text: Color::Gray,
                muted: Color::DarkGray,
                user: Color::LightCyan,
                assistant: Color::LightYellow,
                accent: Color::LightBlue,
            }
        } else {
            Self {
                background: Color::Reset,
                text: Color::Reset,
                muted: Color::DarkGray,
                user: Color::Cyan,
                assistant: Color::Yellow,
                accent: Color::Blue,
            }
        }
    }
}

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after_open = &rest[start + 2..];
        let Some(len) = after_open.find("**") else {
            break;
        };
        if len == 0 {
            // "****" carries no text, keep it literal
            spans.push(Span::raw(rest[..start + 4].to_string()));
            rest = &rest[start + 4..];
            continue;
        }

        if start > 0 {
            spans.push(Span::raw(rest[..start].to_string()));
        }
        spans.push(Span::styled(
            after_open[..len].to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        rest = &after_open[len + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    Line::from(spans)
}

/// Mask an API key, keeping only the last four characters visible
fn mask_key(key: &str) -> String {
    let len = key.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let masked_len = len - 4;
    let last_four: String = key.chars().skip(masked_len).collect();
    format!("{}...{}", "*".repeat(masked_len.min(20)), last_four)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let palette = Palette::for_app(app);

    frame.render_widget(
        Block::default().style(Style::default().bg(palette.background).fg(palette.text)),
        area,
    );

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, &palette, frame, header_area);
    render_chat(app, &palette, frame, chat_area);
    render_input(app, &palette, frame, input_area);
    render_footer(app, &palette, frame, footer_area);

    match &app.popup {
        Popup::None => {}
        Popup::ConfirmClearChat => render_confirm(
            frame,
            area,
            " Limpar Chat ",
            "Tem certeza que deseja limpar todo o histórico?",
        ),
        Popup::ConfirmClearAll => render_confirm(
            frame,
            area,
            " Limpar Dados ",
            "Isso irá apagar todas as mensagens e configurações. Tem certeza?",
        ),
        Popup::Settings => render_settings(app, &palette, frame, area),
        Popup::Alert { title, message } => render_alert(frame, area, title, message),
    }
}

fn render_header(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let (status, status_color) = if app.is_online() {
        (" online ", Color::Green)
    } else {
        (" offline ", Color::Red)
    };

    let title = Line::from(vec![
        Span::styled(" Assistente IA ", Style::default().fg(palette.accent).bold()),
        Span::styled(status, Style::default().fg(status_color)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(palette.muted),
        ),
    ]);

    frame.render_widget(Paragraph::new(title), area);
}

fn author_line(label: &'static str, timestamp: &str, color: Color, palette: &Palette) -> Line<'static> {
    Line::from(vec![
        Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::styled(format!(" {}", timestamp), Style::default().fg(palette.muted)),
    ])
}

fn render_chat(app: &mut App, palette: &Palette, frame: &mut Frame, area: Rect) {
    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);
    if app.follow_bottom {
        app.chat_scroll = app.max_scroll();
    }

    let mut lines: Vec<Line> = Vec::new();
    for msg in app.session.messages() {
        if msg.is_user {
            lines.push(author_line("Você:", &msg.timestamp, palette.user, palette));
            for line in msg.text.lines() {
                lines.push(Line::from(line.to_string()));
            }
        } else {
            lines.push(author_line("IA:", &msg.timestamp, palette.assistant, palette));
            for line in msg.text.lines() {
                lines.push(parse_markdown_line(line));
            }
        }
        lines.push(Line::default());
    }

    if app.is_loading() {
        lines.push(Line::from(Span::styled(
            "IA:",
            Style::default().fg(palette.assistant).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Digitando{}", dots),
            Style::default().fg(palette.muted).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.muted))
        .title(" Conversa ");

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing && app.popup == Popup::None;
    let border_color = if editing { Color::Yellow } else { palette.muted };
    let title = if app.is_loading() {
        " Aguarde a resposta... "
    } else {
        " Digite sua mensagem "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;
    let scroll_offset = if inner_width > 0 && cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(palette.user))
        .block(input_block);

    frame.render_widget(input, area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let hints = match app.input_mode {
        InputMode::Editing => "Enter enviar | Esc modo normal | Ctrl+C sair",
        InputMode::Normal => "i escrever | c limpar chat | o configurações | X limpar dados | j/k rolar | q sair",
    };
    let footer = Paragraph::new(Span::styled(hints, Style::default().fg(palette.muted)));
    frame.render_widget(footer, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_confirm(frame: &mut Frame, area: Rect, title: &str, question: &str) {
    let popup_area = centered(area, 60, 6);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(title.to_string());

    let text = Text::from(vec![
        Line::from(question.to_string()),
        Line::default(),
        Line::from(vec![
            Span::styled("[s] Limpar", Style::default().fg(Color::Red).bold()),
            Span::raw("   "),
            Span::styled("[n] Cancelar", Style::default().fg(Color::DarkGray)),
        ]),
    ]);

    frame.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: true }),
        popup_area,
    );
}

fn render_alert(frame: &mut Frame, area: Rect, title: &str, message: &str) {
    let popup_area = centered(area, 50, 5);
    frame.render_widget(Clear, popup_area);

    let color = if title == "Erro" { Color::Red } else { Color::Green };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(format!(" {} ", title));

    let text = Text::from(vec![
        Line::from(message.to_string()),
        Line::from(Span::styled(
            "Pressione qualquer tecla",
            Style::default().fg(Color::DarkGray),
        )),
    ]);

    frame.render_widget(Paragraph::new(text).block(block), popup_area);
}

fn render_settings(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 60, 11);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Configurações ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let form = &app.settings_form;
    let selected = |field: SettingsField| {
        if form.field == field {
            Style::default().fg(palette.accent).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    };
    let checkbox = |on: bool| if on { "[x]" } else { "[ ]" };

    let lines = vec![
        Line::from(Span::styled("Chave da API", selected(SettingsField::ApiKey))),
        Line::from(Span::styled(
            mask_key(&form.values.api_key),
            Style::default().fg(palette.user),
        )),
        Line::default(),
        Line::from(Span::styled(
            format!("{} Modo escuro", checkbox(form.values.dark_mode)),
            selected(SettingsField::DarkMode),
        )),
        Line::from(Span::styled(
            format!("{} Voz habilitada", checkbox(form.values.voice_enabled)),
            selected(SettingsField::VoiceEnabled),
        )),
        Line::from(Span::styled(
            format!("{} Salvar automaticamente", checkbox(form.values.auto_save)),
            selected(SettingsField::AutoSave),
        )),
        Line::default(),
        Line::from(Span::styled(
            "Tab campo | Espaço alternar | Enter salvar | Esc cancelar",
            Style::default().fg(palette.muted),
        )),
    ];

    frame.render_widget(Paragraph::new(Text::from(lines)), inner);

    if form.field == SettingsField::ApiKey {
        let shown = mask_key(&form.values.api_key).chars().count() as u16;
        let cursor_x = shown.min(inner.width.saturating_sub(1));
        frame.set_cursor_position((inner.x + cursor_x, inner.y + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_bold_markdown_is_styled() {
        let line = parse_markdown_line("Isso é **importante** mesmo");
        assert_eq!(plain(&line), "Isso é importante mesmo");
        assert_eq!(line.spans.len(), 3);
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_unclosed_bold_is_literal() {
        let line = parse_markdown_line("a **b");
        assert_eq!(plain(&line), "a **b");
    }

    #[test]
    fn test_mask_key_keeps_last_four() {
        assert_eq!(mask_key(""), "");
        assert_eq!(mask_key("abc"), "***");
        assert_eq!(mask_key("sk-123456"), "*****...3456");
    }
}
