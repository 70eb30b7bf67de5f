use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use assistant_core::fragment::{self, Event, Tag};
use assistant_core::markdown;
use assistant_core::ChatRole;
use crate::app::{App, InputMode};

const DISCLAIMER: &str = "Gemini can make mistakes. Please verify important information.";

fn tag_style(tag: Tag, base: Style) -> Style {
    match tag {
        Tag::Heading(1) => base
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        Tag::Heading(_) => base.fg(Color::Yellow).add_modifier(Modifier::BOLD),
        Tag::Strong => base.add_modifier(Modifier::BOLD),
        Tag::Emphasis => base.add_modifier(Modifier::ITALIC),
        Tag::Code | Tag::Preformatted => base.fg(Color::Cyan),
        Tag::Paragraph | Tag::ListItem => base,
    }
}

fn flush_line(lines: &mut Vec<Line<'static>>, spans: &mut Vec<Span<'static>>) {
    lines.push(Line::from(std::mem::take(spans)));
}

/// Turn a rendered HTML fragment into styled terminal lines
pub fn fragment_lines(html: &str) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut styles: Vec<Style> = vec![Style::default()];

    for event in fragment::parse(html) {
        let current = styles.last().copied().unwrap_or_default();
        match event {
            Event::Start(tag) => {
                if tag == Tag::ListItem {
                    spans.push(Span::styled("  • ", Style::default().fg(Color::DarkGray)));
                }
                styles.push(tag_style(tag, current));
            }
            Event::End(tag) => {
                if styles.len() > 1 {
                    styles.pop();
                }
                if tag.is_block() {
                    flush_line(&mut lines, &mut spans);
                }
                // Breathing room after paragraphs and code blocks
                if matches!(tag, Tag::Paragraph | Tag::Preformatted) {
                    lines.push(Line::default());
                }
            }
            Event::LineBreak => flush_line(&mut lines, &mut spans),
            Event::Text(text) => {
                // Only code blocks carry raw newlines
                let mut parts = text.split('\n');
                if let Some(first) = parts.next() {
                    spans.push(Span::styled(first.to_string(), current));
                }
                for part in parts {
                    flush_line(&mut lines, &mut spans);
                    spans.push(Span::styled(part.to_string(), current));
                }
            }
        }
    }

    if !spans.is_empty() {
        flush_line(&mut lines, &mut spans);
    }
    while lines.last().is_some_and(|line| line.width() == 0) {
        lines.pop();
    }
    lines
}

/// Rows a line takes once wrapped to `width` columns
fn wrapped_height(line: &Line, width: u16) -> usize {
    let width = width.max(1) as usize;
    line.width().div_ceil(width).max(1)
}

/// Row counts are kept in `usize`; the scroll offset ratatui takes is `u16`
fn clamp_rows(rows: usize) -> u16 {
    u16::try_from(rows).unwrap_or(u16::MAX)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let attachment_height = if app.attachment.is_some() { 3 } else { 0 };
    let [header_area, chat_area, attachment_area, input_area, disclaimer_area, footer_area] =
        Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(attachment_height),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    if app.attachment.is_some() {
        render_attachment(app, frame, attachment_area);
    }
    render_input(app, frame, input_area);

    let disclaimer = Paragraph::new(Span::styled(DISCLAIMER, Style::default().fg(Color::DarkGray)))
        .alignment(Alignment::Center);
    frame.render_widget(disclaimer, disclaimer_area);

    render_footer(app, frame, footer_area);

    if app.show_voice_picker {
        render_voice_picker(app, frame, area);
    }
}

fn render_header(app: &mut App, frame: &mut Frame, area: Rect) {
    let voice = app
        .narrator
        .selected_voice()
        .map(|v| format!(" voice: {} ", v.name))
        .unwrap_or_default();

    let title = Line::from(vec![
        Span::styled(" Gemini Assistant ", Style::default().fg(Color::Magenta).bold()),
        Span::styled(
            format!("{} ", app.session.client().base_url()),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(voice, Style::default().fg(Color::Gray)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::Black));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);
    // Inner size minus borders
    app.chat_height = area.height.saturating_sub(2);
    let inner_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Normal {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(" Conversation ");

    let transcript = app.session.transcript();
    if transcript.is_empty() && !app.is_loading() {
        let welcome = Text::from(vec![
            Line::default(),
            Line::from(Span::styled(
                "Welcome to Gemini Assistant",
                Style::default().fg(Color::Magenta).bold(),
            )),
            Line::from(Span::styled(
                "Ask me anything or upload a document (Ctrl+O) to get started!",
                Style::default().fg(Color::DarkGray),
            )),
        ]);
        let paragraph = Paragraph::new(welcome)
            .block(block)
            .alignment(Alignment::Center);
        frame.render_widget(paragraph, area);
        app.total_chat_lines = 0;
        app.chat_scroll = 0;
        return;
    }

    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut message_offsets: Vec<u16> = Vec::with_capacity(transcript.len());
    let mut rows: usize = 0;

    for (i, msg) in transcript.iter().enumerate() {
        message_offsets.push(clamp_rows(rows));
        let start = lines.len();

        let (label_color, label) = match (msg.role(), msg.is_error()) {
            (ChatRole::User, _) => (Color::Cyan, "You:"),
            (ChatRole::Assistant, true) => (Color::Red, "Assistant:"),
            (ChatRole::Assistant, false) => (Color::Yellow, "Assistant:"),
        };
        let mut header = vec![
            Span::styled(label, Style::default().fg(label_color).add_modifier(Modifier::BOLD)),
            Span::styled(format!(" {}", msg.time_label()), Style::default().fg(Color::DarkGray)),
        ];
        if let Some(name) = msg.attachment_name() {
            header.push(Span::styled(format!("  📎 {}", name), Style::default().fg(Color::Blue)));
        }
        if app.narrator.is_speaking(msg.id()) {
            header.push(Span::styled("  🔊 speaking", Style::default().fg(Color::Green)));
        }
        let mut header_line = Line::from(header);
        if app.selected_message == Some(i) {
            header_line = header_line.style(Style::default().add_modifier(Modifier::REVERSED));
        }
        lines.push(header_line);

        match msg.role() {
            // User input is shown literally, never interpreted as markup
            ChatRole::User => {
                for line in msg.raw_text().lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            ChatRole::Assistant if msg.is_error() => {
                lines.push(Line::from(Span::styled(
                    msg.raw_text().to_string(),
                    Style::default().fg(Color::Red),
                )));
            }
            ChatRole::Assistant => {
                lines.extend(fragment_lines(&markdown::render(msg.raw_text())));
            }
        }
        lines.push(Line::default());

        rows = lines[start..]
            .iter()
            .map(|line| wrapped_height(line, inner_width))
            .fold(rows, usize::saturating_add);
    }

    if app.is_loading() {
        lines.push(Line::from(Span::styled(
            "Assistant:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
        rows = rows.saturating_add(2);
    }

    app.total_chat_lines = clamp_rows(rows);
    let max_scroll = app.total_chat_lines.saturating_sub(app.chat_height);
    if app.follow_tail {
        app.chat_scroll = max_scroll;
    } else if app.scroll_to_selection {
        if let Some(offset) = app.selected_message.and_then(|i| message_offsets.get(i)) {
            if *offset < app.chat_scroll
                || *offset >= app.chat_scroll.saturating_add(app.chat_height)
            {
                app.chat_scroll = *offset;
            }
        }
    }
    app.scroll_to_selection = false;
    app.chat_scroll = app.chat_scroll.min(max_scroll);

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_attachment(app: &App, frame: &mut Frame, area: Rect) {
    let Some(attachment) = app.attachment.as_ref() else {
        return;
    };

    let line = Line::from(vec![
        Span::styled(" 📎 ", Style::default().fg(Color::Blue)),
        Span::styled(
            attachment.name().to_string(),
            Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" ({})", attachment.size_label()),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue))
        .title(" Attachment (x to remove) ");
    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (text, cursor_pos, title, border_color) = match app.input_mode {
        InputMode::AttachPath => (
            app.attach_input.as_str(),
            app.attach_input.chars().count(),
            " Attach file path: .pdf .txt .docx (Enter to attach, Esc to cancel) ",
            Color::Blue,
        ),
        mode => {
            let title = if app.is_loading() {
                " Waiting for reply... "
            } else if app.can_send() {
                " Message (Enter to send) "
            } else {
                " Message Gemini Assistant... "
            };
            let color = if mode == InputMode::Editing {
                Color::Yellow
            } else {
                Color::DarkGray
            };
            (app.input.as_str(), app.input_cursor, title, color)
        }
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scrolling keeps the cursor visible
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = text
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if app.input_mode != InputMode::Normal && !app.show_voice_picker {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
        InputMode::AttachPath => (" ATTACH ", Style::default().bg(Color::Magenta).fg(Color::White)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];

    if let Some(status) = &app.status {
        spans.push(Span::styled(format!(" {} ", status), Style::default().fg(Color::Green)));
    } else {
        let hints: &[(&str, &str)] = match app.input_mode {
            InputMode::Normal => &[
                ("j/k", "select"),
                ("c", "copy"),
                ("s", "speak"),
                ("d", "download"),
                ("v", "voice"),
                ("a", "attach"),
                ("i", "write"),
                ("q", "quit"),
            ],
            InputMode::Editing => &[("Enter", "send"), ("Ctrl+O", "attach"), ("Esc", "actions")],
            InputMode::AttachPath => &[("Enter", "attach"), ("Esc", "cancel")],
        };
        for (key, label) in hints {
            spans.push(Span::styled(format!(" {} ", key), key_style));
            spans.push(Span::styled(format!(" {} ", label), label_style));
        }
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_voice_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let current = app.narrator.selected_index();
    let items: Vec<ListItem> = app
        .narrator
        .voices()
        .iter()
        .enumerate()
        .map(|(i, voice)| {
            let style = if Some(i) == current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ({}) ", voice.name, voice.lang)).style(style)
        })
        .collect();

    // Calculate popup size and position (centered)
    let popup_width = 50.min(area.width.saturating_sub(4));
    let popup_height = (items.len() as u16 + 2).min(area.height.saturating_sub(4));
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Voice (Enter to select, Esc to cancel) ");

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.voice_picker_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use assistant_core::{
        BackendClient, ClipboardWriter, Config, DirectorySink, Narrator, SpeechPlayer,
        VoiceProfile,
    };
    use ratatui::{backend::TestBackend, Terminal};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Mute;

    impl SpeechPlayer for Mute {
        fn voices(&mut self) -> Result<Vec<VoiceProfile>> {
            Ok(Vec::new())
        }
        fn speak(&mut self, _text: &str, _voice: Option<&VoiceProfile>) -> Result<()> {
            Ok(())
        }
        fn cancel(&mut self) {}
        fn is_playing(&mut self) -> bool {
            false
        }
    }

    struct NoClipboard;

    impl ClipboardWriter for NoClipboard {
        fn write_text(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_fragment_lines_layout() {
        let html = markdown::render("## Title\n* one\n**bold** and *soft*\n```\nfn a()\n{}\n```");
        let lines = fragment_lines(&html);
        let text: Vec<String> = lines.iter().map(plain).collect();

        assert_eq!(
            text,
            vec!["Title", "  • one", "bold and soft", "", "fn a()", "{}"]
        );
    }

    #[test]
    fn test_fragment_lines_styles() {
        let lines = fragment_lines(&markdown::render("**b** *i* `c`"));
        let spans = &lines[0].spans;

        assert!(spans[0].style.add_modifier.contains(Modifier::BOLD));
        assert!(spans[2].style.add_modifier.contains(Modifier::ITALIC));
        assert_eq!(spans[4].style.fg, Some(Color::Cyan));
    }

    #[tokio::test]
    async fn test_transcript_taller_than_u16_rows_draws() {
        // 40k paragraphs render to ~80k rows
        let reply = "line\\n\\n".repeat(40_000);
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                format!(r#"{{"response":"{}"}}"#, reply),
                "application/json",
            ))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut app = App::with_capabilities(
            Config::new(),
            BackendClient::new(&server.uri()),
            Narrator::new(Box::new(Mute)),
            Box::new(NoClipboard),
            Box::new(DirectorySink::new(dir.path())),
        );
        app.input = "a long one please".to_string();
        app.send_draft();
        app.session.wait_for_response().await;
        assert!(!app.session.transcript().last().unwrap().is_error());

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        assert_eq!(app.total_chat_lines, u16::MAX);
        assert_eq!(app.chat_scroll, u16::MAX - app.chat_height);

        app.select_last_message();
        app.scroll_down(10);
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert_eq!(app.chat_scroll, u16::MAX - app.chat_height);
    }

    #[test]
    fn test_clamp_rows() {
        assert_eq!(clamp_rows(12), 12);
        assert_eq!(clamp_rows(80_000), u16::MAX);
    }

    #[test]
    fn test_wrapped_height() {
        assert_eq!(wrapped_height(&Line::from(""), 10), 1);
        assert_eq!(wrapped_height(&Line::from("abcdefghij"), 10), 1);
        assert_eq!(wrapped_height(&Line::from("abcdefghijk"), 10), 2);
        assert_eq!(wrapped_height(&Line::from("abc"), 0), 3);
    }
}
