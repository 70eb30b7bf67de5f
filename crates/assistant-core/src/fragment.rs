//! Reading rendered fragments back
//!
//! The renderer only ever emits a fixed set of bare tags, so a fragment can be
//! walked as a flat event stream without a general HTML parser. Anything that
//! is not one of our tags is kept as text.

/// Tags produced by [`crate::markdown::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Heading(u8),
    Paragraph,
    ListItem,
    Strong,
    Emphasis,
    Code,
    Preformatted,
}

impl Tag {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "h1" => Some(Tag::Heading(1)),
            "h2" => Some(Tag::Heading(2)),
            "h3" => Some(Tag::Heading(3)),
            "p" => Some(Tag::Paragraph),
            "li" => Some(Tag::ListItem),
            "strong" => Some(Tag::Strong),
            "em" => Some(Tag::Emphasis),
            "code" => Some(Tag::Code),
            "pre" => Some(Tag::Preformatted),
            _ => None,
        }
    }

    /// Whether the tag occupies its own line(s).
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Tag::Heading(_) | Tag::Paragraph | Tag::ListItem | Tag::Preformatted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(Tag),
    End(Tag),
    LineBreak,
    /// Text with entities decoded
    Text(String),
}

/// Tokenize a rendered fragment.
pub fn parse(fragment: &str) -> Vec<Event> {
    let mut events = Vec::new();
    let mut rest = fragment;

    while let Some(open) = rest.find('<') {
        push_text(&mut events, &rest[..open]);
        let tail = &rest[open..];

        match tail.find('>') {
            Some(close) => {
                match parse_tag(&tail[1..close]) {
                    Some(event) => events.push(event),
                    None => push_text(&mut events, &tail[..=close]),
                }
                rest = &tail[close + 1..];
            }
            None => {
                push_text(&mut events, tail);
                rest = "";
            }
        }
    }

    push_text(&mut events, rest);
    events
}

fn parse_tag(inner: &str) -> Option<Event> {
    let inner = inner.trim().trim_end_matches('/');
    let (closing, name) = match inner.strip_prefix('/') {
        Some(name) => (true, name),
        None => (false, inner),
    };
    let name = name.split_whitespace().next()?.to_ascii_lowercase();

    if name == "br" {
        return Some(Event::LineBreak);
    }
    let tag = Tag::from_name(&name)?;
    Some(if closing { Event::End(tag) } else { Event::Start(tag) })
}

fn push_text(events: &mut Vec<Event>, raw: &str) {
    if raw.is_empty() {
        return;
    }
    let text = decode_entities(raw);
    if let Some(Event::Text(previous)) = events.last_mut() {
        previous.push_str(&text);
    } else {
        events.push(Event::Text(text));
    }
}

/// Reverse of [`crate::markdown::escape_html`].
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Flatten a fragment to plain text for transcripts and read-aloud.
///
/// List items get a `• ` bullet, block ends and `<br>` become newlines and
/// inline formatting is dropped.
pub fn to_plain_text(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());

    for event in parse(fragment) {
        match event {
            Event::Start(Tag::ListItem) => out.push_str("• "),
            Event::End(tag) if tag.is_block() => out.push('\n'),
            Event::LineBreak => out.push('\n'),
            Event::Text(text) => out.push_str(&text),
            Event::Start(_) | Event::End(_) => {}
        }
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::render;

    #[test]
    fn test_parse_events() {
        let events = parse("<h2>Hi</h2><p>a<br>b <em>c</em></p>");
        assert_eq!(
            events,
            vec![
                Event::Start(Tag::Heading(2)),
                Event::Text("Hi".to_string()),
                Event::End(Tag::Heading(2)),
                Event::Start(Tag::Paragraph),
                Event::Text("a".to_string()),
                Event::LineBreak,
                Event::Text("b ".to_string()),
                Event::Start(Tag::Emphasis),
                Event::Text("c".to_string()),
                Event::End(Tag::Emphasis),
                Event::End(Tag::Paragraph),
            ]
        );
    }

    #[test]
    fn test_unknown_tags_stay_text() {
        assert_eq!(
            parse("x <div> y"),
            vec![Event::Text("x <div> y".to_string())]
        );
        assert_eq!(parse("a < b"), vec![Event::Text("a < b".to_string())]);
    }

    #[test]
    fn test_entities_are_decoded() {
        assert_eq!(decode_entities("&lt;b&gt; &amp;amp; &quot;q&quot; &#39;"), "<b> &amp; \"q\" '");
        assert_eq!(to_plain_text(&render("1 < 2 && x > y")), "1 < 2 && x > y");
    }

    #[test]
    fn test_plain_text_recovers_markers() {
        let raw = "# Title\n- item\n**bold** text\n```\nlet x = 1;\nlet y = *x;\n```";
        let html = render(raw);

        assert_eq!(
            to_plain_text(&html),
            "Title\n• item\nbold text\nlet x = 1;\nlet y = *x;"
        );
    }

    #[test]
    fn test_plain_text_line_breaks() {
        assert_eq!(to_plain_text(&render("one\ntwo\n\nthree")), "one\ntwo\nthree");
    }
}
