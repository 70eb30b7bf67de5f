//! Markdown-lite rendering for assistant replies
//!
//! Converts the small markdown subset the backend produces into an HTML
//! fragment restricted to `h1`-`h3`, `p`, `li`, `strong`, `em`, `code`, `pre`
//! and `br`. Replies are untrusted, so `&`, `<`, `>` and quotes are escaped
//! before any tag is produced: the only markup in the output is our own.
//!
//! Rendering is a pure function and never fails. Malformed input (an
//! unterminated fence, a dangling `*`) is left as literal text.

const FENCE: &str = "```";

/// A line-level block recognised in the (already escaped) input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Block<'a> {
    Heading(u8, &'a str),
    ListItem(&'a str),
    Code(String),
    Paragraph(Vec<&'a str>),
}

/// Render raw assistant text as an HTML fragment.
pub fn render(raw: &str) -> String {
    let escaped = escape_html(&raw.replace("\r\n", "\n"));
    let mut html = String::with_capacity(escaped.len() + 32);

    for block in parse_blocks(&escaped) {
        match block {
            Block::Heading(level, text) => {
                html.push_str(&format!("<h{level}>{}</h{level}>", render_inline(text)));
            }
            Block::ListItem(text) => {
                html.push_str("<li>");
                html.push_str(&render_inline(text));
                html.push_str("</li>");
            }
            Block::Code(code) => {
                html.push_str("<pre><code>");
                html.push_str(&code);
                html.push_str("</code></pre>");
            }
            Block::Paragraph(lines) => {
                let body: Vec<String> = lines.iter().map(|line| render_inline(line)).collect();
                html.push_str("<p>");
                html.push_str(&body.join("<br>"));
                html.push_str("</p>");
            }
        }
    }

    html
}

/// Escape text for inclusion in HTML element content.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Split text into blocks. Fences are resolved before anything else so their
/// content never reaches the heading, list or inline rules.
fn parse_blocks(text: &str) -> Vec<Block<'_>> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(after) = line.strip_prefix(FENCE) {
            // ```inline``` on a single line
            if let Some(code) = after.strip_suffix(FENCE) {
                flush_paragraph(&mut blocks, &mut paragraph);
                blocks.push(Block::Code(code.to_string()));
                i += 1;
                continue;
            }

            let close = lines[i + 1..]
                .iter()
                .position(|l| l.starts_with(FENCE))
                .map(|offset| i + 1 + offset);
            if let Some(close) = close {
                flush_paragraph(&mut blocks, &mut paragraph);
                blocks.push(Block::Code(lines[i + 1..close].join("\n")));
                i = close + 1;
                continue;
            }
            // Unterminated: the opener falls through as ordinary text
        }

        if line.trim().is_empty() {
            flush_paragraph(&mut blocks, &mut paragraph);
        } else if let Some((level, text)) = heading(line) {
            flush_paragraph(&mut blocks, &mut paragraph);
            blocks.push(Block::Heading(level, text));
        } else if let Some(text) = list_item(line) {
            flush_paragraph(&mut blocks, &mut paragraph);
            blocks.push(Block::ListItem(text));
        } else {
            paragraph.push(line);
        }
        i += 1;
    }

    flush_paragraph(&mut blocks, &mut paragraph);
    blocks
}

fn flush_paragraph<'a>(blocks: &mut Vec<Block<'a>>, paragraph: &mut Vec<&'a str>) {
    if !paragraph.is_empty() {
        blocks.push(Block::Paragraph(std::mem::take(paragraph)));
    }
}

/// `# `, `## ` or `### ` at the very start of the line.
fn heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if !(1..=3).contains(&hashes) {
        return None;
    }
    line[hashes..]
        .strip_prefix(' ')
        .map(|text| (hashes as u8, text))
}

/// `* item`, `- item` or `12. item` at the very start of the line.
fn list_item(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix('*').or_else(|| line.strip_prefix('-')) {
        return after_marker(rest);
    }

    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix('.').and_then(after_marker)
}

fn after_marker(rest: &str) -> Option<&str> {
    if rest.starts_with([' ', '\t']) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Apply code, bold and italic spans to a single line.
///
/// Code spans win over emphasis and their content is copied as is. Bold is
/// tried before italic so `**` is never read as two single asterisks. Spans
/// nest by rendering the inner text recursively.
fn render_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(|c: char| c == '`' || c == '*') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix('`') {
            match after.find('`') {
                Some(end) if end > 0 => {
                    out.push_str("<code>");
                    out.push_str(&after[..end]);
                    out.push_str("</code>");
                    rest = &after[end + 1..];
                }
                _ => {
                    out.push('`');
                    rest = after;
                }
            }
        } else if let Some((after, end)) = tail
            .strip_prefix("***")
            .and_then(|after| find_triple(after).filter(|&end| end > 0).map(|end| (after, end)))
        {
            // ***x*** is bold wrapping italic
            out.push_str("<strong><em>");
            out.push_str(&render_inline(&after[..end]));
            out.push_str("</em></strong>");
            rest = &after[end + 3..];
        } else if let Some(after) = tail
            .strip_prefix("**")
            .filter(|_| !opens_italic_around_bold(tail))
        {
            match find_closing(after, true) {
                Some(end) if end > 0 => {
                    out.push_str("<strong>");
                    out.push_str(&render_inline(&after[..end]));
                    out.push_str("</strong>");
                    rest = &after[end + 2..];
                }
                _ => {
                    out.push_str("**");
                    rest = after;
                }
            }
        } else {
            let after = &tail[1..];
            match find_closing(after, false) {
                Some(end) if end > 0 => {
                    out.push_str("<em>");
                    out.push_str(&render_inline(&after[..end]));
                    out.push_str("</em>");
                    rest = &after[end + 1..];
                }
                _ => {
                    out.push('*');
                    rest = after;
                }
            }
        }
    }

    out.push_str(rest);
    out
}

/// `***a** b*`: an italic span whose text starts with bold.
fn opens_italic_around_bold(tail: &str) -> bool {
    tail.starts_with("***")
        && find_closing(&tail[3..], true).is_some_and(|end| end > 0)
        && find_closing(&tail[1..], false).is_some_and(|end| end > 0)
}

/// Byte offset of a closing `***`, skipping complete code spans.
fn find_triple(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'`' => match s[i + 1..].find('`') {
                Some(end) => i += end + 2,
                None => i += 1,
            },
            b'*' if s[i..].starts_with("***") => return Some(i),
            _ => i += 1,
        }
    }

    None
}

/// Byte offset of the delimiter closing a bold (`**`) or italic (`*`) span.
///
/// Complete code spans are skipped so asterisks inside them never close a
/// span. While looking for an italic close, complete `**` pairs are skipped
/// as nested bold.
fn find_closing(s: &str, bold: bool) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'`' => match s[i + 1..].find('`') {
                Some(end) => i += end + 2,
                None => i += 1,
            },
            b'*' => {
                let double = bytes.get(i + 1) == Some(&b'*');
                if bold {
                    if double {
                        return Some(i);
                    }
                    i += 1;
                } else if double {
                    match find_closing(&s[i + 2..], true) {
                        Some(end) => i += end + 4,
                        None => i += 2,
                    }
                } else {
                    return Some(i);
                }
            }
            _ => i += 1,
        }
    }

    None
}
