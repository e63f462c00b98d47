//! Render source formatting entities as Discord markdown.
//!
//! Entity offsets and lengths are UTF-16 code units, so the document renderer
//! works on a UTF-16 buffer and only decodes the span it is about to wrap.
//! Characters outside the BMP (most emoji) take two code units; indexing by
//! `char` or byte would shift every later span.

use std::collections::BTreeMap;

use tracing::debug;

use ferry_channels::{Entity, EntityKind, Error, Result};

/// Discord rejects message content longer than this many characters.
pub const DISCORD_MAX_MESSAGE_LEN: usize = 2000;

/// Output of [`render_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Net growth in UTF-16 code units.
    pub growth: usize,
}

/// How a single entity kind maps onto Discord markup.
enum Markup {
    /// Surround the span, keeping edge whitespace outside the markers.
    Inline(&'static str),
    /// Surround the span verbatim.
    Wrap { prefix: String, suffix: String },
    /// Prefix every line of the span.
    Lines(&'static str),
    /// No Discord equivalent.
    Plain,
}

/// Static table from entity kind to markup.
fn markup_for(kind: &EntityKind, text: &str, linkify: bool) -> Markup {
    match kind {
        EntityKind::Bold => Markup::Inline("**"),
        EntityKind::Italic => Markup::Inline("*"),
        EntityKind::Underline => Markup::Inline("__"),
        EntityKind::Strikethrough => Markup::Inline("~~"),
        EntityKind::Spoiler => Markup::Inline("||"),
        EntityKind::Code => Markup::Inline("`"),
        EntityKind::Pre { language } => Markup::Wrap {
            prefix: format!("```{}\n", language.as_deref().unwrap_or_default()),
            suffix: "\n```".into(),
        },
        EntityKind::Blockquote | EntityKind::ExpandableBlockquote => Markup::Lines("> "),
        EntityKind::TextLink { url } => Markup::Wrap {
            prefix: "[".into(),
            suffix: format!("]({url})"),
        },
        EntityKind::Url if linkify && !has_scheme(text) => Markup::Wrap {
            prefix: "[".into(),
            suffix: format!("](https://{})", text.trim()),
        },
        EntityKind::Url
        | EntityKind::Email
        | EntityKind::PhoneNumber
        | EntityKind::Mention
        | EntityKind::TextMention { .. }
        | EntityKind::Hashtag
        | EntityKind::Cashtag
        | EntityKind::BotCommand
        | EntityKind::CustomEmoji { .. } => Markup::Plain,
    }
}

fn has_scheme(text: &str) -> bool {
    let text = text.trim_start();
    match text.find("://") {
        Some(idx) => {
            idx > 0
                && text[..idx]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        },
        None => text.starts_with("mailto:") || text.starts_with("tg:"),
    }
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Apply one entity to the whole of `text`.
///
/// Returns the new text and its growth in UTF-16 code units.
pub fn render_one(text: &str, entity: &Entity, linkify: bool) -> (String, usize) {
    if text.is_empty() {
        return (String::new(), 0);
    }
    let rendered = match markup_for(&entity.kind, text, linkify) {
        Markup::Plain => return (text.to_owned(), 0),
        Markup::Inline(marker) => {
            let body = text.trim();
            if body.is_empty() {
                return (text.to_owned(), 0);
            }
            let lead = &text[..text.len() - text.trim_start().len()];
            let trail = &text[text.trim_end().len()..];
            format!("{lead}{marker}{body}{marker}{trail}")
        },
        Markup::Wrap { prefix, suffix } => format!("{prefix}{text}{suffix}"),
        Markup::Lines(prefix) => {
            // A closing newline ends the quote; it does not open an empty line.
            let (body, tail) = match text.strip_suffix('\n') {
                Some(body) if !body.is_empty() => (body, "\n"),
                _ => (text, ""),
            };
            let quoted = body
                .split('\n')
                .map(|line| format!("{prefix}{line}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{quoted}{tail}")
        },
    };
    let growth = utf16_len(&rendered).saturating_sub(utf16_len(text));
    (rendered, growth)
}

/// Apply `base`, then every sibling in declaration order onto the running
/// output. Composition is not commutative: `**` then `*` gives `***t***`
/// while a link then bold gives `**[t](u)**`.
pub fn render_nested(
    text: &str,
    base: &Entity,
    siblings: &[&Entity],
    linkify: bool,
) -> (String, usize) {
    let (mut out, mut growth) = render_one(text, base, linkify);
    for sibling in siblings {
        let (next, grew) = render_one(&out, sibling, linkify);
        out = next;
        growth += grew;
    }
    (out, growth)
}

/// Render a full message text with all of its entities.
///
/// Entities are grouped by start offset; within a group the first declared
/// entity is the base and defines the span. Groups are applied in ascending
/// offset order against the growing output, so each later offset is shifted
/// by the markup inserted so far.
pub fn render_document(text: &str, entities: &[Entity], linkify: bool) -> Rendered {
    if entities.is_empty() {
        return Rendered {
            text: text.to_owned(),
            growth: 0,
        };
    }

    let mut groups: BTreeMap<usize, Vec<&Entity>> = BTreeMap::new();
    for entity in entities {
        groups.entry(entity.offset).or_default().push(entity);
    }

    let mut buf: Vec<u16> = text.encode_utf16().collect();
    let mut growth = 0usize;

    for (offset, group) in groups {
        let Some((base, siblings)) = group.split_first() else {
            continue;
        };
        let start = offset + growth;
        let end = base.end() + growth;
        if end > buf.len() || start > end {
            debug!(
                offset,
                length = base.length,
                kind = base.kind.name(),
                "entity span outside text, skipping"
            );
            continue;
        }
        let Ok(span) = String::from_utf16(&buf[start..end]) else {
            debug!(
                offset,
                length = base.length,
                kind = base.kind.name(),
                "entity span splits a surrogate pair, skipping"
            );
            continue;
        };
        let (rendered, grew) = render_nested(&span, base, siblings, linkify);
        if grew == 0 && rendered == span {
            continue;
        }
        buf.splice(start..end, rendered.encode_utf16());
        growth += grew;
    }

    Rendered {
        text: String::from_utf16_lossy(&buf),
        growth,
    }
}

/// Fail with [`Error::MessageTooLong`] when `text` exceeds Discord's limit.
///
/// Callers surface this instead of truncating.
pub fn ensure_within_limit(text: &str) -> Result<()> {
    let length = text.chars().count();
    if length > DISCORD_MAX_MESSAGE_LEN {
        return Err(Error::MessageTooLong {
            length,
            limit: DISCORD_MAX_MESSAGE_LEN,
        });
    }
    Ok(())
}

/// Escape characters Discord would interpret as markdown.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(
            ch,
            '\\' | '*' | '_' | '~' | '|' | '`' | '>' | '[' | ']' | '(' | ')' | '#'
        ) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
