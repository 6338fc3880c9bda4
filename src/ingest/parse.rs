// src/ingest/parse.rs
//! RSS 2.0, RSS 1.0 (RDF) and Atom parsing on top of `quick_xml::de`.
//!
//! All three dialects deserialize into one `Root` shape: RSS 2.0 nests items
//! under `<channel>`, RDF puts them next to it, Atom uses `<entry>`.
//! Element names match without their namespace prefix (`content:encoded` is
//! `encoded`), and repeated elements may be interleaved with others.

use std::borrow::Cow;
use std::fmt::Write as _;

use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::ingest::types::{FeedDocument, FetchedEntry};
use crate::ingest::FetchError;

#[derive(Debug, Deserialize)]
struct Root {
    channel: Option<Channel>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "encoded")]
    content_encoded: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Parse raw feed bytes. A well-formed feed without items is an empty document.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument, FetchError> {
    let t0 = std::time::Instant::now();
    let raw = String::from_utf8_lossy(bytes);
    let xml_clean = xml_safe_entities(raw.trim_start_matches('\u{feff}'));
    let root: Root = from_str(&xml_clean)?;

    let mut items = root.item;
    if let Some(ch) = root.channel {
        items.extend(ch.item);
    }

    let mut entries: Vec<FetchedEntry> = items.into_iter().map(rss_entry).collect();
    entries.extend(root.entry.into_iter().map(atom_entry));

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("feed_parse_ms").record(ms);
    counter!("feed_entries_total").increment(entries.len() as u64);
    Ok(FeedDocument::new(entries))
}

fn rss_entry(it: Item) -> FetchedEntry {
    let summary = match it.description.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => text_or_empty(it.content_encoded),
    };
    FetchedEntry {
        title: plain_title(&text_or_empty(it.title)),
        link: text_or_empty(it.link),
        summary,
    }
}

fn atom_entry(e: AtomEntry) -> FetchedEntry {
    let link = e
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
        .or_else(|| e.links.first())
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default();

    let summary = match e.summary.map(|t| t.value.trim().to_string()) {
        Some(s) if !s.is_empty() => s,
        _ => e
            .content
            .map(|t| t.value.trim().to_string())
            .unwrap_or_default(),
    };

    FetchedEntry {
        title: e
            .title
            .map(|t| plain_title(t.value.trim()))
            .unwrap_or_default(),
        link,
        summary,
    }
}

/// Titles published as escaped HTML (`type="html"`, CDATA) still carry entities.
fn plain_title(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

fn text_or_empty(s: Option<String>) -> String {
    s.map(|v| v.trim().to_string()).unwrap_or_default()
}

const XML_ENTITIES: [&str; 5] = ["amp", "lt", "gt", "quot", "apos"];

/// XML defines five named entities; feeds use the whole HTML set.
///
/// Other named entities become numeric references, unknown names and stray
/// ampersands become literal text. CDATA sections are copied untouched.
fn xml_safe_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 32);
    let mut rest = s;
    while let Some(pos) = rest.find(['&', '<']) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        if let Some(body) = rest.strip_prefix("<![CDATA[") {
            let end = body.find("]]>").map_or(body.len(), |i| i + 3);
            out.push_str(&rest[..9 + end]);
            rest = &body[end..];
        } else if rest.starts_with('<') {
            out.push('<');
            rest = &rest[1..];
        } else if let Some(len) = entity_len(rest) {
            push_entity(&mut out, &rest[..len]);
            rest = &rest[len..];
        } else {
            out.push_str("&amp;");
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Byte length of `&name;` / `&#123;` / `&#x1F;` at the start of `s`.
fn entity_len(s: &str) -> Option<usize> {
    let body = s.strip_prefix('&')?;
    let semi = body
        .char_indices()
        .take(40)
        .find(|&(_, c)| c == ';')
        .map(|(i, _)| i)?;
    let name = body[..semi].strip_prefix('#').unwrap_or(&body[..semi]);
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(semi + 2)
}

fn push_entity(out: &mut String, token: &str) {
    let name = &token[1..token.len() - 1];
    if name.starts_with('#') || XML_ENTITIES.contains(&name) {
        out.push_str(token);
        return;
    }
    let decoded = html_escape::decode_html_entities(token);
    if decoded == token {
        out.push_str("&amp;");
        out.push_str(&token[1..]);
        return;
    }
    for c in decoded.chars() {
        let _ = write!(out, "&#{};", u32::from(c));
    }
}
