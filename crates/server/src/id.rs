// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque identifiers for pages, rooms, and widgets.
//!
//! A `PageId` is the page URL joined with a room UUID; a `WidgetId` appends
//! the widget's index. The string forms are what travels over the wire; the
//! hex forms derive collision-free container and volume names.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Typed parse failures for the ID grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    MalformedPageUrl(String),
    MalformedRoomId(String),
    MalformedWidgetId(String),
    MalformedWidgetIndex(String),
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedPageUrl(detail) => write!(f, "malformed page URL: {detail}"),
            Self::MalformedRoomId(detail) => write!(f, "malformed room ID: {detail}"),
            Self::MalformedWidgetId(detail) => write!(f, "malformed widget ID: {detail}"),
            Self::MalformedWidgetIndex(detail) => write!(f, "malformed widget index: {detail}"),
        }
    }
}

impl std::error::Error for IdError {}

const UUID_V4: &str = "[0-9A-F]{8}-[0-9A-F]{4}-4[0-9A-F]{3}-[89AB][0-9A-F]{3}-[0-9A-F]{12}";

// the anchored patterns are compile-time constants and always valid
#[allow(clippy::unwrap_used)]
fn room_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(&format!("(?i)^{UUID_V4}$")).unwrap())
}

#[allow(clippy::unwrap_used)]
fn page_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(&format!("(?i)^((?:/.+)*)/({UUID_V4})$")).unwrap())
}

#[allow(clippy::unwrap_used)]
fn widget_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!("(?i)^((?:/.+)*)/({UUID_V4})/([0-9]+)$")).unwrap()
    })
}

/// Absolute path-like page URL. Canonical form has no trailing slash
/// (except the root, which is exactly `/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PageUrl(String);

impl PageUrl {
    /// Validate and canonicalize a page URL.
    ///
    /// Rejects empty input, URLs not starting with `/`, and doubled slashes.
    /// A single trailing slash is trimmed.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        if raw.is_empty() {
            return Err(IdError::MalformedPageUrl("page URL is empty".into()));
        }
        if !raw.starts_with('/') {
            return Err(IdError::MalformedPageUrl(format!(
                "\"{raw}\" does not start with \"/\""
            )));
        }
        let parts: Vec<&str> = raw.split('/').collect();
        for (i, part) in parts.iter().enumerate() {
            if i != 0 && i < parts.len() - 1 && part.is_empty() {
                return Err(IdError::MalformedPageUrl(format!(
                    "\"{raw}\" contains multiple slashes after each other"
                )));
            }
        }
        let trimmed = raw.strip_suffix('/').unwrap_or(raw);
        if trimmed.is_empty() {
            return Ok(Self("/".to_owned()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Lowercase hex of the UTF-8 bytes, safe as an image name suffix.
    pub fn encode(&self) -> String {
        encode_hex(&self.0)
    }
}

impl fmt::Display for PageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PageUrl {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Room identifier: a UUIDv4 in canonical 8-4-4-4-12 form, either case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        if !room_id_pattern().is_match(raw) {
            return Err(IdError::MalformedRoomId(format!("\"{raw}\" is not a UUIDv4")));
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Zero-based position of a widget on its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WidgetIndex(pub usize);

impl WidgetIndex {
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        // usize::from_str tolerates a leading `+`; the grammar does not
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdError::MalformedWidgetIndex(format!(
                "\"{raw}\" is not a non-negative decimal"
            )));
        }
        let index: usize = raw.parse().map_err(|_| {
            IdError::MalformedWidgetIndex(format!("\"{raw}\" is out of range"))
        })?;
        Ok(Self(index))
    }
}

impl fmt::Display for WidgetIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live instance of a page: `pageURL + "/" + roomID`, with the slash
/// collapsed when the URL is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId {
    url: PageUrl,
    room: RoomId,
}

impl PageId {
    pub fn from_parts(url: PageUrl, room: RoomId) -> Self {
        Self { url, room }
    }

    /// Parse an opaque page ID string back into its parts.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        if raw.is_empty() {
            return Err(IdError::MalformedPageUrl("page ID is empty".into()));
        }
        let captures = page_id_pattern()
            .captures(raw)
            .ok_or_else(|| IdError::MalformedPageUrl(format!("\"{raw}\" is not a page ID")))?;
        let url = match captures.get(1).map(|m| m.as_str()) {
            None | Some("") => PageUrl::parse("/")?,
            Some(prefix) => PageUrl::parse(prefix)?,
        };
        let room = match captures.get(2) {
            Some(m) => RoomId::parse(m.as_str())?,
            None => return Err(IdError::MalformedRoomId(format!("\"{raw}\" has no room ID"))),
        };
        Ok(Self { url, room })
    }

    pub fn url(&self) -> &PageUrl {
        &self.url
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Widget ID for the widget at `index` on this page instance.
    pub fn widget(&self, index: WidgetIndex) -> WidgetId {
        WidgetId { page: self.clone(), index }
    }

    /// Lowercase hex of the UTF-8 bytes, safe as a volume name suffix.
    pub fn encode(&self) -> String {
        encode_hex(&self.to_string())
    }

    /// Reverse of [`PageId::encode`].
    pub fn decode(encoded: &str) -> Result<Self, IdError> {
        let raw = decode_hex(encoded)
            .ok_or_else(|| IdError::MalformedPageUrl(format!("\"{encoded}\" is not hex")))?;
        Self::parse(&raw)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.url.is_root() {
            write!(f, "/{}", self.room)
        } else {
            write!(f, "{}/{}", self.url, self.room)
        }
    }
}

/// One widget of a page instance: `pageID + "/" + widgetIndex`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WidgetId {
    page: PageId,
    index: WidgetIndex,
}

impl WidgetId {
    pub fn from_parts(url: PageUrl, room: RoomId, index: WidgetIndex) -> Self {
        Self { page: PageId::from_parts(url, room), index }
    }

    /// Parse an opaque widget ID string back into its parts.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        if raw.is_empty() {
            return Err(IdError::MalformedWidgetId("widget ID is empty".into()));
        }
        let captures = widget_id_pattern()
            .captures(raw)
            .ok_or_else(|| IdError::MalformedWidgetId(format!("\"{raw}\" is not a widget ID")))?;
        let url = match captures.get(1).map(|m| m.as_str()) {
            None | Some("") => PageUrl::parse("/")?,
            Some(prefix) => PageUrl::parse(prefix)?,
        };
        let room = match captures.get(2) {
            Some(m) => RoomId::parse(m.as_str())?,
            None => return Err(IdError::MalformedWidgetId(format!("\"{raw}\" has no room ID"))),
        };
        let index = match captures.get(3) {
            Some(m) => WidgetIndex::parse(m.as_str())?,
            None => {
                return Err(IdError::MalformedWidgetId(format!("\"{raw}\" has no widget index")))
            }
        };
        Ok(Self { page: PageId::from_parts(url, room), index })
    }

    pub fn page(&self) -> &PageId {
        &self.page
    }

    pub fn index(&self) -> WidgetIndex {
        self.index
    }

    /// Lowercase hex of the UTF-8 bytes, safe as a container name suffix.
    pub fn encode(&self) -> String {
        encode_hex(&self.to_string())
    }

    /// Reverse of [`WidgetId::encode`].
    pub fn decode(encoded: &str) -> Result<Self, IdError> {
        let raw = decode_hex(encoded)
            .ok_or_else(|| IdError::MalformedWidgetId(format!("\"{encoded}\" is not hex")))?;
        Self::parse(&raw)
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.page, self.index)
    }
}

fn encode_hex(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for byte in s.bytes() {
        out.push(char::from_digit((byte >> 4) as u32, 16).unwrap_or('0'));
        out.push(char::from_digit((byte & 0xf) as u32, 16).unwrap_or('0'));
    }
    out
}

fn decode_hex(s: &str) -> Option<String> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(s.len() / 2);
    let raw = s.as_bytes();
    for pair in raw.chunks(2) {
        let high = (pair[0] as char).to_digit(16)?;
        let low = (pair[1] as char).to_digit(16)?;
        bytes.push(((high << 4) | low) as u8);
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
