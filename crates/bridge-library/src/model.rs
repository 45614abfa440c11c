//! Library payload model
//!
//! Hosts disagree on field naming and often omit collections entirely, so
//! parsing is tolerant: a missing `cards` or `playlists` key (or a value
//! that is not an array) becomes an empty collection, entries that are not
//! objects are skipped, and missing scalar fields default to empty strings.
//! Only a body that is not a JSON object at all is rejected.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// The payload root was not a JSON object.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("expected a JSON object with cards/playlists, got {found}")]
pub struct MalformedPayload {
    /// JSON type that was found instead
    pub found: &'static str,
}

/// A content card.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Card identifier
    pub id: String,

    /// Display title
    pub title: String,

    /// Author, empty when unknown
    pub author: String,

    /// Free-text description
    pub description: String,

    /// Arbitrary metadata object
    pub metadata: Map<String, Value>,

    /// Card kind, as reported by the host
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,

    /// Top-level keys the card carried on the wire, in wire order
    #[serde(skip)]
    pub keys: Vec<String>,
}

/// A playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    /// Playlist identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Number of items in the playlist
    pub item_count: u64,
}

/// Snapshot of a host's library.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LibraryPayload {
    /// Cards in host order
    pub cards: Vec<Card>,

    /// Playlists in host order
    pub playlists: Vec<Playlist>,
}

impl LibraryPayload {
    /// Parse a library response body.
    pub fn parse(value: &Value) -> Result<Self, MalformedPayload> {
        let root = value.as_object().ok_or(MalformedPayload {
            found: json_type(value),
        })?;

        let cards = objects(root.get("cards"))
            .map(Card::from_object)
            .collect();
        let playlists = objects(root.get("playlists"))
            .map(Playlist::from_object)
            .collect();

        Ok(Self { cards, playlists })
    }

    /// Number of cards.
    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    /// Number of playlists.
    pub fn playlist_count(&self) -> usize {
        self.playlists.len()
    }

    /// Whether the library holds nothing.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty() && self.playlists.is_empty()
    }
}

impl Card {
    /// Build a card from one JSON object.
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            id: text(obj, &["id", "cardId", "_id"]),
            title: text(obj, &["title", "name"]),
            author: text(obj, &["author"]),
            description: text(obj, &["description"]),
            metadata: obj
                .get("metadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            card_type: Some(text(obj, &["type"])).filter(|t| !t.is_empty()),
            keys: obj.keys().cloned().collect(),
        }
    }
}

impl Playlist {
    /// Build a playlist from one JSON object.
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let item_count = obj
            .get("itemCount")
            .or_else(|| obj.get("item_count"))
            .and_then(count)
            .or_else(|| obj.get("items").and_then(Value::as_array).map(|a| a.len() as u64))
            .unwrap_or(0);

        Self {
            id: text(obj, &["id", "playlistId", "_id"]),
            name: text(obj, &["name", "title"]),
            item_count,
        }
    }
}

/// Iterate the object entries of an optional array, skipping everything else.
fn objects(value: Option<&Value>) -> impl Iterator<Item = &Map<String, Value>> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// First present key rendered as text. Numbers and booleans are stringified.
fn text(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| match obj.get(*key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

fn count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
