//! Samples waiting for a measurement, as listed by the API.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::form::IDENTIFIER_MAX_CHARS;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum PendingEntry {
    /// Any object carrying `kartu_ari`. The id is kept as the text the server
    /// sent, whether it was a JSON number or a string.
    Record { id: Option<String>, kartu_ari: String },
    /// Older endpoints list only the card identifier.
    Bare(Value),
}

impl From<Value> for PendingEntry {
    fn from(value: Value) -> Self {
        let Value::Object(map) = &value else {
            return PendingEntry::Bare(value);
        };
        let Some(kartu_ari) = map.get("kartu_ari").and_then(scalar_text) else {
            return PendingEntry::Bare(value);
        };
        PendingEntry::Record {
            id: map.get("id").and_then(scalar_text),
            kartu_ari,
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl PendingEntry {
    pub fn kartu_ari(&self) -> String {
        match self {
            PendingEntry::Record { kartu_ari, .. } => kartu_ari.clone(),
            PendingEntry::Bare(Value::String(s)) => s.clone(),
            PendingEntry::Bare(other) => other.to_string(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            PendingEntry::Record { id, .. } => id.as_deref(),
            PendingEntry::Bare(_) => None,
        }
    }

    /// Whether the form identifier still names this entry. The form keeps
    /// only the first few characters of a long card number.
    fn matches(&self, kartu_ari: &str) -> bool {
        let own = self.kartu_ari();
        let own: String = own.trim().chars().take(IDENTIFIER_MAX_CHARS).collect();
        !own.is_empty() && own == kartu_ari.trim()
    }
}

impl fmt::Display for PendingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "Kartu ARI: {} (ID: {id})", self.kartu_ari()),
            None => write!(f, "Kartu ARI: {}", self.kartu_ari()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PendingQueue {
    entries: Vec<PendingEntry>,
    index: usize,
}

impl PendingQueue {
    pub fn replace(&mut self, entries: Vec<PendingEntry>) {
        self.entries = entries;
        self.index = 0;
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current(&self) -> Option<&PendingEntry> {
        self.entries.get(self.index)
    }

    /// Moves forward; false at the last entry.
    pub fn next(&mut self) -> bool {
        if self.index + 1 < self.entries.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Moves back; false at the first entry.
    pub fn prev(&mut self) -> bool {
        if self.index > 0 && !self.entries.is_empty() {
            self.index -= 1;
            true
        } else {
            false
        }
    }

    /// One-based position, e.g. `(2, 5)`.
    pub fn position(&self) -> Option<(usize, usize)> {
        self.current().map(|_| (self.index + 1, self.entries.len()))
    }

    /// The id sent with a submission so the server can match the list entry.
    /// Only given while the form still shows the current entry's card.
    pub fn correlation_id(&self, kartu_ari: &str) -> Option<String> {
        self.current()
            .filter(|entry| entry.matches(kartu_ari))
            .and_then(PendingEntry::id)
            .map(str::to_string)
    }
}
