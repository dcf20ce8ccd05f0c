//! Grouping of notes for a digest run.
//!
//! Groups are transient: built per run, rendered, discarded.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::Note;

/// A (group key, ordered note texts) pair.  The key is a conversation id or
/// a user id depending on the aggregation mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestGroup {
    pub key: String,
    pub texts: Vec<String>,
}

impl DigestGroup {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Chronological line-separated concatenation for the analyzer.
    pub fn joined_text(&self) -> String {
        self.texts.join("\n")
    }
}

fn chronological<'a>(notes: &'a [Note]) -> Vec<&'a Note> {
    let mut ordered: Vec<&Note> = notes.iter().collect();
    ordered.sort_by_key(|note| (note.created_at_epoch, note.id));
    ordered
}

/// Single-conversation grouping: one group, chronological concatenation.
pub fn group_by_conversation(notes: &[Note]) -> DigestGroup {
    let ordered = chronological(notes);
    DigestGroup {
        key: ordered
            .first()
            .map(|note| note.conversation_id.clone())
            .unwrap_or_default(),
        texts: ordered.iter().map(|note| note.text.clone()).collect(),
    }
}

/// Cross-chat grouping: one group per distinct user, chronological within
/// each group.  Empty input yields an empty map.
pub fn group_by_user(notes: &[Note]) -> BTreeMap<String, DigestGroup> {
    let mut groups: BTreeMap<String, DigestGroup> = BTreeMap::new();
    for note in chronological(notes) {
        let group = groups
            .entry(note.user_id.clone())
            .or_insert_with(|| DigestGroup {
                key: note.user_id.clone(),
                texts: Vec::new(),
            });
        group.texts.push(note.text.clone());
    }
    groups
}

/// Rendered author label: the sole author's id, or `"multiple participants"`
/// when more than one distinct user contributed (also used when no sole
/// author exists at all).
pub fn author_label(notes: &[Note]) -> String {
    let authors: BTreeSet<&str> = notes.iter().map(|note| note.user_id.as_str()).collect();
    match authors.len() {
        1 => authors
            .into_iter()
            .next()
            .map(ToString::to_string)
            .unwrap_or_default(),
        _ => "multiple participants".to_string(),
    }
}
