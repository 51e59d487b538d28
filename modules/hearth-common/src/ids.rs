//! Deterministic document keys.
//!
//! Every cross-document reference is a string id, never a raw human name.
//! Ids must be stable across process restarts and collision-resistant, so
//! hashed components use SHA-256 rather than the std hasher.

use sha2::{Digest, Sha256};

use crate::slug::slugify;

/// Maximum series id length. Longer ids get the tail replaced with a hash.
const SERIES_ID_MAX: usize = 200;

/// First 12 hex chars of SHA-256.
pub fn hash12(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

/// Canonical event id: `{sourceId}:{sourceEventId}`.
pub fn event_id(source_id: &str, source_event_id: &str) -> String {
    format!("{source_id}:{source_event_id}")
}

/// Host id derived from a host seed and the source it came from.
/// Two events from the same organizer on the same source yield the same id.
pub fn host_id(seed: &str, source_id: &str) -> String {
    let normalized = slugify(seed);
    let basis = if normalized.is_empty() {
        format!("{source_id}:{seed}")
    } else {
        format!("{source_id}:{normalized}")
    };
    format!("host:{}", hash12(&basis))
}

/// Series id: `{hostId}__{slug(title)}`, capped at 200 chars with a hashed
/// tail so distinct long titles cannot collide after truncation.
pub fn series_id(host_id: &str, title: &str) -> String {
    let title_slug = {
        let s = slugify(title);
        if s.is_empty() {
            "untitled".to_string()
        } else {
            s
        }
    };
    let full = format!("{host_id}__{title_slug}");
    if full.len() <= SERIES_ID_MAX {
        return full;
    }

    let tail = hash12(&full);
    let keep = SERIES_ID_MAX - tail.len() - 1;
    let mut head = full;
    head.truncate(keep);
    format!("{head}-{tail}")
}

/// Category id: `category:{hash12(hostId:name-lowercased)}`.
pub fn category_id(host_id: &str, name: &str) -> String {
    format!("category:{}", hash12(&format!("{host_id}:{}", name.to_lowercase())))
}
