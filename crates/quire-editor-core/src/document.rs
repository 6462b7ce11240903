//! The document being authored and its persisted draft form.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Title, markdown content and the confirmed image URLs of a post in progress.
///
/// `images` only ever holds permanent URLs. Preview tokens live in `content`
/// while an upload is in flight and never make it into this list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Document {
    pub title: SmolStr,
    pub content: String,
    pub images: Vec<String>,
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(title: impl Into<SmolStr>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Record a confirmed image URL, ignoring duplicates.
    pub fn add_image(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !self.images.contains(&url) {
            self.images.push(url);
        }
    }

    /// Snapshot for persistence, stamped with `saved_at`.
    pub fn to_draft(&self, saved_at: DateTime<Utc>) -> DraftRecord {
        DraftRecord {
            title: self.title.clone(),
            content: self.content.clone(),
            images: self.images.clone(),
            last_saved: saved_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Restore from a stored draft. An unparseable timestamp is dropped.
    pub fn from_draft(draft: DraftRecord) -> Self {
        let last_saved_at = DateTime::parse_from_rfc3339(&draft.last_saved)
            .map(|t| t.with_timezone(&Utc))
            .ok();
        Self {
            title: draft.title,
            content: draft.content,
            images: draft.images,
            last_saved_at,
        }
    }
}

/// Persisted draft record.
///
/// Serialized as `{title, content, images, lastSaved}` with `lastSaved` an
/// ISO-8601 string.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DraftRecord {
    pub title: SmolStr,
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub last_saved: String,
}
