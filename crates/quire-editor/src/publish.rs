//! Publishing a finished document.

use async_trait::async_trait;
use quire_common::{PublishError, ValidationError};
use quire_editor_core::Document;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
}

/// Post metadata the editor carries through without interpreting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishMetadata {
    #[serde(default)]
    pub tags: Vec<SmolStr>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<SmolStr>,
}

/// Identifier of a created post, as returned by the publisher.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub SmolStr);

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        document: &Document,
        metadata: &PublishMetadata,
    ) -> Result<PostId, PublishError>;
}

/// Local checks before the publisher is called.
pub fn check_publishable(document: &Document, pending_uploads: usize) -> Result<(), ValidationError> {
    if document.title.trim().is_empty() {
        return Err(ValidationError::MissingTitle);
    }
    if document.content.trim().is_empty() {
        return Err(ValidationError::MissingContent);
    }
    if pending_uploads > 0 {
        return Err(ValidationError::UploadsPending {
            count: pending_uploads,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishable_needs_title_content_and_settled_uploads() {
        assert_eq!(
            check_publishable(&Document::new("  ", "body"), 0),
            Err(ValidationError::MissingTitle)
        );
        assert_eq!(
            check_publishable(&Document::new("T", "\n \n"), 0),
            Err(ValidationError::MissingContent)
        );
        assert_eq!(
            check_publishable(&Document::new("T", "body"), 2),
            Err(ValidationError::UploadsPending { count: 2 })
        );
        assert_eq!(check_publishable(&Document::new("T", "body"), 0), Ok(()));
    }

    #[test]
    fn metadata_defaults_from_empty_json() {
        let meta: PublishMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(meta, PublishMetadata::default());
        assert_eq!(meta.visibility, Visibility::Public);
    }
}
