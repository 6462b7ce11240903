//! Local previews for images that are still uploading.

use std::collections::HashMap;

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use quire_renderer::ImageResolver;
use smol_str::SmolStr;

#[derive(Clone, Debug)]
struct Preview {
    mime_type: SmolStr,
    data: Bytes,
}

/// Image bytes keyed by preview token, rendered as `data:` URLs.
#[derive(Clone, Debug, Default)]
pub struct PreviewStore {
    previews: HashMap<SmolStr, Preview>,
}

impl PreviewStore {
    pub fn insert(&mut self, token: SmolStr, mime_type: SmolStr, data: Bytes) {
        self.previews.insert(token, Preview { mime_type, data });
    }

    /// Drop the bytes behind `token`. Returns whether it was held.
    pub fn release(&mut self, token: &str) -> bool {
        self.previews.remove(token).is_some()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.previews.contains_key(token)
    }

    pub fn is_empty(&self) -> bool {
        self.previews.is_empty()
    }
}

impl ImageResolver for PreviewStore {
    fn resolve_image_url(&self, url: &str) -> Option<String> {
        self.previews.get(url).map(|preview| {
            format!(
                "data:{};base64,{}",
                preview.mime_type,
                STANDARD.encode(&preview.data)
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_held_tokens_only() {
        let mut store = PreviewStore::default();
        store.insert(
            "blob:quire-preview/1-00000001".into(),
            "image/png".into(),
            Bytes::from_static(b"abc"),
        );
        assert_eq!(
            store.resolve_image_url("blob:quire-preview/1-00000001"),
            Some("data:image/png;base64,YWJj".to_string())
        );
        assert_eq!(store.resolve_image_url("https://cdn/x.png"), None);

        assert!(store.release("blob:quire-preview/1-00000001"));
        assert!(!store.release("blob:quire-preview/1-00000001"));
        assert!(store.is_empty());
    }
}
