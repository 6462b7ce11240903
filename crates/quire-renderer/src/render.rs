//! Rendering traits for the preview.
//!
//! Implementations are provided by the consuming application (e.g. the
//! editor session, which maps local preview tokens to `data:` URLs).

/// Resolves image URLs from markdown to actual sources.
///
/// Markdown may reference images by a local preview token while an upload is
/// in flight. This trait maps those to something the preview can display.
pub trait ImageResolver {
    /// Resolve an image URL from markdown to an actual URL.
    ///
    /// Returns `Some(resolved_url)` if the image is known,
    /// `None` to use the original URL (after sanitizing).
    fn resolve_image_url(&self, url: &str) -> Option<String>;
}

/// Unit type implementation - no image resolution.
impl ImageResolver for () {
    fn resolve_image_url(&self, _url: &str) -> Option<String> {
        None
    }
}

impl<T: ImageResolver> ImageResolver for &T {
    fn resolve_image_url(&self, url: &str) -> Option<String> {
        (*self).resolve_image_url(url)
    }
}

impl<T: ImageResolver> ImageResolver for Option<T> {
    fn resolve_image_url(&self, url: &str) -> Option<String> {
        self.as_ref().and_then(|r| r.resolve_image_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestImageResolver;

    impl ImageResolver for TestImageResolver {
        fn resolve_image_url(&self, url: &str) -> Option<String> {
            url.strip_prefix("blob:")
                .map(|rest| format!("data:image/png;base64,{rest}"))
        }
    }

    #[test]
    fn test_unit_resolver() {
        assert_eq!(().resolve_image_url("blob:x"), None);
    }

    #[test]
    fn test_reference_and_option() {
        let resolver = TestImageResolver;
        assert_eq!(
            (&resolver).resolve_image_url("blob:AAAA"),
            Some("data:image/png;base64,AAAA".to_string())
        );
        assert_eq!(Some(resolver).resolve_image_url("https://x"), None);
        assert_eq!(None::<TestImageResolver>.resolve_image_url("blob:AAAA"), None);
    }
}
