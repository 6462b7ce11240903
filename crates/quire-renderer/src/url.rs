//! Scheme filtering for author-supplied link and image URLs.

/// Image `data:` types that may be embedded.
const DATA_IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Return the URL if it is safe to put in an `href` or `src`, `None` otherwise.
///
/// Relative URLs pass through. `javascript:`, `vbscript:` and `file:` are
/// dropped, as is any `data:` URL that is not a raster image.
pub fn sanitize_url(url: &str) -> Option<&str> {
    let url = url.trim();
    let Some(scheme) = scheme(url) else {
        return Some(url);
    };
    match scheme.as_str() {
        "javascript" | "vbscript" | "file" => None,
        "data" => is_image_data(url).then_some(url),
        _ => Some(url),
    }
}

/// Lower-cased scheme, ignoring whitespace and control characters browsers skip.
fn scheme(url: &str) -> Option<String> {
    let colon = url.find(':')?;
    let head = &url[..colon];
    if head.contains(['/', '?', '#']) {
        return None;
    }
    let scheme: String = head
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    (!scheme.is_empty()).then_some(scheme)
}

fn is_image_data(url: &str) -> bool {
    let Some(colon) = url.find(':') else {
        return false;
    };
    let rest = &url[colon + 1..];
    let media_type = rest.split([';', ',']).next().unwrap_or_default().trim();
    DATA_IMAGE_TYPES
        .iter()
        .any(|t| media_type.eq_ignore_ascii_case(t))
}
