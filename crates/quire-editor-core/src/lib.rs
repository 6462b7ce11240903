//! Pure text logic for the quire markdown editor.
//!
//! Nothing here touches the network, timers or a rendering surface. The
//! session in `quire-editor` owns the live document and calls into these
//! functions to compute each new `(text, selection)` pair.

pub mod document;
pub mod formatting;
pub mod splice;
pub mod text_helpers;
pub mod types;

pub use document::{Document, DraftRecord};
pub use formatting::{FormatKind, Transformed, apply_format, apply_format_key};
pub use splice::{Spliced, image_reference, insert_image_reference, remove_placeholder, replace_token};
pub use types::Selection;
