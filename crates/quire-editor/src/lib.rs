//! The live side of the quire markdown editor.
//!
//! [`SessionHandle`] is the entry point. It owns the document being authored
//! and drives the autosave scheduler and the image upload pipeline; the
//! persistence, signing and publishing services it needs are passed in as
//! [`Collaborators`].

pub mod autosave;
pub mod preview;
pub mod publish;
pub mod session;
pub mod signing;
pub mod storage;
pub mod upload;

pub use autosave::{AutosaveScheduler, AutosaveState, AutosaveStatus, FlushReason};
pub use preview::PreviewStore;
pub use publish::{PostId, PublishMetadata, Publisher, Visibility, check_publishable};
pub use session::{Collaborators, DocumentView, SessionHandle};
pub use signing::{HttpUploadSigner, HttpUploadTransport};
pub use storage::{DraftStore, JsonFileDraftStore, MemoryDraftStore};
pub use upload::{
    ImageFile, PREVIEW_TOKEN_PREFIX, UploadCredentials, UploadEvent, UploadId, UploadPipeline,
    UploadProgress, UploadSigner, UploadStatus, UploadTask, UploadTransport,
};

pub use quire_editor_core::{Document, DraftRecord, FormatKind, Selection, Transformed};
