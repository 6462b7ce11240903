//! Image upload pipeline.
//!
//! Each picked file becomes an [`UploadTask`] with its own preview token. The
//! token goes into the document straight away as `![name](token)` so the
//! preview shows the image before the network round-trip. A background job
//! then asks the signer for credentials and hands the bytes to the transport.
//!
//! Jobs never touch the document. They report back over a channel and the
//! session calls [`UploadPipeline::settle`] with the document as it is *at
//! that moment*, so text typed during the upload is kept.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mime_sniffer::MimeTypeSniffer;
use n0_future::task::JoinHandle;
use quire_common::{NetworkError, UploadConfig, ValidationError};
use quire_editor_core::{Document, Selection, remove_placeholder, replace_token};
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use tokio::sync::mpsc;

use crate::preview::PreviewStore;

/// Prefix of every preview token.
pub const PREVIEW_TOKEN_PREFIX: &str = "blob:quire-preview/";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UploadId(pub u64);

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A picked or dropped file.
#[derive(Clone, Debug)]
pub struct ImageFile {
    pub name: SmolStr,
    /// Type declared by the picker, used only when sniffing is inconclusive.
    pub content_type: Option<SmolStr>,
    pub data: Bytes,
}

impl ImageFile {
    pub fn new(name: impl Into<SmolStr>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<SmolStr>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// File name without its extension, for alt text.
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.name,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Succeeded,
    Failed,
}

impl UploadStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Snapshot of one upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadTask {
    pub id: UploadId,
    pub name: SmolStr,
    pub content_type: SmolStr,
    pub size: usize,
    pub status: UploadStatus,
    /// 0 to 100.
    pub progress: u8,
    pub placeholder: SmolStr,
    pub final_url: Option<String>,
    pub error_message: Option<String>,
}

/// What the signing collaborator hands back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCredentials {
    pub upload_url: String,
    #[serde(default)]
    pub upload_fields: BTreeMap<String, String>,
    /// Field of the transfer response body holding the permanent URL.
    pub final_url_field: String,
}

#[async_trait]
pub trait UploadSigner: Send + Sync {
    /// `kind` is the validated MIME type of the file.
    async fn request_upload_credentials(&self, kind: &str)
    -> Result<UploadCredentials, NetworkError>;
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Send the bytes and return the permanent URL.
    async fn transfer(
        &self,
        credentials: &UploadCredentials,
        file: &ImageFile,
        progress: &UploadProgress,
    ) -> Result<String, NetworkError>;
}

/// Messages from upload jobs back to the owner of the pipeline.
#[derive(Debug)]
pub enum UploadEvent {
    Progress {
        id: UploadId,
        percent: u8,
    },
    Finished {
        id: UploadId,
        result: Result<String, NetworkError>,
    },
}

/// Progress reporting handle given to transports.
#[derive(Clone, Debug)]
pub struct UploadProgress {
    id: UploadId,
    events: mpsc::UnboundedSender<UploadEvent>,
}

impl UploadProgress {
    pub fn report(&self, percent: u8) {
        let _ = self.events.send(UploadEvent::Progress {
            id: self.id,
            percent: percent.min(100),
        });
    }
}

/// A freshly started upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingUpload {
    pub id: UploadId,
    pub placeholder: SmolStr,
    pub alt: SmolStr,
}

pub struct UploadPipeline {
    config: UploadConfig,
    signer: Arc<dyn UploadSigner>,
    transport: Arc<dyn UploadTransport>,
    events: mpsc::UnboundedSender<UploadEvent>,
    tasks: BTreeMap<UploadId, UploadTask>,
    jobs: HashMap<UploadId, JoinHandle<()>>,
    previews: PreviewStore,
    next_id: u64,
}

impl UploadPipeline {
    pub fn new(
        config: UploadConfig,
        signer: Arc<dyn UploadSigner>,
        transport: Arc<dyn UploadTransport>,
        events: mpsc::UnboundedSender<UploadEvent>,
    ) -> Self {
        Self {
            config,
            signer,
            transport,
            events,
            tasks: BTreeMap::new(),
            jobs: HashMap::new(),
            previews: PreviewStore::default(),
            next_id: 0,
        }
    }

    /// Check a file against the allow-list and size limit. Returns the
    /// content type the upload will use.
    pub fn validate(&self, file: &ImageFile) -> Result<SmolStr, ValidationError> {
        if file.data.is_empty() {
            return Err(ValidationError::EmptyFile {
                name: file.name.clone(),
            });
        }
        let detected: SmolStr = match file.data.sniff_mime_type() {
            Some(sniffed) => sniffed.into(),
            None => file
                .content_type
                .clone()
                .unwrap_or_else(|| SmolStr::new_static("application/octet-stream")),
        };
        if !self.config.is_allowed(&detected) {
            return Err(ValidationError::UnsupportedType {
                name: file.name.clone(),
                detected,
            });
        }
        if file.data.len() > self.config.max_bytes {
            return Err(ValidationError::TooLarge {
                name: file.name.clone(),
                size: file.data.len(),
                limit: self.config.max_bytes,
            });
        }
        Ok(detected)
    }

    /// Validate `file`, register a task with a token unique within `content`
    /// and start the background job.
    pub fn begin(&mut self, file: ImageFile, content: &str) -> Result<PendingUpload, ValidationError> {
        let content_type = self.validate(&file)?;
        self.next_id += 1;
        let id = UploadId(self.next_id);
        let placeholder = self.fresh_token(id, content);
        let alt = SmolStr::new(file.stem());

        self.previews
            .insert(placeholder.clone(), content_type.clone(), file.data.clone());
        self.tasks.insert(
            id,
            UploadTask {
                id,
                name: file.name.clone(),
                content_type: content_type.clone(),
                size: file.data.len(),
                status: UploadStatus::Pending,
                progress: 0,
                placeholder: placeholder.clone(),
                final_url: None,
                error_message: None,
            },
        );

        let job = UploadJob {
            id,
            file: ImageFile {
                content_type: Some(content_type),
                ..file
            },
            signer: self.signer.clone(),
            transport: self.transport.clone(),
            signing_timeout: self.config.signing_timeout(),
            transfer_timeout: self.config.transfer_timeout(),
            events: self.events.clone(),
        };
        tracing::debug!(upload_id = %id, name = %job.file.name, "upload started");
        self.jobs.insert(id, n0_future::task::spawn(job.run()));

        Ok(PendingUpload {
            id,
            placeholder,
            alt,
        })
    }

    fn fresh_token(&self, id: UploadId, content: &str) -> SmolStr {
        loop {
            let token = format_smolstr!(
                "{PREVIEW_TOKEN_PREFIX}{}-{:08x}",
                id.0,
                rand::random::<u32>()
            );
            if !content.contains(token.as_str()) && !self.previews.contains(&token) {
                return token;
            }
        }
    }

    pub fn on_progress(&mut self, id: UploadId, percent: u8) {
        if let Some(task) = self.tasks.get_mut(&id) {
            if !task.status.is_settled() {
                task.status = UploadStatus::Uploading;
                task.progress = task.progress.max(percent.min(100));
            }
        }
    }

    /// Apply a finished job to the current document.
    ///
    /// On success every occurrence of the token becomes the permanent URL; on
    /// failure every `![..](token)` reference is removed. Other uploads are
    /// untouched. Returns the shifted selection, or `None` if the task was
    /// unknown or already settled (e.g. cancelled).
    pub fn settle(
        &mut self,
        id: UploadId,
        result: Result<String, NetworkError>,
        document: &mut Document,
        selection: Selection,
    ) -> Option<Selection> {
        let task = self.tasks.get_mut(&id)?;
        if task.status.is_settled() {
            return None;
        }
        self.jobs.remove(&id);
        self.previews.release(&task.placeholder);

        let spliced = match result {
            Ok(url) => {
                let spliced = replace_token(&document.content, selection, &task.placeholder, &url);
                if spliced.count > 0 {
                    document.add_image(url.clone());
                }
                tracing::info!(
                    upload_id = %id,
                    name = %task.name,
                    replaced = spliced.count,
                    "image uploaded"
                );
                task.status = UploadStatus::Succeeded;
                task.progress = 100;
                task.final_url = Some(url);
                spliced
            }
            Err(e) => {
                tracing::warn!(upload_id = %id, name = %task.name, error = %e, "image upload failed");
                task.status = UploadStatus::Failed;
                task.error_message = Some(e.to_string());
                remove_placeholder(&document.content, selection, &task.placeholder)
            }
        };
        document.content = spliced.text;
        Some(spliced.selection)
    }

    /// Abort every unsettled upload. Returns their tokens so the caller can
    /// strip them from the document.
    pub fn cancel_all(&mut self) -> Vec<SmolStr> {
        for (_, job) in self.jobs.drain() {
            job.abort();
        }
        let mut cancelled = Vec::new();
        for task in self.tasks.values_mut() {
            if task.status.is_settled() {
                continue;
            }
            task.status = UploadStatus::Failed;
            task.error_message = Some(NetworkError::Cancelled.to_string());
            self.previews.release(&task.placeholder);
            cancelled.push(task.placeholder.clone());
        }
        if !cancelled.is_empty() {
            tracing::debug!(count = cancelled.len(), "cancelled in-flight uploads");
        }
        cancelled
    }

    pub fn pending_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| !t.status.is_settled())
            .count()
    }

    pub fn tasks(&self) -> Vec<UploadTask> {
        self.tasks.values().cloned().collect()
    }

    pub fn task(&self, id: UploadId) -> Option<&UploadTask> {
        self.tasks.get(&id)
    }

    pub fn previews(&self) -> &PreviewStore {
        &self.previews
    }
}

impl Drop for UploadPipeline {
    fn drop(&mut self) {
        for job in self.jobs.values() {
            job.abort();
        }
    }
}

struct UploadJob {
    id: UploadId,
    file: ImageFile,
    signer: Arc<dyn UploadSigner>,
    transport: Arc<dyn UploadTransport>,
    signing_timeout: Duration,
    transfer_timeout: Duration,
    events: mpsc::UnboundedSender<UploadEvent>,
}

impl UploadJob {
    async fn run(self) {
        let progress = UploadProgress {
            id: self.id,
            events: self.events.clone(),
        };
        progress.report(0);
        let result = self.upload(&progress).await;
        let _ = self.events.send(UploadEvent::Finished {
            id: self.id,
            result,
        });
    }

    /// Sign, then transfer. No retries: a failure is reported as-is.
    async fn upload(&self, progress: &UploadProgress) -> Result<String, NetworkError> {
        let kind = self
            .file
            .content_type
            .clone()
            .unwrap_or_else(|| SmolStr::new_static("application/octet-stream"));

        let credentials = tokio::time::timeout(
            self.signing_timeout,
            self.signer.request_upload_credentials(&kind),
        )
        .await
        .map_err(|_| NetworkError::Timeout {
            stage: "signing",
            secs: self.signing_timeout.as_secs(),
        })??;
        progress.report(10);

        let url = tokio::time::timeout(
            self.transfer_timeout,
            self.transport.transfer(&credentials, &self.file, progress),
        )
        .await
        .map_err(|_| NetworkError::Timeout {
            stage: "transfer",
            secs: self.transfer_timeout.as_secs(),
        })??;
        progress.report(100);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const PDF: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n";

    struct NeverSigner;

    #[async_trait]
    impl UploadSigner for NeverSigner {
        async fn request_upload_credentials(
            &self,
            _kind: &str,
        ) -> Result<UploadCredentials, NetworkError> {
            std::future::pending().await
        }
    }

    struct NeverTransport;

    #[async_trait]
    impl UploadTransport for NeverTransport {
        async fn transfer(
            &self,
            _credentials: &UploadCredentials,
            _file: &ImageFile,
            _progress: &UploadProgress,
        ) -> Result<String, NetworkError> {
            std::future::pending().await
        }
    }

    fn pipeline(config: UploadConfig) -> (UploadPipeline, mpsc::UnboundedReceiver<UploadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            UploadPipeline::new(config, Arc::new(NeverSigner), Arc::new(NeverTransport), tx),
            rx,
        )
    }

    #[tokio::test]
    async fn rejects_non_images_by_content() {
        let (p, _rx) = pipeline(UploadConfig::default());
        let file = ImageFile::new("cat.png", PDF).with_content_type("image/png");
        match p.validate(&file).unwrap_err() {
            ValidationError::UnsupportedType { name, detected } => {
                assert_eq!(name, "cat.png");
                assert!(!detected.starts_with("image/"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_oversized_and_empty() {
        let (p, _rx) = pipeline(UploadConfig {
            max_bytes: 8,
            ..UploadConfig::default()
        });
        let err = p.validate(&ImageFile::new("big.png", PNG)).unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge { limit: 8, .. }));

        let err = p.validate(&ImageFile::new("none.png", Bytes::new())).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyFile { .. }));
    }

    #[tokio::test]
    async fn begin_registers_unique_tokens() {
        let (mut p, _rx) = pipeline(UploadConfig::default());
        let a = p.begin(ImageFile::new("a.png", PNG), "").unwrap();
        let b = p.begin(ImageFile::new("b.png", PNG), "").unwrap();

        assert_ne!(a.placeholder, b.placeholder);
        assert!(a.placeholder.starts_with(PREVIEW_TOKEN_PREFIX));
        assert_eq!(a.alt, "a");
        assert_eq!(p.pending_count(), 2);
        assert!(p.previews().contains(&a.placeholder));
        assert_eq!(p.task(a.id).map(|t| t.content_type.as_str()), Some("image/png"));
    }

    #[tokio::test]
    async fn settle_success_replaces_token() {
        let (mut p, _rx) = pipeline(UploadConfig::default());
        let up = p.begin(ImageFile::new("a.png", PNG), "").unwrap();
        let mut doc = Document::new("t", format!("x\n![a]({})\ny", up.placeholder));

        let sel = p
            .settle(up.id, Ok("https://cdn/a.png".into()), &mut doc, Selection::collapsed(0))
            .unwrap();
        assert_eq!(doc.content, "x\n![a](https://cdn/a.png)\ny");
        assert_eq!(doc.images, vec!["https://cdn/a.png".to_string()]);
        assert_eq!(sel, Selection::collapsed(0));
        assert!(!p.previews().contains(&up.placeholder));
        assert_eq!(p.task(up.id).map(|t| t.status), Some(UploadStatus::Succeeded));

        // A second completion for the same task is ignored.
        assert!(p.settle(up.id, Ok("https://cdn/other.png".into()), &mut doc, sel).is_none());
    }

    #[tokio::test]
    async fn settle_failure_removes_reference() {
        let (mut p, _rx) = pipeline(UploadConfig::default());
        let up = p.begin(ImageFile::new("a.png", PNG), "").unwrap();
        let mut doc = Document::new("t", format!("x\n![a]({})\ny", up.placeholder));

        p.settle(
            up.id,
            Err(NetworkError::Transfer {
                message: "503".into(),
            }),
            &mut doc,
            Selection::collapsed(0),
        );
        assert_eq!(doc.content, "x\ny");
        assert!(doc.images.is_empty());
        let task = p.task(up.id).unwrap();
        assert_eq!(task.status, UploadStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("upload failed: 503"));
    }

    #[tokio::test]
    async fn cancel_all_settles_everything() {
        let (mut p, _rx) = pipeline(UploadConfig::default());
        let a = p.begin(ImageFile::new("a.png", PNG), "").unwrap();
        let tokens = p.cancel_all();
        assert_eq!(tokens, vec![a.placeholder.clone()]);
        assert_eq!(p.pending_count(), 0);
        assert!(p.previews().is_empty());
        assert_eq!(
            p.task(a.id).and_then(|t| t.error_message.clone()).as_deref(),
            Some("upload failed: cancelled")
        );
    }

    #[test]
    fn stem_strips_extension() {
        assert_eq!(ImageFile::new("photo.final.jpg", Bytes::new()).stem(), "photo.final");
        assert_eq!(ImageFile::new(".hidden", Bytes::new()).stem(), ".hidden");
        assert_eq!(ImageFile::new("noext", Bytes::new()).stem(), "noext");
    }
}
