//! The document session.
//!
//! One spawned task owns the [`Document`], the caret, the autosave scheduler
//! and the upload pipeline. Everything else talks to it through a
//! [`SessionHandle`], so keystrokes, toolbar actions and upload completions
//! are applied one at a time in the order they were issued.
//!
//! Network-bound work (draft flushes, uploads, publishing) runs in its own
//! task and reports back over a channel; the owning task never awaits a
//! collaborator except while disposing.

use std::mem;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use quire_common::{Config, ConfigError, PersistenceError, PublishError, SessionError, ValidationError};
use quire_editor_core::text_helpers::char_len;
use quire_editor_core::{
    Document, Selection, Transformed, apply_format_key, insert_image_reference, remove_placeholder,
};
use serde::Serialize;
use smol_str::SmolStr;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::autosave::{AutosaveScheduler, AutosaveState, AutosaveStatus, FlushReason};
use crate::publish::{PostId, PublishMetadata, Publisher, check_publishable};
use crate::signing::{HttpUploadSigner, HttpUploadTransport};
use crate::storage::{DraftStore, JsonFileDraftStore, MemoryDraftStore};
use crate::upload::{
    ImageFile, UploadEvent, UploadId, UploadPipeline, UploadSigner, UploadTask, UploadTransport,
};

/// External services the session depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub drafts: Arc<dyn DraftStore>,
    pub signer: Arc<dyn UploadSigner>,
    pub transport: Arc<dyn UploadTransport>,
    pub publisher: Arc<dyn Publisher>,
}

impl Collaborators {
    /// The HTTP upload pair against `uploads.signing_endpoint`, plus drafts
    /// kept as files under `drafts.dir` or in memory when no dir is set.
    pub fn from_config(
        config: &Config,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, ConfigError> {
        let endpoint = config
            .uploads
            .signing_endpoint
            .as_deref()
            .ok_or(ConfigError::Missing {
                key: "uploads.signing_endpoint",
            })?;
        let drafts: Arc<dyn DraftStore> = match &config.drafts.dir {
            Some(dir) => Arc::new(JsonFileDraftStore::new(dir)),
            None => Arc::new(MemoryDraftStore::new()),
        };
        Ok(Self {
            drafts,
            signer: Arc::new(HttpUploadSigner::new(endpoint)),
            transport: Arc::new(HttpUploadTransport::new()),
            publisher,
        })
    }
}

/// What an edit surface needs to redraw.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DocumentView {
    pub title: SmolStr,
    pub content: String,
    pub selection: Selection,
    pub images: Vec<String>,
    pub last_saved_at: Option<DateTime<Utc>>,
}

type SaveReply = oneshot::Sender<Result<DateTime<Utc>, PersistenceError>>;
type PublishReply = oneshot::Sender<Result<PostId, PublishError>>;

enum Command {
    Format {
        key: SmolStr,
        reply: oneshot::Sender<Option<Transformed>>,
    },
    ContentChanged {
        text: String,
        selection: Option<Selection>,
    },
    TitleChanged(SmolStr),
    SetSelection(Selection),
    FilesDropped {
        files: Vec<ImageFile>,
        reply: oneshot::Sender<Vec<Result<UploadId, ValidationError>>>,
    },
    Autosave(oneshot::Sender<AutosaveState>),
    Uploads(oneshot::Sender<Vec<UploadTask>>),
    RenderPreview(oneshot::Sender<String>),
    Snapshot(oneshot::Sender<DocumentView>),
    SaveNow(SaveReply),
    Publish {
        metadata: PublishMetadata,
        reply: PublishReply,
    },
    Dispose(oneshot::Sender<()>),
}

/// Results of work the session spawned.
enum Completion {
    Flushed {
        reason: FlushReason,
        result: Result<DateTime<Utc>, PersistenceError>,
        waiters: Vec<SaveReply>,
    },
    Published {
        result: Result<PostId, PublishError>,
        reply: PublishReply,
    },
}

/// Cheap, cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    document: watch::Receiver<DocumentView>,
    autosave: watch::Receiver<AutosaveState>,
}

impl SessionHandle {
    /// Start a session, restoring the stored draft if there is one.
    ///
    /// A draft that cannot be read is logged and ignored; the session then
    /// starts from an empty document.
    pub async fn open(config: Config, collaborators: Collaborators) -> Self {
        let key = config.drafts.key.clone();
        let document = match collaborators.drafts.load_draft(&key).await {
            Ok(Some(draft)) => {
                tracing::info!(key = %key, "restored draft");
                Document::from_draft(draft)
            }
            Ok(None) => Document::default(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "ignoring unreadable draft");
                Document::default()
            }
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (upload_tx, upload_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let scheduler = AutosaveScheduler::new(&config.autosave, Instant::now())
            .restored(document.last_saved_at);
        let selection = Selection::collapsed(char_len(&document.content));
        let uploads = UploadPipeline::new(
            config.uploads.clone(),
            collaborators.signer,
            collaborators.transport,
            upload_tx,
        );

        let actor = SessionActor {
            view: view_of(&document, selection),
            document,
            selection,
            scheduler,
            uploads,
            drafts: collaborators.drafts,
            publisher: collaborators.publisher,
            completions: completion_tx,
            queued_saves: Vec::new(),
            clear_after_flush: false,
            config,
        };
        let (document_tx, document_rx) = watch::channel(actor.view.clone());
        let (autosave_tx, autosave_rx) = watch::channel(actor.scheduler.state().clone());

        n0_future::task::spawn(actor.run(
            Outlets {
                document: document_tx,
                autosave: autosave_tx,
            },
            commands_rx,
            upload_rx,
            completion_rx,
        ));

        Self {
            commands: commands_tx,
            document: document_rx,
            autosave: autosave_rx,
        }
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::Closed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx))?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Apply a toolbar format at the current selection. `Ok(None)` for an
    /// unknown key, which leaves the document untouched.
    pub async fn format(&self, key: &str) -> Result<Option<Transformed>, SessionError> {
        self.request(|reply| Command::Format {
            key: SmolStr::new(key),
            reply,
        })
        .await
    }

    /// The edit surface's text changed. The selection is clamped to it.
    pub fn on_content_change(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::ContentChanged {
            text: text.into(),
            selection: None,
        })
    }

    /// Same as [`on_content_change`](Self::on_content_change), with the caret
    /// the surface reported alongside.
    pub fn on_content_change_at(
        &self,
        text: impl Into<String>,
        selection: Selection,
    ) -> Result<(), SessionError> {
        self.send(Command::ContentChanged {
            text: text.into(),
            selection: Some(selection),
        })
    }

    pub fn on_title_change(&self, title: impl Into<SmolStr>) -> Result<(), SessionError> {
        self.send(Command::TitleChanged(title.into()))
    }

    pub fn set_selection(&self, selection: Selection) -> Result<(), SessionError> {
        self.send(Command::SetSelection(selection))
    }

    /// Start uploads for `files`, inserting a preview reference at the caret
    /// for each one that passes validation. Results are in input order.
    pub async fn on_files_dropped(
        &self,
        files: Vec<ImageFile>,
    ) -> Result<Vec<Result<UploadId, ValidationError>>, SessionError> {
        self.request(|reply| Command::FilesDropped { files, reply })
            .await
    }

    /// Autosave state after every command sent before this one.
    pub async fn autosave_status(&self) -> Result<AutosaveState, SessionError> {
        self.request(Command::Autosave).await
    }

    pub fn subscribe_autosave(&self) -> watch::Receiver<AutosaveState> {
        self.autosave.clone()
    }

    pub fn subscribe_document(&self) -> watch::Receiver<DocumentView> {
        self.document.clone()
    }

    pub async fn uploads(&self) -> Result<Vec<UploadTask>, SessionError> {
        self.request(Command::Uploads).await
    }

    /// Preview HTML of the current content, with in-flight images inlined.
    pub async fn render_preview(&self) -> Result<String, SessionError> {
        self.request(Command::RenderPreview).await
    }

    pub async fn snapshot(&self) -> Result<DocumentView, SessionError> {
        self.request(Command::Snapshot).await
    }

    /// Flush now and wait for the result. Queued behind a flush that is
    /// already running.
    pub async fn save_now(&self) -> Result<Result<DateTime<Utc>, PersistenceError>, SessionError> {
        self.request(Command::SaveNow).await
    }

    /// Publish the document. On success the stored draft is cleared.
    pub async fn publish(&self, metadata: PublishMetadata) -> Result<PostId, PublishError> {
        self.request(|reply| Command::Publish { metadata, reply })
            .await?
    }

    /// Cancel uploads, flush what is left and stop the session.
    pub async fn dispose(&self) -> Result<(), SessionError> {
        self.request(Command::Dispose).await
    }
}

fn view_of(document: &Document, selection: Selection) -> DocumentView {
    DocumentView {
        title: document.title.clone(),
        content: document.content.clone(),
        selection,
        images: document.images.clone(),
        last_saved_at: document.last_saved_at,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

struct Outlets {
    document: watch::Sender<DocumentView>,
    autosave: watch::Sender<AutosaveState>,
}

struct SessionActor {
    config: Config,
    document: Document,
    selection: Selection,
    view: DocumentView,
    scheduler: AutosaveScheduler,
    uploads: UploadPipeline,
    drafts: Arc<dyn DraftStore>,
    publisher: Arc<dyn Publisher>,
    completions: mpsc::UnboundedSender<Completion>,
    /// Manual saves requested while a flush was running.
    queued_saves: Vec<SaveReply>,
    /// A publish succeeded while a flush was running; clear once it lands.
    clear_after_flush: bool,
}

impl SessionActor {
    async fn run(
        mut self,
        outlets: Outlets,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut upload_events: mpsc::UnboundedReceiver<UploadEvent>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        tracing::debug!(key = %self.config.drafts.key, "document session started");
        loop {
            let deadline = self.scheduler.next_deadline();
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Dispose(reply)) => {
                        self.dispose(&mut completions, &outlets).await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        self.dispose(&mut completions, &outlets).await;
                        break;
                    }
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
                Some(event) = upload_events.recv() => self.on_upload_event(event),
                _ = sleep_until(deadline) => self.on_timer(),
            }
            self.broadcast(&outlets);
        }
        tracing::debug!("document session stopped");
    }

    fn broadcast(&mut self, outlets: &Outlets) {
        outlets.autosave.send_if_modified(|state| {
            let current = self.scheduler.state();
            if state != current {
                *state = current.clone();
                true
            } else {
                false
            }
        });
        let view = view_of(&self.document, self.selection);
        if view != self.view {
            self.view = view.clone();
            outlets.document.send_replace(view);
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Format { key, reply } => {
                let result = apply_format_key(
                    &self.document.content,
                    self.selection,
                    &key,
                    &self.config.placeholders,
                );
                match &result {
                    Some(transformed) => {
                        self.document.content = transformed.text.clone();
                        self.selection = transformed.selection;
                        self.on_edit();
                    }
                    None => tracing::debug!(key = %key, "ignoring unknown format key"),
                }
                let _ = reply.send(result);
            }
            Command::ContentChanged { text, selection } => {
                self.document.content = text;
                let len = char_len(&self.document.content);
                self.selection = selection.unwrap_or(self.selection).clamp(len);
                self.on_edit();
            }
            Command::TitleChanged(title) => {
                self.document.title = title;
                self.on_edit();
            }
            Command::SetSelection(selection) => {
                self.selection = selection.clamp(char_len(&self.document.content));
            }
            Command::FilesDropped { files, reply } => {
                let results = self.start_uploads(files);
                let _ = reply.send(results);
            }
            Command::Autosave(reply) => {
                let _ = reply.send(self.scheduler.state().clone());
            }
            Command::Uploads(reply) => {
                let _ = reply.send(self.uploads.tasks());
            }
            Command::RenderPreview(reply) => {
                let html =
                    quire_renderer::render_preview_with(&self.document.content, self.uploads.previews());
                let _ = reply.send(html);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(view_of(&self.document, self.selection));
            }
            Command::SaveNow(reply) => {
                if self.scheduler.in_flight() {
                    self.queued_saves.push(reply);
                } else {
                    self.start_flush(FlushReason::Manual, vec![reply]);
                }
            }
            Command::Publish { metadata, reply } => self.start_publish(metadata, reply),
            // Handled by the run loop.
            Command::Dispose(reply) => {
                let _ = reply.send(());
            }
        }
    }

    fn on_edit(&mut self) {
        self.scheduler.on_edit(Instant::now());
    }

    fn start_uploads(&mut self, files: Vec<ImageFile>) -> Vec<Result<UploadId, ValidationError>> {
        let mut results = Vec::with_capacity(files.len());
        let mut inserted = false;
        for file in files {
            let name = file.name.clone();
            match self.uploads.begin(file, &self.document.content) {
                Ok(pending) => {
                    let spliced = insert_image_reference(
                        &self.document.content,
                        self.selection,
                        &pending.alt,
                        &pending.placeholder,
                    );
                    self.document.content = spliced.text;
                    self.selection = spliced.selection;
                    inserted = true;
                    results.push(Ok(pending.id));
                }
                Err(e) => {
                    tracing::debug!(name = %name, error = %e, "rejected dropped file");
                    results.push(Err(e));
                }
            }
        }
        if inserted {
            self.on_edit();
        }
        results
    }

    fn on_upload_event(&mut self, event: UploadEvent) {
        match event {
            UploadEvent::Progress { id, percent } => self.uploads.on_progress(id, percent),
            UploadEvent::Finished { id, result } => {
                if let Some(selection) =
                    self.uploads
                        .settle(id, result, &mut self.document, self.selection)
                {
                    self.selection = selection;
                    self.on_edit();
                }
            }
        }
    }

    fn on_timer(&mut self) {
        if let Some(reason) = self.scheduler.poll_due(Instant::now()) {
            self.start_flush(reason, Vec::new());
        }
    }

    fn start_flush(&mut self, reason: FlushReason, waiters: Vec<SaveReply>) {
        self.scheduler.begin_flush(Instant::now());
        let saved_at = Utc::now().trunc_subsecs(0);
        let draft = self.document.to_draft(saved_at);
        let drafts = self.drafts.clone();
        let key = self.config.drafts.key.clone();
        let completions = self.completions.clone();
        tracing::debug!(reason = reason.as_str(), "autosave flush");

        n0_future::task::spawn(async move {
            let result = drafts.save_draft(&key, &draft).await.map(|()| saved_at);
            let _ = completions.send(Completion::Flushed {
                reason,
                result,
                waiters,
            });
        });
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Flushed {
                reason,
                result,
                waiters,
            } => self.finish_flush(reason, result, waiters),
            Completion::Published { result, reply } => self.finish_publish(result, reply),
        }
    }

    fn finish_flush(
        &mut self,
        reason: FlushReason,
        result: Result<DateTime<Utc>, PersistenceError>,
        waiters: Vec<SaveReply>,
    ) {
        let now = Instant::now();
        let outcome = match &result {
            Ok(saved_at) => {
                self.document.last_saved_at = Some(*saved_at);
                tracing::debug!(reason = reason.as_str(), "draft saved");
                Ok(*saved_at)
            }
            Err(e) => {
                tracing::warn!(reason = reason.as_str(), error = %e, "autosave failed");
                Err(e.to_string())
            }
        };
        self.scheduler.finish_flush(outcome.clone(), now);

        // The first waiter gets the original error, the rest a copy of its message.
        let mut waiters = waiters.into_iter();
        if let Some(first) = waiters.next() {
            let _ = first.send(result);
        }
        for waiter in waiters {
            let _ = waiter.send(
                outcome
                    .clone()
                    .map_err(|message| PersistenceError::Backend { message }),
            );
        }

        if mem::take(&mut self.clear_after_flush) {
            self.clear_draft();
            if !self.scheduler.has_pending_edit() {
                self.scheduler.reset(now);
            }
        }
        if !self.queued_saves.is_empty() {
            let waiters = mem::take(&mut self.queued_saves);
            self.start_flush(FlushReason::Manual, waiters);
        }
    }

    fn start_publish(&mut self, metadata: PublishMetadata, reply: PublishReply) {
        if let Err(e) = check_publishable(&self.document, self.uploads.pending_count()) {
            tracing::debug!(error = %e, "publish refused");
            let _ = reply.send(Err(e.into()));
            return;
        }
        let document = self.document.clone();
        let publisher = self.publisher.clone();
        let completions = self.completions.clone();
        n0_future::task::spawn(async move {
            let result = publisher.publish(&document, &metadata).await;
            let _ = completions.send(Completion::Published { result, reply });
        });
    }

    fn finish_publish(&mut self, result: Result<PostId, PublishError>, reply: PublishReply) {
        match &result {
            Ok(id) => {
                tracing::info!(post_id = %id, "post published");
                if self.scheduler.in_flight() {
                    self.clear_after_flush = true;
                } else {
                    self.clear_draft();
                    self.scheduler.reset(Instant::now());
                }
            }
            Err(e) => tracing::warn!(error = %e, "publish failed"),
        }
        let _ = reply.send(result);
    }

    fn clear_draft(&self) {
        let drafts = self.drafts.clone();
        let key = self.config.drafts.key.clone();
        n0_future::task::spawn(async move {
            if let Err(e) = drafts.clear_draft(&key).await {
                tracing::warn!(key = %key, error = %e, "failed to clear draft");
            }
        });
    }

    /// Cancel uploads and strip their references, let any running flush
    /// land, then write a final draft if anything is unsaved.
    async fn dispose(
        &mut self,
        completions: &mut mpsc::UnboundedReceiver<Completion>,
        outlets: &Outlets,
    ) {
        let cancelled = self.uploads.cancel_all();
        for token in &cancelled {
            let spliced = remove_placeholder(&self.document.content, self.selection, token);
            self.document.content = spliced.text;
            self.selection = spliced.selection;
        }

        self.drain_flushes(completions).await;
        let unsaved = self.scheduler.has_pending_edit()
            || self.scheduler.status() == AutosaveStatus::Error
            || !cancelled.is_empty();
        if unsaved {
            self.start_flush(FlushReason::Dispose, Vec::new());
            self.drain_flushes(completions).await;
        }
        self.broadcast(outlets);
        tracing::debug!(cancelled = cancelled.len(), "document session disposed");
    }

    async fn drain_flushes(&mut self, completions: &mut mpsc::UnboundedReceiver<Completion>) {
        while self.scheduler.in_flight() {
            match completions.recv().await {
                Some(completion) => self.on_completion(completion),
                None => break,
            }
        }
    }
}
