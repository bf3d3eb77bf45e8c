//! Parametrized feature controller.
//!
//! # Responsibility
//! - Route UI intents (create, edit, save, delete, menu choices) through one
//!   `EditSession` onto one collection of a `KeyedCollectionStore`.
//! - Maintain the display snapshot and publish `ControllerEvent`s.
//! - Schedule generation-tagged toast expiry.
//!
//! # Invariants
//! - No mutex is held across an `.await`.
//! - A refresh result is applied only when no newer refresh was applied.
//! - Write failures are surfaced as toasts, never dropped silently.
//! - The long-press menu target lives in the view, never in an open form.

use crate::backend::KvBackend;
use crate::config::DaybookConfig;
use crate::model::record::{Payload, PayloadError, Record, RecordId};
use crate::repo::collection_store::{KeyedCollectionStore, StoreError};
use crate::session::edit_session::{
    Draft, EditSession, SaveOutcome, SessionError, SessionStatus, Toast, ToastEvent, ToastTicket,
    Validator,
};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::time::Instant;

const EVENT_CHANNEL_CAPACITY: usize = 64;
pub const SAVE_FAILED_MESSAGE: &str = "save failed, please retry";
pub const DELETE_FAILED_MESSAGE: &str = "delete failed, please retry";

/// Per-feature rules plugged into a [`FeatureController`].
pub trait FeatureSchema: Send + Sync + 'static {
    /// Backend collection this feature persists into.
    fn collection_key(&self) -> &str;

    /// Draft shown by a fresh create form.
    fn default_draft(&self) -> Draft;

    /// Draft pre-filled from an existing record.
    fn draft_from_record(&self, record: &Record) -> Result<Draft, PayloadError>;

    /// Predicates run in order; the first failure aborts the save.
    fn validators(&self) -> &[Validator];

    /// Maps validated draft strings into a typed payload.
    fn build_payload(&self, draft: &Draft) -> Result<Payload, String>;

    /// Display order: most recently appended first.
    fn display_order(&self, mut records: Vec<Record>) -> Vec<Record> {
        records.reverse();
        records
    }
}

/// Choice offered by the long-press menu of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Edit,
    Delete,
    Cancel,
}

impl MenuAction {
    /// Maps the menu button index (`0` edit, `1` delete, `2` cancel).
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Edit),
            1 => Some(Self::Delete),
            2 => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// Notification published to presentation subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// Display snapshot changed; records are in display order.
    RecordsRefreshed(Vec<Record>),
    ToastShown(ToastEvent),
    ToastCleared,
}

/// Controller-level failure of a UI intent.
#[derive(Debug)]
pub enum ControllerError {
    Session(SessionError),
    Payload(PayloadError),
    Store(StoreError),
}

impl Display for ControllerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(err) => write!(f, "{err}"),
            Self::Payload(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ControllerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            Self::Payload(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<SessionError> for ControllerError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

impl From<PayloadError> for ControllerError {
    fn from(value: PayloadError) -> Self {
        Self::Payload(value)
    }
}

impl From<StoreError> for ControllerError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;

#[derive(Debug, Default)]
struct ViewState {
    records: Vec<Record>,
    applied_generation: u64,
    menu_target: Option<Record>,
}

/// One feature screen's controller: schema + session + collection.
pub struct FeatureController<S: FeatureSchema, B: KvBackend + ?Sized> {
    schema: S,
    store: KeyedCollectionStore<B>,
    session: Arc<Mutex<EditSession>>,
    view: Mutex<ViewState>,
    refresh_issued: AtomicU64,
    events: broadcast::Sender<ControllerEvent>,
}

impl<S: FeatureSchema, B: KvBackend + ?Sized> FeatureController<S, B> {
    pub fn new(schema: S, store: KeyedCollectionStore<B>, config: &DaybookConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            schema,
            store,
            session: Arc::new(Mutex::new(EditSession::new(
                config.toast_duration(),
                config.id_baseline,
            ))),
            view: Mutex::new(ViewState::default()),
            refresh_issued: AtomicU64::new(0),
            events,
        }
    }

    pub fn schema(&self) -> &S {
        &self.schema
    }

    pub fn store(&self) -> &KeyedCollectionStore<B> {
        &self.store
    }

    pub fn collection_key(&self) -> &str {
        self.schema.collection_key()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Current display snapshot.
    pub fn records(&self) -> Vec<Record> {
        lock(&self.view).records.clone()
    }

    pub fn status(&self) -> SessionStatus {
        lock(&self.session).status()
    }

    pub fn selected(&self) -> Option<RecordId> {
        lock(&self.session).selected()
    }

    pub fn draft(&self) -> Draft {
        lock(&self.session).draft().clone()
    }

    pub fn toast(&self) -> Option<Toast> {
        lock(&self.session).toast().cloned()
    }

    /// Opens an empty form; a pending menu is dismissed.
    pub fn open_for_create(&self) -> ControllerResult<()> {
        let defaults = self.schema.default_draft();
        lock(&self.session).open_for_create(defaults)?;
        lock(&self.view).menu_target = None;
        Ok(())
    }

    /// Opens the form on `record`; a pending menu is dismissed.
    pub fn open_for_edit(&self, record: &Record) -> ControllerResult<()> {
        let draft = self.schema.draft_from_record(record)?;
        lock(&self.session).open_for_edit(record.id, draft)?;
        lock(&self.view).menu_target = None;
        Ok(())
    }

    pub fn change_field(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> ControllerResult<()> {
        lock(&self.session).change_field(name, value)?;
        Ok(())
    }

    pub fn cancel(&self) {
        lock(&self.session).cancel();
        lock(&self.view).menu_target = None;
    }

    /// Validates and persists the draft, then refreshes the display.
    ///
    /// The session closes as soon as the write is issued. A failed write is
    /// reported through a toast and still followed by a refresh. The
    /// collection is only read when a fresh id has to be allocated.
    pub async fn save(&self) -> SaveOutcome {
        let key = self.schema.collection_key();
        let creates_record = {
            let mut session = lock(&self.session);
            if !session.is_open() {
                return SaveOutcome::NotOpen;
            }
            if let Err(ticket) = session.validate(self.schema.validators(), Instant::now()) {
                drop(session);
                return self.reject(ticket);
            }
            session.creates_record()
        };

        let existing = if creates_record {
            match self.store.try_list(key).await {
                Ok(records) => records,
                Err(err) => {
                    warn!("event=record_save module=service status=degraded collection={key} error={err}");
                    lock(&self.view).records.clone()
                }
            }
        } else {
            Vec::new()
        };

        let outcome = lock(&self.session).save(
            self.schema.validators(),
            |draft| self.schema.build_payload(draft),
            &existing,
            Instant::now(),
        );

        match outcome {
            SaveOutcome::Rejected(ticket) => self.reject(ticket),
            SaveOutcome::Issued(write) => {
                match self.store.upsert(key, write.id, write.payload.clone()).await {
                    Ok(()) => info!(
                        "event=record_save module=service status=ok collection={key} id={} created={}",
                        write.id, write.created
                    ),
                    Err(err) => {
                        error!(
                            "event=record_save module=service status=error collection={key} id={} error={err}",
                            write.id
                        );
                        self.show_toast(SAVE_FAILED_MESSAGE);
                    }
                }
                self.refresh().await;
                SaveOutcome::Issued(write)
            }
            SaveOutcome::NotOpen => SaveOutcome::NotOpen,
        }
    }

    /// Deletes the selected record, then refreshes the display.
    pub async fn delete_selected(&self) -> ControllerResult<RecordId> {
        let id = lock(&self.session).delete_selected()?;
        lock(&self.view).menu_target = None;
        self.delete_and_refresh(id).await;
        Ok(id)
    }

    /// Deletes a record by id without going through the selection.
    pub async fn delete(&self, id: RecordId) {
        self.delete_and_refresh(id).await;
    }

    /// Remembers `record` as the target of the long-press menu.
    ///
    /// Fails with `SessionError::AlreadyOpen` while a form is open.
    pub fn select(&self, record: &Record) -> ControllerResult<()> {
        lock(&self.session).select(record.id)?;
        lock(&self.view).menu_target = Some(record.clone());
        Ok(())
    }

    /// Applies a menu choice to the remembered record.
    ///
    /// Does nothing when no record was selected.
    pub async fn choose(&self, action: MenuAction) -> ControllerResult<()> {
        let target = lock(&self.view).menu_target.take();
        let Some(target) = target else {
            return Ok(());
        };
        lock(&self.session).clear_selection();
        match action {
            MenuAction::Edit => self.open_for_edit(&target),
            MenuAction::Delete => {
                self.delete_and_refresh(target.id).await;
                Ok(())
            }
            MenuAction::Cancel => Ok(()),
        }
    }

    /// Re-reads the collection and updates the display snapshot.
    ///
    /// Returns the snapshot in effect after this refresh, which may be a
    /// newer one if a later refresh completed first.
    pub async fn refresh(&self) -> Vec<Record> {
        let generation = self.refresh_issued.fetch_add(1, Ordering::SeqCst) + 1;
        let listed = self.store.list(self.schema.collection_key()).await;
        let ordered = self.schema.display_order(listed);

        let mut view = lock(&self.view);
        if generation <= view.applied_generation {
            info!(
                "event=records_refresh module=service status=stale collection={} generation={generation}",
                self.schema.collection_key()
            );
            return view.records.clone();
        }
        view.applied_generation = generation;
        view.records = ordered;
        let _ = self
            .events
            .send(ControllerEvent::RecordsRefreshed(view.records.clone()));
        view.records.clone()
    }

    /// Shows a toast and schedules its generation-tagged expiry.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn show_toast(&self, text: impl Into<String>) {
        let ticket = lock(&self.session).show_toast(text, Instant::now());
        self.publish_toast(ticket.generation, ticket.event);
    }

    fn reject(&self, ticket: ToastTicket) -> SaveOutcome {
        info!(
            "event=record_save module=service status=rejected collection={}",
            self.schema.collection_key()
        );
        self.publish_toast(ticket.generation, ticket.event.clone());
        SaveOutcome::Rejected(ticket)
    }

    async fn delete_and_refresh(&self, id: RecordId) {
        let key = self.schema.collection_key();
        match self.store.delete(key, id).await {
            Ok(()) => info!("event=record_delete module=service status=ok collection={key} id={id}"),
            Err(err) => {
                error!("event=record_delete module=service status=error collection={key} id={id} error={err}");
                self.show_toast(DELETE_FAILED_MESSAGE);
            }
        }
        self.refresh().await;
    }

    fn publish_toast(&self, generation: u64, event: ToastEvent) {
        let duration = lock(&self.session).toast_duration();
        let _ = self.events.send(ControllerEvent::ToastShown(event));

        let session = Arc::clone(&self.session);
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if lock(&session).expire_toast(generation) {
                let _ = events.send(ControllerEvent::ToastCleared);
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
