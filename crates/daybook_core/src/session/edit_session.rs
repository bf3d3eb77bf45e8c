//! Create/edit session for one feature screen.
//!
//! # Responsibility
//! - Move between `Closed` and `Open` on create/edit/cancel/save intents.
//! - Validate drafts through caller-supplied predicates.
//! - Issue generation-tagged toasts for validation and write feedback.
//!
//! # Invariants
//! - Opening requires `Closed`; field edits require `Open`.
//! - A menu selection can only be made while `Closed`, so it never
//!   retargets an open form.
//! - Freshly allocated ids never repeat within one session, even while
//!   earlier writes are still in flight.
//! - `save` closes optimistically once a write is issued, before it resolves.
//! - A failed validation keeps the session `Open` with the draft untouched.
//! - `expire_toast` only clears the toast whose generation it was given.

use crate::config::{DEFAULT_ID_BASELINE, DEFAULT_TOAST_DURATION_MS};
use crate::model::record::{Payload, Record, RecordId};
use crate::repo::collection_store::next_id_from;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tokio::time::Instant;

/// Draft field values keyed by field name.
pub type Draft = BTreeMap<String, String>;

/// Validation predicate; `Err` carries the user-facing message.
pub type Validator = fn(&Draft) -> Result<(), String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Closed,
    Open,
}

/// Rejected session transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    NotOpen,
    AlreadyOpen,
    NothingSelected,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotOpen => write!(f, "edit session is not open"),
            Self::AlreadyOpen => write!(f, "edit session is already open"),
            Self::NothingSelected => write!(f, "no record selected"),
        }
    }
}

impl Error for SessionError {}

/// Currently displayed toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub text: String,
    pub expires_at: Instant,
    pub generation: u64,
}

/// Presentation-facing toast notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastEvent {
    pub text: String,
    pub duration_ms: u64,
}

/// Handle returned when a toast is shown; used to schedule its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastTicket {
    pub generation: u64,
    pub event: ToastEvent,
}

/// Write produced by a successful save, to be persisted by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub id: RecordId,
    pub payload: Payload,
    /// `true` when the id was freshly allocated.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Issued(PendingWrite),
    /// Validation failed; the toast explains why.
    Rejected(ToastTicket),
    /// Save was requested while the session was closed.
    NotOpen,
}

/// Modal edit state machine.
#[derive(Debug)]
pub struct EditSession {
    status: SessionStatus,
    selected: Option<RecordId>,
    draft: Draft,
    toast: Option<Toast>,
    toast_generation: u64,
    toast_duration: Duration,
    id_baseline: RecordId,
    /// Lowest id a fresh record may receive.
    next_fresh_id: RecordId,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_TOAST_DURATION_MS),
            DEFAULT_ID_BASELINE,
        )
    }
}

impl EditSession {
    pub fn new(toast_duration: Duration, id_baseline: RecordId) -> Self {
        Self {
            status: SessionStatus::Closed,
            selected: None,
            draft: Draft::new(),
            toast: None,
            toast_generation: 0,
            toast_duration,
            id_baseline,
            next_fresh_id: id_baseline,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    pub fn selected(&self) -> Option<RecordId> {
        self.selected
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.draft.get(name).map(String::as_str)
    }

    pub fn toast(&self) -> Option<&Toast> {
        self.toast.as_ref()
    }

    pub fn toast_duration(&self) -> Duration {
        self.toast_duration
    }

    /// Opens an empty form for a new record.
    pub fn open_for_create(&mut self, defaults: Draft) -> Result<(), SessionError> {
        self.ensure_closed()?;
        self.status = SessionStatus::Open;
        self.selected = None;
        self.draft = defaults;
        Ok(())
    }

    /// Opens the form pre-filled from an existing record.
    pub fn open_for_edit(&mut self, id: RecordId, draft: Draft) -> Result<(), SessionError> {
        self.ensure_closed()?;
        self.status = SessionStatus::Open;
        self.selected = Some(id);
        self.draft = draft;
        Ok(())
    }

    /// Updates one draft field without validating it.
    pub fn change_field(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        if !self.is_open() {
            return Err(SessionError::NotOpen);
        }
        self.draft.insert(name.into(), value.into());
        Ok(())
    }

    /// Closes the form and discards the draft. Safe to call while closed.
    pub fn cancel(&mut self) {
        if self.is_open() {
            self.selected = None;
        }
        self.status = SessionStatus::Closed;
        self.draft.clear();
    }

    /// Marks a record as the target of a pending menu action.
    pub fn select(&mut self, id: RecordId) -> Result<(), SessionError> {
        self.ensure_closed()?;
        self.selected = Some(id);
        Ok(())
    }

    /// Drops a pending selection without touching the draft.
    pub fn clear_selection(&mut self) {
        if !self.is_open() {
            self.selected = None;
        }
    }

    /// Runs `validators` in order; the first failure shows its toast.
    pub fn validate(
        &mut self,
        validators: &[Validator],
        now: Instant,
    ) -> Result<(), ToastTicket> {
        for validate in validators {
            if let Err(message) = validate(&self.draft) {
                return Err(self.show_toast(message, now));
            }
        }
        Ok(())
    }

    /// Whether saving now would allocate a fresh id.
    pub fn creates_record(&self) -> bool {
        self.is_open() && self.selected.is_none()
    }

    /// Validates the draft and, on success, issues a write and closes.
    ///
    /// `existing` should be the full record set of the collection; it is only
    /// consulted when a new id has to be allocated. Ids issued earlier by
    /// this session are never handed out again.
    pub fn save<F>(
        &mut self,
        validators: &[Validator],
        build: F,
        existing: &[Record],
        now: Instant,
    ) -> SaveOutcome
    where
        F: FnOnce(&Draft) -> Result<Payload, String>,
    {
        if !self.is_open() {
            return SaveOutcome::NotOpen;
        }

        if let Err(ticket) = self.validate(validators, now) {
            return SaveOutcome::Rejected(ticket);
        }

        let payload = match build(&self.draft) {
            Ok(payload) => payload,
            Err(message) => return SaveOutcome::Rejected(self.show_toast(message, now)),
        };

        let (id, created) = match self.selected {
            Some(id) => (id, false),
            None => {
                let id = next_id_from(existing, self.id_baseline).max(self.next_fresh_id);
                self.next_fresh_id = id.saturating_add(1);
                (id, true)
            }
        };

        self.status = SessionStatus::Closed;
        self.selected = None;
        self.draft.clear();
        SaveOutcome::Issued(PendingWrite {
            id,
            payload,
            created,
        })
    }

    /// Takes the selected id for deletion. The session may be open or closed.
    pub fn delete_selected(&mut self) -> Result<RecordId, SessionError> {
        self.selected.take().ok_or(SessionError::NothingSelected)
    }

    /// Replaces any visible toast with `text`.
    pub fn show_toast(&mut self, text: impl Into<String>, now: Instant) -> ToastTicket {
        self.toast_generation += 1;
        let text = text.into();
        self.toast = Some(Toast {
            text: text.clone(),
            expires_at: now + self.toast_duration,
            generation: self.toast_generation,
        });
        ToastTicket {
            generation: self.toast_generation,
            event: ToastEvent {
                text,
                duration_ms: u64::try_from(self.toast_duration.as_millis()).unwrap_or(u64::MAX),
            },
        }
    }

    /// Clears the toast if it still belongs to `generation`.
    ///
    /// Returns whether a toast was cleared.
    pub fn expire_toast(&mut self, generation: u64) -> bool {
        match &self.toast {
            Some(toast) if toast.generation == generation => {
                self.toast = None;
                true
            }
            _ => false,
        }
    }

    fn ensure_closed(&self) -> Result<(), SessionError> {
        if self.is_open() {
            Err(SessionError::AlreadyOpen)
        } else {
            Ok(())
        }
    }
}
