//! Core persistence and edit-session logic for Daybook.
//! This crate owns every invariant of the checklist and ledger collections.

pub mod backend;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod session;

pub use backend::{BackendError, BackendResult, KvBackend, MemoryBackend, SetOptions, SqliteBackend};
pub use config::{DaybookConfig, StorageConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::bill::{BillEntry, BillKind};
pub use model::record::{Payload, PayloadError, Record, RecordId};
pub use model::todo::TodoItem;
pub use repo::collection_store::{next_id, KeyedCollectionStore, StoreError, StoreResult};
pub use service::bill::{BillController, BillSchema, BILL_COLLECTION_KEY};
pub use service::feature_controller::{
    ControllerError, ControllerEvent, ControllerResult, FeatureController, FeatureSchema,
    MenuAction,
};
pub use service::todo::{TodoController, TodoSchema, TODO_COLLECTION_KEY};
pub use session::edit_session::{
    Draft, EditSession, PendingWrite, SaveOutcome, SessionError, SessionStatus, Toast, ToastEvent,
    ToastTicket,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
