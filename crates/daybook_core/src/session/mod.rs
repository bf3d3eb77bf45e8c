//! Edit-session state machine shared by feature controllers.
//!
//! # Responsibility
//! - Track the modal status, current selection and draft field values.
//! - Run validation before handing a write to the caller.
//! - Own the single transient toast notification.
//!
//! # Invariants
//! - `Open` implies a populated draft; `Closed` clears the draft.
//! - At most one toast is visible; only its own generation may clear it.

pub mod edit_session;
