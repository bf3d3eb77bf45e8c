//! Repository layer over the key-value backend.
//!
//! # Responsibility
//! - Map named collections onto uniquely identified records.
//! - Keep backend details out of sessions and controllers.
//!
//! # Invariants
//! - Writes always carry an explicit id and replace the full payload.
//! - Fail-open reads never surface backend errors to the caller.

pub mod collection_store;
