//! Feature controllers wiring sessions onto collection stores.
//!
//! # Responsibility
//! - Provide one parametrized controller reused by every feature screen.
//! - Keep per-feature rules (key, validation, field mapping, ordering) in
//!   `FeatureSchema` implementations.
//!
//! # Invariants
//! - Every save/delete is followed by a list refresh.
//! - Stale refresh results never overwrite newer ones.

pub mod bill;
pub mod feature_controller;
pub mod todo;
