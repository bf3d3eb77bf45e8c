//! Domain model for checklist and ledger records.
//!
//! # Responsibility
//! - Define the generic `Record` shape persisted by collection stores.
//! - Provide typed views over todo and bill payloads.
//!
//! # Invariants
//! - Every record is identified by a `RecordId` unique within its collection.
//! - Payloads are always JSON objects and are replaced wholesale on write.

pub mod bill;
pub mod record;
pub mod todo;
