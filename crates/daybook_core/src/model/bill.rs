//! Ledger entry model.
//!
//! # Invariants
//! - `amount` is signed: negative values are expenses, positive are income.
//! - Zero is never produced by validated input but is displayed as an expense.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Direction selector shown next to the amount input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillKind {
    Expense,
    Income,
}

impl BillKind {
    /// Sign multiplier applied to the unsigned amount input.
    pub fn sign(self) -> i64 {
        match self {
            Self::Expense => -1,
            Self::Income => 1,
        }
    }

    /// Derives the selector from a stored signed amount.
    pub fn of_amount(amount: i64) -> Self {
        if amount <= 0 {
            Self::Expense
        } else {
            Self::Income
        }
    }

    /// Parses the draft representation (`-1`/`1` or `expense`/`income`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "-1" | "expense" => Some(Self::Expense),
            "1" | "income" => Some(Self::Income),
            _ => None,
        }
    }

    /// Draft representation stored in edit-session fields.
    pub fn as_draft(self) -> &'static str {
        match self {
            Self::Expense => "-1",
            Self::Income => "1",
        }
    }
}

/// Typed view of a `billList` record payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillEntry {
    pub occurred_at: NaiveDateTime,
    pub amount: i64,
    #[serde(default)]
    pub description: String,
}

impl BillEntry {
    pub fn kind(&self) -> BillKind {
        BillKind::of_amount(self.amount)
    }
}
