//! Ledger feature rules.
//!
//! # Invariants
//! - The draft amount is always unsigned; the sign comes from the `type`
//!   selector (`-1` expense, `1` income).
//! - `occurredAt` is composed from separate date (`YYYY-MM-DD`) and time
//!   (`HH:MM`) fields.

use crate::model::bill::{BillEntry, BillKind};
use crate::model::record::{to_payload, Payload, PayloadError, Record};
use crate::service::feature_controller::{FeatureController, FeatureSchema};
use crate::session::edit_session::{Draft, Validator};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};

pub const BILL_COLLECTION_KEY: &str = "billList";
pub const FIELD_KIND: &str = "type";
pub const FIELD_DATE: &str = "date";
pub const FIELD_TIME: &str = "time";
pub const FIELD_AMOUNT: &str = "amount";
pub const FIELD_DESCRIPTION: &str = "description";

pub const AMOUNT_REQUIRED_MESSAGE: &str = "amount cannot be empty";
pub const AMOUNT_INVALID_MESSAGE: &str = "amount is invalid";
pub const KIND_INVALID_MESSAGE: &str = "type must be expense or income";
pub const DATETIME_INVALID_MESSAGE: &str = "date or time is invalid";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Controller specialised for the ledger.
pub type BillController<B> = FeatureController<BillSchema, B>;

/// Schema of the `billList` collection.
#[derive(Debug, Clone, Copy)]
pub struct BillSchema {
    clock: fn() -> NaiveDateTime,
}

impl Default for BillSchema {
    fn default() -> Self {
        Self {
            clock: local_now,
        }
    }
}

impl BillSchema {
    /// Uses `clock` to pre-fill date and time of new entries.
    pub fn with_clock(clock: fn() -> NaiveDateTime) -> Self {
        Self { clock }
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn field<'a>(draft: &'a Draft, name: &str) -> &'a str {
    draft.get(name).map(|value| value.trim()).unwrap_or("")
}

fn parse_amount(draft: &Draft) -> Option<i64> {
    field(draft, FIELD_AMOUNT)
        .parse::<i64>()
        .ok()
        .filter(|amount| *amount > 0)
}

fn parse_occurred_at(draft: &Draft) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(field(draft, FIELD_DATE), DATE_FORMAT).ok()?;
    let raw_time = field(draft, FIELD_TIME);
    let time = NaiveTime::parse_from_str(raw_time, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw_time, "%H:%M:%S"))
        .ok()?;
    Some(NaiveDateTime::new(date, time))
}

fn amount_present(draft: &Draft) -> Result<(), String> {
    if field(draft, FIELD_AMOUNT).is_empty() {
        return Err(AMOUNT_REQUIRED_MESSAGE.to_string());
    }
    Ok(())
}

fn amount_positive_integer(draft: &Draft) -> Result<(), String> {
    parse_amount(draft)
        .map(|_| ())
        .ok_or_else(|| AMOUNT_INVALID_MESSAGE.to_string())
}

fn kind_known(draft: &Draft) -> Result<(), String> {
    BillKind::parse(field(draft, FIELD_KIND))
        .map(|_| ())
        .ok_or_else(|| KIND_INVALID_MESSAGE.to_string())
}

fn occurred_at_valid(draft: &Draft) -> Result<(), String> {
    parse_occurred_at(draft)
        .map(|_| ())
        .ok_or_else(|| DATETIME_INVALID_MESSAGE.to_string())
}

const BILL_VALIDATORS: &[Validator] = &[
    amount_present,
    amount_positive_integer,
    kind_known,
    occurred_at_valid,
];

impl FeatureSchema for BillSchema {
    fn collection_key(&self) -> &str {
        BILL_COLLECTION_KEY
    }

    fn default_draft(&self) -> Draft {
        let now = (self.clock)();
        Draft::from([
            (FIELD_KIND.to_string(), BillKind::Expense.as_draft().to_string()),
            (FIELD_DATE.to_string(), now.format(DATE_FORMAT).to_string()),
            (FIELD_TIME.to_string(), now.format(TIME_FORMAT).to_string()),
            (FIELD_AMOUNT.to_string(), String::new()),
            (FIELD_DESCRIPTION.to_string(), String::new()),
        ])
    }

    fn draft_from_record(&self, record: &Record) -> Result<Draft, PayloadError> {
        let entry: BillEntry = record.decode()?;
        Ok(Draft::from([
            (FIELD_KIND.to_string(), entry.kind().as_draft().to_string()),
            (
                FIELD_DATE.to_string(),
                entry.occurred_at.format(DATE_FORMAT).to_string(),
            ),
            (
                FIELD_TIME.to_string(),
                entry.occurred_at.format(TIME_FORMAT).to_string(),
            ),
            (
                FIELD_AMOUNT.to_string(),
                entry.amount.unsigned_abs().to_string(),
            ),
            (FIELD_DESCRIPTION.to_string(), entry.description),
        ]))
    }

    fn validators(&self) -> &[Validator] {
        BILL_VALIDATORS
    }

    fn build_payload(&self, draft: &Draft) -> Result<Payload, String> {
        let amount = parse_amount(draft).ok_or_else(|| AMOUNT_INVALID_MESSAGE.to_string())?;
        let kind = BillKind::parse(field(draft, FIELD_KIND))
            .ok_or_else(|| KIND_INVALID_MESSAGE.to_string())?;
        let occurred_at =
            parse_occurred_at(draft).ok_or_else(|| DATETIME_INVALID_MESSAGE.to_string())?;

        let entry = BillEntry {
            occurred_at,
            amount: kind.sign() * amount,
            description: field(draft, FIELD_DESCRIPTION).to_string(),
        };
        to_payload(&entry).map_err(|err| err.to_string())
    }
}
