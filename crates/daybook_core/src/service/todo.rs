//! Checklist feature rules.

use crate::backend::KvBackend;
use crate::model::record::{to_payload, Payload, PayloadError, Record, RecordId};
use crate::model::todo::TodoItem;
use crate::repo::collection_store::{StoreError, StoreResult};
use crate::service::feature_controller::{FeatureController, FeatureSchema};
use crate::session::edit_session::{Draft, Validator};
use log::info;

pub const TODO_COLLECTION_KEY: &str = "todoList";
pub const FIELD_TEXT: &str = "text";
pub const FIELD_DONE: &str = "done";
pub const EMPTY_TEXT_MESSAGE: &str = "content cannot be empty";

/// Controller specialised for the checklist.
pub type TodoController<B> = FeatureController<TodoSchema, B>;

/// Schema of the `todoList` collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct TodoSchema;

fn text_not_blank(draft: &Draft) -> Result<(), String> {
    match draft.get(FIELD_TEXT) {
        Some(text) if !text.trim().is_empty() => Ok(()),
        _ => Err(EMPTY_TEXT_MESSAGE.to_string()),
    }
}

const TODO_VALIDATORS: &[Validator] = &[text_not_blank];

impl FeatureSchema for TodoSchema {
    fn collection_key(&self) -> &str {
        TODO_COLLECTION_KEY
    }

    fn default_draft(&self) -> Draft {
        Draft::from([
            (FIELD_TEXT.to_string(), String::new()),
            (FIELD_DONE.to_string(), false.to_string()),
        ])
    }

    fn draft_from_record(&self, record: &Record) -> Result<Draft, PayloadError> {
        let item: TodoItem = record.decode()?;
        Ok(Draft::from([
            (FIELD_TEXT.to_string(), item.text),
            (FIELD_DONE.to_string(), item.done.to_string()),
        ]))
    }

    fn validators(&self) -> &[Validator] {
        TODO_VALIDATORS
    }

    fn build_payload(&self, draft: &Draft) -> Result<Payload, String> {
        let item = TodoItem {
            text: draft
                .get(FIELD_TEXT)
                .map(|text| text.trim().to_string())
                .unwrap_or_default(),
            done: draft
                .get(FIELD_DONE)
                .is_some_and(|done| done.trim() == "true"),
        };
        to_payload(&item).map_err(|err| err.to_string())
    }
}

impl<B: KvBackend + ?Sized> FeatureController<TodoSchema, B> {
    /// Flips the `done` flag of a stored item and refreshes the display.
    ///
    /// Returns `Ok(false)` when `id` does not exist.
    pub async fn toggle_done(&self, id: RecordId) -> StoreResult<bool> {
        let key = self.collection_key();
        let Some(record) = self.store().get(key, id).await? else {
            return Ok(false);
        };
        let invalid = |source| StoreError::InvalidData {
            collection: key.to_string(),
            id,
            source,
        };
        let toggled = record.decode::<TodoItem>().map_err(invalid)?.toggled();
        let payload = to_payload(&toggled).map_err(invalid)?;

        let result = self.store().upsert(key, id, payload).await;
        self.refresh().await;
        result?;
        info!(
            "event=todo_toggle module=service status=ok id={id} done={}",
            toggled.done
        );
        Ok(true)
    }
}
