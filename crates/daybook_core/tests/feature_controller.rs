use async_trait::async_trait;
use daybook_core::service::bill::{AMOUNT_INVALID_MESSAGE, AMOUNT_REQUIRED_MESSAGE};
use daybook_core::service::feature_controller::{DELETE_FAILED_MESSAGE, SAVE_FAILED_MESSAGE};
use daybook_core::service::todo::EMPTY_TEXT_MESSAGE;
use daybook_core::{
    BackendResult, BillController, BillSchema, ControllerError, ControllerEvent, DaybookConfig,
    KeyedCollectionStore, KvBackend, MemoryBackend, MenuAction, RecordId, SaveOutcome,
    SessionError, SessionStatus, SetOptions, TodoController, TodoSchema, BILL_COLLECTION_KEY,
    TODO_COLLECTION_KEY,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

fn todo_controller() -> (Arc<MemoryBackend>, TodoController<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let store = KeyedCollectionStore::new(Arc::clone(&backend));
    let controller = TodoController::new(TodoSchema, store, &DaybookConfig::default());
    (backend, controller)
}

fn bill_controller() -> (Arc<MemoryBackend>, BillController<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let store = KeyedCollectionStore::new(Arc::clone(&backend));
    let controller = BillController::new(BillSchema::default(), store, &DaybookConfig::default());
    (backend, controller)
}

async fn add_todo(controller: &TodoController<MemoryBackend>, text: &str) -> SaveOutcome {
    controller.open_for_create().unwrap();
    controller.change_field("text", text).unwrap();
    controller.save().await
}

#[tokio::test]
async fn todo_scenario_allocates_sequential_ids() {
    let (_, controller) = todo_controller();

    add_todo(&controller, "buy milk").await;
    let records = controller.store().list(TODO_COLLECTION_KEY).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, 1000);
    assert_eq!(
        records[0].payload,
        json!({"text": "buy milk", "done": false})
            .as_object()
            .unwrap()
            .clone()
    );

    add_todo(&controller, "buy eggs").await;
    let ids: Vec<RecordId> = controller.records().iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![1001, 1000]);
}

#[tokio::test]
async fn next_id_follows_maximum_not_display_head() {
    let (backend, controller) = todo_controller();
    for id in [1007, 1002] {
        backend
            .set(
                TODO_COLLECTION_KEY,
                id,
                json!({"text": "seed", "done": false}),
                SetOptions::default(),
            )
            .await
            .unwrap();
    }
    controller.refresh().await;
    assert_eq!(controller.records()[0].id, 1002);

    let outcome = add_todo(&controller, "next").await;
    let SaveOutcome::Issued(write) = outcome else {
        panic!("expected issued write, got {outcome:?}");
    };
    assert_eq!(write.id, 1008);
}

#[tokio::test]
async fn editing_overwrites_without_growing_collection() {
    let (_, controller) = todo_controller();
    add_todo(&controller, "draft").await;
    add_todo(&controller, "other").await;

    let target = controller
        .records()
        .into_iter()
        .find(|record| record.id == 1000)
        .unwrap();
    controller.open_for_edit(&target).unwrap();
    assert_eq!(controller.selected(), Some(1000));
    controller.change_field("text", "final").unwrap();
    controller.save().await;

    let records = controller.store().list(TODO_COLLECTION_KEY).await;
    assert_eq!(records.len(), 2);
    let edited = records.iter().find(|record| record.id == 1000).unwrap();
    assert_eq!(edited.payload.get("text"), Some(&json!("final")));
}

#[tokio::test]
async fn blank_todo_is_rejected_and_session_stays_open() {
    let (_, controller) = todo_controller();

    let outcome = add_todo(&controller, "   ").await;

    let SaveOutcome::Rejected(ticket) = outcome else {
        panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!(ticket.event.text, EMPTY_TEXT_MESSAGE);
    assert_eq!(controller.status(), SessionStatus::Open);
    assert_eq!(controller.draft().get("text").map(String::as_str), Some("   "));
    assert!(controller.store().list(TODO_COLLECTION_KEY).await.is_empty());
}

#[tokio::test]
async fn invalid_bill_amounts_leave_collection_unchanged() {
    let (_, controller) = bill_controller();
    controller.open_for_create().unwrap();

    for (amount, message) in [
        ("0", AMOUNT_INVALID_MESSAGE),
        ("-5", AMOUNT_INVALID_MESSAGE),
        ("", AMOUNT_REQUIRED_MESSAGE),
    ] {
        controller.change_field("amount", amount).unwrap();
        let outcome = controller.save().await;
        let SaveOutcome::Rejected(ticket) = outcome else {
            panic!("amount `{amount}` should be rejected, got {outcome:?}");
        };
        assert_eq!(ticket.event.text, message);
        assert_eq!(
            controller.toast().map(|toast| toast.text),
            Some(message.to_string())
        );
    }

    assert_eq!(controller.status(), SessionStatus::Open);
    assert!(controller.store().list(BILL_COLLECTION_KEY).await.is_empty());
}

#[tokio::test]
async fn expense_bill_is_stored_with_negative_amount() {
    let (_, controller) = bill_controller();
    controller.open_for_create().unwrap();
    controller.change_field("type", "-1").unwrap();
    controller.change_field("amount", "200").unwrap();
    controller.change_field("description", "lunch").unwrap();
    controller.save().await;

    let records = controller.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload.get("amount"), Some(&json!(-200)));
    assert_eq!(records[0].payload.get("description"), Some(&json!("lunch")));
    assert_eq!(controller.status(), SessionStatus::Closed);
}

#[tokio::test]
async fn menu_edit_prefills_draft_and_delete_removes_record() {
    let (_, controller) = bill_controller();
    controller.open_for_create().unwrap();
    controller.change_field("type", "1").unwrap();
    controller.change_field("amount", "300").unwrap();
    controller.save().await;
    let record = controller.records()[0].clone();

    controller.select(&record).unwrap();
    controller.choose(MenuAction::Edit).await.unwrap();
    assert_eq!(controller.status(), SessionStatus::Open);
    assert_eq!(controller.draft().get("amount").map(String::as_str), Some("300"));
    assert_eq!(controller.draft().get("type").map(String::as_str), Some("1"));
    controller.cancel();

    controller.select(&record).unwrap();
    controller.choose(MenuAction::Cancel).await.unwrap();
    assert_eq!(controller.selected(), None);
    assert_eq!(controller.records().len(), 1);

    controller.select(&record).unwrap();
    controller.choose(MenuAction::Delete).await.unwrap();
    assert!(controller.records().is_empty());
    assert!(controller.store().list(BILL_COLLECTION_KEY).await.is_empty());
}

#[tokio::test]
async fn toggle_done_flips_flag_in_place() {
    let (_, controller) = todo_controller();
    add_todo(&controller, "walk").await;
    add_todo(&controller, "read").await;

    assert!(controller.toggle_done(1000).await.unwrap());
    assert!(!controller.toggle_done(4242).await.unwrap());

    let records = controller.store().list(TODO_COLLECTION_KEY).await;
    let ids: Vec<RecordId> = records.iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![1000, 1001]);
    assert_eq!(records[0].payload.get("done"), Some(&json!(true)));
    assert_eq!(records[1].payload.get("done"), Some(&json!(false)));
}

#[tokio::test]
async fn failed_write_is_surfaced_as_toast() {
    let (backend, controller) = todo_controller();
    controller.open_for_create().unwrap();
    controller.change_field("text", "lost").unwrap();
    backend.set_available(false);

    let outcome = controller.save().await;

    assert!(matches!(outcome, SaveOutcome::Issued(_)));
    assert_eq!(controller.status(), SessionStatus::Closed);
    assert_eq!(
        controller.toast().map(|toast| toast.text),
        Some(SAVE_FAILED_MESSAGE.to_string())
    );
    assert!(controller.records().is_empty());
}

#[tokio::test]
async fn successful_save_publishes_refresh_event() {
    let (_, controller) = todo_controller();
    let mut events = controller.subscribe();

    add_todo(&controller, "buy milk").await;

    match events.recv().await.unwrap() {
        ControllerEvent::RecordsRefreshed(records) => assert_eq!(records.len(), 1),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn newer_toast_survives_expiry_of_older_one() {
    let (_, controller) = todo_controller();
    let mut events = controller.subscribe();

    add_todo(&controller, "").await;
    tokio::time::advance(Duration::from_millis(600)).await;
    controller.show_toast("second");

    tokio::time::advance(Duration::from_millis(500)).await;
    tokio::task::yield_now().await;
    assert_eq!(
        controller.toast().map(|toast| toast.text),
        Some("second".to_string())
    );

    tokio::time::advance(Duration::from_millis(600)).await;
    tokio::task::yield_now().await;
    assert!(controller.toast().is_none());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    let cleared = seen
        .iter()
        .filter(|event| **event == ControllerEvent::ToastCleared)
        .count();
    assert_eq!(cleared, 1);
}

#[tokio::test]
async fn long_press_during_create_form_does_not_retarget_save() {
    let (_, controller) = todo_controller();
    add_todo(&controller, "existing").await;
    let existing = controller.records()[0].clone();

    controller.open_for_create().unwrap();
    controller.change_field("text", "new item").unwrap();
    assert!(matches!(
        controller.select(&existing),
        Err(ControllerError::Session(SessionError::AlreadyOpen))
    ));
    controller.choose(MenuAction::Cancel).await.unwrap();

    let SaveOutcome::Issued(write) = controller.save().await else {
        panic!("expected issued write");
    };
    assert_eq!(write.id, 1001);
    assert!(write.created);
    let records = controller.store().list(TODO_COLLECTION_KEY).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].payload.get("text"), Some(&json!("existing")));
}

#[tokio::test]
async fn long_press_during_edit_form_keeps_edit_target() {
    let (_, controller) = todo_controller();
    add_todo(&controller, "A").await;
    add_todo(&controller, "B").await;
    let records = controller.store().list(TODO_COLLECTION_KEY).await;
    let (a, b) = (records[0].clone(), records[1].clone());

    controller.open_for_edit(&a).unwrap();
    controller.change_field("text", "A edited").unwrap();
    assert!(controller.select(&b).is_err());
    controller.save().await;

    let a = controller.store().get(TODO_COLLECTION_KEY, a.id).await.unwrap().unwrap();
    let b = controller.store().get(TODO_COLLECTION_KEY, b.id).await.unwrap().unwrap();
    assert_eq!(a.payload.get("text"), Some(&json!("A edited")));
    assert_eq!(b.payload.get("text"), Some(&json!("B")));
}

#[tokio::test]
async fn cancelled_menu_leaves_next_create_untouched() {
    let (_, controller) = todo_controller();
    add_todo(&controller, "kept").await;
    let record = controller.records()[0].clone();

    controller.select(&record).unwrap();
    controller.choose(MenuAction::Cancel).await.unwrap();
    let outcome = add_todo(&controller, "added").await;

    assert!(matches!(outcome, SaveOutcome::Issued(write) if write.id == 1001 && write.created));
    assert_eq!(controller.records().len(), 2);
}

#[tokio::test]
async fn delete_selected_without_menu_choice() {
    let (_, controller) = todo_controller();
    add_todo(&controller, "gone").await;
    let record = controller.records()[0].clone();

    controller.select(&record).unwrap();
    assert_eq!(controller.status(), SessionStatus::Closed);
    assert_eq!(controller.delete_selected().await.unwrap(), 1000);

    assert!(controller.records().is_empty());
    assert_eq!(controller.selected(), None);
    assert!(matches!(
        controller.delete_selected().await,
        Err(ControllerError::Session(SessionError::NothingSelected))
    ));
}

#[tokio::test]
async fn failed_delete_is_surfaced_as_toast() {
    let (backend, controller) = todo_controller();
    add_todo(&controller, "stuck").await;
    backend.set_available(false);

    controller.delete(1000).await;

    assert_eq!(
        controller.toast().map(|toast| toast.text),
        Some(DELETE_FAILED_MESSAGE.to_string())
    );
    backend.set_available(true);
    assert_eq!(controller.store().list(TODO_COLLECTION_KEY).await.len(), 1);
}

/// Memory backend whose calls can be held back and counted.
#[derive(Default)]
struct GatedBackend {
    inner: MemoryBackend,
    list_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    set_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    list_calls: AtomicUsize,
}

impl GatedBackend {
    /// Holds the next `list_by_key` after it has read its snapshot.
    fn gate_next_list(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.list_gates.lock().unwrap().push_back(gate);
        release
    }

    /// Holds the next `set` before it writes.
    fn gate_next_set(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.set_gates.lock().unwrap().push_back(gate);
        release
    }
}

#[async_trait]
impl KvBackend for GatedBackend {
    async fn get(&self, key: &str, id: RecordId) -> BackendResult<Option<Value>> {
        self.inner.get(key, id).await
    }

    async fn set(
        &self,
        key: &str,
        id: RecordId,
        value: Value,
        options: SetOptions,
    ) -> BackendResult<()> {
        let gate = self.set_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.inner.set(key, id, value, options).await
    }

    async fn remove(&self, key: &str, id: RecordId) -> BackendResult<()> {
        self.inner.remove(key, id).await
    }

    async fn list_by_key(&self, key: &str) -> BackendResult<Vec<(RecordId, Value)>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.inner.list_by_key(key).await?;
        let gate = self.list_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(snapshot)
    }
}

fn gated_todo_controller() -> (Arc<GatedBackend>, Arc<TodoController<GatedBackend>>) {
    let backend = Arc::new(GatedBackend::default());
    let store = KeyedCollectionStore::new(Arc::clone(&backend));
    let controller = Arc::new(TodoController::new(
        TodoSchema,
        store,
        &DaybookConfig::default(),
    ));
    (backend, controller)
}

#[tokio::test]
async fn stale_refresh_does_not_overwrite_newer_snapshot() {
    let (backend, controller) = gated_todo_controller();
    let release = backend.gate_next_list();

    let slow = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.refresh().await }
    });
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    backend
        .set(
            TODO_COLLECTION_KEY,
            1000,
            json!({"text": "fresh", "done": false}),
            SetOptions::default(),
        )
        .await
        .unwrap();
    let fast = controller.refresh().await;
    assert_eq!(fast.len(), 1);

    release.send(()).unwrap();
    let slow = slow.await.unwrap();
    assert_eq!(slow.len(), 1);
    assert_eq!(controller.records().len(), 1);
}

#[tokio::test]
async fn create_issued_during_pending_write_gets_its_own_id() {
    let (backend, controller) = gated_todo_controller();
    let release = backend.gate_next_set();

    controller.open_for_create().unwrap();
    controller.change_field("text", "first").unwrap();
    let first = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.save().await }
    });
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert_eq!(controller.status(), SessionStatus::Closed);

    controller.open_for_create().unwrap();
    controller.change_field("text", "second").unwrap();
    let SaveOutcome::Issued(second) = controller.save().await else {
        panic!("expected issued write");
    };

    release.send(()).unwrap();
    let SaveOutcome::Issued(first) = first.await.unwrap() else {
        panic!("expected issued write");
    };

    assert_eq!((first.id, second.id), (1000, 1001));
    let mut texts: Vec<Value> = controller
        .store()
        .list(TODO_COLLECTION_KEY)
        .await
        .into_iter()
        .filter_map(|record| record.payload.get("text").cloned())
        .collect();
    texts.sort_by_key(|text| text.to_string());
    assert_eq!(texts, vec![json!("first"), json!("second")]);
}

#[tokio::test]
async fn rejected_or_closed_save_skips_collection_read() {
    let (backend, controller) = gated_todo_controller();

    assert_eq!(controller.save().await, SaveOutcome::NotOpen);
    controller.open_for_create().unwrap();
    controller.change_field("text", "  ").unwrap();
    assert!(matches!(controller.save().await, SaveOutcome::Rejected(_)));

    assert_eq!(backend.list_calls.load(Ordering::SeqCst), 0);
}
