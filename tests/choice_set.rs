use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};

use hulink::capability::capability_channel;
use hulink::file::{Artwork, ArtworkUploader, UploadError};
use hulink::manager::ManagerState;
use hulink::manager::choice_set::{
    ChoiceCell, ChoiceSet, ChoiceSetError, ChoiceSetManager, ChoiceSetSelectionListener,
    KeyboardListener,
};
use hulink::rpc::messages::{InteractionMode, OnKeyboardInput, TriggerSource};
use hulink::{Frame, FramePayload, FunctionId, RpcSession, RpcType, Transport};

/// Scripted head unit: answers every request synchronously, except
/// interactions it is told to hold open for the test to resolve.
#[derive(Default)]
struct MockHeadUnit {
    session: OnceLock<Arc<RpcSession>>,
    requests: Mutex<Vec<Recorded>>,
    hold_interactions: AtomicBool,
    reject_choice_sets: AtomicU32,
    held: Mutex<Vec<(u32, Value)>>,
}

#[derive(Clone)]
struct Recorded {
    function_id: FunctionId,
    params: Value,
}

impl MockHeadUnit {
    fn respond(&self, correlation_id: u32, function_id: FunctionId, body: Value) {
        let frame = Frame::rpc(
            RpcType::Response,
            1,
            correlation_id,
            function_id,
            Bytes::from(serde_json::to_vec(&body).unwrap()),
            Bytes::new(),
        );
        self.session
            .get()
            .expect("session not wired")
            .handle_frame(frame.encode())
            .unwrap();
    }

    fn notify(&self, function_id: FunctionId, body: Value) {
        let frame = Frame::rpc(
            RpcType::Notification,
            1,
            0,
            function_id,
            Bytes::from(serde_json::to_vec(&body).unwrap()),
            Bytes::new(),
        );
        self.session
            .get()
            .expect("session not wired")
            .handle_frame(frame.encode())
            .unwrap();
    }

    /// Resolve the oldest held interaction with a selection.
    fn complete_interaction(&self, choice_id: u32) {
        let (correlation_id, _) = self.held.lock().unwrap().remove(0);
        self.respond(
            correlation_id,
            FunctionId::PerformInteraction,
            json!({
                "success": true,
                "resultCode": "SUCCESS",
                "choiceID": choice_id,
                "triggerSource": "MENU",
            }),
        );
    }

    fn held_count(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    fn bodies(&self, function_id: FunctionId) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|recorded| recorded.function_id == function_id)
            .map(|recorded| recorded.params.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockHeadUnit {
    async fn send(&self, frame: Bytes) -> std::io::Result<()> {
        let frame = Frame::decode(frame).expect("client sent a malformed frame");
        let correlation_id = frame.header().message_id();
        let FramePayload::Rpc {
            function_id, json, ..
        } = frame.payload()
        else {
            return Ok(());
        };
        let function_id = *function_id;
        let params: Value = if json.is_empty() {
            json!({})
        } else {
            serde_json::from_slice(json).unwrap()
        };
        self.requests.lock().unwrap().push(Recorded {
            function_id,
            params: params.clone(),
        });

        let success = json!({ "success": true, "resultCode": "SUCCESS" });
        match function_id {
            FunctionId::CreateInteractionChoiceSet => {
                let rejected = self
                    .reject_choice_sets
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                        left.checked_sub(1)
                    })
                    .is_ok();
                if rejected {
                    self.respond(
                        correlation_id,
                        function_id,
                        json!({ "success": false, "resultCode": "REJECTED" }),
                    );
                } else {
                    self.respond(correlation_id, function_id, success);
                }
            }
            FunctionId::PerformInteraction => {
                if self.hold_interactions.load(Ordering::SeqCst) {
                    self.held.lock().unwrap().push((correlation_id, params));
                } else {
                    let body = match params["interactionChoiceSetIDList"]
                        .as_array()
                        .and_then(|ids| ids.first())
                        .cloned()
                    {
                        Some(id) => json!({
                            "success": true,
                            "resultCode": "SUCCESS",
                            "choiceID": id,
                            "triggerSource": "MENU",
                        }),
                        None => success,
                    };
                    self.respond(correlation_id, function_id, body);
                }
            }
            FunctionId::CancelInteraction => {
                self.respond(correlation_id, function_id, success);
                let aborted = {
                    let mut held = self.held.lock().unwrap();
                    held.iter()
                        .position(|(_, interaction)| {
                            interaction["cancelID"] == params["cancelID"]
                        })
                        .map(|index| held.remove(index).0)
                };
                if let Some(interaction_id) = aborted {
                    self.respond(
                        interaction_id,
                        FunctionId::PerformInteraction,
                        json!({ "success": false, "resultCode": "ABORTED" }),
                    );
                }
            }
            _ => self.respond(correlation_id, function_id, success),
        }
        Ok(())
    }
}

struct NoopUploader;

#[async_trait]
impl ArtworkUploader for NoopUploader {
    fn needs_upload(&self, _artwork: &Artwork) -> bool {
        false
    }

    async fn upload(&self, _artworks: Vec<Artwork>) -> Vec<Result<(), UploadError>> {
        Vec::new()
    }
}

#[derive(Default)]
struct RecordingListener {
    selected: Mutex<Vec<(String, usize)>>,
    errors: Mutex<Vec<String>>,
}

impl ChoiceSetSelectionListener for RecordingListener {
    fn on_choice_selected(&self, cell: &ChoiceCell, _trigger: TriggerSource, row_index: usize) {
        self.selected
            .lock()
            .unwrap()
            .push((cell.text().to_owned(), row_index));
    }

    fn on_error(&self, error: &ChoiceSetError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

#[derive(Default)]
struct RecordingKeyboard {
    events: Mutex<Vec<OnKeyboardInput>>,
}

impl KeyboardListener for RecordingKeyboard {
    fn on_keyboard_event(&self, event: &OnKeyboardInput) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn fixture() -> (Arc<ChoiceSetManager>, Arc<MockHeadUnit>) {
    let head_unit = Arc::new(MockHeadUnit::default());
    let session = RpcSession::new(head_unit.clone(), 1);
    head_unit.session.set(Arc::clone(&session)).ok();
    let (_capability_tx, capability) = capability_channel();
    let manager = Arc::new(ChoiceSetManager::new(
        session,
        Arc::new(NoopUploader),
        capability,
    ));
    (manager, head_unit)
}

async fn ready_fixture() -> (Arc<ChoiceSetManager>, Arc<MockHeadUnit>) {
    let (manager, head_unit) = fixture();
    manager.start().await.unwrap();
    (manager, head_unit)
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

fn choice_set_ids(params: &Value) -> Vec<u64> {
    params["choiceSet"]
        .as_array()
        .unwrap()
        .iter()
        .map(|choice| choice["choiceID"].as_u64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_start_probes_with_throwaway_set() {
    let (manager, head_unit) = ready_fixture().await;
    assert_eq!(manager.state(), ManagerState::Ready);

    let uploads = head_unit.bodies(FunctionId::CreateInteractionChoiceSet);
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0]["interactionChoiceSetID"], 0);
    // Voice is optional, so the probe carries no voice commands.
    assert!(uploads[0]["choiceSet"][0].get("vrCommands").is_none());

    let deletes = head_unit.bodies(FunctionId::DeleteInteractionChoiceSet);
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0]["interactionChoiceSetID"], 0);
}

#[tokio::test]
async fn test_preload_assigns_monotonic_ids_and_dedups() {
    let (manager, head_unit) = ready_fixture().await;
    let coffee = ChoiceCell::new("Coffee");
    let tea = ChoiceCell::new("Tea");

    manager
        .preload_choices(vec![coffee.clone(), tea.clone()])
        .await
        .unwrap();
    // An equal cell is already on the head unit; only Juice uploads.
    manager
        .preload_choices(vec![ChoiceCell::new("Coffee"), ChoiceCell::new("Juice")])
        .await
        .unwrap();

    let uploads = head_unit.bodies(FunctionId::CreateInteractionChoiceSet);
    let ids: Vec<u64> = uploads
        .iter()
        .skip(1) // probe
        .map(|body| body["interactionChoiceSetID"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, [1, 2, 3]);
    assert_eq!(manager.preloaded_choices().len(), 3);
}

#[tokio::test]
async fn test_ids_never_reused_after_delete() {
    let (manager, head_unit) = ready_fixture().await;
    let coffee = ChoiceCell::new("Coffee");

    manager.preload_choices(vec![coffee.clone()]).await.unwrap();
    manager.delete_choices(vec![coffee.clone()]).await.unwrap();
    manager.preload_choices(vec![coffee]).await.unwrap();

    let deletes = head_unit.bodies(FunctionId::DeleteInteractionChoiceSet);
    assert_eq!(deletes.last().unwrap()["interactionChoiceSetID"], 1);

    let uploads = head_unit.bodies(FunctionId::CreateInteractionChoiceSet);
    let ids: Vec<u64> = uploads
        .iter()
        .skip(1)
        .map(|body| body["interactionChoiceSetID"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, [1, 2]);
}

#[tokio::test]
async fn test_voice_mandatory_adds_fallback_commands() {
    let (manager, head_unit) = fixture();
    // First probe (no voice) is rejected, the retry succeeds.
    head_unit.reject_choice_sets.store(1, Ordering::SeqCst);
    manager.start().await.unwrap();

    manager
        .preload_choices(vec![ChoiceCell::new("Coffee")])
        .await
        .unwrap();

    let uploads = head_unit.bodies(FunctionId::CreateInteractionChoiceSet);
    let coffee = uploads
        .iter()
        .find(|body| body["interactionChoiceSetID"] == 1)
        .unwrap();
    // The synthetic voice command is the choice ID rendered as text.
    assert_eq!(coffee["choiceSet"][0]["vrCommands"], json!(["1"]));
}

#[tokio::test]
async fn test_present_reports_selection_with_row_index() {
    let (manager, head_unit) = ready_fixture().await;
    let listener = Arc::new(RecordingListener::default());
    let set = ChoiceSet::new(
        "Drinks",
        vec![ChoiceCell::new("Coffee"), ChoiceCell::new("Tea")],
        listener.clone(),
    );

    manager
        .present_choice_set(set, InteractionMode::ManualOnly, None)
        .await
        .unwrap();

    let presents = head_unit.bodies(FunctionId::PerformInteraction);
    assert_eq!(presents.len(), 1);
    assert_eq!(presents[0]["interactionChoiceSetIDList"], json!([1, 2]));
    assert_eq!(presents[0]["initialText"], "Drinks");

    let uploads = head_unit.bodies(FunctionId::CreateInteractionChoiceSet);
    assert_eq!(choice_set_ids(&uploads[1]), [1]);

    assert_eq!(
        listener.selected.lock().unwrap().as_slice(),
        [("Coffee".to_owned(), 0)]
    );
    assert!(listener.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_newer_presentation_supersedes_pending_one() {
    let (manager, head_unit) = ready_fixture().await;
    head_unit.hold_interactions.store(true, Ordering::SeqCst);

    let first_listener = Arc::new(RecordingListener::default());
    let first_set = ChoiceSet::new(
        "First",
        vec![ChoiceCell::new("Coffee")],
        first_listener.clone(),
    );
    let first = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .present_choice_set(first_set, InteractionMode::ManualOnly, None)
                .await
        })
    };
    wait_until("first interaction on screen", || head_unit.held_count() == 1).await;

    let second_listener = Arc::new(RecordingListener::default());
    let second_set = ChoiceSet::new(
        "Second",
        vec![ChoiceCell::new("Tea")],
        second_listener.clone(),
    );
    let second = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .present_choice_set(second_set, InteractionMode::ManualOnly, None)
                .await
        })
    };

    assert!(matches!(
        first.await.unwrap(),
        Err(ChoiceSetError::Canceled)
    ));
    assert_eq!(first_listener.errors.lock().unwrap().len(), 1);

    wait_until("second interaction on screen", || {
        head_unit.held_count() == 1
    })
    .await;
    head_unit.complete_interaction(2);
    second.await.unwrap().unwrap();
    assert_eq!(
        second_listener.selected.lock().unwrap().as_slice(),
        [("Tea".to_owned(), 0)]
    );
}

#[tokio::test]
async fn test_delete_cancels_presentation_referencing_cells() {
    let (manager, head_unit) = ready_fixture().await;
    head_unit.hold_interactions.store(true, Ordering::SeqCst);

    let listener = Arc::new(RecordingListener::default());
    let set = ChoiceSet::new("Drinks", vec![ChoiceCell::new("Coffee")], listener.clone());
    let present = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .present_choice_set(set, InteractionMode::ManualOnly, None)
                .await
        })
    };
    wait_until("interaction on screen", || head_unit.held_count() == 1).await;

    manager
        .delete_choices(vec![ChoiceCell::new("Coffee")])
        .await
        .unwrap();

    assert!(matches!(
        present.await.unwrap(),
        Err(ChoiceSetError::Canceled)
    ));
    assert_eq!(listener.errors.lock().unwrap().len(), 1);
    assert!(manager.preloaded_choices().is_empty());
    assert_eq!(head_unit.bodies(FunctionId::CancelInteraction).len(), 1);
}

#[tokio::test]
async fn test_failed_probe_leaves_manager_unusable() {
    let (manager, head_unit) = fixture();
    head_unit.reject_choice_sets.store(u32::MAX, Ordering::SeqCst);

    assert!(matches!(
        manager.start().await,
        Err(ChoiceSetError::Request { .. })
    ));
    assert_eq!(manager.state(), ManagerState::Error);

    assert!(matches!(
        manager.preload_choices(vec![ChoiceCell::new("Coffee")]).await,
        Err(ChoiceSetError::ManagerUnusable { .. })
    ));
    assert!(matches!(
        manager.present_keyboard("Search", Arc::new(RecordingKeyboard::default())),
        Err(ChoiceSetError::ManagerUnusable { .. })
    ));
}

#[tokio::test]
async fn test_keyboard_streams_events_and_dismisses() {
    let (manager, head_unit) = ready_fixture().await;
    head_unit.hold_interactions.store(true, Ordering::SeqCst);

    let listener = Arc::new(RecordingKeyboard::default());
    let cancel_id = manager
        .present_keyboard("Search", listener.clone())
        .unwrap();

    wait_until("keyboard on screen", || head_unit.held_count() == 1).await;
    let presents = head_unit.bodies(FunctionId::PerformInteraction);
    assert_eq!(presents[0]["interactionLayout"], "KEYBOARD");
    assert_eq!(presents[0]["interactionChoiceSetIDList"], json!([]));
    assert_eq!(presents[0]["cancelID"], cancel_id);

    head_unit.notify(
        FunctionId::OnKeyboardInput,
        json!({ "event": "KEYPRESS_EVENT", "data": "c" }),
    );
    wait_until("keyboard event forwarded", || {
        !listener.events.lock().unwrap().is_empty()
    })
    .await;
    assert_eq!(listener.events.lock().unwrap()[0].data.as_deref(), Some("c"));

    manager.dismiss_keyboard(cancel_id);
    wait_until("keyboard dismissed", || head_unit.held_count() == 0).await;
    let cancels = head_unit.bodies(FunctionId::CancelInteraction);
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0]["cancelID"], cancel_id);
}

#[tokio::test]
async fn test_new_keyboard_supersedes_previous_one() {
    let (manager, head_unit) = ready_fixture().await;
    head_unit.hold_interactions.store(true, Ordering::SeqCst);

    let first_listener = Arc::new(RecordingKeyboard::default());
    let first = manager.present_keyboard("One", first_listener).unwrap();
    wait_until("first keyboard on screen", || head_unit.held_count() == 1).await;

    let second_listener = Arc::new(RecordingKeyboard::default());
    let second = manager.present_keyboard("Two", second_listener).unwrap();
    assert_ne!(first, second);

    wait_until("second keyboard on screen", || {
        head_unit
            .held
            .lock()
            .unwrap()
            .first()
            .is_some_and(|(_, params)| params["initialText"] == "Two")
    })
    .await;

    let cancels = head_unit.bodies(FunctionId::CancelInteraction);
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0]["cancelID"], first);
}

#[tokio::test]
async fn test_empty_keyboard_text_rejected_synchronously() {
    let (manager, head_unit) = ready_fixture().await;
    assert!(matches!(
        manager.present_keyboard("", Arc::new(RecordingKeyboard::default())),
        Err(ChoiceSetError::EmptyInitialText)
    ));
    assert!(head_unit.bodies(FunctionId::PerformInteraction).is_empty());
}

#[tokio::test]
async fn test_back_to_back_presentations_keep_only_the_newest() {
    let (manager, head_unit) = ready_fixture().await;
    manager
        .preload_choices(vec![ChoiceCell::new("Coffee"), ChoiceCell::new("Tea")])
        .await
        .unwrap();

    let first_listener = Arc::new(RecordingListener::default());
    let first_set = ChoiceSet::new(
        "First",
        vec![ChoiceCell::new("Coffee")],
        first_listener.clone(),
    );
    let second_listener = Arc::new(RecordingListener::default());
    let second_set = ChoiceSet::new(
        "Second",
        vec![ChoiceCell::new("Tea")],
        second_listener.clone(),
    );

    // Queue both before either reaches the screen; the second must win.
    let first = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .present_choice_set(first_set, InteractionMode::ManualOnly, None)
                .await
        })
    };
    let second = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .present_choice_set(second_set, InteractionMode::ManualOnly, None)
                .await
        })
    };

    assert!(matches!(first.await.unwrap(), Err(ChoiceSetError::Canceled)));
    assert_eq!(first_listener.errors.lock().unwrap().len(), 1);

    second.await.unwrap().unwrap();
    assert_eq!(
        second_listener.selected.lock().unwrap().as_slice(),
        [("Tea".to_owned(), 0)]
    );

    // The superseded presentation never reached the screen.
    let presents = head_unit.bodies(FunctionId::PerformInteraction);
    assert_eq!(presents.len(), 1);
    assert_eq!(presents[0]["initialText"], "Second");
}

#[tokio::test]
async fn test_present_surfaces_implicit_preload_failure() {
    let (manager, head_unit) = ready_fixture().await;
    head_unit.reject_choice_sets.store(1, Ordering::SeqCst);

    let listener = Arc::new(RecordingListener::default());
    let set = ChoiceSet::new("Drinks", vec![ChoiceCell::new("Coffee")], listener.clone());

    assert!(matches!(
        manager
            .present_choice_set(set, InteractionMode::ManualOnly, None)
            .await,
        Err(ChoiceSetError::Request { .. })
    ));
    // The listener hears about the failure even though the interaction
    // itself never ran.
    assert_eq!(listener.errors.lock().unwrap().len(), 1);
    assert!(head_unit.bodies(FunctionId::PerformInteraction).is_empty());
}

#[tokio::test]
async fn test_hmi_none_suspends_queued_work() {
    let (manager, head_unit) = ready_fixture().await;

    head_unit.notify(
        FunctionId::OnHmiStatus,
        json!({ "hmiLevel": "NONE", "systemContext": "MAIN" }),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;

    let preload = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager.preload_choices(vec![ChoiceCell::new("Coffee")]).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Only the startup check has reached the head unit so far.
    assert_eq!(
        head_unit.bodies(FunctionId::CreateInteractionChoiceSet).len(),
        1
    );

    head_unit.notify(
        FunctionId::OnHmiStatus,
        json!({ "hmiLevel": "FULL", "systemContext": "MAIN" }),
    );
    preload.await.unwrap().unwrap();
    assert_eq!(
        head_unit.bodies(FunctionId::CreateInteractionChoiceSet).len(),
        2
    );
}

#[tokio::test]
async fn test_dispose_rejects_further_calls() {
    let (manager, _head_unit) = ready_fixture().await;
    manager.dispose();
    assert_eq!(manager.state(), ManagerState::Disposed);
    assert!(matches!(
        manager.preload_choices(vec![ChoiceCell::new("Coffee")]).await,
        Err(ChoiceSetError::ManagerUnusable { .. })
    ));
}
