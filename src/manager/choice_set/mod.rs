//! Choice-set manager
//!
//! Owns the cells known to the head unit, assigns their IDs, and
//! serializes every preload, delete, and presentation through one
//! operation queue. Cells are tracked by value: preloading a cell the
//! head unit already has costs nothing, and IDs are never reused within
//! a session even after a delete.

mod cell;
mod error;
mod operations;

pub use cell::{
    ChoiceCell, ChoiceSet, ChoiceSetLayout, ChoiceSetSelectionListener, KeyboardListener,
    MAX_TIMEOUT, MIN_TIMEOUT,
};
pub use error::{ChoiceSetError, ChoiceValidationError, Result};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::capability::CapabilityReceiver;
use crate::file::ArtworkUploader;
use crate::manager::{ManagerLifecycle, ManagerState, OperationHandle, OperationQueue, OperationState};
use crate::protocol::FunctionId;
use crate::rpc::RpcNotification;
use crate::rpc::messages::{HmiLevel, InteractionMode, KeyboardProperties, OnHmiStatus};
use crate::session::RpcSession;

use operations::{
    CheckVoiceOptionalOperation, DeleteChoicesOperation, PreloadChoicesOperation,
    PresentChoiceSetOperation, PresentKeyboardOperation, SearchableKeyboard,
};

/// Choice-set ID of the throwaway voice probe; real IDs start at 1.
const PROBE_SET_ID: u32 = 0;

/// State shared between the manager facade and its queued operations.
struct ChoiceCtx {
    session: Arc<RpcSession>,
    uploader: Arc<dyn ArtworkUploader>,
    inventory: Mutex<Inventory>,
    /// Whether the head unit accepts choices without voice commands
    vr_optional: AtomicBool,
    capability: CapabilityReceiver,
}

/// Everything the manager tracks about head-unit state, under one lock.
#[derive(Default)]
struct Inventory {
    /// Cells confirmed on the head unit, by content
    preloaded: HashMap<ChoiceCell, u32>,
    /// Cells with an assigned ID whose upload has not completed.
    /// Operations treat this map as the source of truth at run time, so
    /// removing an entry here strips it from any queued preload.
    pending_preload: HashMap<ChoiceCell, u32>,
    /// The one presentation queued or on screen, if any
    pending_set: Option<PendingSet>,
    /// Keyboard interactions queued or on screen
    keyboards: Vec<KeyboardEntry>,
}

struct PendingSet {
    cancel_id: u32,
    cells: Vec<ChoiceCell>,
    handle: OperationHandle,
    listener: Arc<dyn ChoiceSetSelectionListener>,
}

struct KeyboardEntry {
    cancel_id: u32,
    handle: OperationHandle,
    dismiss: watch::Sender<bool>,
}

/// High-level manager for interaction choice sets and keyboards.
///
/// Construct with [`ChoiceSetManager::new`], then call
/// [`start`](ChoiceSetManager::start) once to probe head-unit voice
/// requirements before other calls are accepted for execution.
pub struct ChoiceSetManager {
    ctx: Arc<ChoiceCtx>,
    queue: Arc<OperationQueue>,
    lifecycle: ManagerLifecycle,
    next_choice_id: AtomicU32,
    next_cancel_id: AtomicU32,
    keyboard_properties: Mutex<KeyboardProperties>,
    hmi_watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ChoiceSetManager {
    /// Create the manager. Requires a running tokio runtime.
    #[must_use]
    pub fn new(
        session: Arc<RpcSession>,
        uploader: Arc<dyn ArtworkUploader>,
        capability: CapabilityReceiver,
    ) -> Self {
        let ctx = Arc::new(ChoiceCtx {
            session: Arc::clone(&session),
            uploader,
            inventory: Mutex::new(Inventory::default()),
            vr_optional: AtomicBool::new(true),
            capability,
        });
        let queue = Arc::new(OperationQueue::new("choice_set"));
        let watcher = tokio::spawn(watch_hmi(session.notifications(), Arc::clone(&queue)));

        Self {
            ctx,
            queue,
            lifecycle: ManagerLifecycle::new("choice_set"),
            next_choice_id: AtomicU32::new(1),
            next_cancel_id: AtomicU32::new(1),
            keyboard_properties: Mutex::new(KeyboardProperties::default()),
            hmi_watcher: Mutex::new(Some(watcher)),
        }
    }

    /// Probe the head unit and move to `Ready`, or to `Error` when the
    /// probe fails outright. Call once after construction.
    pub async fn start(&self) -> Result<()> {
        let state = self.lifecycle.state();
        if state != ManagerState::SettingUp {
            return Err(ChoiceSetError::ManagerUnusable { state });
        }

        let (tx, rx) = oneshot::channel();
        self.queue.enqueue(CheckVoiceOptionalOperation {
            ctx: Arc::clone(&self.ctx),
            result: Some(tx),
        });

        match rx.await.map_err(|_| ChoiceSetError::Canceled).and_then(|r| r) {
            Ok(vr_optional) => {
                debug!(vr_optional, "choice set manager ready");
                self.lifecycle.transition(ManagerState::Ready);
                Ok(())
            }
            Err(err) => {
                self.lifecycle.transition(ManagerState::Error);
                self.queue.cancel_all();
                Err(err)
            }
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ManagerState {
        self.lifecycle.state()
    }

    /// Cells currently confirmed on the head unit
    #[must_use]
    pub fn preloaded_choices(&self) -> Vec<ChoiceCell> {
        self.ctx
            .inventory
            .lock()
            .expect("inventory lock poisoned")
            .preloaded
            .keys()
            .cloned()
            .collect()
    }

    /// Upload `cells` to the head unit ahead of presentation.
    ///
    /// Cells already preloaded (by value) or already pending are not
    /// sent again; an empty remainder resolves immediately without
    /// queueing anything.
    pub async fn preload_choices(&self, cells: Vec<ChoiceCell>) -> Result<()> {
        self.ensure_usable()?;
        let Some(batch) = self.stage_preload(&cells) else {
            return Ok(());
        };
        debug!(count = batch.len(), "preloading choices");
        self.await_outcome(self.enqueue_preload(batch)).await
    }

    /// Remove `cells` from the head unit.
    ///
    /// Cells still waiting in a queued preload are stripped from it
    /// without wire traffic. If the pending presentation references any
    /// of the cells it is cancelled and its listener told.
    pub async fn delete_choices(&self, cells: Vec<ChoiceCell>) -> Result<()> {
        self.ensure_usable()?;

        {
            let mut inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
            for cell in &cells {
                inventory.pending_preload.remove(cell);
            }
            let references_pending = inventory
                .pending_set
                .as_ref()
                .is_some_and(|pending| pending.cells.iter().any(|cell| cells.contains(cell)));
            if references_pending {
                warn!("deleting choices referenced by the pending presentation, cancelling it");
                Self::cancel_pending_set(&mut inventory);
            }
        }

        let (tx, rx) = oneshot::channel();
        self.queue.enqueue(DeleteChoicesOperation {
            ctx: Arc::clone(&self.ctx),
            cells,
            result: Some(tx),
        });
        self.await_outcome(rx).await
    }

    /// Present `set` for user selection and report the outcome through
    /// the set's listener as well as the returned result.
    ///
    /// Missing cells are preloaded first. Only one presentation may be
    /// queued or on screen; a newer one supersedes the old, which is
    /// cancelled and reported to its listener as such.
    pub async fn present_choice_set(
        &self,
        set: ChoiceSet,
        mode: InteractionMode,
        keyboard_listener: Option<Arc<dyn KeyboardListener>>,
    ) -> Result<()> {
        self.ensure_usable()?;
        set.validate()?;

        let preload_rx = self
            .stage_preload(set.choices())
            .map(|batch| self.enqueue_preload(batch));

        let cancel_id = self.next_cancel_id.fetch_add(1, Ordering::Relaxed);
        let keyboard = keyboard_listener.map(|listener| SearchableKeyboard {
            properties: self
                .keyboard_properties
                .lock()
                .expect("keyboard properties lock poisoned")
                .clone(),
            listener,
        });

        let (tx, rx) = oneshot::channel();
        let handle = self.queue.enqueue(PresentChoiceSetOperation {
            ctx: Arc::clone(&self.ctx),
            set: set.clone(),
            mode,
            keyboard,
            cancel_id,
            result: Some(tx),
        });

        // Supersede and install under one lock so two racing calls
        // cannot both see an empty slot and leave one presentation
        // untracked.
        {
            let mut inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
            if inventory.pending_set.is_some() {
                warn!("superseding pending choice set presentation");
                Self::cancel_pending_set(&mut inventory);
            }
            inventory.pending_set = Some(PendingSet {
                cancel_id,
                cells: set.choices().to_vec(),
                handle: handle.clone(),
                listener: set.listener(),
            });
        }

        if let Some(preload_rx) = preload_rx {
            if let Err(err) = self.await_outcome(preload_rx).await {
                {
                    let mut inventory =
                        self.ctx.inventory.lock().expect("inventory lock poisoned");
                    if inventory
                        .pending_set
                        .as_ref()
                        .is_some_and(|pending| pending.cancel_id == cancel_id)
                    {
                        inventory.pending_set = None;
                    }
                }
                handle.cancel();
                set.listener().on_error(&err);
                return Err(err);
            }
        }

        self.await_outcome(rx).await
    }

    /// Present a free-standing keyboard. Returns immediately with the
    /// cancel ID that dismisses it; keyboard events stream to
    /// `listener` once the interaction reaches the screen.
    ///
    /// At most one interaction may be outstanding: a pending
    /// presentation or earlier keyboard is cancelled first.
    pub fn present_keyboard(
        &self,
        initial_text: impl Into<String>,
        listener: Arc<dyn KeyboardListener>,
    ) -> Result<u32> {
        self.ensure_usable()?;
        let initial_text = initial_text.into();
        if initial_text.is_empty() {
            return Err(ChoiceSetError::EmptyInitialText);
        }

        {
            let mut inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
            if inventory.pending_set.is_some() {
                warn!("keyboard supersedes the pending choice set presentation");
                Self::cancel_pending_set(&mut inventory);
            }
            Self::dismiss_all_keyboards(&mut inventory);
        }

        let cancel_id = self.next_cancel_id.fetch_add(1, Ordering::Relaxed);
        let (dismiss_tx, dismiss_rx) = watch::channel(false);
        let handle = self.queue.enqueue(PresentKeyboardOperation {
            ctx: Arc::clone(&self.ctx),
            initial_text,
            properties: self
                .keyboard_properties
                .lock()
                .expect("keyboard properties lock poisoned")
                .clone(),
            listener,
            cancel_id,
            dismiss: dismiss_rx,
        });

        self.ctx
            .inventory
            .lock()
            .expect("inventory lock poisoned")
            .keyboards
            .push(KeyboardEntry {
                cancel_id,
                handle,
                dismiss: dismiss_tx,
            });
        Ok(cancel_id)
    }

    /// Dismiss the keyboard presented under `cancel_id`. A keyboard
    /// still waiting in the queue is dropped without wire traffic; an
    /// unknown or already-finished ID is a no-op.
    pub fn dismiss_keyboard(&self, cancel_id: u32) {
        let mut inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
        let Some(index) = inventory
            .keyboards
            .iter()
            .position(|entry| entry.cancel_id == cancel_id)
        else {
            debug!(cancel_id, "dismiss for unknown keyboard ignored");
            return;
        };

        match inventory.keyboards[index].handle.state() {
            OperationState::Pending => {
                let entry = inventory.keyboards.remove(index);
                entry.handle.cancel();
            }
            OperationState::InProgress => {
                inventory.keyboards[index].dismiss.send_replace(true);
            }
            _ => {}
        }
    }

    /// Keyboard configuration applied to subsequent keyboard and
    /// searchable interactions.
    pub fn set_keyboard_configuration(&self, properties: KeyboardProperties) {
        *self
            .keyboard_properties
            .lock()
            .expect("keyboard properties lock poisoned") = properties;
    }

    /// Tear the manager down: cancel everything queued or on screen and
    /// reject all further calls.
    pub fn dispose(&self) {
        if !self.lifecycle.transition(ManagerState::Disposed) {
            return;
        }
        if let Some(watcher) = self
            .hmi_watcher
            .lock()
            .expect("watcher lock poisoned")
            .take()
        {
            watcher.abort();
        }
        self.queue.close();

        let mut inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
        Self::cancel_pending_set(&mut inventory);
        inventory.pending_set = None;
        inventory.keyboards.clear();
        inventory.pending_preload.clear();
        inventory.preloaded.clear();
    }

    fn ensure_usable(&self) -> Result<()> {
        let state = self.lifecycle.state();
        if state.accepts_operations() {
            Ok(())
        } else {
            Err(ChoiceSetError::ManagerUnusable { state })
        }
    }

    /// Cancel the tracked presentation, if any. A presentation that
    /// never started runs no cleanup of its own, so its listener is
    /// told here; an in-progress one reports through its own unwind.
    fn cancel_pending_set(inventory: &mut Inventory) {
        let Some(pending) = inventory.pending_set.take() else {
            return;
        };
        let was_pending = pending.handle.state() == OperationState::Pending;
        pending.handle.cancel();
        if was_pending {
            pending.listener.on_error(&ChoiceSetError::Canceled);
        } else {
            inventory.pending_set = Some(pending);
        }
    }

    /// Dismiss every tracked keyboard: queued ones are dropped in
    /// place, the on-screen one is told to cancel its interaction and
    /// removes its own entry when it unwinds.
    fn dismiss_all_keyboards(inventory: &mut Inventory) {
        inventory.keyboards.retain(|entry| {
            if entry.handle.state() == OperationState::Pending {
                entry.handle.cancel();
                false
            } else {
                entry.dismiss.send_replace(true);
                true
            }
        });
    }

    /// Assign IDs to the not-yet-known cells of `cells` and record them
    /// as pending. Returns `None` when nothing needs uploading.
    fn stage_preload(&self, cells: &[ChoiceCell]) -> Option<Vec<ChoiceCell>> {
        let mut inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
        let mut seen = HashSet::new();
        let mut batch = Vec::new();
        for cell in cells {
            if inventory.preloaded.contains_key(cell)
                || inventory.pending_preload.contains_key(cell)
                || !seen.insert(cell.clone())
            {
                continue;
            }
            let id = self.next_choice_id.fetch_add(1, Ordering::Relaxed);
            inventory.pending_preload.insert(cell.clone(), id);
            batch.push(cell.clone());
        }
        if batch.is_empty() { None } else { Some(batch) }
    }

    fn enqueue_preload(&self, batch: Vec<ChoiceCell>) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        self.queue.enqueue(PreloadChoicesOperation {
            ctx: Arc::clone(&self.ctx),
            cells: batch,
            result: Some(tx),
        });
        rx
    }

    /// A dropped sender means the operation was skipped after a
    /// cancellation, which callers observe as `Canceled`.
    async fn await_outcome(&self, rx: oneshot::Receiver<Result<()>>) -> Result<()> {
        rx.await.map_err(|_| ChoiceSetError::Canceled)?
    }
}

impl Drop for ChoiceSetManager {
    fn drop(&mut self) {
        if let Some(watcher) = self
            .hmi_watcher
            .lock()
            .expect("watcher lock poisoned")
            .take()
        {
            watcher.abort();
        }
    }
}

/// Suspend the queue while the app has no HMI presence; work enqueued
/// meanwhile stays pending and runs when the app returns.
async fn watch_hmi(
    mut notifications: broadcast::Receiver<RpcNotification>,
    queue: Arc<OperationQueue>,
) {
    loop {
        match notifications.recv().await {
            Ok(notification) if notification.function_id == FunctionId::OnHmiStatus => {
                match notification.typed_params::<OnHmiStatus>() {
                    Ok(status) => {
                        queue.set_suspended(status.hmi_level == HmiLevel::None);
                    }
                    Err(err) => warn!(%err, "dropping unparseable hmi status"),
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "hmi status subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
