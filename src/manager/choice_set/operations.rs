//! Queued operations behind the choice-set manager
//!
//! Each public manager call becomes one operation on the manager's
//! queue. Operations re-read the shared inventory when they start
//! running, not when they were enqueued, so a delete queued behind a
//! preload strips the preload's cells before they ever hit the wire.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use crate::manager::{CancelToken, Operation};
use crate::protocol::FunctionId;
use crate::rpc::RpcResponse;
use crate::rpc::messages::{
    CancelInteraction, Choice, CreateInteractionChoiceSet, DeleteInteractionChoiceSet,
    InteractionMode, KeyboardProperties, LayoutMode, PerformInteraction,
    PerformInteractionResponse, SetGlobalProperties,
};

use super::cell::{ChoiceCell, ChoiceSet, KeyboardListener};
use super::error::ChoiceSetError;
use super::{ChoiceCtx, PROBE_SET_ID};

fn request_err(response: &RpcResponse) -> ChoiceSetError {
    ChoiceSetError::Request {
        code: response.result_code,
        info: response.info.clone(),
    }
}

/// Capability probe: determines whether the head unit accepts choices
/// without voice commands.
///
/// Runs first on a fresh queue. A throwaway choice set is uploaded
/// without voice commands; acceptance means voice is optional, a
/// rejection is retried with a synthetic voice command to distinguish
/// "voice mandatory" from "head unit broken".
pub(super) struct CheckVoiceOptionalOperation {
    pub ctx: Arc<ChoiceCtx>,
    pub result: Option<oneshot::Sender<Result<bool, ChoiceSetError>>>,
}

impl CheckVoiceOptionalOperation {
    async fn probe(&self, vr_commands: Option<Vec<String>>) -> Result<(), ChoiceSetError> {
        let body = CreateInteractionChoiceSet {
            interaction_choice_set_id: PROBE_SET_ID,
            choice_set: vec![Choice {
                choice_id: PROBE_SET_ID,
                menu_name: "Test Cell".into(),
                secondary_text: None,
                tertiary_text: None,
                vr_commands,
                image: None,
                secondary_image: None,
            }],
        };
        let response = self
            .ctx
            .session
            .send_request_body(FunctionId::CreateInteractionChoiceSet, &body)
            .await?;
        if !response.success {
            return Err(request_err(&response));
        }

        // Best effort; a stranded probe set only wastes one head-unit ID.
        let delete = DeleteInteractionChoiceSet {
            interaction_choice_set_id: PROBE_SET_ID,
        };
        if let Err(err) = self
            .ctx
            .session
            .send_request_body(FunctionId::DeleteInteractionChoiceSet, &delete)
            .await
        {
            warn!(%err, "failed to delete voice-probe choice set");
        }
        Ok(())
    }

    async fn execute(&self) -> Result<bool, ChoiceSetError> {
        match self.probe(None).await {
            Ok(()) => Ok(true),
            Err(ChoiceSetError::Session(err)) => Err(ChoiceSetError::Session(err)),
            Err(first) => {
                debug!(%first, "voiceless probe rejected, retrying with voice command");
                self.probe(Some(vec!["Test VR".into()])).await?;
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl Operation for CheckVoiceOptionalOperation {
    fn name(&self) -> &str {
        "check_voice_optional"
    }

    async fn run(&mut self, token: &CancelToken) {
        if token.is_canceled() {
            return;
        }
        let outcome = self.execute().await;
        if let Ok(optional) = outcome {
            self.ctx.vr_optional.store(optional, Ordering::Release);
        }
        if let Some(result) = self.result.take() {
            let _ = result.send(outcome);
        }
    }
}

/// Upload a batch of cells, one choice set per cell.
pub(super) struct PreloadChoicesOperation {
    pub ctx: Arc<ChoiceCtx>,
    pub cells: Vec<ChoiceCell>,
    pub result: Option<oneshot::Sender<Result<(), ChoiceSetError>>>,
}

impl PreloadChoicesOperation {
    /// Cells of this batch still awaiting preload, with their IDs.
    /// A delete queued after the preload may have stripped some.
    fn remaining(&self) -> Vec<(ChoiceCell, u32)> {
        let inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
        self.cells
            .iter()
            .filter_map(|cell| {
                inventory
                    .pending_preload
                    .get(cell)
                    .map(|id| (cell.clone(), *id))
            })
            .collect()
    }

    async fn upload_artworks(&self, batch: &[(ChoiceCell, u32)]) -> Result<(), ChoiceSetError> {
        let mut artworks = Vec::new();
        for (cell, _) in batch {
            for artwork in [cell.artwork(), cell.secondary_artwork()]
                .into_iter()
                .flatten()
            {
                if self.ctx.uploader.needs_upload(artwork) && !artworks.contains(artwork) {
                    artworks.push(artwork.clone());
                }
            }
        }
        if artworks.is_empty() {
            return Ok(());
        }

        let outcomes = self.ctx.uploader.upload(artworks).await;
        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        if failed > 0 {
            for err in outcomes.into_iter().filter_map(Result::err) {
                warn!(%err, "choice artwork upload failed");
            }
            return Err(ChoiceSetError::UploadFailed { failed });
        }
        Ok(())
    }

    fn build_choice(&self, cell: &ChoiceCell, id: u32) -> Choice {
        let vr_fallback = if self.ctx.vr_optional.load(Ordering::Acquire)
            || cell.voice_commands().is_some()
        {
            None
        } else {
            Some(id.to_string())
        };
        let mut choice = cell.to_choice(id, vr_fallback);

        // Fields the window cannot render are stripped rather than sent
        // for the head unit to reject.
        if let Some(capability) = self.ctx.capability.borrow().as_ref() {
            if !capability.supports_choice_images {
                choice.image = None;
                choice.secondary_image = None;
            }
            if !capability.supports_secondary_text {
                choice.secondary_text = None;
                choice.tertiary_text = None;
            }
        }
        choice
    }

    async fn execute(&self, token: &CancelToken) -> Result<(), ChoiceSetError> {
        let batch = self.remaining();
        if batch.is_empty() {
            return Ok(());
        }

        self.upload_artworks(&batch).await.inspect_err(|_| {
            let mut inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
            for (cell, _) in &batch {
                inventory.pending_preload.remove(cell);
            }
        })?;

        let mut first_failure = None;
        for (cell, id) in batch {
            if token.is_canceled() {
                return Err(ChoiceSetError::Canceled);
            }
            // The delete may have stripped this cell while an earlier
            // upload in the same batch was in flight.
            if !self
                .ctx
                .inventory
                .lock()
                .expect("inventory lock poisoned")
                .pending_preload
                .contains_key(&cell)
            {
                continue;
            }

            let body = CreateInteractionChoiceSet {
                interaction_choice_set_id: id,
                choice_set: vec![self.build_choice(&cell, id)],
            };
            let response = self
                .ctx
                .session
                .send_request_body(FunctionId::CreateInteractionChoiceSet, &body)
                .await?;

            let mut inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
            inventory.pending_preload.remove(&cell);
            if response.success {
                inventory.preloaded.insert(cell, id);
            } else {
                warn!(
                    choice_id = id,
                    code = ?response.result_code,
                    "choice preload rejected"
                );
                first_failure.get_or_insert_with(|| request_err(&response));
            }
        }

        first_failure.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl Operation for PreloadChoicesOperation {
    fn name(&self) -> &str {
        "preload_choices"
    }

    async fn run(&mut self, token: &CancelToken) {
        let outcome = if token.is_canceled() {
            Err(ChoiceSetError::Canceled)
        } else {
            self.execute(token).await
        };
        if let Some(result) = self.result.take() {
            let _ = result.send(outcome);
        }
    }
}

/// Remove a batch of cells from the head unit.
pub(super) struct DeleteChoicesOperation {
    pub ctx: Arc<ChoiceCtx>,
    pub cells: Vec<ChoiceCell>,
    pub result: Option<oneshot::Sender<Result<(), ChoiceSetError>>>,
}

impl DeleteChoicesOperation {
    async fn execute(&self, token: &CancelToken) -> Result<(), ChoiceSetError> {
        let batch: Vec<(ChoiceCell, u32)> = {
            let inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
            self.cells
                .iter()
                .filter_map(|cell| inventory.preloaded.get(cell).map(|id| (cell.clone(), *id)))
                .collect()
        };

        let mut first_failure = None;
        for (cell, id) in batch {
            if token.is_canceled() {
                return Err(ChoiceSetError::Canceled);
            }
            let body = DeleteInteractionChoiceSet {
                interaction_choice_set_id: id,
            };
            let response = self
                .ctx
                .session
                .send_request_body(FunctionId::DeleteInteractionChoiceSet, &body)
                .await?;
            if response.success {
                self.ctx
                    .inventory
                    .lock()
                    .expect("inventory lock poisoned")
                    .preloaded
                    .remove(&cell);
            } else {
                warn!(choice_id = id, code = ?response.result_code, "choice delete rejected");
                first_failure.get_or_insert_with(|| request_err(&response));
            }
        }

        first_failure.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl Operation for DeleteChoicesOperation {
    fn name(&self) -> &str {
        "delete_choices"
    }

    async fn run(&mut self, token: &CancelToken) {
        let outcome = if token.is_canceled() {
            Err(ChoiceSetError::Canceled)
        } else {
            self.execute(token).await
        };
        if let Some(result) = self.result.take() {
            let _ = result.send(outcome);
        }
    }
}

/// Keyboard attachment for a searchable presentation.
pub(super) struct SearchableKeyboard {
    pub properties: KeyboardProperties,
    pub listener: Arc<dyn KeyboardListener>,
}

/// Present one choice set and report the user's selection.
pub(super) struct PresentChoiceSetOperation {
    pub ctx: Arc<ChoiceCtx>,
    pub set: ChoiceSet,
    pub mode: InteractionMode,
    pub keyboard: Option<SearchableKeyboard>,
    pub cancel_id: u32,
    pub result: Option<oneshot::Sender<Result<(), ChoiceSetError>>>,
}

impl PresentChoiceSetOperation {
    /// Resolve preloaded IDs for the set's cells, in presentation order.
    fn resolve_ids(&self) -> Option<Vec<(u32, ChoiceCell)>> {
        let inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
        self.set
            .choices()
            .iter()
            .map(|cell| {
                inventory
                    .preloaded
                    .get(cell)
                    .map(|id| (*id, cell.clone()))
            })
            .collect()
    }

    async fn set_keyboard_properties(&self, properties: Option<KeyboardProperties>) {
        let body = SetGlobalProperties {
            keyboard_properties: Some(properties.unwrap_or_default()),
        };
        match self
            .ctx
            .session
            .send_request_body(FunctionId::SetGlobalProperties, &body)
            .await
        {
            Ok(response) if !response.success => {
                warn!(code = ?response.result_code, "keyboard configuration rejected");
            }
            Err(err) => warn!(%err, "keyboard configuration failed"),
            Ok(_) => {}
        }
    }

    async fn execute(&self, token: &CancelToken) -> Result<(), ChoiceSetError> {
        let Some(rows) = self.resolve_ids() else {
            // A delete stripped part of the set between enqueue and run.
            return Err(ChoiceSetError::Canceled);
        };

        if let Some(keyboard) = &self.keyboard {
            self.set_keyboard_properties(Some(keyboard.properties.clone()))
                .await;
        }

        let body = PerformInteraction {
            initial_text: self.set.title().to_owned(),
            interaction_mode: self.mode,
            interaction_choice_set_id_list: rows.iter().map(|(id, _)| *id).collect(),
            timeout: self
                .set
                .timeout()
                .map(|timeout| u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)),
            interaction_layout: Some(
                self.set
                    .layout()
                    .to_layout_mode(self.keyboard.is_some()),
            ),
            cancel_id: Some(self.cancel_id),
        };

        let response = interaction_loop(
            &self.ctx,
            FunctionId::PerformInteraction,
            &body,
            self.cancel_id,
            token,
            None,
            self.keyboard.as_ref().map(|keyboard| &*keyboard.listener),
        )
        .await;

        if self.keyboard.is_some() {
            self.set_keyboard_properties(None).await;
        }

        let response = response?;
        if !response.success {
            if response.result_code == crate::rpc::ResultCode::Aborted {
                return Err(ChoiceSetError::Canceled);
            }
            return Err(request_err(&response));
        }

        let outcome: PerformInteractionResponse =
            response.typed_params().map_err(crate::session::SessionError::from)?;
        if let Some(choice_id) = outcome.choice_id {
            if let Some((index, (_, cell))) = rows
                .iter()
                .enumerate()
                .find(|(_, (id, _))| *id == choice_id)
            {
                self.set.listener().on_choice_selected(
                    cell,
                    outcome
                        .trigger_source
                        .unwrap_or(crate::rpc::messages::TriggerSource::Menu),
                    index,
                );
            } else {
                warn!(choice_id, "head unit selected a choice not in the presented set");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Operation for PresentChoiceSetOperation {
    fn name(&self) -> &str {
        "present_choice_set"
    }

    async fn run(&mut self, token: &CancelToken) {
        let outcome = if token.is_canceled() {
            Err(ChoiceSetError::Canceled)
        } else {
            self.execute(token).await
        };

        {
            let mut inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
            if inventory
                .pending_set
                .as_ref()
                .is_some_and(|pending| pending.cancel_id == self.cancel_id)
            {
                inventory.pending_set = None;
            }
        }

        if let Err(err) = &outcome {
            self.set.listener().on_error(err);
        }
        if let Some(result) = self.result.take() {
            let _ = result.send(outcome);
        }
    }
}

/// Present a standalone keyboard interaction.
pub(super) struct PresentKeyboardOperation {
    pub ctx: Arc<ChoiceCtx>,
    pub initial_text: String,
    pub properties: KeyboardProperties,
    pub listener: Arc<dyn KeyboardListener>,
    pub cancel_id: u32,
    pub dismiss: watch::Receiver<bool>,
}

impl PresentKeyboardOperation {
    async fn execute(&self, token: &CancelToken) -> Result<(), ChoiceSetError> {
        let properties = SetGlobalProperties {
            keyboard_properties: Some(self.properties.clone()),
        };
        let response = self
            .ctx
            .session
            .send_request_body(FunctionId::SetGlobalProperties, &properties)
            .await?;
        if !response.success {
            return Err(request_err(&response));
        }

        let body = PerformInteraction {
            initial_text: self.initial_text.clone(),
            interaction_mode: InteractionMode::ManualOnly,
            interaction_choice_set_id_list: Vec::new(),
            timeout: None,
            interaction_layout: Some(LayoutMode::Keyboard),
            cancel_id: Some(self.cancel_id),
        };

        let response = interaction_loop(
            &self.ctx,
            FunctionId::PerformInteraction,
            &body,
            self.cancel_id,
            token,
            Some(self.dismiss.clone()),
            Some(&*self.listener),
        )
        .await?;

        if !response.success && response.result_code != crate::rpc::ResultCode::Aborted {
            return Err(request_err(&response));
        }
        Ok(())
    }
}

#[async_trait]
impl Operation for PresentKeyboardOperation {
    fn name(&self) -> &str {
        "present_keyboard"
    }

    async fn run(&mut self, token: &CancelToken) {
        if !token.is_canceled() {
            if let Err(err) = self.execute(token).await {
                warn!(cancel_id = self.cancel_id, %err, "keyboard interaction failed");
            }
        }

        let mut inventory = self.ctx.inventory.lock().expect("inventory lock poisoned");
        inventory
            .keyboards
            .retain(|entry| entry.cancel_id != self.cancel_id);
    }
}

/// Send an interaction request and drive it to completion.
///
/// While the response is outstanding, keyboard notifications are
/// forwarded to `listener` and a cancellation (token or dismiss signal)
/// turns into one `CancelInteraction`; the head unit then answers the
/// original request with `ABORTED`, which the caller maps to its own
/// outcome. The cancel request itself is fire-and-forget.
async fn interaction_loop(
    ctx: &ChoiceCtx,
    function_id: FunctionId,
    body: &PerformInteraction,
    cancel_id: u32,
    token: &CancelToken,
    dismiss: Option<watch::Receiver<bool>>,
    listener: Option<&dyn KeyboardListener>,
) -> Result<RpcResponse, ChoiceSetError> {
    let mut notifications = ctx.session.notifications();
    let request = ctx.session.send_request_body(function_id, body);
    tokio::pin!(request);

    let mut dismiss = dismiss;
    let mut cancel_sent = false;
    let mut notifications_open = listener.is_some();

    loop {
        let dismiss_armed = dismiss.is_some() && !cancel_sent;
        tokio::select! {
            response = &mut request => return Ok(response?),

            _ = token.canceled(), if !cancel_sent => {
                cancel_sent = true;
                send_cancel(ctx, cancel_id).await;
            }

            dismissed = wait_dismiss(dismiss.as_mut()), if dismiss_armed => {
                if dismissed {
                    cancel_sent = true;
                    send_cancel(ctx, cancel_id).await;
                } else {
                    dismiss = None;
                }
            }

            notification = notifications.recv(), if notifications_open => {
                match notification {
                    Ok(notification)
                        if notification.function_id == FunctionId::OnKeyboardInput =>
                    {
                        match notification.typed_params() {
                            Ok(event) => {
                                if let Some(listener) = listener {
                                    listener.on_keyboard_event(&event);
                                }
                            }
                            Err(err) => warn!(%err, "dropping unparseable keyboard event"),
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "keyboard event subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        notifications_open = false;
                    }
                }
            }
        }
    }
}

async fn wait_dismiss(dismiss: Option<&mut watch::Receiver<bool>>) -> bool {
    match dismiss {
        Some(rx) => rx.wait_for(|dismissed| *dismissed).await.is_ok(),
        None => std::future::pending().await,
    }
}

async fn send_cancel(ctx: &ChoiceCtx, cancel_id: u32) {
    let body = CancelInteraction {
        cancel_id,
        function_id: FunctionId::PerformInteraction.as_u32(),
    };
    match ctx
        .session
        .send_request_body(FunctionId::CancelInteraction, &body)
        .await
    {
        Ok(response) if !response.success => {
            warn!(cancel_id, code = ?response.result_code, "interaction cancel rejected");
        }
        Err(err) => warn!(cancel_id, %err, "interaction cancel failed"),
        Ok(_) => {}
    }
}
