//! Control-loop state.
//!
//! The [`Controller`] is the single owner of the open session, the model
//! collection, the selection set and the busy flag. Network work runs in
//! spawned worker tasks that post [`WorkerEvent`]s back over a channel;
//! the front-end drains that channel with [`Controller::next_event`] and
//! hands every event to [`Controller::apply`], which is the only place
//! worker results touch shared state.

pub mod events;


pub use events::{SendOutcome, UiUpdate, WorkerEvent};

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::models::ModelDescriptor;
use crate::api::ChatMessage;
use crate::core::constants::CONNECTIVITY_POLL_INTERVAL;
use crate::core::message::Role;
use crate::core::session::{SessionStore, StoreError};
use crate::core::transport::{ChunkSink, OllamaClient, TransportError};
use crate::core::validator::ValidationError;

struct ChatExchange {
    id: u64,
    model: String,
    cancel: CancellationToken,
    received_content: bool,
}

pub struct Controller {
    client: OllamaClient,
    store: SessionStore,
    models: Vec<ModelDescriptor>,
    selected: BTreeSet<String>,
    current_model: Option<String>,
    hide_thinking: bool,
    reachable: Option<bool>,
    chat: Option<ChatExchange>,
    next_exchange: u64,
    pulls: HashMap<String, CancellationToken>,
    monitor: Option<CancellationToken>,
    poll_interval: Duration,
    tx: mpsc::UnboundedSender<WorkerEvent>,
    rx: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl Controller {
    pub fn new(client: OllamaClient, store: SessionStore, hide_thinking: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Controller {
            client,
            store,
            models: Vec::new(),
            selected: BTreeSet::new(),
            current_model: None,
            hide_thinking,
            reachable: None,
            chat: None,
            next_exchange: 0,
            pulls: HashMap::new(),
            monitor: None,
            poll_interval: CONNECTIVITY_POLL_INTERVAL,
            tx,
            rx,
        }
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Direct access for session commands (save, load, export, clear).
    /// Replacing the open session abandons any in-flight exchange.
    pub fn store_mut(&mut self) -> &mut SessionStore {
        self.abandon_chat();
        &mut self.store
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn current_model(&self) -> Option<&str> {
        self.current_model.as_deref()
    }

    pub fn hide_thinking(&self) -> bool {
        self.hide_thinking
    }

    pub fn set_hide_thinking(&mut self, hide: bool) {
        self.hide_thinking = hide;
    }

    pub fn is_reachable(&self) -> Option<bool> {
        self.reachable
    }

    /// True while a chat exchange is in flight.
    pub fn is_busy(&self) -> bool {
        self.chat.is_some()
    }

    pub fn is_pulling(&self, name: &str) -> bool {
        self.pulls.contains_key(name)
    }

    /// Choose the model for later messages. A note is added to a session
    /// that already has messages; notes are never sent to the server.
    pub fn set_model(&mut self, name: &str) -> Result<(), ValidationError> {
        let name = name.trim();
        self.client.validator().validate_model_identifier(name)?;
        if self.current_model.as_deref() == Some(name) {
            return Ok(());
        }
        if !self.store.current().is_empty() {
            let note = format!("Switched to model {name}");
            if let Err(err) = self.store.append(Role::System, &note, name) {
                warn!(error = %err, "could not record model switch");
            }
        }
        self.current_model = Some(name.to_string());
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    /// Wait for the next worker result.
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.rx.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<WorkerEvent> {
        self.rx.try_recv().ok()
    }

    /// Append `text` as a user message and start a streamed exchange.
    ///
    /// While an exchange is in flight this is a no-op returning
    /// [`SendOutcome::Busy`]: nothing is appended and nothing is sent.
    pub fn send_message(&mut self, text: &str) -> SendOutcome {
        if self.is_busy() {
            debug!("send ignored; an exchange is already in flight");
            return SendOutcome::Busy;
        }
        let Some(model) = self.current_model.clone() else {
            return SendOutcome::NoModel;
        };
        match self.store.append(Role::User, text, "") {
            Ok(true) => {}
            Ok(false) => return SendOutcome::Empty,
            Err(err) => return SendOutcome::Rejected(err),
        }

        self.next_exchange += 1;
        let exchange = ChatExchange {
            id: self.next_exchange,
            model,
            cancel: CancellationToken::new(),
            received_content: false,
        };
        let messages = self.store.project_for_transport();
        self.spawn_chat(&exchange, messages, true);
        self.chat = Some(exchange);
        SendOutcome::Started
    }

    /// Abort the in-flight exchange. The worker still reports back, as a
    /// cancelled failure, which clears the busy flag.
    pub fn cancel_chat(&mut self) -> bool {
        match &self.chat {
            Some(exchange) => {
                exchange.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Re-read the model list in the background.
    pub fn refresh_models(&self) {
        let client = self.client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = client.list_models().await;
            let _ = tx.send(WorkerEvent::ModelsListed(result));
        });
    }

    /// Start pulling `name`. Returns `Ok(false)` when a pull of the same
    /// model is already running.
    pub fn start_pull(&mut self, name: &str) -> Result<bool, ValidationError> {
        let name = name.trim().to_string();
        self.client.validator().validate_model_identifier(&name)?;
        if self.pulls.contains_key(&name) {
            return Ok(false);
        }

        let cancel = CancellationToken::new();
        self.pulls.insert(name.clone(), cancel.clone());
        let client = self.client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let progress_tx = tx.clone();
            let progress_name = name.clone();
            let result = client
                .pull(
                    &name,
                    |progress| {
                        let _ = progress_tx.send(WorkerEvent::PullProgress {
                            name: progress_name.clone(),
                            progress: progress.clone(),
                        });
                    },
                    &cancel,
                )
                .await;
            let _ = tx.send(WorkerEvent::PullFinished { name, result });
        });
        Ok(true)
    }

    pub fn cancel_pull(&mut self, name: &str) -> bool {
        match self.pulls.get(name) {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Add an installed model to the selection.
    pub fn select_model(&mut self, name: &str) -> bool {
        if self.models.iter().any(|model| model.name == name) {
            self.selected.insert(name.to_string());
            true
        } else {
            false
        }
    }

    pub fn deselect_model(&mut self, name: &str) -> bool {
        self.selected.remove(name)
    }

    pub fn select_all(&mut self) {
        self.selected = self.models.iter().map(|model| model.name.clone()).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }

    pub fn selected_models(&self) -> Vec<&ModelDescriptor> {
        self.models
            .iter()
            .filter(|model| self.selected.contains(&model.name))
            .collect()
    }

    /// Delete every selected model. Each deletion reports back separately;
    /// returns how many were started.
    pub fn delete_selected(&mut self) -> usize {
        let names: Vec<String> = self.selected.iter().cloned().collect();
        for name in &names {
            self.spawn_delete(name.clone());
        }
        names.len()
    }

    pub fn delete_model(&mut self, name: &str) -> Result<(), ValidationError> {
        let name = name.trim();
        self.client.validator().validate_model_identifier(name)?;
        self.spawn_delete(name.to_string());
        Ok(())
    }

    /// Probe the server now and then every poll interval until stopped.
    pub fn start_connectivity_monitor(&mut self) {
        self.stop_connectivity_monitor();
        let cancel = CancellationToken::new();
        self.monitor = Some(cancel.clone());
        let client = self.client.clone();
        let tx = self.tx.clone();
        let interval = self.poll_interval;
        tokio::spawn(async move {
            loop {
                let reachable = tokio::select! {
                    reachable = client.probe() => reachable,
                    _ = cancel.cancelled() => break,
                };
                if tx.send(WorkerEvent::Connectivity(reachable)).is_err() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            debug!("connectivity monitor stopped");
        });
    }

    pub fn stop_connectivity_monitor(&mut self) {
        if let Some(cancel) = self.monitor.take() {
            cancel.cancel();
        }
    }

    /// Fold one worker result into the controller state.
    pub fn apply(&mut self, event: WorkerEvent) -> UiUpdate {
        match event {
            WorkerEvent::Connectivity(reachable) => {
                let changed = self.reachable != Some(reachable);
                if changed {
                    info!(reachable, "server connectivity changed");
                }
                self.reachable = Some(reachable);
                UiUpdate::Connectivity { reachable, changed }
            }
            WorkerEvent::ModelsListed(Ok(models)) => {
                self.selected
                    .retain(|name| models.iter().any(|model| &model.name == name));
                self.models = models;
                UiUpdate::ModelsRefreshed {
                    count: self.models.len(),
                }
            }
            WorkerEvent::ModelsListed(Err(error)) => UiUpdate::ModelsUnavailable(error),
            WorkerEvent::PullProgress { name, progress } => UiUpdate::PullProgress {
                name,
                label: progress.stage_label(),
                percentage: progress.percentage(),
            },
            WorkerEvent::PullFinished { name, result } => {
                self.pulls.remove(&name);
                match result {
                    Ok(success) => {
                        if success {
                            self.refresh_models();
                        }
                        UiUpdate::PullFinished { name, success }
                    }
                    Err(error) => UiUpdate::PullFailed { name, error },
                }
            }
            WorkerEvent::Deleted { name, result } => match result {
                Ok(removed) => {
                    self.models.retain(|model| model.name != name);
                    self.selected.remove(&name);
                    if removed {
                        UiUpdate::ModelDeleted { name }
                    } else {
                        UiUpdate::ModelMissing { name }
                    }
                }
                Err(error) => UiUpdate::DeleteFailed { name, error },
            },
            WorkerEvent::ChatChunk { exchange, text } => match self.chat.as_mut() {
                Some(current) if current.id == exchange => {
                    current.received_content = true;
                    UiUpdate::ChatChunk(text)
                }
                _ => UiUpdate::Nothing,
            },
            WorkerEvent::ChatFinished {
                exchange,
                streamed,
                result,
            } => self.finish_chat(exchange, streamed, result),
        }
    }

    /// Stop background work and save a non-empty open session when
    /// autosave is enabled.
    pub fn shutdown(&mut self) -> Result<Option<usize>, StoreError> {
        self.stop_connectivity_monitor();
        self.abandon_chat();
        for cancel in self.pulls.values() {
            cancel.cancel();
        }
        self.pulls.clear();

        let saved = if self.store.settings().auto_save && !self.store.current().is_empty() {
            Some(self.store.save(None)?)
        } else {
            None
        };
        self.store.flush()?;
        Ok(saved)
    }

    fn finish_chat(
        &mut self,
        exchange: u64,
        streamed: bool,
        result: Result<String, TransportError>,
    ) -> UiUpdate {
        let Some(current) = self.chat.take_if(|current| current.id == exchange) else {
            return UiUpdate::Nothing;
        };

        match result {
            Ok(reply) if streamed && !current.received_content && reply.trim().is_empty() => {
                info!(model = %current.model, "stream produced no content; retrying without streaming");
                let messages = self.store.project_for_transport();
                self.spawn_chat(&current, messages, false);
                self.chat = Some(current);
                UiUpdate::RetryingWithoutStreaming
            }
            Ok(reply) => match self.store.append(Role::Assistant, &reply, &current.model) {
                Ok(true) => UiUpdate::ReplyCompleted { reply },
                Ok(false) => UiUpdate::EmptyReply,
                Err(err) => {
                    warn!(error = %err, "reply could not be recorded");
                    UiUpdate::ReplyCompleted { reply }
                }
            },
            Err(error) => {
                debug!(classification = error.classification(), "chat exchange failed");
                UiUpdate::ChatFailed(error)
            }
        }
    }

    fn spawn_chat(&self, exchange: &ChatExchange, messages: Vec<ChatMessage>, streamed: bool) {
        let client = self.client.clone();
        let tx = self.tx.clone();
        let id = exchange.id;
        let model = exchange.model.clone();
        let cancel = exchange.cancel.clone();
        let hide_thinking = self.hide_thinking;
        tokio::spawn(async move {
            let chunk_tx = tx.clone();
            let mut forward = move |text: &str| {
                let _ = chunk_tx.send(WorkerEvent::ChatChunk {
                    exchange: id,
                    text: text.to_string(),
                });
            };
            let sink: Option<&mut ChunkSink<'_>> = if streamed {
                Some(&mut forward)
            } else {
                None
            };
            let result = client
                .chat(&model, &messages, sink, hide_thinking, &cancel)
                .await;
            let _ = tx.send(WorkerEvent::ChatFinished {
                exchange: id,
                streamed,
                result,
            });
        });
    }

    fn spawn_delete(&self, name: String) {
        let client = self.client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = client.delete(&name).await;
            let _ = tx.send(WorkerEvent::Deleted { name, result });
        });
    }

    fn abandon_chat(&mut self) {
        if let Some(exchange) = self.chat.take() {
            exchange.cancel.cancel();
            debug!(exchange = exchange.id, "exchange abandoned");
        }
    }
}
