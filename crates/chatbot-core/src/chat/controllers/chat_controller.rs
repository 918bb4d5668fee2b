use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chat::models::{
    DispatchQueue, DispatchSender, DispatchTask, FinishedGeneration, GenerationId, ResponseSink,
    Role, Session, SessionStore,
};
use crate::chat::repositories::RepositoryError;
use crate::chat::services::{
    EngineHandle, GenerationConfig, GenerationJob, GenerationOutcome, generation_worker,
};
use crate::chat::views::{MessageHandle, Presenter};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("A response is still being generated")]
    GenerationInFlight,

    #[error("Session '{id}' has a response being generated")]
    SessionBusy { id: String },

    #[error("Shutting down")]
    ShuttingDown,

    #[error("Unknown session '{id}'")]
    UnknownSession { id: String },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Started(GenerationId),
    /// Input was empty after trimming; nothing happened.
    Ignored,
}

/// The generation the controller is waiting on.
#[derive(Clone, Debug)]
pub struct ActiveGeneration {
    pub id: GenerationId,
    /// Session the prompt was submitted to; the response is persisted there.
    pub session_id: String,
    pub assistant: MessageHandle,
    /// The user started a new chat; the response is persisted but no longer shown.
    pub detached: bool,
}

#[derive(Clone, Debug, Default)]
pub enum GenerationState {
    #[default]
    Idle,
    Generating(ActiveGeneration),
}

/// Coordinates sessions, the engine and the presentation loop.
///
/// Every method runs on the presentation loop. Workers talk back only through
/// the dispatch queue, whose tasks are passed to [`ChatController::apply`].
pub struct ChatController {
    state: GenerationState,
    store: SessionStore,
    engine: EngineHandle,
    dispatch: DispatchSender,
    config: GenerationConfig,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    /// A chat reset requested while the worker held the engine.
    pending_chat_reset: bool,
    next_generation: u64,
}

impl ChatController {
    /// Load the session index and open a fresh session.
    pub async fn start(
        mut store: SessionStore,
        engine: EngineHandle,
        dispatch: DispatchSender,
        config: GenerationConfig,
        presenter: &mut dyn Presenter,
    ) -> Self {
        if let Err(e) = store.load_index().await {
            warn!(error = ?e, "Failed to list saved sessions");
        }

        let id = store.create().await;
        store.set_active(&id);
        info!(session_id = %id, "Started new session");

        let controller = Self {
            state: GenerationState::Idle,
            store,
            engine,
            dispatch,
            config,
            workers: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            pending_chat_reset: false,
            next_generation: 0,
        };

        controller.show_sessions(presenter);
        presenter.set_submit_enabled(true);
        controller
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn is_generating(&self) -> bool {
        matches!(self.state, GenerationState::Generating(_))
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.store.active_id()
    }

    /// Session ids, newest first
    pub fn sessions(&self) -> &[String] {
        self.store.list()
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.store.get(id)
    }

    pub async fn submit(
        &mut self,
        input: &str,
        presenter: &mut dyn Presenter,
    ) -> Result<SubmitOutcome, ControllerError> {
        self.ensure_running()?;

        let prompt = input.trim();
        if prompt.is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }
        if self.is_generating() {
            return Err(ControllerError::GenerationInFlight);
        }

        let session_id = match self.store.active_id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.store.create().await;
                self.store.set_active(&id);
                self.show_sessions(presenter);
                id
            }
        };

        presenter.set_submit_enabled(false);
        let user = presenter.begin_message(true);
        presenter.update_message(user, prompt);
        let assistant = presenter.begin_message(false);
        presenter.update_message(assistant, "");
        presenter.scroll_to_bottom();

        self.store.append_turn(&session_id, Role::User, prompt).await;

        self.next_generation += 1;
        let id = GenerationId(self.next_generation);

        // Finished workers have already sent their finalize
        self.workers.retain(|worker| !worker.is_finished());
        self.workers.push(generation_worker::spawn(GenerationJob {
            generation_id: id,
            session_id: session_id.clone(),
            prompt: prompt.to_string(),
            target: assistant,
            sink: ResponseSink::new(),
            engine: self.engine.clone(),
            config: self.config,
            dispatch: self.dispatch.clone(),
            shutdown: self.shutdown.clone(),
        }));

        debug!(generation_id = id.0, session_id = %session_id, "Submitted prompt");
        self.state = GenerationState::Generating(ActiveGeneration {
            id,
            session_id,
            assistant,
            detached: false,
        });
        Ok(SubmitOutcome::Started(id))
    }

    /// Execute one dispatch task on the presentation loop.
    pub async fn apply(&mut self, task: DispatchTask, presenter: &mut dyn Presenter) {
        match task {
            DispatchTask::Render { handle, text } => {
                presenter.update_message(handle, &text);
                presenter.scroll_to_bottom();
            }
            DispatchTask::Finalize(finished) => self.finalize(finished, presenter).await,
        }
    }

    async fn finalize(&mut self, finished: FinishedGeneration, presenter: &mut dyn Presenter) {
        let current = match &self.state {
            GenerationState::Generating(active) if active.id == finished.generation_id => {
                Some(active.detached)
            }
            _ => None,
        };

        if current == Some(false) {
            presenter.update_message(finished.target, &finished.text);
            presenter.scroll_to_bottom();
        }

        match &finished.outcome {
            GenerationOutcome::Completed | GenerationOutcome::Interrupted => {}
            GenerationOutcome::Failed(reason) => {
                debug!(reason = %reason, "Persisting partial response")
            }
            GenerationOutcome::EngineUnavailable => debug!("Persisting empty response"),
        }

        if !self
            .store
            .append_turn(&finished.session_id, Role::Assistant, &finished.text)
            .await
        {
            info!(session_id = %finished.session_id, "Session was deleted, response dropped");
        }

        if current.is_none() {
            warn!(generation_id = finished.generation_id.0, "Finalize for unknown generation");
            return;
        }

        self.state = GenerationState::Idle;
        if self.pending_chat_reset {
            self.pending_chat_reset = false;
            self.engine.restart_chat();
        }
        if !self.shutdown.load(Ordering::SeqCst) {
            presenter.set_submit_enabled(true);
        }
    }

    /// Clear the transcript and open a fresh session.
    ///
    /// A running generation keeps going against its own message handle and is
    /// persisted into the session it was submitted to.
    pub async fn new_chat(&mut self, presenter: &mut dyn Presenter) -> Result<String, ControllerError> {
        self.ensure_running()?;

        presenter.clear_transcript();
        let id = self.store.create().await;
        self.store.set_active(&id);

        match &mut self.state {
            GenerationState::Generating(active) => {
                active.detached = true;
                self.pending_chat_reset = true;
                info!(
                    session_id = %id,
                    detached_session_id = %active.session_id,
                    "Started new session, previous response continues in background"
                );
            }
            GenerationState::Idle => {
                self.engine.restart_chat();
                info!(session_id = %id, "Started new session");
            }
        }

        self.show_sessions(presenter);
        Ok(id)
    }

    /// Show a saved session and make it active.
    pub async fn open_session(
        &mut self,
        id: &str,
        presenter: &mut dyn Presenter,
    ) -> Result<(), ControllerError> {
        self.ensure_running()?;
        if self.is_generating() {
            return Err(ControllerError::GenerationInFlight);
        }

        let turns = match self.store.load(id).await? {
            Some(session) => session.turns().to_vec(),
            None => return Err(ControllerError::UnknownSession { id: id.to_string() }),
        };

        presenter.clear_transcript();
        for turn in &turns {
            let handle = presenter.begin_message(turn.role.is_user());
            presenter.update_message(handle, &turn.text);
        }
        presenter.scroll_to_bottom();

        self.store.set_active(id);
        self.engine.restart_chat();
        self.show_sessions(presenter);
        info!(session_id = %id, turns = turns.len(), "Opened session");
        Ok(())
    }

    pub async fn delete_session(
        &mut self,
        id: &str,
        presenter: &mut dyn Presenter,
    ) -> Result<(), ControllerError> {
        self.delete_sessions(&[id.to_string()], presenter).await
    }

    /// Delete sessions. Unknown ids are fine. Starts a new chat when the active
    /// session goes away or nothing is left.
    pub async fn delete_sessions(
        &mut self,
        ids: &[String],
        presenter: &mut dyn Presenter,
    ) -> Result<(), ControllerError> {
        self.ensure_running()?;
        if let GenerationState::Generating(active) = &self.state
            && let Some(busy) = ids.iter().find(|id| **id == active.session_id)
        {
            return Err(ControllerError::SessionBusy { id: busy.clone() });
        }

        // Keep going past a failed id so the index and active session stay consistent
        let mut first_error = None;
        for id in ids {
            if let Err(e) = self.store.delete(id).await {
                warn!(error = ?e, session_id = %id, "Failed to delete session");
                first_error.get_or_insert(e);
            }
        }

        if self.store.active_id().is_none() || self.store.list().is_empty() {
            self.new_chat(presenter).await?;
        } else {
            self.show_sessions(presenter);
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Stop accepting work, let every worker finish, persist what they
    /// produced, then release the engine.
    pub async fn shutdown(&mut self, queue: &mut DispatchQueue, presenter: &mut dyn Presenter) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(workers = self.workers.len(), "Shutting down");
        presenter.set_submit_enabled(false);

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!(error = %e, "Generation worker failed");
            }
        }

        while let Some(task) = queue.try_next() {
            self.apply(task, presenter).await;
        }

        self.engine.release().await;
    }

    fn ensure_running(&self) -> Result<(), ControllerError> {
        if self.shutdown.load(Ordering::SeqCst) {
            Err(ControllerError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn show_sessions(&self, presenter: &mut dyn Presenter) {
        presenter.show_sessions(self.store.list(), self.store.active_id());
    }
}
