//! Doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, TimeZone};
use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::chat::models::{Clock, DispatchQueue, DispatchTask, FinishedGeneration};
use crate::chat::services::{
    Device, EngineError, EngineHandle, GenerationConfig, InferenceBackend, InferencePipeline,
    StreamControl,
};
use crate::chat::views::{MessageHandle, Presenter};

/// Clock advancing one second per reading, or frozen.
pub struct StepClock {
    next: Mutex<DateTime<Local>>,
    step: Duration,
}

impl StepClock {
    pub fn starting_at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Self {
            next: Mutex::new(local(year, month, day, hour, min, sec)),
            step: Duration::seconds(1),
        }
    }

    pub fn frozen_at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Self {
            next: Mutex::new(local(year, month, day, hour, min, sec)),
            step: Duration::zero(),
        }
    }
}

fn local(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, min, sec)
        .earliest()
        .unwrap()
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Local> {
        let mut next = self.next.lock();
        let now = *next;
        *next = now + self.step;
        now
    }
}

/// Point inside a scripted generation where the engine parks until the test
/// opens it.
#[derive(Clone, Default)]
pub struct Gate {
    open: Arc<(Mutex<bool>, Condvar)>,
    reached: Arc<Notify>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (open, cvar) = &*self.open;
        *open.lock() = true;
        cvar.notify_all();
    }

    /// Wait until the engine has parked at the gate.
    pub async fn wait_reached(&self) {
        self.reached.notified().await;
    }

    fn arrive_and_wait(&self) {
        self.reached.notify_one();
        let (open, cvar) = &*self.open;
        let mut open = open.lock();
        while !*open {
            cvar.wait(&mut open);
        }
    }
}

#[derive(Clone)]
struct Script {
    tokens: Vec<String>,
    gate: Option<(usize, Gate)>,
    failure: Option<(usize, String)>,
    fail_create: bool,
}

/// Backend whose pipelines emit a fixed token list on every `generate`.
/// Records every engine call in order.
#[derive(Clone)]
pub struct ScriptedBackend {
    script: Script,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Script {
                tokens: tokens.into_iter().map(Into::into).collect(),
                gate: None,
                failure: None,
                fail_create: false,
            },
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Park at `gate` after emitting `after` tokens.
    pub fn gated_after(mut self, after: usize, gate: Gate) -> Self {
        self.script.gate = Some((after, gate));
        self
    }

    /// Fail after emitting `after` tokens.
    pub fn failing_after(mut self, after: usize, message: &str) -> Self {
        self.script.failure = Some((after, message.to_string()));
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.script.fail_create = true;
        self
    }

    /// An engine handle holding a ready pipeline, with its chat already started.
    pub fn engine(&self) -> EngineHandle {
        EngineHandle::ready(Box::new(self.pipeline()))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn pipeline(&self) -> ScriptedPipeline {
        ScriptedPipeline {
            script: self.script.clone(),
            calls: self.calls.clone(),
        }
    }
}

impl InferenceBackend for ScriptedBackend {
    fn create(
        &self,
        model_id: &str,
        device: Device,
    ) -> Result<Box<dyn InferencePipeline>, EngineError> {
        self.calls.lock().push(format!("create:{model_id}:{device}"));
        if self.script.fail_create {
            return Err(EngineError::ModelNotFound {
                model: model_id.to_string(),
            });
        }
        Ok(Box::new(self.pipeline()))
    }
}

struct ScriptedPipeline {
    script: Script,
    calls: Arc<Mutex<Vec<String>>>,
}

impl InferencePipeline for ScriptedPipeline {
    fn start_chat(&mut self) -> Result<(), EngineError> {
        self.calls.lock().push("start_chat".to_string());
        Ok(())
    }

    fn generate(
        &mut self,
        prompt: &str,
        _config: &GenerationConfig,
        on_token: &mut dyn FnMut(&str) -> StreamControl,
    ) -> Result<(), EngineError> {
        self.calls.lock().push(format!("generate:{prompt}"));

        for (emitted, token) in self.script.tokens.iter().enumerate() {
            if let Some((after, gate)) = &self.script.gate
                && *after == emitted
            {
                gate.arrive_and_wait();
            }
            if let Some((after, message)) = &self.script.failure
                && *after == emitted
            {
                return Err(EngineError::Protocol(message.clone()));
            }
            if on_token(token) == StreamControl::Stop {
                return Ok(());
            }
        }
        Ok(())
    }

    fn finish_chat(&mut self) -> Result<(), EngineError> {
        self.calls.lock().push("finish_chat".to_string());
        Ok(())
    }
}

impl Drop for ScriptedPipeline {
    fn drop(&mut self) {
        self.calls.lock().push("drop".to_string());
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecordedMessage {
    pub is_user: bool,
    /// Every text the message was set to, in order.
    pub renders: Vec<String>,
}

impl RecordedMessage {
    pub fn text(&self) -> &str {
        self.renders.last().map(String::as_str).unwrap_or("")
    }
}

/// Presenter that records everything and honors handle staleness.
#[derive(Default)]
pub struct RecordingPresenter {
    next_handle: u64,
    messages: HashMap<MessageHandle, RecordedMessage>,
    transcript: Vec<MessageHandle>,
    pub stale_updates: usize,
    pub scrolls: usize,
    pub clears: usize,
    pub submit_enabled: bool,
    pub submit_history: Vec<bool>,
    pub sessions: Vec<String>,
    pub active_session: Option<String>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self {
            submit_enabled: true,
            ..Self::default()
        }
    }

    pub fn message(&self, handle: MessageHandle) -> Option<&RecordedMessage> {
        self.messages.get(&handle)
    }

    /// The visible transcript as `(is_user, text)` pairs.
    pub fn transcript(&self) -> Vec<(bool, String)> {
        self.transcript
            .iter()
            .filter_map(|handle| self.messages.get(handle))
            .map(|m| (m.is_user, m.text().to_string()))
            .collect()
    }

    pub fn last_handle(&self) -> Option<MessageHandle> {
        self.transcript.last().copied()
    }
}

impl Presenter for RecordingPresenter {
    fn begin_message(&mut self, is_user: bool) -> MessageHandle {
        self.next_handle += 1;
        let handle = MessageHandle(self.next_handle);
        self.messages.insert(
            handle,
            RecordedMessage {
                is_user,
                renders: Vec::new(),
            },
        );
        self.transcript.push(handle);
        handle
    }

    fn update_message(&mut self, handle: MessageHandle, text: &str) {
        match self.messages.get_mut(&handle) {
            Some(message) => message.renders.push(text.to_string()),
            None => self.stale_updates += 1,
        }
    }

    fn scroll_to_bottom(&mut self) {
        self.scrolls += 1;
    }

    fn clear_transcript(&mut self) {
        self.messages.clear();
        self.transcript.clear();
        self.clears += 1;
    }

    fn set_submit_enabled(&mut self, enabled: bool) {
        self.submit_enabled = enabled;
        self.submit_history.push(enabled);
    }

    fn show_sessions(&mut self, session_ids: &[String], active: Option<&str>) {
        self.sessions = session_ids.to_vec();
        self.active_session = active.map(str::to_string);
    }
}

/// Pop tasks until a finalize arrives, returning it and the tasks before it.
pub async fn next_finalize(queue: &mut DispatchQueue) -> (Vec<DispatchTask>, FinishedGeneration) {
    let mut before = Vec::new();
    loop {
        match queue.next().await {
            Some(DispatchTask::Finalize(finished)) => return (before, finished),
            Some(task) => before.push(task),
            None => panic!("dispatch queue closed before finalize"),
        }
    }
}
