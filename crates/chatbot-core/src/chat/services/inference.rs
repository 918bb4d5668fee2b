use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Hardware the model runs on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    #[default]
    Gpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Gpu => write!(f, "GPU"),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown device '{0}', expected 'cpu' or 'gpu'")]
pub struct ParseDeviceError(String);

impl FromStr for Device {
    type Err = ParseDeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "gpu" => Ok(Device::Gpu),
            _ => Err(ParseDeviceError(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerationConfig {
    pub max_new_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
        }
    }
}

/// Returned by the token callback to tell the engine whether to keep going.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamControl {
    Continue,
    Stop,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Inference engine is not available")]
    Unavailable,

    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("Engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Model '{model}' not found")]
    ModelNotFound { model: String },
}

/// Factory for inference pipelines.
pub trait InferenceBackend: Send + Sync + 'static {
    /// Load `model_id` on `device`. Blocking; may take a long time.
    fn create(
        &self,
        model_id: &str,
        device: Device,
    ) -> Result<Box<dyn InferencePipeline>, EngineError>;
}

/// A loaded model holding one chat context. Dropping it releases the model.
pub trait InferencePipeline: Send {
    fn start_chat(&mut self) -> Result<(), EngineError>;

    /// Generate a response to `prompt`, calling `on_token` for every decoded
    /// piece of text in order. Blocks until generation ends or `on_token`
    /// returns [`StreamControl::Stop`].
    fn generate(
        &mut self,
        prompt: &str,
        config: &GenerationConfig,
        on_token: &mut dyn FnMut(&str) -> StreamControl,
    ) -> Result<(), EngineError>;

    fn finish_chat(&mut self) -> Result<(), EngineError>;
}

/// How a generation ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed,
    /// Stopped early because the application is shutting down.
    Interrupted,
    Failed(String),
    EngineUnavailable,
}

/// Shared slot holding the process-wide pipeline.
///
/// The slot is empty while the engine initializes and stays empty if
/// initialization fails; callers then run in degraded mode. A worker holds the
/// lock for the whole of `generate`.
#[derive(Clone, Default)]
pub struct EngineHandle {
    slot: Arc<Mutex<Option<Box<dyn InferencePipeline>>>>,
    init: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EngineHandle {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn ready(pipeline: Box<dyn InferencePipeline>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(pipeline))),
            init: Arc::new(Mutex::new(None)),
        }
    }

    /// Create the pipeline on a blocking thread and start its chat.
    ///
    /// Must be called from within a tokio runtime. The handle is usable
    /// immediately and reports the engine as unavailable until loading finishes.
    pub fn initialize(backend: Arc<dyn InferenceBackend>, model_id: String, device: Device) -> Self {
        let handle = Self::unavailable();
        let slot = handle.slot.clone();

        let task = tokio::task::spawn_blocking(move || {
            info!(model = %model_id, device = %device, "Loading inference engine");
            let mut pipeline = match backend.create(&model_id, device) {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    warn!(error = %e, model = %model_id, "Failed to create inference pipeline, responses will be empty");
                    return;
                }
            };
            if let Err(e) = pipeline.start_chat() {
                warn!(error = %e, "Failed to start chat, responses will be empty");
                return;
            }
            *slot.lock() = Some(pipeline);
            info!(model = %model_id, "Inference engine ready");
        });

        *handle.init.lock() = Some(task);
        handle
    }

    pub fn is_ready(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Wait for background initialization, if any, to finish.
    pub async fn wait_initialized(&self) {
        let task = self.init.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Engine initialization task failed");
        }
    }

    /// Run `f` against the pipeline, blocking until the slot is free.
    /// Returns `None` when the engine is unavailable.
    pub fn with_pipeline<R>(&self, f: impl FnOnce(&mut dyn InferencePipeline) -> R) -> Option<R> {
        let mut slot = self.slot.lock();
        slot.as_mut().map(|pipeline| f(pipeline.as_mut()))
    }

    /// Finish the current chat context and begin a fresh one.
    ///
    /// Only called while no generation runs, so the lock is uncontended.
    pub fn restart_chat(&self) {
        let restarted = self.with_pipeline(|pipeline| {
            if let Err(e) = pipeline.finish_chat() {
                warn!(error = %e, "Failed to finish chat");
            }
            if let Err(e) = pipeline.start_chat() {
                warn!(error = %e, "Failed to start chat");
            }
        });
        if restarted.is_some() {
            debug!("Engine chat context restarted");
        }
    }

    /// Finish the chat and drop the pipeline. Waits for initialization first
    /// so a pipeline still loading is released too.
    pub async fn release(&self) {
        self.wait_initialized().await;

        let pipeline = self.slot.lock().take();
        if let Some(mut pipeline) = pipeline {
            if let Err(e) = pipeline.finish_chat() {
                warn!(error = %e, "Failed to finish chat during release");
            }
            drop(pipeline);
            info!("Inference engine released");
        }
    }
}
