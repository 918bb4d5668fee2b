pub mod generation_worker;
pub mod inference;
pub mod ollama_engine;

pub use generation_worker::GenerationJob;
pub use inference::{
    Device, EngineError, EngineHandle, GenerationConfig, GenerationOutcome, InferenceBackend,
    InferencePipeline, ParseDeviceError, StreamControl,
};
pub use ollama_engine::OllamaBackend;
