pub mod chat_controller;

pub use chat_controller::{
    ActiveGeneration, ChatController, ControllerError, GenerationState, SubmitOutcome,
};
