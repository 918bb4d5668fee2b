pub mod chat;
pub mod settings;

pub use chat::controllers::{ChatController, ControllerError, SubmitOutcome};
pub use chat::models::{DispatchQueue, DispatchSender, DispatchTask, SessionStore};
pub use chat::views::{MessageHandle, Presenter};
pub use settings::models::GeneralSettingsModel;
