pub mod dispatch_queue;
pub mod response_sink;
pub mod session;
pub mod sessions_store;

pub use dispatch_queue::{
    DispatchQueue, DispatchSender, DispatchTask, FinishedGeneration, GenerationId,
};
pub use response_sink::ResponseSink;
pub use session::{Role, Session, Turn};
pub use sessions_store::{Clock, LocalClock, SessionStore};
