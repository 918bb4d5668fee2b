pub mod presenter;

pub use presenter::{MessageHandle, Presenter};
