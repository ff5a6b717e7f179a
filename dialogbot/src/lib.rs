pub use crate::controller::{InteractionController, Phase, Submission};
pub use crate::conversation::ConversationState;
pub use crate::generation::{GenerationConfig, ResponseGenerator, MODEL_NOT_READY};
pub use crate::model::{ChatModel, SharedModel};
pub use crate::normalize::normalize;

pub mod args;
pub mod chat;
pub mod controller;
pub mod conversation;
pub mod dataset;
pub mod generation;
pub mod inference;
pub mod model;
pub mod normalize;
pub mod prepare;
pub mod telemetry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

pub const DEFAULT_SAVE_PATH: &str = "./saved_dialog_model";
