mod util;

pub mod agent;
pub mod conversation;
pub mod error;
pub mod event;
pub mod experiment;
pub mod message;
pub mod models;

pub use agent::{AgentConfig, AgentId, AwarenessLevel};
pub use conversation::{Conversation, ConversationStatus, EndedReason, Turn};
pub use error::{Error, Result};
pub use event::{EventKind, EventPayload, EventRecord};
pub use experiment::{
    ConvergenceAction, ConvergenceProfile, ConvergenceSettings, ConvergenceWeights, Experiment,
    ExperimentConfig, ExperimentStatus, Manifest,
};
pub use message::{Message, Role, Sender};
pub use models::{ModelSpec, Vendor};
pub use util::*;
