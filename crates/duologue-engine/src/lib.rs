pub mod convergence;
pub mod error;
pub mod metrics;
pub mod names;
pub mod replay;
pub mod router;

pub use convergence::{ConvergenceCalculator, Trend};
pub use error::{Error, Result};
pub use metrics::{MessageMetrics, TurnTextMetrics, message_metrics, turn_text_metrics};
pub use names::NameCoordinator;
pub use replay::{ConversationState, StateBuilder, ThinkingRecord, read_events, validate_log};
pub use router::route_history;
