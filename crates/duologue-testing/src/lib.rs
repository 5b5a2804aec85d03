//! Test fixtures for the duologue workspace: deterministic providers with
//! scripted failures, event-log builders, and isolated experiment worlds.

pub mod fixtures;
pub mod providers;
pub mod world;

pub use fixtures::{experiment_config, write_event_log};
pub use providers::{Outcome, SequenceProvider};
pub use world::ExperimentWorld;
