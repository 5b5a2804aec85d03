mod payload;
mod record;

pub use payload::{EventKind, EventPayload};
pub use record::EventRecord;
