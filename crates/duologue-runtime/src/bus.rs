//! Process-local event fan-out plus append-only JSONL persistence.
//!
//! One bus serves one experiment. Sequence assignment, the file append, and
//! the history push happen under a single mutex before any subscriber sees
//! the event, so replaying a log always matches live delivery order.
//! Handlers run synchronously in the emitting task; anything heavy must
//! hand off to its own worker.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use duologue_types::{EventKind, EventPayload, EventRecord};

use crate::error::{Error, Result};

/// Events retained in the observability ring buffer
const DEFAULT_HISTORY_LIMIT: usize = 10_000;

type Handler = Arc<dyn Fn(&EventRecord) + Send + Sync>;

struct Subscription {
    id: u64,
    filter: Option<EventKind>,
    handler: Handler,
}

struct BusInner {
    dir: PathBuf,
    subscribers: Vec<Subscription>,
    next_subscription_id: u64,
    /// Per-conversation sequence counters; independent across conversations
    sequences: HashMap<Uuid, u64>,
    experiment_sequence: u64,
    writers: HashMap<Uuid, File>,
    experiment_writer: Option<File>,
    history: VecDeque<EventRecord>,
    history_limit: usize,
    stopped: bool,
}

pub struct EventBus {
    inner: Mutex<BusInner>,
    experiment_id: Option<Uuid>,
}

impl EventBus {
    /// A bus writing into `dir`. The directory must already exist.
    pub fn new(dir: PathBuf, experiment_id: Option<Uuid>) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                dir,
                subscribers: Vec::new(),
                next_subscription_id: 1,
                sequences: HashMap::new(),
                experiment_sequence: 0,
                writers: HashMap::new(),
                experiment_writer: None,
                history: VecDeque::new(),
                history_limit: DEFAULT_HISTORY_LIMIT,
                stopped: false,
            }),
            experiment_id,
        }
    }

    /// Register a handler for one event kind, or every kind when `filter`
    /// is None. Handlers run in registration order in the emitting task.
    pub fn subscribe<F>(&self, filter: Option<EventKind>, handler: F) -> u64
    where
        F: Fn(&EventRecord) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_subscription_id;
        inner.next_subscription_id += 1;
        inner.subscribers.push(Subscription {
            id,
            filter,
            handler: Arc::new(handler),
        });
        id
    }

    pub fn unsubscribe(&self, subscription_id: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.retain(|s| s.id != subscription_id);
    }

    /// Emit a conversation-scoped or experiment-scoped event.
    ///
    /// Assigns the next sequence atomically, appends the JSONL line with an
    /// immediate flush, then delivers to subscribers. A sink failure
    /// surfaces to the caller after subscribers are notified; the bus never
    /// retries silently.
    pub fn emit(&self, conversation_id: Option<Uuid>, payload: EventPayload) -> Result<EventRecord> {
        self.emit_with_metadata(conversation_id, payload, None)
    }

    pub fn emit_with_metadata(
        &self,
        conversation_id: Option<Uuid>,
        payload: EventPayload,
        metadata: Option<Value>,
    ) -> Result<EventRecord> {
        let (record, handlers, write_error) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.stopped {
                return Err(Error::Bus("bus is stopped".to_string()));
            }

            let sequence = match conversation_id {
                Some(id) => {
                    let counter = inner.sequences.entry(id).or_insert(0);
                    *counter += 1;
                    *counter
                }
                None => {
                    inner.experiment_sequence += 1;
                    inner.experiment_sequence
                }
            };

            let record = EventRecord {
                sequence,
                timestamp: Utc::now(),
                conversation_id,
                experiment_id: self.experiment_id,
                payload,
                metadata,
            };

            let write_error = inner.append(&record).err();

            inner.history.push_back(record.clone());
            while inner.history.len() > inner.history_limit {
                inner.history.pop_front();
            }

            let handlers: Vec<Handler> = inner
                .subscribers
                .iter()
                .filter(|s| s.filter.is_none() || s.filter == Some(record.kind()))
                .map(|s| s.handler.clone())
                .collect();

            (record, handlers, write_error)
        };

        // Handlers run outside the lock; a panicking subscriber is logged
        // and cannot halt delivery to the rest
        for handler in &handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&record))).is_err() {
                tracing::warn!(kind = record.kind().as_str(), "event handler panicked");
            }
        }

        if let Some(err) = write_error {
            // Deliver the failure to subscribers without writing it back to
            // the failed sink
            let notice = EventRecord {
                sequence: record.sequence,
                timestamp: Utc::now(),
                conversation_id,
                experiment_id: self.experiment_id,
                payload: EventPayload::ApiError {
                    agent_id: None,
                    turn_number: None,
                    kind: "bus_write".to_string(),
                    message: err.to_string(),
                    retryable: false,
                },
                metadata: None,
            };
            let wildcard: Vec<Handler> = {
                let inner = self.inner.lock().unwrap();
                inner
                    .subscribers
                    .iter()
                    .filter(|s| s.filter.is_none() || s.filter == Some(EventKind::ApiError))
                    .map(|s| s.handler.clone())
                    .collect()
            };
            for handler in &wildcard {
                let _ = catch_unwind(AssertUnwindSafe(|| handler(&notice)));
            }
            return Err(Error::Io(err));
        }

        Ok(record)
    }

    /// Last `limit` events from the ring buffer, oldest first
    pub fn history(&self, limit: usize) -> Vec<EventRecord> {
        let inner = self.inner.lock().unwrap();
        let skip = inner.history.len().saturating_sub(limit);
        inner.history.iter().skip(skip).cloned().collect()
    }

    pub fn clear_history(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.history.clear();
    }

    /// Flush and close one conversation's sink. Emissions for that
    /// conversation after this reopen the file, so callers close only after
    /// the ConversationEnd.
    pub fn close_conversation_log(&self, conversation_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(mut file) = inner.writers.remove(&conversation_id) {
            file.flush()?;
        }
        Ok(())
    }

    /// Flush and close every sink; the bus refuses emissions afterwards
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.stopped = true;
        for (_, mut file) in inner.writers.drain() {
            file.flush()?;
        }
        if let Some(mut file) = inner.experiment_writer.take() {
            file.flush()?;
        }
        Ok(())
    }
}

impl BusInner {
    fn append(&mut self, record: &EventRecord) -> std::io::Result<()> {
        let line = record
            .to_jsonl()
            .map_err(|err| std::io::Error::other(err.to_string()))?;

        let file = match record.conversation_id {
            Some(id) => {
                if !self.writers.contains_key(&id) {
                    let path = self.dir.join(format!("{}_events.jsonl", id));
                    let file = OpenOptions::new().create(true).append(true).open(path)?;
                    self.writers.insert(id, file);
                }
                self.writers.get_mut(&id).unwrap()
            }
            None => {
                if self.experiment_writer.is_none() {
                    let path = self.dir.join("experiment.jsonl");
                    let file = OpenOptions::new().create(true).append(true).open(path)?;
                    self.experiment_writer = Some(file);
                }
                self.experiment_writer.as_mut().unwrap()
            }
        };

        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duologue_engine::read_events;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bus(dir: &std::path::Path) -> EventBus {
        EventBus::new(dir.to_path_buf(), Some(Uuid::new_v4()))
    }

    #[test]
    fn test_sequences_are_monotonic_and_independent() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus(dir.path());
        let conv_1 = Uuid::new_v4();
        let conv_2 = Uuid::new_v4();

        let first = bus
            .emit(Some(conv_1), EventPayload::TurnStart { turn_number: 0 })
            .unwrap();
        let second = bus
            .emit(Some(conv_1), EventPayload::TurnStart { turn_number: 1 })
            .unwrap();
        let other = bus
            .emit(Some(conv_2), EventPayload::TurnStart { turn_number: 0 })
            .unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        // Counters are per conversation
        assert_eq!(other.sequence, 1);
    }

    #[test]
    fn test_events_land_in_per_conversation_files() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus(dir.path());
        let conv = Uuid::new_v4();

        bus.emit(Some(conv), EventPayload::TurnStart { turn_number: 0 })
            .unwrap();
        bus.emit(
            None,
            EventPayload::InterruptRequest {
                source: "signal".to_string(),
            },
        )
        .unwrap();

        let conv_events = read_events(&dir.path().join(format!("{}_events.jsonl", conv))).unwrap();
        assert_eq!(conv_events.len(), 1);
        assert_eq!(conv_events[0].kind(), EventKind::TurnStart);

        let exp_events = read_events(&dir.path().join("experiment.jsonl")).unwrap();
        assert_eq!(exp_events.len(), 1);
        assert_eq!(exp_events[0].kind(), EventKind::InterruptRequest);
    }

    #[test]
    fn test_filtered_and_wildcard_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus(dir.path());
        let conv = Uuid::new_v4();

        let turn_starts = Arc::new(AtomicUsize::new(0));
        let all_events = Arc::new(AtomicUsize::new(0));

        let counter = turn_starts.clone();
        bus.subscribe(Some(EventKind::TurnStart), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = all_events.clone();
        bus.subscribe(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(Some(conv), EventPayload::TurnStart { turn_number: 0 })
            .unwrap();
        bus.emit(
            Some(conv),
            EventPayload::TurnComplete {
                turn_number: 0,
                convergence_score: 0.1,
            },
        )
        .unwrap();

        assert_eq!(turn_starts.load(Ordering::SeqCst), 1);
        assert_eq!(all_events.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus(dir.path());
        let conv = Uuid::new_v4();

        bus.subscribe(None, |_| panic!("bad subscriber"));
        let reached = Arc::new(AtomicUsize::new(0));
        let counter = reached.clone();
        bus.subscribe(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(Some(conv), EventPayload::TurnStart { turn_number: 0 })
            .unwrap();
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus(dir.path());
        let conv = Uuid::new_v4();

        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let id = bus.subscribe(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(Some(conv), EventPayload::TurnStart { turn_number: 0 })
            .unwrap();
        bus.unsubscribe(id);
        bus.emit(Some(conv), EventPayload::TurnStart { turn_number: 1 })
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_history_ring_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus(dir.path());
        let conv = Uuid::new_v4();

        for turn in 0..5 {
            bus.emit(Some(conv), EventPayload::TurnStart { turn_number: turn })
                .unwrap();
        }
        let recent = bus.history(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].sequence, 4);
        assert_eq!(recent[1].sequence, 5);

        bus.clear_history();
        assert!(bus.history(10).is_empty());
    }

    #[test]
    fn test_stopped_bus_rejects_emissions() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus(dir.path());
        bus.stop().unwrap();
        let result = bus.emit(
            Some(Uuid::new_v4()),
            EventPayload::TurnStart { turn_number: 0 },
        );
        assert!(result.is_err());
    }
}
