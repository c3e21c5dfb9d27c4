//! Message Bus for lifecycle events
//!
//! Components publish what happened (a pulse tick, a bot wake, a tool call,
//! workforce progress) and interested listeners subscribe. Channels are
//! bounded and publishing never waits: a full or closed subscriber channel
//! drops the event for that subscriber only, so a slow listener can never
//! stall a pulse tick or a runtime step.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    /// A pulse tick ran
    Pulse,
    /// A pulse job woke its bot
    Wake,
    /// The runtime invoked a tool
    ToolCalled,
    /// A workforce job reported an iteration
    WorkforceProgress,
    /// A workforce job finished (either way)
    WorkforceFinished,
    EngineStarted,
    EngineStopping,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the message bus
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Pulse {
        timestamp: i64,
        due: usize,
    },
    Wake {
        job_id: String,
        bot_id: String,
        success: bool,
        execution_time_ms: i64,
    },
    ToolCalled {
        run_id: String,
        tool: String,
        args: String,
        success: bool,
    },
    WorkforceProgress {
        job_id: String,
        percent: u32,
    },
    WorkforceFinished {
        job_id: String,
        status: String,
    },
    EngineStarted,
    EngineStopping,
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::Pulse { .. } => EventType::Pulse,
            Event::Wake { .. } => EventType::Wake,
            Event::ToolCalled { .. } => EventType::ToolCalled,
            Event::WorkforceProgress { .. } => EventType::WorkforceProgress,
            Event::WorkforceFinished { .. } => EventType::WorkforceFinished,
            Event::EngineStarted => EventType::EngineStarted,
            Event::EngineStopping => EventType::EngineStopping,
        }
    }
}

/// Message bus for pub/sub communication between components
///
/// Cloning yields another handle onto the same subscriber table.
#[derive(Clone)]
pub struct MessageBus {
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    ///
    /// The returned channel holds at most CHANNEL_BUFFER_SIZE undelivered
    /// events; newer events are dropped while it is full.
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all subscribers without waiting on any of them
    ///
    /// Subscribers whose receiver was dropped are removed.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        trace!("Subscriber channel full, dropping {:?}", event_type);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }

    /// Number of live subscribers for an event type
    pub async fn subscriber_count(&self, event_type: EventType) -> usize {
        let channels = self.channels.lock().await;
        channels.get(&event_type).map(Vec::len).unwrap_or(0)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
