//! Event fan-out to registered presentation sinks

use super::types::MixerEvent;
use crate::sink::PresentationSink;
use std::sync::Arc;
use tracing::debug;

/// Registered listeners, notified in registration order
#[derive(Default, Clone)]
pub struct EventBus {
    sinks: Vec<Arc<dyn PresentationSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink, returning its subscriber id
    pub fn subscribe(&mut self, sink: Arc<dyn PresentationSink>) -> usize {
        debug!(sink = sink.name(), "sink subscribed");
        self.sinks.push(sink);
        self.sinks.len() - 1
    }

    pub fn publish(&self, event: &MixerEvent) {
        for sink in &self.sinks {
            sink.on_event(event);
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}
