//! Presentation sinks - receivers of mixer state notifications
//!
//! The state machine publishes typed [`MixerEvent`]s; anything that repaints
//! (a GUI, a control surface, a log) registers a sink and reacts to them.

use crate::state::MixerEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace};

/// Presentation sink trait - all repaint targets implement this
///
/// `on_event` runs on the state owner's task, so implementations must return
/// quickly and must not call back into the console handle synchronously.
pub trait PresentationSink: Send + Sync {
    /// Sink name for logs
    fn name(&self) -> &str;

    /// Receive one event
    fn on_event(&self, event: &MixerEvent);
}

/// ConsoleSink logs every notification
///
/// Flash ticks are logged at trace level only, they fire several times a
/// second while anything is muted.
pub struct ConsoleSink {
    name: String,
    received: AtomicU64,
}

impl ConsoleSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            received: AtomicU64::new(0),
        }
    }

    /// Number of events received so far
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl PresentationSink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, event: &MixerEvent) {
        let count = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        let ts = chrono::Local::now().format("%H:%M:%S%.3f");

        match event {
            MixerEvent::FlashTick { on } => {
                trace!(sink = %self.name, on, "flash tick");
            }
            MixerEvent::StateChanged => {
                debug!(sink = %self.name, event_no = count, "state changed");
            }
            MixerEvent::MuteChanged {
                name,
                muted,
                explicit,
            } => {
                info!(
                    "🔇 [{}] {} mute={} ({})",
                    ts,
                    name,
                    muted,
                    if *explicit { "explicit" } else { "solo" }
                );
            }
            MixerEvent::SoloChanged { name, soloed } => {
                info!("🎧 [{}] {} solo={}", ts, name, soloed);
            }
            MixerEvent::LevelChanged { name, level } => {
                debug!(sink = %self.name, channel = %name, level, "level changed");
            }
            MixerEvent::GroupChanged {
                id,
                member_a,
                member_b,
                macro_level,
                balance,
            } => {
                info!(
                    "🔗 [{}] {} {}+{} level={} balance={}",
                    ts, id, member_a, member_b, macro_level, balance
                );
            }
            MixerEvent::GroupRemoved { id } => {
                info!("✂️  [{}] {} ungrouped", ts, id);
            }
        }
    }
}

/// Sink that keeps every event, for assertions in tests
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: parking_lot::Mutex<Vec<MixerEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<MixerEvent> {
        self.events.lock().clone()
    }

    pub(crate) fn clear(&self) {
        self.events.lock().clear();
    }

    pub(crate) fn count_state_changed(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, MixerEvent::StateChanged))
            .count()
    }
}

#[cfg(test)]
impl PresentationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_event(&self, event: &MixerEvent) {
        self.events.lock().push(event.clone());
    }
}
