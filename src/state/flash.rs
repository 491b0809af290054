//! Flash ticker - shared blink phase for mute/solo feedback
//!
//! The ticker only holds the phase; the owner's run loop drives `tick()` from
//! its own interval timer.

use super::types::MixerEvent;
use std::time::Duration;

/// Default blink period
pub const DEFAULT_FLASH_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlashTicker {
    active: bool,
    on: bool,
}

impl FlashTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Start or stop blinking
    ///
    /// Stopping resets the phase and yields a final `FlashTick { on: false }`
    /// so sinks do not stay lit.
    pub fn set_active(&mut self, active: bool) -> Option<MixerEvent> {
        if active == self.active {
            return None;
        }
        self.active = active;
        if active {
            None
        } else {
            self.on = false;
            Some(MixerEvent::FlashTick { on: false })
        }
    }

    /// Advance one period. No-op while stopped.
    pub fn tick(&mut self) -> Option<MixerEvent> {
        if !self.active {
            return None;
        }
        self.on = !self.on;
        Some(MixerEvent::FlashTick { on: self.on })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_only_while_active() {
        let mut ticker = FlashTicker::new();
        assert_eq!(ticker.tick(), None);

        assert_eq!(ticker.set_active(true), None);
        assert_eq!(ticker.tick(), Some(MixerEvent::FlashTick { on: true }));
        assert_eq!(ticker.tick(), Some(MixerEvent::FlashTick { on: false }));
        assert_eq!(ticker.tick(), Some(MixerEvent::FlashTick { on: true }));
    }

    #[test]
    fn test_stop_resets_phase() {
        let mut ticker = FlashTicker::new();
        ticker.set_active(true);
        ticker.tick();
        assert!(ticker.is_on());

        assert_eq!(
            ticker.set_active(false),
            Some(MixerEvent::FlashTick { on: false })
        );
        assert!(!ticker.is_on());
        assert!(!ticker.is_active());

        // Stopping twice emits nothing
        assert_eq!(ticker.set_active(false), None);
    }
}
