//! Mute/solo state machine
//!
//! Single source of truth for mute and solo across every hardware control.
//! Solo overrides mute: while any input channel is soloed, every other input
//! channel is muted implicitly and the operator's own mutes are remembered in
//! `pre_solo_muted` so they come back when the last solo is released.
//! Output channels are never muted by someone else's solo, and soloing an
//! output does not mute anything.
//!
//! Every setter is idempotent and absorbs its own errors: unknown channels
//! and backend failures are logged and never surface to the caller.

use super::bus::EventBus;
use super::flash::FlashTicker;
use super::types::{ChannelKind, ChannelPreset, ChannelRecord, MixerEvent};
use crate::backend::{GainBackend, SharedBackend, MAX_LEVEL};
use crate::sink::PresentationSink;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Owner of every [`ChannelRecord`]
pub struct MuteSoloMachine {
    backend: SharedBackend,
    /// Records keyed by control name
    channels: HashMap<String, ChannelRecord>,
    /// Inventory order, used for every sweep
    order: Vec<String>,
    /// Channels currently soloed (inputs and outputs)
    soloed: BTreeSet<String>,
    /// Channels currently muted
    muted: BTreeSet<String>,
    flash: FlashTicker,
    bus: EventBus,
    /// Nesting depth of `batch` calls
    batch_depth: usize,
    /// A StateChanged is owed when the outermost batch ends
    batch_dirty: bool,
}

impl MuteSoloMachine {
    /// Seed one record per control the backend lists
    ///
    /// A failing inventory call yields an empty machine (logged).
    pub fn new<S: AsRef<str>>(backend: SharedBackend, output_prefixes: &[S]) -> Self {
        let controls = match backend.list_controls() {
            Ok(controls) => controls,
            Err(e) => {
                warn!(backend = backend.name(), "Failed to list controls: {}", e);
                Vec::new()
            }
        };
        Self::with_controls(backend, controls, output_prefixes)
    }

    /// Seed records for an explicit control list
    pub fn with_controls<S: AsRef<str>>(
        backend: SharedBackend,
        controls: Vec<String>,
        output_prefixes: &[S],
    ) -> Self {
        let mut channels = HashMap::with_capacity(controls.len());
        let mut order = Vec::with_capacity(controls.len());

        for name in controls {
            if channels.contains_key(&name) {
                warn!(channel = %name, "Duplicate control name skipped");
                continue;
            }
            let level = match backend.get_level(&name) {
                Ok(level) => level.min(MAX_LEVEL),
                Err(e) => {
                    warn!(channel = %name, "Initial level read failed, assuming 0: {}", e);
                    0
                }
            };
            let kind = ChannelKind::classify(&name, output_prefixes);
            channels.insert(name.clone(), ChannelRecord::new(name.clone(), kind, level));
            order.push(name);
        }

        info!(
            channels = order.len(),
            outputs = channels.values().filter(|r| r.kind.is_output()).count(),
            "Mute/solo state machine ready"
        );

        Self {
            backend,
            channels,
            order,
            soloed: BTreeSet::new(),
            muted: BTreeSet::new(),
            flash: FlashTicker::new(),
            bus: EventBus::new(),
            batch_depth: 0,
            batch_dirty: false,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn record(&self, name: &str) -> Option<&ChannelRecord> {
        self.channels.get(name)
    }

    /// Control names in inventory order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Fader level of a channel (remembered level while muted)
    pub fn level(&self, name: &str) -> Option<u8> {
        self.channels.get(name).map(ChannelRecord::fader_level)
    }

    pub fn get_mute(&self, name: &str) -> bool {
        self.channels.get(name).map(|r| r.muted).unwrap_or(false)
    }

    pub fn get_solo(&self, name: &str) -> bool {
        self.channels.get(name).map(|r| r.soloed).unwrap_or(false)
    }

    /// Whether any channel at all is soloed
    pub fn any_soloed(&self) -> bool {
        !self.soloed.is_empty()
    }

    /// Whether solo is currently muting inputs (an input channel is soloed)
    pub fn is_solo_active(&self) -> bool {
        self.soloed.iter().any(|name| {
            self.channels
                .get(name)
                .map(|r| !r.kind.is_output())
                .unwrap_or(false)
        })
    }

    /// Mute state as heard, taking solo into account
    ///
    /// Inputs follow `not soloed` whenever solo is active; outputs always
    /// report their stored flag.
    pub fn get_effective_mute(&self, name: &str) -> bool {
        let Some(record) = self.channels.get(name) else {
            warn!(channel = %name, "Effective mute requested for unknown channel");
            return false;
        };
        if !record.kind.is_output() && self.is_solo_active() {
            !record.soloed
        } else {
            record.muted
        }
    }

    /// Copy of every record in inventory order
    pub fn snapshot(&self) -> Vec<ChannelRecord> {
        self.order
            .iter()
            .filter_map(|name| self.channels.get(name).cloned())
            .collect()
    }

    pub fn soloed_channels(&self) -> Vec<String> {
        self.soloed.iter().cloned().collect()
    }

    pub fn muted_channels(&self) -> Vec<String> {
        self.muted.iter().cloned().collect()
    }

    pub fn backend(&self) -> &dyn GainBackend {
        self.backend.as_ref()
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    pub fn subscribe(&mut self, sink: Arc<dyn PresentationSink>) -> usize {
        self.bus.subscribe(sink)
    }

    /// Publish an event to every sink
    pub fn publish(&self, event: MixerEvent) {
        self.bus.publish(&event);
    }

    pub fn flash_active(&self) -> bool {
        self.flash.is_active()
    }

    /// Advance the blink phase; the owner calls this once per flash period
    pub fn tick_flash(&mut self) {
        if let Some(event) = self.flash.tick() {
            self.bus.publish(&event);
        }
    }

    /// Run `f` with aggregate notifications deferred
    ///
    /// Per-channel events are still published as they happen; a single
    /// StateChanged follows when the outermost batch ends, if anything
    /// asked for one.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.batch_depth += 1;
        let result = f(self);
        self.batch_depth -= 1;

        if self.batch_depth == 0 && std::mem::take(&mut self.batch_dirty) {
            self.bus.publish(&MixerEvent::StateChanged);
        }
        result
    }

    fn state_changed(&mut self) {
        if self.batch_depth > 0 {
            self.batch_dirty = true;
        } else {
            self.bus.publish(&MixerEvent::StateChanged);
        }
    }

    fn refresh_flash(&mut self) {
        let active = !self.muted.is_empty() || !self.soloed.is_empty();
        if let Some(event) = self.flash.set_active(active) {
            self.bus.publish(&event);
        }
        if active {
            trace!(
                muted = self.muted.len(),
                soloed = self.soloed.len(),
                "Flash ticker running"
            );
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Set the mute state of one channel
    ///
    /// No-op when the request changes nothing: unmuting an unmuted channel,
    /// or muting a muted one without upgrading it to explicit. Muting
    /// remembers the current hardware level and pushes 0; unmuting pushes
    /// the remembered level back. `skip_hardware_write` changes only the
    /// model.
    pub fn set_mute(&mut self, name: &str, muted: bool, explicit: bool, skip_hardware_write: bool) {
        let solo_active = self.is_solo_active();
        let backend = self.backend.as_ref();

        let Some(record) = self.channels.get_mut(name) else {
            warn!(channel = %name, "Channel not found, mute ignored");
            return;
        };
        let unchanged = if muted {
            record.muted && (record.explicit_mute || !explicit)
        } else {
            !record.muted
        };
        if unchanged {
            return;
        }

        if muted {
            if !record.muted {
                record.pre_mute_level = read_level(backend, name, record.level);
                if !skip_hardware_write && push_level(backend, name, 0) {
                    record.level = 0;
                }
            }
            record.muted = true;
            if explicit {
                record.explicit_mute = true;
            }
            self.muted.insert(name.to_string());
        } else {
            if record.muted
                && !skip_hardware_write
                && push_level(backend, name, record.pre_mute_level)
            {
                record.level = record.pre_mute_level;
            }
            record.muted = false;
            record.explicit_mute = false;
            self.muted.remove(name);
        }

        if !solo_active {
            record.pre_solo_muted = record.muted;
        }

        let explicit_now = record.explicit_mute;
        // What the hardware now holds: 0 once muted, the restored level after
        let shown_level = if record.muted { 0 } else { record.level };
        debug!(
            channel = %name,
            muted,
            explicit = explicit_now,
            pre_mute_level = record.pre_mute_level,
            "Mute updated"
        );

        self.refresh_flash();
        self.bus.publish(&MixerEvent::MuteChanged {
            name: name.to_string(),
            muted,
            explicit: explicit_now,
        });
        self.bus.publish(&MixerEvent::LevelChanged {
            name: name.to_string(),
            level: shown_level,
        });
        self.state_changed();
    }

    /// Set the solo state of one channel and re-apply solo logic everywhere
    pub fn set_solo(&mut self, name: &str, soloed: bool, explicit: bool, skip_hardware_write: bool) {
        let Some(record) = self.channels.get(name) else {
            warn!(channel = %name, "Channel not found, solo ignored");
            return;
        };
        if record.soloed == soloed && record.explicit_solo == explicit {
            return;
        }

        // First input solo: remember what every channel looked like without it
        if soloed && !record.kind.is_output() && !self.is_solo_active() {
            for record in self.channels.values_mut() {
                record.pre_solo_muted = record.muted;
            }
            debug!("Pre-solo mute snapshot taken");
        }

        if let Some(record) = self.channels.get_mut(name) {
            record.soloed = soloed;
            if !soloed {
                record.explicit_solo = false;
            } else if explicit {
                record.explicit_solo = true;
            }
        }
        if soloed {
            self.soloed.insert(name.to_string());
        } else {
            self.soloed.remove(name);
        }

        debug!(channel = %name, soloed, explicit, "Solo updated");
        self.bus.publish(&MixerEvent::SoloChanged {
            name: name.to_string(),
            soloed,
        });

        self.batch(|machine| {
            machine.apply_solo_logic(skip_hardware_write);
            machine.refresh_flash();
            machine.state_changed();
        });
    }

    pub fn toggle_mute(&mut self, name: &str) {
        let muted = self.get_mute(name);
        self.set_mute(name, !muted, true, false);
    }

    pub fn toggle_solo(&mut self, name: &str) {
        let soloed = self.get_solo(name);
        self.set_solo(name, !soloed, true, false);
    }

    /// Re-derive every channel's mute from the solo set
    ///
    /// Each channel's target depends only on its own record and on whether
    /// solo is active, so the sweep is order-independent and idempotent.
    fn apply_solo_logic(&mut self, skip_hardware_write: bool) {
        let solo_active = self.is_solo_active();
        let order = self.order.clone();

        for name in &order {
            let Some(record) = self.channels.get(name) else {
                continue;
            };
            let (target, explicit) = if solo_active {
                if record.kind.is_output() {
                    (record.muted, false)
                } else {
                    (!record.soloed, false)
                }
            } else {
                // Mutes surviving a cleared solo belong to the operator
                (record.pre_solo_muted, record.pre_solo_muted)
            };
            if target == record.muted {
                continue;
            }
            self.set_mute(name, target, explicit, skip_hardware_write);
        }
    }

    /// Move a channel's level, respecting mute
    ///
    /// While muted only the remembered level changes, so the channel stays
    /// silent. Returns false when the channel is unknown or the hardware
    /// write failed.
    pub fn set_level(&mut self, name: &str, value: u8) -> bool {
        let backend = self.backend.as_ref();
        let Some(record) = self.channels.get_mut(name) else {
            warn!(channel = %name, "Channel not found, level ignored");
            return false;
        };
        let value = value.min(MAX_LEVEL);

        let stored = if record.muted {
            record.pre_mute_level = value;
            true
        } else if push_level(backend, name, value) {
            record.level = value;
            true
        } else {
            false
        };

        if stored {
            trace!(channel = %name, value, muted = record.muted, "Level set");
            self.bus.publish(&MixerEvent::LevelChanged {
                name: name.to_string(),
                level: value,
            });
        }
        stored
    }

    /// Take in a level observed on the hardware (poller, second controller)
    ///
    /// Updates the model without writing back. Returns true only when the
    /// value differs from the last known level.
    pub fn observe_level(&mut self, name: &str, value: u8) -> bool {
        let Some(record) = self.channels.get_mut(name) else {
            debug!(channel = %name, "Observed level for unknown channel ignored");
            return false;
        };
        let value = value.min(MAX_LEVEL);
        if record.level == value {
            return false;
        }

        debug!(channel = %name, from = record.level, to = value, "External level change");
        record.level = value;
        let shown = record.fader_level();
        self.bus.publish(&MixerEvent::LevelChanged {
            name: name.to_string(),
            level: shown,
        });
        true
    }

    /// Release every solo, with one aggregate notification
    pub fn clear_all_solo(&mut self) {
        let soloed: Vec<String> = self.soloed.iter().cloned().collect();
        if soloed.is_empty() {
            return;
        }
        info!(count = soloed.len(), "Clearing all solos");
        self.batch(|machine| {
            for name in &soloed {
                machine.set_solo(name, false, true, false);
            }
        });
    }

    /// Apply a set of channel presets in one batch
    ///
    /// Solos are cleared first, then levels and mutes are applied, then the
    /// preset solos, so the result does not depend on entry order.
    pub fn apply_presets(&mut self, presets: &[ChannelPreset]) {
        info!(entries = presets.len(), "Applying presets");
        self.batch(|machine| {
            machine.clear_all_solo();

            for preset in presets {
                if !machine.contains(&preset.name) {
                    warn!(channel = %preset.name, "Preset for unknown channel skipped");
                    continue;
                }
                if let Some(level) = preset.level {
                    machine.set_level(&preset.name, level);
                }
                machine.set_mute(&preset.name, preset.muted, true, false);
            }

            for preset in presets.iter().filter(|p| p.soloed) {
                machine.set_solo(&preset.name, true, true, false);
            }
            machine.state_changed();
        });
    }
}

/// Read a level, falling back to the last known value on failure
fn read_level(backend: &dyn GainBackend, name: &str, last_known: u8) -> u8 {
    match backend.get_level(name) {
        Ok(level) => level.min(MAX_LEVEL),
        Err(e) => {
            warn!(channel = %name, "Level read failed, using last known {}: {}", last_known, e);
            last_known
        }
    }
}

/// Write a level, logging failures. Returns whether the write succeeded.
fn push_level(backend: &dyn GainBackend, name: &str, value: u8) -> bool {
    match backend.set_level(name, value) {
        Ok(()) => true,
        Err(e) => {
            warn!(channel = %name, value, "Hardware write failed: {}", e);
            false
        }
    }
}
