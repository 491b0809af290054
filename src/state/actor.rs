//! ConsoleActor - single owner of channel and group state
//!
//! The actor owns the [`MuteSoloMachine`] and the [`GroupCoordinator`] and
//! processes commands one at a time, so neither needs a lock. It also drives
//! the flash ticker from its own interval timer.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ConsoleActor                 │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ machine: MuteSoloMachine               │  │
//! │  │ groups:  GroupCoordinator              │  │
//! │  └────────────────────────────────────────┘  │
//! │        ▲ commands            ▲ flash tick    │
//! │  command_rx (unbounded)   interval timer     │
//! └──────────────────────────────────────────────┘
//!      ▲                ▲
//!   REPL / UI       level poller
//! ```

use super::actor_handle::ConsoleHandle;
use super::commands::{ConsoleCommand, ConsoleSnapshot};
use super::flash::DEFAULT_FLASH_INTERVAL;
use super::mute_solo::MuteSoloMachine;
use crate::group::GroupCoordinator;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Actor responsible for all mixer state
pub struct ConsoleActor {
    machine: MuteSoloMachine,
    groups: GroupCoordinator,
    /// Receiver for incoming commands
    command_rx: mpsc::UnboundedReceiver<ConsoleCommand>,
    flash_interval: Duration,
    /// Total commands processed
    command_count: u64,
}

impl ConsoleActor {
    /// Spawn the actor's run loop as a tokio task and return its handle
    pub fn spawn(
        machine: MuteSoloMachine,
        groups: GroupCoordinator,
        flash_interval: Duration,
    ) -> ConsoleHandle {
        let (cmd_tx, command_rx) = mpsc::unbounded_channel();

        let actor = ConsoleActor {
            machine,
            groups,
            command_rx,
            flash_interval: sanitize_interval(flash_interval),
            command_count: 0,
        };

        tokio::spawn(actor.run());
        info!("ConsoleActor spawned");

        ConsoleHandle::new(cmd_tx)
    }

    /// Main run loop
    ///
    /// Exits on `Shutdown` or once every handle has been dropped.
    async fn run(mut self) {
        debug!(
            channels = self.machine.len(),
            flash_ms = self.flash_interval.as_millis() as u64,
            "ConsoleActor run loop started"
        );
        let mut flash = flash_timer(self.flash_interval);

        loop {
            tokio::select! {
                maybe_cmd = self.command_rx.recv() => {
                    let Some(cmd) = maybe_cmd else {
                        debug!("All console handles dropped");
                        break;
                    };
                    trace!(?cmd, "Processing command");
                    self.command_count += 1;

                    match cmd {
                        ConsoleCommand::Shutdown => {
                            info!("ConsoleActor received shutdown command");
                            break;
                        }
                        ConsoleCommand::SetFlashInterval(period) => {
                            let period = sanitize_interval(period);
                            if period != self.flash_interval {
                                info!(ms = period.as_millis() as u64, "Flash interval updated");
                                self.flash_interval = period;
                                flash = flash_timer(period);
                            }
                        }
                        cmd => hardware_section(|| self.handle_command(cmd)),
                    }
                }
                _ = flash.tick() => {
                    if self.machine.flash_active() {
                        self.machine.tick_flash();
                    }
                }
            }
        }

        info!(
            command_count = self.command_count,
            "ConsoleActor run loop terminated"
        );
    }

    fn handle_command(&mut self, cmd: ConsoleCommand) {
        match cmd {
            ConsoleCommand::SetMute { name, muted } => {
                self.machine.set_mute(&name, muted, true, false);
            }
            ConsoleCommand::SetSolo { name, soloed } => {
                self.machine.set_solo(&name, soloed, true, false);
            }
            ConsoleCommand::SetLevel { name, level } => {
                // A member moved on its own: the group follows, hardware does not
                if self.machine.set_level(&name, level) {
                    self.groups.reconcile_member(&self.machine, &name);
                }
            }
            ConsoleCommand::ObserveLevels { levels } => {
                self.handle_observe_levels(levels);
            }
            ConsoleCommand::ClearAllSolo => self.machine.clear_all_solo(),
            ConsoleCommand::ApplyPresets { presets } => {
                self.machine.apply_presets(&presets);
                for preset in presets.iter().filter(|p| p.level.is_some()) {
                    self.groups.reconcile_member(&self.machine, &preset.name);
                }
            }
            ConsoleCommand::MoveGroup { id, x, y } => {
                self.groups.move_group(id, x, y);
            }
            ConsoleCommand::SetMacroLevel { id, level } => {
                self.groups.set_macro_level(&mut self.machine, id, level);
            }
            ConsoleCommand::SetBalance { id, balance } => {
                self.groups.set_balance(&mut self.machine, id, balance);
            }
            ConsoleCommand::ToggleGroupMute { id } => {
                self.groups.toggle_group_mute(&mut self.machine, id);
            }
            ConsoleCommand::ToggleGroupSolo { id } => {
                self.groups.toggle_group_solo(&mut self.machine, id);
            }
            ConsoleCommand::DragBlock {
                name,
                x,
                y,
                response,
            } => {
                let formed = if self.groups.move_block(&name, x, y) {
                    self.groups.drag_finished(&self.machine, &name)
                } else {
                    None
                };
                let _ = response.send(formed);
            }
            ConsoleCommand::Pair {
                member_a,
                member_b,
                response,
            } => {
                let result = self.groups.pair(&self.machine, &member_a, &member_b);
                if let Err(e) = &result {
                    warn!("Pairing rejected: {}", e);
                }
                let _ = response.send(result);
            }
            ConsoleCommand::Ungroup { id, response } => {
                let _ = response.send(self.groups.ungroup(&self.machine, id));
            }
            ConsoleCommand::Snapshot { response } => {
                let _ = response.send(self.snapshot());
            }
            ConsoleCommand::Subscribe { sink, response } => {
                let id = self.machine.subscribe(sink);
                let _ = response.send(id);
                debug!(subscriber_id = id, "Added subscriber");
            }
            ConsoleCommand::SetSnapRules(rules) => self.groups.set_rules(rules),
            ConsoleCommand::SetFlashInterval(_) | ConsoleCommand::Shutdown => {
                unreachable!("handled by the run loop")
            }
        }
    }

    /// Take in poller deltas, reconciling each group once per real change
    fn handle_observe_levels(&mut self, levels: Vec<(String, u8)>) {
        let mut changed = 0usize;
        for (name, level) in levels {
            if self.machine.observe_level(&name, level) {
                changed += 1;
                self.groups.reconcile_member(&self.machine, &name);
            }
        }
        if changed > 0 {
            debug!(changed, "External level changes applied");
        }
    }

    fn snapshot(&self) -> ConsoleSnapshot {
        ConsoleSnapshot {
            channels: self.machine.snapshot(),
            scene: self.groups.items().to_vec(),
            solo_active: self.machine.is_solo_active(),
            flash_active: self.machine.flash_active(),
        }
    }
}

fn sanitize_interval(period: Duration) -> Duration {
    if period.is_zero() {
        warn!("Zero flash interval, using default");
        DEFAULT_FLASH_INTERVAL
    } else {
        period
    }
}

fn flash_timer(period: Duration) -> Interval {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

/// Run a command that may call the gain backend
///
/// Backend calls block (amixer spawns a process per call). On the
/// multi-threaded runtime the worker hands its other tasks off first; the
/// current-thread runtime used by tests has no other worker to hand them to.
fn hardware_section<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}
