//! ConsoleHandle - Public API for the ConsoleActor
//!
//! Fire-and-forget methods for operator actions and poller deltas, and async
//! methods with oneshot channels for anything the caller reports back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::commands::{ConsoleCommand, ConsoleSnapshot};
use super::types::{ChannelPreset, GroupId};
use crate::group::{PairingError, SnapRules};
use crate::sink::PresentationSink;

/// Handle for interacting with the ConsoleActor
///
/// Cheap to clone; every clone talks to the same actor. All methods are
/// non-blocking for the caller.
///
/// # Fire-and-forget
/// - `set_mute`, `set_solo`, `set_level`, `clear_all_solo`, `apply_presets`
/// - `set_macro_level`, `set_balance`, `move_group`, group mute/solo toggles
/// - `observe_levels` (poller)
///
/// # Query methods (async with response)
/// - `drag_block`, `pair`, `ungroup`, `snapshot`, `subscribe`
#[derive(Clone)]
pub struct ConsoleHandle {
    /// Command channel to the ConsoleActor
    cmd_tx: mpsc::UnboundedSender<ConsoleCommand>,
}

impl ConsoleHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<ConsoleCommand>) -> Self {
        Self { cmd_tx }
    }

    fn send(&self, cmd: ConsoleCommand) {
        let _ = self.cmd_tx.send(cmd);
    }

    // =========================================================================
    // Channel methods (fire-and-forget)
    // =========================================================================

    pub fn set_mute(&self, name: impl Into<String>, muted: bool) {
        self.send(ConsoleCommand::SetMute {
            name: name.into(),
            muted,
        });
    }

    pub fn set_solo(&self, name: impl Into<String>, soloed: bool) {
        self.send(ConsoleCommand::SetSolo {
            name: name.into(),
            soloed,
        });
    }

    pub fn set_level(&self, name: impl Into<String>, level: u8) {
        self.send(ConsoleCommand::SetLevel {
            name: name.into(),
            level,
        });
    }

    /// Report levels read from hardware (changed ones only)
    pub fn observe_levels(&self, levels: Vec<(String, u8)>) {
        if !levels.is_empty() {
            self.send(ConsoleCommand::ObserveLevels { levels });
        }
    }

    pub fn clear_all_solo(&self) {
        self.send(ConsoleCommand::ClearAllSolo);
    }

    pub fn apply_presets(&self, presets: Vec<ChannelPreset>) {
        self.send(ConsoleCommand::ApplyPresets { presets });
    }

    // =========================================================================
    // Group methods (fire-and-forget)
    // =========================================================================

    pub fn move_group(&self, id: GroupId, x: f64, y: f64) {
        self.send(ConsoleCommand::MoveGroup { id, x, y });
    }

    pub fn set_macro_level(&self, id: GroupId, level: u8) {
        self.send(ConsoleCommand::SetMacroLevel { id, level });
    }

    pub fn set_balance(&self, id: GroupId, balance: u8) {
        self.send(ConsoleCommand::SetBalance { id, balance });
    }

    pub fn toggle_group_mute(&self, id: GroupId) {
        self.send(ConsoleCommand::ToggleGroupMute { id });
    }

    pub fn toggle_group_solo(&self, id: GroupId) {
        self.send(ConsoleCommand::ToggleGroupSolo { id });
    }

    // =========================================================================
    // Query methods (async with response)
    // =========================================================================

    /// Drop a block at (x, y); returns the group formed by snapping, if any
    pub async fn drag_block(&self, name: impl Into<String>, x: f64, y: f64) -> Option<GroupId> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = ConsoleCommand::DragBlock {
            name: name.into(),
            x,
            y,
            response: response_tx,
        };

        if self.cmd_tx.send(cmd).is_err() {
            return None;
        }

        response_rx.await.ok().flatten()
    }

    /// Pair two blocks explicitly
    ///
    /// Returns `None` when the actor is gone.
    pub async fn pair(
        &self,
        member_a: impl Into<String>,
        member_b: impl Into<String>,
    ) -> Option<Result<GroupId, PairingError>> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = ConsoleCommand::Pair {
            member_a: member_a.into(),
            member_b: member_b.into(),
            response: response_tx,
        };

        if self.cmd_tx.send(cmd).is_err() {
            return None;
        }

        response_rx.await.ok()
    }

    pub async fn ungroup(&self, id: GroupId) -> bool {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ConsoleCommand::Ungroup {
                id,
                response: response_tx,
            })
            .is_err()
        {
            return false;
        }

        response_rx.await.unwrap_or(false)
    }

    pub async fn snapshot(&self) -> Option<ConsoleSnapshot> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ConsoleCommand::Snapshot {
                response: response_tx,
            })
            .is_err()
        {
            return None;
        }

        response_rx.await.ok()
    }

    /// Register a presentation sink, returning its subscriber id
    pub async fn subscribe(&self, sink: Arc<dyn PresentationSink>) -> Option<usize> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ConsoleCommand::Subscribe {
                sink,
                response: response_tx,
            })
            .is_err()
        {
            return None;
        }

        response_rx.await.ok()
    }

    // =========================================================================
    // Tunables and lifecycle
    // =========================================================================

    pub fn set_snap_rules(&self, rules: SnapRules) {
        self.send(ConsoleCommand::SetSnapRules(rules));
    }

    pub fn set_flash_interval(&self, period: Duration) {
        self.send(ConsoleCommand::SetFlashInterval(period));
    }

    /// Check if the actor is still alive
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Signal the actor to shut down gracefully
    pub fn shutdown(&self) {
        self.send(ConsoleCommand::Shutdown);
    }
}
