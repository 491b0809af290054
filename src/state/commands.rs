//! Command enum for the console actor
//!
//! Every mutation of channel or group state travels as a message to the
//! single task that owns the state machine and the group coordinator.

use super::types::{ChannelPreset, ChannelRecord, GroupId};
use crate::group::{Group, PairingError, SceneItem, SnapRules};
use crate::sink::PresentationSink;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time copy of everything the console owns
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleSnapshot {
    /// Channel records in inventory order
    pub channels: Vec<ChannelRecord>,
    /// Patch surface in scan order
    pub scene: Vec<SceneItem>,
    /// Any input channel soloed
    pub solo_active: bool,
    pub flash_active: bool,
}

impl ConsoleSnapshot {
    pub fn channel(&self, name: &str) -> Option<&ChannelRecord> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.scene.iter().filter_map(|item| match item {
            SceneItem::Group(group) => Some(group),
            SceneItem::Block { .. } => None,
        })
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups().find(|g| g.id == id)
    }
}

// ============================================================================
// ConsoleCommand
// ============================================================================

/// Commands for the console actor
///
/// Commands are divided into two categories:
/// - **Fire-and-forget**: operator actions and poller deltas; the actor
///   absorbs every error into a log line
/// - **Request-response**: operations whose outcome the caller reports,
///   answered through a oneshot channel
pub enum ConsoleCommand {
    // -------------------------------------------------------------------------
    // Channel commands (fire and forget)
    // -------------------------------------------------------------------------
    /// Operator mute (explicit)
    SetMute { name: String, muted: bool },

    /// Operator solo (explicit)
    SetSolo { name: String, soloed: bool },

    /// Direct fader move on one channel
    SetLevel { name: String, level: u8 },

    /// Levels read back from hardware by the poller, changed ones only
    ObserveLevels { levels: Vec<(String, u8)> },

    ClearAllSolo,

    /// Apply presets in one batch
    ApplyPresets { presets: Vec<ChannelPreset> },

    // -------------------------------------------------------------------------
    // Group commands (fire and forget)
    // -------------------------------------------------------------------------
    MoveGroup { id: GroupId, x: f64, y: f64 },

    SetMacroLevel { id: GroupId, level: u8 },

    SetBalance { id: GroupId, balance: u8 },

    ToggleGroupMute { id: GroupId },

    ToggleGroupSolo { id: GroupId },

    // -------------------------------------------------------------------------
    // Request-response commands
    // -------------------------------------------------------------------------
    /// Move a free block and run pairing detection once the drag ends
    ///
    /// Answers with the group formed by the drop, if any.
    DragBlock {
        name: String,
        x: f64,
        y: f64,
        response: oneshot::Sender<Option<GroupId>>,
    },

    /// Explicit pairing action
    Pair {
        member_a: String,
        member_b: String,
        response: oneshot::Sender<Result<GroupId, PairingError>>,
    },

    Ungroup {
        id: GroupId,
        response: oneshot::Sender<bool>,
    },

    Snapshot {
        response: oneshot::Sender<ConsoleSnapshot>,
    },

    /// Register a presentation sink
    Subscribe {
        sink: Arc<dyn PresentationSink>,
        response: oneshot::Sender<usize>,
    },

    // -------------------------------------------------------------------------
    // Live tunables and lifecycle
    // -------------------------------------------------------------------------
    SetSnapRules(SnapRules),

    SetFlashInterval(Duration),

    /// Gracefully shut down the actor
    Shutdown,
}

// Manual Debug implementation because PresentationSink doesn't implement Debug
impl std::fmt::Debug for ConsoleCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsoleCommand::SetMute { name, muted } => f
                .debug_struct("SetMute")
                .field("name", name)
                .field("muted", muted)
                .finish(),
            ConsoleCommand::SetSolo { name, soloed } => f
                .debug_struct("SetSolo")
                .field("name", name)
                .field("soloed", soloed)
                .finish(),
            ConsoleCommand::SetLevel { name, level } => f
                .debug_struct("SetLevel")
                .field("name", name)
                .field("level", level)
                .finish(),
            ConsoleCommand::ObserveLevels { levels } => f
                .debug_struct("ObserveLevels")
                .field("count", &levels.len())
                .finish(),
            ConsoleCommand::ClearAllSolo => write!(f, "ClearAllSolo"),
            ConsoleCommand::ApplyPresets { presets } => f
                .debug_struct("ApplyPresets")
                .field("entries", &presets.len())
                .finish(),
            ConsoleCommand::MoveGroup { id, x, y } => f
                .debug_struct("MoveGroup")
                .field("id", id)
                .field("x", x)
                .field("y", y)
                .finish(),
            ConsoleCommand::SetMacroLevel { id, level } => f
                .debug_struct("SetMacroLevel")
                .field("id", id)
                .field("level", level)
                .finish(),
            ConsoleCommand::SetBalance { id, balance } => f
                .debug_struct("SetBalance")
                .field("id", id)
                .field("balance", balance)
                .finish(),
            ConsoleCommand::ToggleGroupMute { id } => {
                f.debug_struct("ToggleGroupMute").field("id", id).finish()
            }
            ConsoleCommand::ToggleGroupSolo { id } => {
                f.debug_struct("ToggleGroupSolo").field("id", id).finish()
            }
            ConsoleCommand::DragBlock { name, x, y, .. } => f
                .debug_struct("DragBlock")
                .field("name", name)
                .field("x", x)
                .field("y", y)
                .finish_non_exhaustive(),
            ConsoleCommand::Pair {
                member_a, member_b, ..
            } => f
                .debug_struct("Pair")
                .field("member_a", member_a)
                .field("member_b", member_b)
                .finish_non_exhaustive(),
            ConsoleCommand::Ungroup { id, .. } => f
                .debug_struct("Ungroup")
                .field("id", id)
                .finish_non_exhaustive(),
            ConsoleCommand::Snapshot { .. } => f.debug_struct("Snapshot").finish_non_exhaustive(),
            ConsoleCommand::Subscribe { sink, .. } => f
                .debug_struct("Subscribe")
                .field("sink", &sink.name())
                .finish_non_exhaustive(),
            ConsoleCommand::SetSnapRules(rules) => {
                f.debug_tuple("SetSnapRules").field(rules).finish()
            }
            ConsoleCommand::SetFlashInterval(period) => {
                f.debug_tuple("SetFlashInterval").field(period).finish()
            }
            ConsoleCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ConsoleSink;

    #[test]
    fn test_console_command_debug() {
        let cmd = ConsoleCommand::SetMute {
            name: "Mic-AN1".to_string(),
            muted: true,
        };
        let debug_str = format!("{:?}", cmd);
        assert!(debug_str.contains("SetMute"));
        assert!(debug_str.contains("Mic-AN1"));

        let (tx, _rx) = oneshot::channel();
        let cmd = ConsoleCommand::Subscribe {
            sink: Arc::new(ConsoleSink::new("console")),
            response: tx,
        };
        let debug_str = format!("{:?}", cmd);
        assert!(debug_str.contains("Subscribe"));
        assert!(debug_str.contains("console"));

        let cmd = ConsoleCommand::ObserveLevels {
            levels: vec![("Mic-AN1".to_string(), 10), ("Mic-AN2".to_string(), 20)],
        };
        assert!(format!("{:?}", cmd).contains("count: 2"));

        assert_eq!(format!("{:?}", ConsoleCommand::Shutdown), "Shutdown");
    }

    #[tokio::test]
    async fn test_pairing_response_channel() {
        let (tx, rx) = oneshot::channel::<Result<GroupId, PairingError>>();
        tx.send(Err(PairingError::SelfPair("Mic-AN1".to_string())))
            .unwrap();
        assert!(matches!(rx.await.unwrap(), Err(PairingError::SelfPair(_))));
    }
}
