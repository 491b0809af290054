//! Channel state type definitions
//!
//! Defines the per-control record owned by the mute/solo state machine and
//! the typed events published to presentation sinks.

use serde::{Deserialize, Serialize};

/// Whether a control is an input/crosspoint or a main output
///
/// Outputs are never muted by another channel's solo, and soloing an output
/// does not mute anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Input,
    Output,
}

impl ChannelKind {
    /// Classify a control name against the configured output prefixes
    pub fn classify<S: AsRef<str>>(name: &str, output_prefixes: &[S]) -> Self {
        if output_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_ref()))
        {
            ChannelKind::Output
        } else {
            ChannelKind::Input
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, ChannelKind::Output)
    }
}

/// Per-control state, one per hardware control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Stable key into the gain backend
    pub name: String,
    pub kind: ChannelKind,
    /// Last known hardware level (0-100)
    pub level: u8,
    pub muted: bool,
    pub soloed: bool,
    /// Muted by the operator rather than by someone else's solo
    pub explicit_mute: bool,
    pub explicit_solo: bool,
    /// Level restored on unmute
    pub pre_mute_level: u8,
    /// Mute state restored when solo is cleared globally
    pub pre_solo_muted: bool,
}

impl ChannelRecord {
    pub fn new(name: impl Into<String>, kind: ChannelKind, level: u8) -> Self {
        Self {
            name: name.into(),
            kind,
            level,
            muted: false,
            soloed: false,
            explicit_mute: false,
            explicit_solo: false,
            pre_mute_level: level,
            pre_solo_muted: false,
        }
    }

    /// Level the operator's fader shows: the remembered level while muted
    pub fn fader_level(&self) -> u8 {
        if self.muted {
            self.pre_mute_level
        } else {
            self.level
        }
    }
}

/// Preset entry applied in bulk through batch mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPreset {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub soloed: bool,
}

/// Identifier of a two-channel group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// Events published to presentation sinks
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MixerEvent {
    MuteChanged {
        name: String,
        muted: bool,
        explicit: bool,
    },
    SoloChanged {
        name: String,
        soloed: bool,
    },
    LevelChanged {
        name: String,
        level: u8,
    },
    /// Blink phase while any channel is muted or soloed
    FlashTick {
        on: bool,
    },
    /// Aggregate notification after a call or a batch
    StateChanged,
    GroupChanged {
        id: GroupId,
        member_a: String,
        member_b: String,
        macro_level: u8,
        balance: u8,
    },
    GroupRemoved {
        id: GroupId,
    },
}

impl MixerEvent {
    /// Channel this event refers to, if it is a per-channel event
    pub fn channel(&self) -> Option<&str> {
        match self {
            MixerEvent::MuteChanged { name, .. }
            | MixerEvent::SoloChanged { name, .. }
            | MixerEvent::LevelChanged { name, .. } => Some(name),
            _ => None,
        }
    }
}
