//! State module - mute/solo bookkeeping and the single state owner
//!
//! The [`MuteSoloMachine`] holds every channel record and enforces
//! solo-overrides-mute. The [`ConsoleActor`] owns the machine together with
//! the group coordinator and serializes all access through [`ConsoleHandle`].

mod actor;
mod actor_handle;
mod bus;
mod commands;
mod flash;
mod mute_solo;
mod types;

pub use actor::ConsoleActor;
pub use actor_handle::ConsoleHandle;
pub use bus::EventBus;
pub use commands::{ConsoleCommand, ConsoleSnapshot};
pub use flash::{FlashTicker, DEFAULT_FLASH_INTERVAL};
pub use mute_solo::MuteSoloMachine;
pub use types::{ChannelKind, ChannelPreset, ChannelRecord, GroupId, MixerEvent};
