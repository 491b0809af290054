//! patchbay - mute/solo and channel-pair control core for audio interface mixers
//!
//! The [`state::MuteSoloMachine`] owns one record per hardware gain control
//! and implements explicit mute, exclusive-style solo and flash signalling.
//! The [`group::GroupCoordinator`] pairs two controls into a group driven by
//! a macro level and a constant-power balance. Both live inside a single
//! [`state::ConsoleActor`]; everything else talks to them through a
//! [`state::ConsoleHandle`].

pub mod backend;
pub mod cli;
pub mod config;
pub mod group;
pub mod poller;
pub mod sink;
pub mod state;

pub use backend::{BackendError, GainBackend, SharedBackend};
pub use config::AppConfig;
pub use group::{GroupCoordinator, PairingError};
pub use poller::LevelPoller;
pub use sink::PresentationSink;
pub use state::{ConsoleActor, ConsoleHandle, MuteSoloMachine};
