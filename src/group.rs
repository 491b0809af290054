//! Group module - pairing two channel blocks into one stereo/group unit
//!
//! - Constant-power pan law between (macro_level, balance) and member levels
//! - Block geometry and edge-snap detection
//! - The group coordinator owning the patch surface

mod coordinator;
pub mod layout;
pub mod pan_law;

#[cfg(test)]
mod tests;

pub use coordinator::{Group, GroupCoordinator, PairingError, SceneItem};
pub use layout::{GridLayout, Rect, SnapRules};
pub use pan_law::{derive_levels, initial_group_values, pan_ratios};
