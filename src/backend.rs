//! Gain backends (ALSA mixer via amixer, in-memory model)
//!
//! A backend maps a named hardware control to an integer level 0-100.
//! Every call is best-effort: callers log failures and carry on with the
//! last known value, so nothing here is allowed to panic on bad hardware.

use std::sync::Arc;
use thiserror::Error;

pub mod amixer;
pub mod memory;

pub use amixer::AmixerBackend;
pub use memory::MemoryBackend;

/// Highest level a control accepts
pub const MAX_LEVEL: u8 = 100;

/// Errors raised by a gain backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Unknown control: {0}")]
    UnknownControl(String),

    #[error("Backend command failed: {0}")]
    Command(String),

    #[error("Backend command timed out: {0}")]
    Timeout(String),

    #[error("Could not parse backend output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Injected by test doubles to simulate flaky hardware
    #[error("Simulated hardware failure on {0}")]
    Simulated(String),
}

/// Gain backend trait - every hardware mixer implements this
///
/// Methods take `&self` so a backend can be shared as `Arc<dyn GainBackend>`
/// between the state owner and the level poller. Implementations use
/// interior mutability where they keep state.
pub trait GainBackend: Send + Sync {
    /// Backend name for logs (e.g. "amixer:1", "memory")
    fn name(&self) -> &str;

    /// Read the current level of a control (0-100)
    fn get_level(&self, control: &str) -> Result<u8, BackendError>;

    /// Write a level (0-100) to a control
    fn set_level(&self, control: &str, value: u8) -> Result<(), BackendError>;

    /// List every control the hardware exposes, in hardware order
    fn list_controls(&self) -> Result<Vec<String>, BackendError>;
}

/// Shared backend handle
pub type SharedBackend = Arc<dyn GainBackend>;

/// Clamp any integer into the 0-100 level range
pub fn clamp_level(value: i64) -> u8 {
    value.clamp(0, MAX_LEVEL as i64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_level() {
        assert_eq!(clamp_level(-5), 0);
        assert_eq!(clamp_level(42), 42);
        assert_eq!(clamp_level(250), 100);
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::UnknownControl("PCM-AN1-AN1".to_string());
        assert_eq!(err.to_string(), "Unknown control: PCM-AN1-AN1");

        let err = BackendError::Simulated("Mic-AN1".to_string());
        assert!(err.to_string().contains("Mic-AN1"));
    }
}
