//! Level poller - keeps the model in step with hardware changed out-of-band
//!
//! Reads the watched controls on a fixed period and forwards only the levels
//! that differ from the previous reading. It never touches state itself: the
//! deltas go to the console actor, which owns every channel record.

use crate::backend::{BackendError, SharedBackend};
use crate::state::ConsoleHandle;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Periodic reader of a set of controls
pub struct LevelPoller {
    backend: SharedBackend,
    /// Controls to read; empty means every control the backend lists
    watch: Vec<String>,
    interval: Duration,
    /// Last reading per control
    last: HashMap<String, u8>,
}

impl LevelPoller {
    pub fn new(backend: SharedBackend, watch: Vec<String>, interval: Duration) -> Self {
        Self {
            backend,
            watch,
            interval,
            last: HashMap::new(),
        }
    }

    /// Keep the readings that changed since the previous poll
    ///
    /// Failed reads are skipped and keep their previous value.
    pub fn diff(&mut self, readings: Vec<(String, Result<u8, BackendError>)>) -> Vec<(String, u8)> {
        let mut changed = Vec::new();
        for (name, reading) in readings {
            match reading {
                Ok(level) => {
                    if self.last.insert(name.clone(), level) != Some(level) {
                        changed.push((name, level));
                    }
                }
                Err(e) => debug!(channel = %name, "Poll read failed: {}", e),
            }
        }
        changed
    }

    /// Read every watched control on the blocking pool
    async fn read_all(&self) -> Vec<(String, Result<u8, BackendError>)> {
        let backend = self.backend.clone();
        let watch = self.watch.clone();

        let result = tokio::task::spawn_blocking(move || {
            let names = if watch.is_empty() {
                match backend.list_controls() {
                    Ok(names) => names,
                    Err(e) => {
                        warn!("Poller could not list controls: {}", e);
                        Vec::new()
                    }
                }
            } else {
                watch
            };
            names
                .into_iter()
                .map(|name| {
                    let reading = backend.get_level(&name);
                    (name, reading)
                })
                .collect::<Vec<_>>()
        })
        .await;

        match result {
            Ok(readings) => readings,
            Err(e) => {
                warn!("Poller read task failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Run until the console actor goes away
    pub fn spawn(mut self, console: ConsoleHandle) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_ms = self.interval.as_millis() as u64,
                watched = self.watch.len(),
                "Level poller started"
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !console.is_alive() {
                    break;
                }

                let readings = self.read_all().await;
                let changed = self.diff(readings);
                if !changed.is_empty() {
                    trace!(count = changed.len(), "Forwarding level deltas");
                    console.observe_levels(changed);
                }
            }

            info!("Level poller stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::group::{GridLayout, GroupCoordinator, SnapRules};
    use crate::state::{ConsoleActor, MuteSoloMachine};
    use std::sync::Arc;

    fn poller(backend: Arc<MemoryBackend>) -> LevelPoller {
        LevelPoller::new(backend, Vec::new(), Duration::from_millis(50))
    }

    #[test]
    fn test_diff_reports_changes_once() {
        let backend = Arc::new(MemoryBackend::with_levels(&[("A", 10)]));
        let mut poller = poller(backend);

        let first = poller.diff(vec![("A".to_string(), Ok(10)), ("B".to_string(), Ok(20))]);
        assert_eq!(first.len(), 2);

        let same = poller.diff(vec![("A".to_string(), Ok(10)), ("B".to_string(), Ok(20))]);
        assert!(same.is_empty());

        let moved = poller.diff(vec![("A".to_string(), Ok(15)), ("B".to_string(), Ok(20))]);
        assert_eq!(moved, vec![("A".to_string(), 15)]);
    }

    #[test]
    fn test_diff_skips_failed_reads() {
        let backend = Arc::new(MemoryBackend::with_levels(&[("A", 10)]));
        let mut poller = poller(backend);
        poller.diff(vec![("A".to_string(), Ok(10))]);

        let changed = poller.diff(vec![(
            "A".to_string(),
            Err(BackendError::Simulated("A".to_string())),
        )]);
        assert!(changed.is_empty());

        // The previous reading still counts after the failure
        assert!(poller.diff(vec![("A".to_string(), Ok(10))]).is_empty());
    }

    #[tokio::test]
    async fn test_read_all_watch_list() {
        let backend = Arc::new(MemoryBackend::with_levels(&[("A", 10), ("B", 20)]));
        backend.set_failing("B", true);

        let all = poller(backend.clone()).read_all().await;
        assert_eq!(all.len(), 2);
        assert!(all[1].1.is_err());

        let watched = LevelPoller::new(backend, vec!["A".to_string()], Duration::from_millis(50))
            .read_all()
            .await;
        assert_eq!(watched.len(), 1);
        assert_eq!(watched[0].1.as_ref().ok(), Some(&10));
    }

    #[tokio::test]
    async fn test_external_change_reaches_console() {
        let backend = Arc::new(MemoryBackend::with_levels(&[("Mic-AN1", 80), ("Mic-AN2", 40)]));
        let machine = MuteSoloMachine::new(backend.clone(), &["Main-Out"]);
        let groups =
            GroupCoordinator::with_channels(&machine, GridLayout::default(), SnapRules::default());
        let console = ConsoleActor::spawn(machine, groups, Duration::from_millis(250));
        let id = console.pair("Mic-AN1", "Mic-AN2").await.unwrap().unwrap();

        let task = poller(backend.clone()).spawn(console.clone());
        backend.external_change("Mic-AN2", 80);

        let reconciled = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snapshot = console.snapshot().await.unwrap();
                if snapshot.group(id).map(|g| g.macro_level) == Some(80) {
                    break snapshot;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(reconciled.channel("Mic-AN2").unwrap().level, 80);
        assert_eq!(reconciled.group(id).unwrap().balance, 50);
        assert!(backend.writes().is_empty());

        console.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
