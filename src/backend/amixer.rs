//! ALSA mixer backend driven through the `amixer` utility
//!
//! Each call spawns `amixer -c <card> ...`. Levels are read and written as
//! percentages, which is the same 0-100 scale the core uses.
//!
//! Calls are made from the state owner's task, so every child process gets a
//! bounded wait and is killed once it runs past the timeout.

use super::{clamp_level, BackendError, GainBackend};
use std::io::Read;
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Default bound on one amixer invocation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(2000);

const WAIT_POLL: Duration = Duration::from_millis(5);

/// Gain backend for one ALSA sound card
pub struct AmixerBackend {
    card: u32,
    name: String,
    binary: String,
    timeout: Duration,
}

impl AmixerBackend {
    /// Create a backend for the given card index
    pub fn new(card: u32) -> Self {
        Self {
            card,
            name: format!("amixer:{}", card),
            binary: "amixer".to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Use a different amixer executable (e.g. an absolute path)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Bound each amixer invocation (zero keeps the default)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    fn run(&self, args: &[&str]) -> Result<String, BackendError> {
        let card = self.card.to_string();
        trace!(card = self.card, ?args, "amixer call");
        let mut child = Command::new(&self.binary)
            .arg("-c")
            .arg(&card)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes while waiting so a chatty child cannot block on them
        let stdout = child.stdout.take().map(drain_stdout);
        let stderr = child.stderr.take().map(drain_stderr);

        let status = match wait_bounded(&mut child, self.timeout)? {
            Some(status) => status,
            None => {
                if let Err(e) = child.kill() {
                    warn!("Failed to kill stalled amixer: {}", e);
                }
                let _ = child.wait();
                return Err(BackendError::Timeout(format!(
                    "amixer {} ran longer than {} ms",
                    args.join(" "),
                    self.timeout.as_millis()
                )));
            }
        };

        let stdout = join_output(stdout);
        if !status.success() {
            let stderr = join_output(stderr);
            return Err(BackendError::Command(format!(
                "amixer {} exited with {}: {}",
                args.join(" "),
                status,
                stderr.trim()
            )));
        }

        Ok(stdout)
    }
}

/// Wait for the child until `timeout`; `None` when it is still running
fn wait_bounded(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>, BackendError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(WAIT_POLL);
    }
}

fn drain_stdout(mut pipe: ChildStdout) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn drain_stderr(mut pipe: ChildStderr) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_output(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

impl GainBackend for AmixerBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_level(&self, control: &str) -> Result<u8, BackendError> {
        let stdout = self.run(&["sget", control])?;
        parse_percent(&stdout).ok_or_else(|| {
            BackendError::Parse(format!("no percentage in sget output for '{}'", control))
        })
    }

    fn set_level(&self, control: &str, value: u8) -> Result<(), BackendError> {
        let percent = format!("{}%", clamp_level(value as i64));
        self.run(&["-q", "sset", control, &percent])?;
        debug!(control, value, "amixer level written");
        Ok(())
    }

    fn list_controls(&self) -> Result<Vec<String>, BackendError> {
        let stdout = self.run(&["scontrols"])?;
        Ok(parse_scontrols(&stdout))
    }
}

/// Extract control names from `amixer scontrols` output
///
/// Lines look like: `Simple mixer control 'Mic-AN1-AN1',0`
pub fn parse_scontrols(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let start = line.find('\'')?;
            let end = line.rfind('\'')?;
            if end <= start + 1 {
                return None;
            }
            Some(line[start + 1..end].to_string())
        })
        .collect()
}

/// Extract the first `[NN%]` value from `amixer sget` output
pub fn parse_percent(stdout: &str) -> Option<u8> {
    let mut rest = stdout;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let close = after.find(']')?;
        let inner = &after[..close];
        if let Some(number) = inner.strip_suffix('%') {
            if let Ok(value) = number.trim().parse::<i64>() {
                return Some(clamp_level(value));
            }
        }
        rest = &after[close + 1..];
    }
    None
}
