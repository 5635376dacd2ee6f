//! Video playback through an external player process.
//!
//! The player reports back asynchronously on the runtime channel, the same
//! way keyboard input arrives, so the session loop only ever waits in one
//! place.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::engine::SessionEvent;
use crate::error::{Result, SessionError};
use crate::runtime::AppEvent;

pub const DEFAULT_PLAYER_COMMAND: &str = "ffplay -autoexit -loglevel error -fs {}";
pub const DEFAULT_PROBE_COMMAND: &str = "ffprobe";

/// Exit code reported when the player process was killed by a signal.
pub const SIGNALLED_EXIT_CODE: i32 = -1;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    SizeKnown { width: u32, height: u32 },
    Prepared,
    Completed,
    Error(i32),
}

impl From<PlayerEvent> for SessionEvent {
    fn from(event: PlayerEvent) -> Self {
        match event {
            PlayerEvent::SizeKnown { width, height } => SessionEvent::SizeKnown { width, height },
            PlayerEvent::Prepared => SessionEvent::Prepared,
            PlayerEvent::Completed => SessionEvent::PlaybackCompleted,
            PlayerEvent::Error(code) => SessionEvent::PlaybackError(code),
        }
    }
}

/// Playback collaborator. `prepare` must eventually report both
/// `SizeKnown` and `Prepared` (or `Error`) for the given file.
pub trait Player {
    fn prepare(&mut self, path: &Path) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

/// Width and height of the first video stream in `ffprobe -of json` output.
pub fn parse_probe_output(json: &[u8]) -> Option<(u32, u32)> {
    let output: ProbeOutput = serde_json::from_slice(json).ok()?;
    output
        .streams
        .iter()
        .find_map(|s| Some((s.width?, s.height?)))
}

pub fn probe_video_size(probe_command: &str, path: &Path) -> Option<(u32, u32)> {
    let output = Command::new(probe_command)
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=width,height", "-of", "json"])
        .arg(path)
        .stdin(Stdio::null())
        .output();
    match output {
        Ok(output) if output.status.success() => parse_probe_output(&output.stdout),
        Ok(output) => {
            warn!(status = %output.status, path = %path.display(), "video probe failed");
            None
        }
        Err(e) => {
            warn!(error = %e, command = probe_command, "could not run video probe");
            None
        }
    }
}

/// Splits a player command line and places the video path: every `{}` is
/// replaced, and without one the path is appended.
pub fn build_player_command(template: &str, path: &Path) -> Result<Command> {
    let mut parts = template.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| SessionError::Player("player command is empty".into()))?;
    let mut command = Command::new(program);
    let mut placed = false;
    for part in parts {
        if part.contains("{}") {
            command.arg(part.replace("{}", &path.to_string_lossy()));
            placed = true;
        } else {
            command.arg(part);
        }
    }
    if !placed {
        command.arg(path);
    }
    Ok(command)
}

/// Runs each video in a child process started from `player_command`.
pub struct CommandPlayer {
    player_command: String,
    probe_command: String,
    events: Sender<AppEvent>,
    current: Option<PathBuf>,
    child: Arc<Mutex<Option<Child>>>,
    // bumped on every start/stop so a stale watcher stays quiet
    generation: Arc<AtomicU64>,
}

impl CommandPlayer {
    pub fn new(player_command: &str, probe_command: &str, events: Sender<AppEvent>) -> Self {
        Self {
            player_command: player_command.to_string(),
            probe_command: probe_command.to_string(),
            events,
            current: None,
            child: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn kill_child(&self) {
        let Ok(mut slot) = self.child.lock() else {
            return;
        };
        if let Some(mut child) = slot.take() {
            if let Err(e) = child.kill() {
                debug!(error = %e, "player already exited");
            }
            let _ = child.wait();
        }
    }
}

impl Player for CommandPlayer {
    fn prepare(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(SessionError::Player(format!(
                "video file {} not found",
                path.display()
            )));
        }
        self.current = Some(path.to_path_buf());
        let events = self.events.clone();
        let probe = self.probe_command.clone();
        let path = path.to_path_buf();
        thread::spawn(move || {
            let (width, height) = probe_video_size(&probe, &path).unwrap_or((0, 0));
            debug!(width, height, path = %path.display(), "video prepared");
            let _ = events.send(AppEvent::Player(PlayerEvent::SizeKnown { width, height }));
            let _ = events.send(AppEvent::Player(PlayerEvent::Prepared));
        });
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let path = self
            .current
            .clone()
            .ok_or_else(|| SessionError::Player("start called before prepare".into()))?;
        self.kill_child();
        let child = build_player_command(&self.player_command, &path)?
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SessionError::Player(format!("could not start player: {e}")))?;
        info!(pid = child.id(), path = %path.display(), "playback started");

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut slot) = self.child.lock() {
            *slot = Some(child);
        }

        let child = Arc::clone(&self.child);
        let current = Arc::clone(&self.generation);
        let events = self.events.clone();
        thread::spawn(move || loop {
            thread::sleep(POLL_INTERVAL);
            if current.load(Ordering::SeqCst) != generation {
                break;
            }
            let status = match child.lock() {
                Ok(mut slot) => {
                    let polled = slot.as_mut().map(Child::try_wait);
                    match polled {
                        Some(Ok(Some(status))) => {
                            slot.take();
                            Some(status)
                        }
                        Some(Ok(None)) => None,
                        Some(Err(e)) => {
                            error!(error = %e, "could not poll player");
                            break;
                        }
                        None => break,
                    }
                }
                Err(_) => break,
            };
            if let Some(status) = status {
                if current.load(Ordering::SeqCst) != generation {
                    break;
                }
                let event = if status.success() {
                    PlayerEvent::Completed
                } else {
                    PlayerEvent::Error(status.code().unwrap_or(SIGNALLED_EXIT_CODE))
                };
                debug!(?event, "player exited");
                let _ = events.send(AppEvent::Player(event));
                break;
            }
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.kill_child();
        self.current = None;
        Ok(())
    }
}

impl Drop for CommandPlayer {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.kill_child();
    }
}
