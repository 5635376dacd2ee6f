//! Background sampling for time-continuous rating.
//!
//! While a video plays, the current live rating is written to the rating log
//! once per interval with an empty duration column.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Local;
use tracing::{debug, error};

use crate::logger::RatingLog;

pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(1000);

/// State written by the session and read by the sampler thread. Last write wins.
#[derive(Debug, Default)]
pub struct LiveRating {
    playing: AtomicBool,
    value: AtomicI32,
}

impl LiveRating {
    pub fn new(value: i32) -> Self {
        Self {
            playing: AtomicBool::new(false),
            value: AtomicI32::new(value),
        }
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: i32) {
        self.value.store(value, Ordering::SeqCst);
    }

    pub fn get(&self) -> i32 {
        self.value.load(Ordering::SeqCst)
    }
}

pub struct Sampler {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sampler {
    /// Starts sampling for the video at `position`. The first sample is
    /// written right away.
    pub fn start(
        log: Arc<Mutex<RatingLog>>,
        live: Arc<LiveRating>,
        position: usize,
        video_name: String,
        interval: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        debug!(position, video = %video_name, "sampler started");

        let handle = thread::spawn(move || loop {
            if live.is_playing() {
                let written = match log.lock() {
                    Ok(mut log) => log.log_rating(position, &video_name, live.get(), &Local::now(), None),
                    Err(_) => break,
                };
                if let Err(e) = written {
                    error!(error = %e, video = %video_name, "failed to log sampled rating");
                }
            }
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Returns once the thread has exited, so no sample can land after this.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("sampler thread panicked");
            }
            debug!("sampler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop();
    }
}
