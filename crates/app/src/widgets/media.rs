//! Audio widget
//!
//! Shares an [`AudioPlayer`] between the page (transport controls) and a pump
//! task feeding it notifications from the media resource.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use toefl_core::{AudioPlayer, MediaElement, MediaEvent, PlaybackState, Result};

pub struct MediaWidget<E: MediaElement> {
    player: Arc<Mutex<AudioPlayer<E>>>,
    pump: JoinHandle<()>,
}

impl<E: MediaElement + Send + 'static> MediaWidget<E> {
    /// Start forwarding `events` into `player`. Must be called from within a
    /// tokio runtime.
    pub fn attach(player: AudioPlayer<E>, mut events: mpsc::Receiver<MediaEvent>) -> Self {
        let source = player.source().to_string();
        let player = Arc::new(Mutex::new(player));

        let shared = player.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if lock(&shared).handle_event(event) {
                    debug!(source = %source, "Playback completed");
                }
            }
        });

        Self { player, pump }
    }
}

impl<E: MediaElement> MediaWidget<E> {
    /// Run `f` against the player, e.g. a transport control
    pub fn with_player<R>(&self, f: impl FnOnce(&mut AudioPlayer<E>) -> R) -> R {
        f(&mut lock(&self.player))
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.player).state().clone()
    }
}

impl<E: MediaElement> Drop for MediaWidget<E> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Media resource for front ends without audio output. Accepts every
/// command and only remembers whether it is playing.
#[derive(Debug, Default)]
pub struct HeadlessElement {
    playing: bool,
}

impl MediaElement for HeadlessElement {
    fn play(&mut self) -> Result<()> {
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn set_current_time(&mut self, _seconds: f64) {}

    fn set_volume(&mut self, _level: f64) {}
}
