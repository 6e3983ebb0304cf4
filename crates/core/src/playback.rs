//! Audio playback state machine
//!
//! `AudioPlayer` wraps transport controls around a single media resource.
//! The resource itself sits behind [`MediaElement`]; progress and
//! end-of-media arrive as [`MediaEvent`]s from whatever drives it.

use tracing::{debug, warn};

use crate::error::Result;
use crate::invariants::assert_playback_invariants;

/// Volume a freshly mounted player starts at
pub const DEFAULT_VOLUME: f64 = 0.8;

/// Commands accepted by the underlying media resource
pub trait MediaElement {
    /// Start or resume playback. May be refused (e.g. autoplay policy).
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Jump to a position in seconds
    fn set_current_time(&mut self, seconds: f64);

    /// Apply a volume level in `[0, 1]`
    fn set_volume(&mut self, level: f64);
}

/// Notifications emitted by the media resource
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaEvent {
    /// Metadata loaded, total length known
    LoadedMetadata { duration: f64 },
    /// Natural playback progressed
    TimeUpdate { position: f64 },
    /// Reached end of media
    Ended,
}

/// Outcome of the autoplay attempt made on mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoplayOutcome {
    NotRequested,
    Started,
    /// Playback was refused; the player stays paused and usable
    Blocked(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub position: f64,
    /// Unknown until metadata loads
    pub duration: Option<f64>,
    pub volume: f64,
    pub playing: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            position: 0.0,
            duration: None,
            volume: DEFAULT_VOLUME,
            playing: false,
        }
    }
}

type CompletionHook = Box<dyn FnMut() + Send>;

pub struct AudioPlayer<E: MediaElement> {
    source: String,
    element: E,
    state: PlaybackState,
    /// Completion already reported for the current play-through
    completed: bool,
    on_complete: Option<CompletionHook>,
}

impl<E: MediaElement> AudioPlayer<E> {
    pub fn new(source: impl Into<String>, element: E) -> Self {
        Self {
            source: source.into(),
            element,
            state: PlaybackState::default(),
            completed: false,
            on_complete: None,
        }
    }

    /// Register a hook fired once each time playback reaches the end
    pub fn on_complete(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    /// Apply initial settings and attempt autoplay once.
    ///
    /// A refused autoplay is not an error: the player stays paused and can
    /// be started manually.
    pub fn mount(&mut self, autoplay: bool) -> AutoplayOutcome {
        self.element.set_volume(self.state.volume);

        if !autoplay {
            return AutoplayOutcome::NotRequested;
        }

        match self.element.play() {
            Ok(()) => {
                self.state.playing = true;
                self.completed = false;
                AutoplayOutcome::Started
            }
            Err(e) => {
                warn!(source = %self.source, error = %e, "Autoplay was prevented");
                self.state.playing = false;
                AutoplayOutcome::Blocked(e.to_string())
            }
        }
    }

    /// Flip between playing and paused.
    ///
    /// If the resource refuses to start, the player stays paused and the
    /// refusal is returned.
    pub fn toggle_play_pause(&mut self) -> Result<()> {
        if self.state.playing {
            self.pause();
            return Ok(());
        }
        self.start()
    }

    /// Stop playback if it is running. Position is kept.
    pub fn pause(&mut self) {
        if self.state.playing {
            self.element.pause();
            self.state.playing = false;
        }
    }

    /// Jump to `seconds`, clamped to the track. Position updates immediately.
    pub fn seek(&mut self, seconds: f64) {
        let target = self.clamp_position(seconds);
        self.element.set_current_time(target);
        self.state.position = target;
        assert_playback_invariants(&self.state);
    }

    /// Set volume, clamped to `[0, 1]`. NaN leaves the volume unchanged.
    pub fn set_volume(&mut self, level: f64) {
        if level.is_nan() {
            return;
        }
        let level = level.clamp(0.0, 1.0);
        self.element.set_volume(level);
        self.state.volume = level;
    }

    /// Seek to the start and make sure playback is running
    pub fn restart(&mut self) -> Result<()> {
        self.seek(0.0);
        if !self.state.playing {
            self.start()?;
        }
        Ok(())
    }

    /// Feed a notification from the media resource.
    ///
    /// Returns true when this event fired the completion hook.
    pub fn handle_event(&mut self, event: MediaEvent) -> bool {
        match event {
            MediaEvent::LoadedMetadata { duration } => {
                self.state.duration = (duration.is_finite() && duration >= 0.0).then_some(duration);
                self.state.position = self.clamp_position(self.state.position);
                debug!(source = %self.source, duration = ?self.state.duration, "Media metadata loaded");
                false
            }
            MediaEvent::TimeUpdate { position } => {
                self.state.position = self.clamp_position(position);
                false
            }
            MediaEvent::Ended => {
                if self.completed {
                    return false;
                }
                self.completed = true;
                self.state.playing = false;
                self.state.position = 0.0;
                if let Some(hook) = self.on_complete.as_mut() {
                    hook();
                }
                true
            }
        }
    }

    fn start(&mut self) -> Result<()> {
        self.element.play()?;
        self.state.playing = true;
        self.completed = false;
        Ok(())
    }

    fn clamp_position(&self, seconds: f64) -> f64 {
        if !seconds.is_finite() {
            return 0.0;
        }
        let lower = seconds.max(0.0);
        match self.state.duration {
            Some(duration) => lower.min(duration),
            None => lower,
        }
    }
}

/// Render seconds as `M:SS` for track progress labels
pub fn format_track_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let whole = seconds.floor() as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}
