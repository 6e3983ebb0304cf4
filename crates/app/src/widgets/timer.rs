//! Countdown widget
//!
//! Drives a [`CountdownTimer`] from a one-second tokio interval. Commands go
//! in through a watch channel; snapshots come back out through another.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use toefl_core::{CountdownPhase, CountdownTimer, Tick, Urgency};

const TICK: Duration = Duration::from_secs(1);

/// Point-in-time view of the countdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub remaining: u64,
    pub phase: CountdownPhase,
    pub urgency: Urgency,
    /// `MM:SS`
    pub display: String,
}

impl TimerSnapshot {
    fn of(timer: &CountdownTimer) -> Self {
        Self {
            remaining: timer.remaining(),
            phase: timer.phase(),
            urgency: timer.urgency(),
            display: timer.display(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Control {
    running: bool,
    initial: i64,
    /// Bumped on every reset so repeated resets to the same duration apply
    resets: u64,
}

/// Running countdown. Dropping it stops the ticking task.
pub struct TimerWidget {
    control: watch::Sender<Control>,
    snapshot: watch::Receiver<TimerSnapshot>,
    task: JoinHandle<()>,
}

impl TimerWidget {
    /// Start ticking. `on_expire` runs once each time the countdown reaches
    /// zero. Must be called from within a tokio runtime.
    pub fn spawn(initial: i64, running: bool, on_expire: impl FnMut() + Send + 'static) -> Self {
        let mut timer = CountdownTimer::new(initial);
        timer.set_running(running);

        let (control_tx, control_rx) = watch::channel(Control {
            running,
            initial,
            resets: 0,
        });
        let (snapshot_tx, snapshot_rx) = watch::channel(TimerSnapshot::of(&timer));

        let mut ticker = interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task = tokio::spawn(run(timer, ticker, control_rx, snapshot_tx, on_expire));
        debug!(initial, running, "Countdown started");

        Self {
            control: control_tx,
            snapshot: snapshot_rx,
            task,
        }
    }

    /// Pause or resume. Remaining time is kept across a pause.
    pub fn set_running(&self, running: bool) {
        self.control.send_if_modified(|c| {
            let changed = c.running != running;
            c.running = running;
            changed
        });
    }

    /// Restart from a new duration; negative durations become zero
    pub fn reset(&self, initial: i64) {
        self.control.send_modify(|c| {
            c.initial = initial;
            c.resets += 1;
        });
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshot.clone()
    }
}

impl Drop for TimerWidget {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut timer: CountdownTimer,
    mut ticker: tokio::time::Interval,
    mut control: watch::Receiver<Control>,
    snapshot: watch::Sender<TimerSnapshot>,
    mut on_expire: impl FnMut() + Send + 'static,
) {
    let mut resets_seen = 0;
    let mut running_signal = control.borrow_and_update().running;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match timer.tick() {
                    Tick::Ignored => continue,
                    Tick::Decremented(_) => {}
                    Tick::Expired => {
                        info!(initial = timer.initial(), "Countdown expired");
                        on_expire();
                    }
                }
            }
            changed = control.changed() => {
                if changed.is_err() {
                    break;
                }
                let ctl = *control.borrow_and_update();
                let reset_applied = ctl.resets != resets_seen;
                let resumed = ctl.running && !running_signal;
                running_signal = ctl.running;

                if reset_applied {
                    resets_seen = ctl.resets;
                    timer.reset(ctl.initial);
                }
                if ctl.running != timer.is_running() {
                    timer.set_running(ctl.running);
                }
                // Count a full second from a restart or resume only
                if reset_applied || resumed {
                    ticker.reset();
                }
            }
        }

        snapshot.send_replace(TimerSnapshot::of(&timer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = fired.clone();
        (fired, move || {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn expires_once_after_duration() {
        let (fired, on_expire) = counter();
        let widget = TimerWidget::spawn(5, true, on_expire);

        sleep(Duration::from_millis(4500)).await;
        assert_eq!(widget.snapshot().remaining, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(3)).await;
        let snap = widget.snapshot();
        assert_eq!(snap.remaining, 0);
        assert_eq!(snap.phase, CountdownPhase::Expired);
        assert_eq!(snap.display, "00:00");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_remaining_time() {
        let (_, on_expire) = counter();
        let widget = TimerWidget::spawn(10, true, on_expire);

        sleep(Duration::from_millis(2500)).await;
        widget.set_running(false);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(widget.snapshot().remaining, 8);
        assert_eq!(widget.snapshot().phase, CountdownPhase::Idle);

        widget.set_running(true);
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(widget.snapshot().remaining, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_resume_keeps_counting() {
        let (fired, on_expire) = counter();
        let widget = TimerWidget::spawn(5, true, on_expire);

        for _ in 0..10 {
            widget.set_running(true);
            sleep(Duration::from_millis(600)).await;
        }
        let snap = widget.snapshot();
        assert_eq!(snap.remaining, 0);
        assert_eq!(snap.phase, CountdownPhase::Expired);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_after_expiry_runs_again() {
        let (fired, on_expire) = counter();
        let widget = TimerWidget::spawn(1, true, on_expire);

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        widget.reset(3);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(widget.snapshot().remaining, 3);
        assert_eq!(widget.snapshot().phase, CountdownPhase::Running);

        sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_ticking() {
        let (fired, on_expire) = counter();
        let widget = TimerWidget::spawn(2, true, on_expire);
        let mut updates = widget.subscribe();

        drop(widget);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        // The sender went away with the task
        assert!(updates.changed().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn negative_duration_shows_zero() {
        let (fired, on_expire) = counter();
        let widget = TimerWidget::spawn(-3, true, on_expire);
        assert_eq!(widget.snapshot().display, "00:00");

        sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(widget.snapshot().phase, CountdownPhase::Idle);
    }
}
