//! Autosave timing and status.
//!
//! The scheduler is a plain state machine over two deadlines: a debounce
//! deadline pushed back by every edit, and a periodic safety-net deadline
//! restarted whenever a flush starts or finishes. The session drives it with
//! the current [`Instant`] and performs the actual persistence.
//!
//! ```text
//! idle --edit--> saving --flush ok--> saved --edit--> saving
//!                saving --flush err--> error --edit--> saving
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use quire_common::AutosaveConfig;
use serde::Serialize;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AutosaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

/// Observable autosave state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AutosaveState {
    pub status: AutosaveStatus,
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Message of the most recent failed flush, cleared by the next success.
    pub last_error: Option<String>,
}

/// Why a flush was started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushReason {
    Debounce,
    Periodic,
    Manual,
    Dispose,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debounce => "debounce",
            Self::Periodic => "periodic",
            Self::Manual => "manual",
            Self::Dispose => "dispose",
        }
    }
}

#[derive(Debug)]
pub struct AutosaveScheduler {
    debounce: Duration,
    interval: Duration,
    debounce_at: Option<Instant>,
    periodic_at: Instant,
    in_flight: bool,
    state: AutosaveState,
}

impl AutosaveScheduler {
    pub fn new(config: &AutosaveConfig, now: Instant) -> Self {
        let interval = config.interval();
        Self {
            debounce: config.debounce(),
            interval,
            debounce_at: None,
            periodic_at: now + interval,
            in_flight: false,
            state: AutosaveState::default(),
        }
    }

    /// Start from a previously saved draft.
    pub fn restored(mut self, last_saved_at: Option<DateTime<Utc>>) -> Self {
        if last_saved_at.is_some() {
            self.state.status = AutosaveStatus::Saved;
            self.state.last_saved_at = last_saved_at;
        }
        self
    }

    pub fn state(&self) -> &AutosaveState {
        &self.state
    }

    pub fn status(&self) -> AutosaveStatus {
        self.state.status
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Whether an edit is waiting for its debounce flush.
    pub fn has_pending_edit(&self) -> bool {
        self.debounce_at.is_some()
    }

    /// An edit happened: show `saving` and push the debounce deadline back.
    pub fn on_edit(&mut self, now: Instant) {
        self.state.status = AutosaveStatus::Saving;
        self.debounce_at = Some(now + self.debounce);
    }

    /// The next instant [`poll_due`](Self::poll_due) could return a reason.
    ///
    /// `None` while a flush is in flight or before anything was ever edited.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.in_flight {
            return None;
        }
        match (self.debounce_at, self.periodic_armed()) {
            (Some(debounce), true) => Some(debounce.min(self.periodic_at)),
            (Some(debounce), false) => Some(debounce),
            (None, true) => Some(self.periodic_at),
            (None, false) => None,
        }
    }

    /// Which flush, if any, is due at `now`. The debounce wins ties.
    pub fn poll_due(&self, now: Instant) -> Option<FlushReason> {
        if self.in_flight {
            return None;
        }
        if self.debounce_at.is_some_and(|at| at <= now) {
            return Some(FlushReason::Debounce);
        }
        if self.periodic_armed() && self.periodic_at <= now {
            return Some(FlushReason::Periodic);
        }
        None
    }

    /// A flush captured the current document. Any pending debounce is
    /// covered by it, and the periodic timer restarts.
    pub fn begin_flush(&mut self, now: Instant) {
        self.in_flight = true;
        self.debounce_at = None;
        self.periodic_at = now + self.interval;
        self.state.status = AutosaveStatus::Saving;
    }

    pub fn finish_flush(&mut self, result: Result<DateTime<Utc>, String>, now: Instant) {
        self.in_flight = false;
        self.periodic_at = now + self.interval;
        match result {
            Ok(saved_at) => {
                self.state.last_saved_at = Some(saved_at);
                self.state.last_error = None;
                // Edits made while the flush was running still need saving.
                self.state.status = if self.debounce_at.is_some() {
                    AutosaveStatus::Saving
                } else {
                    AutosaveStatus::Saved
                };
            }
            Err(message) => {
                self.state.status = AutosaveStatus::Error;
                self.state.last_error = Some(message);
            }
        }
    }

    /// Back to idle, e.g. after the draft was published and cleared.
    pub fn reset(&mut self, now: Instant) {
        self.debounce_at = None;
        self.periodic_at = now + self.interval;
        self.state.status = AutosaveStatus::Idle;
        self.state.last_error = None;
    }

    /// Periodic flushes start with the first edit or restored draft.
    fn periodic_armed(&self) -> bool {
        self.state.status != AutosaveStatus::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(now: Instant) -> AutosaveScheduler {
        AutosaveScheduler::new(&AutosaveConfig::default(), now)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn idle_scheduler_has_no_deadline() {
        let t0 = Instant::now();
        let s = scheduler(t0);
        assert_eq!(s.status(), AutosaveStatus::Idle);
        assert_eq!(s.next_deadline(), None);
        assert_eq!(s.poll_due(t0 + Duration::from_secs(60)), None);
    }

    #[test]
    fn edits_push_debounce_back() {
        let t0 = Instant::now();
        let mut s = scheduler(t0);
        for i in 0..5 {
            s.on_edit(t0 + ms(i * 200));
        }
        assert_eq!(s.status(), AutosaveStatus::Saving);
        assert_eq!(s.next_deadline(), Some(t0 + ms(1800)));
        assert_eq!(s.poll_due(t0 + ms(1799)), None);
        assert_eq!(s.poll_due(t0 + ms(1800)), Some(FlushReason::Debounce));
    }

    #[test]
    fn debounce_sooner_than_periodic_wins() {
        let t0 = Instant::now();
        let mut s = scheduler(t0);
        s.on_edit(t0 + Duration::from_secs(29));
        // Periodic deadline is at 30s, debounce at 30s: debounce wins the tie.
        assert_eq!(
            s.poll_due(t0 + Duration::from_secs(30)),
            Some(FlushReason::Debounce)
        );
        s.begin_flush(t0 + Duration::from_secs(30));
        assert_eq!(s.next_deadline(), None);
        s.finish_flush(Ok(Utc::now()), t0 + Duration::from_secs(30));
        assert_eq!(s.next_deadline(), Some(t0 + Duration::from_secs(60)));
    }

    #[test]
    fn periodic_fires_without_new_edits() {
        let t0 = Instant::now();
        let mut s = scheduler(t0);
        s.on_edit(t0);
        s.begin_flush(t0 + ms(1000));
        s.finish_flush(Ok(Utc::now()), t0 + ms(1100));
        assert_eq!(s.status(), AutosaveStatus::Saved);
        assert_eq!(
            s.poll_due(t0 + ms(31_100)),
            Some(FlushReason::Periodic)
        );
    }

    #[test]
    fn error_recovers_on_next_edit() {
        let t0 = Instant::now();
        let mut s = scheduler(t0);
        s.on_edit(t0);
        s.begin_flush(t0 + ms(1000));
        s.finish_flush(Err("disk full".into()), t0 + ms(1000));
        assert_eq!(s.status(), AutosaveStatus::Error);
        assert_eq!(s.state().last_error.as_deref(), Some("disk full"));

        s.on_edit(t0 + ms(2000));
        assert_eq!(s.status(), AutosaveStatus::Saving);
        s.begin_flush(t0 + ms(3000));
        s.finish_flush(Ok(Utc::now()), t0 + ms(3000));
        assert_eq!(s.status(), AutosaveStatus::Saved);
        assert_eq!(s.state().last_error, None);
    }

    #[test]
    fn edit_during_flight_keeps_saving() {
        let t0 = Instant::now();
        let mut s = scheduler(t0);
        s.on_edit(t0);
        s.begin_flush(t0 + ms(1000));
        s.on_edit(t0 + ms(1100));
        assert_eq!(s.poll_due(t0 + ms(5000)), None);
        s.finish_flush(Ok(Utc::now()), t0 + ms(1200));
        assert_eq!(s.status(), AutosaveStatus::Saving);
        assert_eq!(s.poll_due(t0 + ms(2100)), Some(FlushReason::Debounce));
    }

    #[test]
    fn restored_draft_arms_periodic() {
        let t0 = Instant::now();
        let s = scheduler(t0).restored(Some(Utc::now()));
        assert_eq!(s.status(), AutosaveStatus::Saved);
        assert_eq!(s.next_deadline(), Some(t0 + Duration::from_secs(30)));
    }
}
