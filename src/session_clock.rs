//! Remaining-validity display for the current access token.
//!
//! `Expired` is only a display state. Clearing credentials is the session
//! manager's job, never the clock's.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::clock::Clock;

pub const EXPIRED: &str = "Expired";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    NoSession,
    Active { remaining_ms: i64 },
    Expired,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionClock {
    expiry: Option<DateTime<Utc>>,
}

impl SessionClock {
    pub fn new(expiry: DateTime<Utc>) -> Self {
        Self {
            expiry: Some(expiry),
        }
    }

    pub fn none() -> Self {
        Self { expiry: None }
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    pub fn state(&self, now: DateTime<Utc>) -> ClockState {
        match self.expiry {
            None => ClockState::NoSession,
            Some(expiry) => {
                let diff = (expiry - now).num_milliseconds();
                if diff > 0 {
                    ClockState::Active { remaining_ms: diff }
                } else {
                    ClockState::Expired
                }
            }
        }
    }

    /// `minutes:seconds` until expiry, `"Expired"` past it, nothing without a session.
    pub fn tick(&self, now: DateTime<Utc>) -> Option<String> {
        match self.state(now) {
            ClockState::NoSession => None,
            ClockState::Active { remaining_ms } => {
                let minutes = remaining_ms / 60_000;
                let seconds = (remaining_ms % 60_000) / 1_000;
                Some(format!("{minutes}:{seconds:02}"))
            }
            ClockState::Expired => Some(EXPIRED.to_string()),
        }
    }

    /// Recompute the display now and then once per second.
    ///
    /// Must be called inside a tokio runtime. The interval task is aborted
    /// when the returned ticker is dropped.
    pub fn watch(self, source: Arc<dyn Clock>) -> ClockTicker {
        let (tx, rx) = watch::channel(self.tick(source.now()));

        let task = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                let display = self.tick(source.now());
                tx.send_if_modified(|current| {
                    if *current != display {
                        *current = display;
                        true
                    } else {
                        false
                    }
                });
            }
        });

        ClockTicker { rx, task }
    }
}

// Live view of a SessionClock
pub struct ClockTicker {
    rx: watch::Receiver<Option<String>>,
    task: JoinHandle<()>,
}

impl ClockTicker {
    pub fn current(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.rx.clone()
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for ClockTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_no_session_displays_nothing() {
        assert_eq!(SessionClock::none().tick(at(0)), None);
        assert_eq!(SessionClock::none().state(at(0)), ClockState::NoSession);
    }

    #[test]
    fn test_formats_minutes_and_padded_seconds() {
        let now = at(1_700_000_000_000);
        let clock = SessionClock::new(now + chrono::Duration::milliseconds(125_000));
        assert_eq!(clock.tick(now).as_deref(), Some("2:05"));

        let clock = SessionClock::new(now + chrono::Duration::milliseconds(59_999));
        assert_eq!(clock.tick(now).as_deref(), Some("0:59"));

        let clock = SessionClock::new(now + chrono::Duration::minutes(15));
        assert_eq!(clock.tick(now).as_deref(), Some("15:00"));
    }

    #[test]
    fn test_past_expiry_displays_expired() {
        let now = at(1_700_000_000_000);
        let clock = SessionClock::new(now - chrono::Duration::milliseconds(1));
        assert_eq!(clock.tick(now).as_deref(), Some(EXPIRED));

        let clock = SessionClock::new(now);
        assert_eq!(clock.state(now), ClockState::Expired);
    }

    #[tokio::test]
    async fn test_ticker_updates_as_time_passes() {
        let source = ManualClock::new(0);
        let ticker = SessionClock::new(at(125_000)).watch(Arc::new(source.clone()));
        assert_eq!(ticker.current().as_deref(), Some("2:05"));

        let mut rx = ticker.subscribe();
        source.set(130_000);
        tokio::time::timeout(Duration::from_secs(3), rx.changed())
            .await
            .expect("ticker did not fire")
            .unwrap();
        assert_eq!(rx.borrow().as_deref(), Some(EXPIRED));
    }

    #[tokio::test]
    async fn test_dropping_ticker_cancels_interval() {
        let source = ManualClock::new(0);
        let ticker = SessionClock::new(at(60_000)).watch(Arc::new(source));
        let mut rx = ticker.subscribe();
        ticker.stop();

        let closed = tokio::time::timeout(Duration::from_secs(3), rx.changed())
            .await
            .expect("ticker task still running");
        assert!(closed.is_err());
    }
}
