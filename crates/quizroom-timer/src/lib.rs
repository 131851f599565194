//! Cancellable question deadline for quizroom.
//!
//! A room has at most one meaningful deadline at a time: the end of the
//! active question's collection window. [`QuestionDeadline`] models that
//! directly. It is armed once per question activation, superseded by the
//! next [`arm`](QuestionDeadline::arm), and disarmed by
//! [`cancel`](QuestionDeadline::cancel) whenever the room leaves the
//! question-active state for any other reason.
//!
//! # Integration
//!
//! The deadline sits inside the room actor's `tokio::select!` loop, next to
//! the command channel, so that commands and expiry are serialized through
//! one owner:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* may arm or cancel */ }
//!         expired = deadline.expired() => {
//!             quiz.close_window(expired.key);
//!         }
//!     }
//! }
//! ```
//!
//! While disarmed, [`QuestionDeadline::expired`] pends forever, so the
//! `select!` branch is simply never taken.
//!
//! The key carried by the deadline identifies which activation it belongs
//! to. The expiry handler must still compare it against the room's current
//! activation: a deadline is only a hint that time is up, the room's state
//! decides whether anything happens.

use std::fmt::Debug;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// Tuning knobs for [`QuestionDeadline`].
#[derive(Debug, Clone)]
pub struct DeadlineConfig {
    /// Expiry observed later than this past the scheduled instant is
    /// logged at `warn`. A busy runtime shows up here first.
    pub late_warn_threshold: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            late_warn_threshold: Duration::from_millis(250),
        }
    }
}

/// Returned by [`QuestionDeadline::expired`] when the armed deadline passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired<K> {
    /// The key passed to [`QuestionDeadline::arm`].
    pub key: K,
    /// The window the deadline was armed with.
    pub window: Duration,
    /// How far past the scheduled instant the expiry was observed.
    pub late_by: Duration,
}

#[derive(Debug)]
struct Armed<K> {
    key: K,
    at: Instant,
    window: Duration,
}

/// A one-shot, re-armable, cancellable deadline owned by a single room.
#[derive(Debug)]
pub struct QuestionDeadline<K> {
    config: DeadlineConfig,
    armed: Option<Armed<K>>,
    arm_count: u64,
}

impl<K: Clone + Debug> QuestionDeadline<K> {
    /// Creates a disarmed deadline with default settings.
    pub fn new() -> Self {
        Self::with_config(DeadlineConfig::default())
    }

    /// Creates a disarmed deadline.
    pub fn with_config(config: DeadlineConfig) -> Self {
        Self {
            config,
            armed: None,
            arm_count: 0,
        }
    }

    /// Arms the deadline to fire `window` from now, tagged with `key`.
    ///
    /// Any previously armed deadline is superseded and will never fire.
    pub fn arm(&mut self, key: K, window: Duration) {
        if let Some(previous) = &self.armed {
            debug!(previous = ?previous.key, next = ?key, "superseding armed deadline");
        }
        self.arm_count += 1;
        trace!(?key, window_ms = window.as_millis() as u64, "deadline armed");
        self.armed = Some(Armed {
            key,
            at: Instant::now() + window,
            window,
        });
    }

    /// Disarms the deadline. Returns the key it was armed with, if any.
    ///
    /// Idempotent.
    pub fn cancel(&mut self) -> Option<K> {
        let cancelled = self.armed.take().map(|a| a.key);
        if let Some(key) = &cancelled {
            trace!(?key, "deadline cancelled");
        }
        cancelled
    }

    /// Waits for the armed deadline to pass, then disarms it.
    ///
    /// Pends forever while disarmed. Cancel-safe: dropping the future
    /// before it resolves leaves the deadline armed and unchanged.
    pub async fn expired(&mut self) -> Expired<K> {
        let at = match &self.armed {
            Some(armed) => armed.at,
            None => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(at).await;

        let late_by = Instant::now().saturating_duration_since(at);
        // `armed` can't have changed: we hold `&mut self` across the await.
        let Some(armed) = self.armed.take() else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        if late_by > self.config.late_warn_threshold {
            warn!(
                key = ?armed.key,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "question deadline observed late"
            );
        } else {
            trace!(key = ?armed.key, "deadline expired");
        }

        Expired {
            key: armed.key,
            window: armed.window,
            late_by,
        }
    }

    /// Whether a deadline is currently armed.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// The key of the armed deadline, if any.
    pub fn armed_key(&self) -> Option<&K> {
        self.armed.as_ref().map(|a| &a.key)
    }

    /// Time left until the armed deadline, or `None` when disarmed.
    /// Zero once the instant has passed but expiry hasn't been observed.
    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .as_ref()
            .map(|a| a.at.saturating_duration_since(Instant::now()))
    }

    /// How many times the deadline has been armed since creation.
    pub fn arm_count(&self) -> u64 {
        self.arm_count
    }
}

impl<K: Clone + Debug> Default for QuestionDeadline<K> {
    fn default() -> Self {
        Self::new()
    }
}
