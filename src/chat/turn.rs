//! Turn tracking - at most one generation in flight per panel

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What to do with a submission that arrives while a turn is in flight
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Refuse the new submission and leave the running turn alone
    #[default]
    Reject,
    /// Cancel the running turn, wait for it to wind down, then start the new one
    CancelPrevious,
}

impl fmt::Display for BusyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusyPolicy::Reject => write!(f, "reject"),
            BusyPolicy::CancelPrevious => write!(f, "cancel_previous"),
        }
    }
}

impl FromStr for BusyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "reject" => Ok(BusyPolicy::Reject),
            "cancel_previous" | "cancel" => Ok(BusyPolicy::CancelPrevious),
            other => Err(format!(
                "unknown busy policy '{}' (expected reject or cancel_previous)",
                other
            )),
        }
    }
}

/// Handles for the turn currently running
#[derive(Debug, Clone)]
pub struct ActiveTurn {
    pub turn_id: Uuid,
    /// Cancelled to abort the relay
    pub cancel_token: CancellationToken,
    /// Cancelled by the turn's task once its last event is out
    pub finished: CancellationToken,
}

impl ActiveTurn {
    fn new() -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            cancel_token: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    /// Wait until the turn's task has emitted its final event
    pub async fn wait_finished(&self) {
        self.finished.cancelled().await
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }
}

#[derive(Debug, Clone, Default)]
pub enum TurnState {
    #[default]
    Idle,
    InFlight(ActiveTurn),
}

/// Owns the panel's [`TurnState`]
#[derive(Debug, Default)]
pub struct TurnTracker {
    state: Mutex<TurnState>,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TurnState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new turn if none is running. On `Err` the running turn is returned.
    pub fn try_begin(&self) -> Result<ActiveTurn, ActiveTurn> {
        let mut state = self.lock();
        if let TurnState::InFlight(current) = &*state {
            return Err(current.clone());
        }

        let turn = ActiveTurn::new();
        *state = TurnState::InFlight(turn.clone());
        Ok(turn)
    }

    /// Start a new turn unconditionally, handing back the one it displaced
    pub fn replace(&self) -> (ActiveTurn, Option<ActiveTurn>) {
        let turn = ActiveTurn::new();
        let previous = std::mem::replace(&mut *self.lock(), TurnState::InFlight(turn.clone()));

        match previous {
            TurnState::InFlight(previous) => (turn, Some(previous)),
            TurnState::Idle => (turn, None),
        }
    }

    /// Mark a turn as done. The state only returns to `Idle` if `turn` is still
    /// the current one.
    pub fn finish(&self, turn: &ActiveTurn) {
        {
            let mut state = self.lock();
            if matches!(&*state, TurnState::InFlight(current) if current.turn_id == turn.turn_id) {
                *state = TurnState::Idle;
            }
        }
        turn.finished.cancel();
    }

    pub fn current(&self) -> Option<ActiveTurn> {
        match &*self.lock() {
            TurnState::InFlight(turn) => Some(turn.clone()),
            TurnState::Idle => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(&*self.lock(), TurnState::InFlight(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_is_refused() {
        let tracker = TurnTracker::new();
        let first = tracker.try_begin().unwrap();
        let busy = tracker.try_begin().unwrap_err();

        assert_eq!(busy.turn_id, first.turn_id);
        assert!(tracker.is_in_flight());
    }

    #[test]
    fn test_finish_returns_to_idle() {
        let tracker = TurnTracker::new();
        let turn = tracker.try_begin().unwrap();
        tracker.finish(&turn);

        assert!(!tracker.is_in_flight());
        assert!(turn.is_finished());
        assert!(tracker.try_begin().is_ok());
    }

    #[test]
    fn test_stale_finish_keeps_newer_turn() {
        let tracker = TurnTracker::new();
        let old = tracker.try_begin().unwrap();
        let (new, previous) = tracker.replace();

        assert_eq!(previous.map(|t| t.turn_id), Some(old.turn_id));

        tracker.finish(&old);
        assert_eq!(tracker.current().map(|t| t.turn_id), Some(new.turn_id));

        tracker.finish(&new);
        assert!(tracker.current().is_none());
    }

    #[test]
    fn test_replace_when_idle() {
        let tracker = TurnTracker::new();
        let (_, previous) = tracker.replace();
        assert!(previous.is_none());
    }

    #[tokio::test]
    async fn test_wait_finished_resolves_after_finish() {
        let tracker = std::sync::Arc::new(TurnTracker::new());
        let turn = tracker.try_begin().unwrap();

        let waiter = turn.clone();
        let handle = tokio::spawn(async move { waiter.wait_finished().await });

        tracker.finish(&turn);
        handle.await.unwrap();
    }

    #[test]
    fn test_busy_policy_parsing() {
        assert_eq!("reject".parse::<BusyPolicy>().unwrap(), BusyPolicy::Reject);
        assert_eq!(
            "cancel-previous".parse::<BusyPolicy>().unwrap(),
            BusyPolicy::CancelPrevious
        );
        assert!("queue".parse::<BusyPolicy>().is_err());
    }
}
