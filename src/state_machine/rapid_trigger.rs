//! Two-stage debounce detector for repeated player actions.
//!
//! ```text
//!          event                 event within window
//!  Idle ──────────► Armed ──────────────────────────► Triggered
//!   ▲                │ ▲                                  │
//!   │                └─┘ event outside window             │
//!   │                    (re-anchors armed_at)            │
//!   └──────────────────── reset ──────────────────────────┘
//! ```
//!
//! With the feature disabled events only refresh `last_seen`.

use std::time::{Duration, Instant};

use super::StateMachine;

/// Where a client currently sits in the rapid trigger cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Armed { since: Instant },
    Triggered,
}

#[derive(Debug)]
pub struct RapidTriggerMachine {
    window: Option<Duration>,
    state: TriggerState,
    last_seen: Option<Instant>,
    pending: Option<TriggerOutput>,
}

impl RapidTriggerMachine {
    /// Create an idle machine. A `window` of `None` disables rapid trigger detection.
    pub fn new(window: Option<Duration>) -> Self {
        Self {
            window,
            state: TriggerState::Idle,
            last_seen: None,
            pending: None,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn is_triggered(&self) -> bool {
        self.state == TriggerState::Triggered
    }

    pub fn armed_at(&self) -> Option<Instant> {
        match self.state {
            TriggerState::Armed { since } => Some(since),
            _ => None,
        }
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }

    fn process_event(&mut self, at: Instant) {
        self.last_seen = Some(at);

        let Some(window) = self.window else {
            return;
        };

        let next = match self.state {
            TriggerState::Idle => TriggerState::Armed { since: at },
            TriggerState::Armed { since } if at.saturating_duration_since(since) <= window => {
                TriggerState::Triggered
            }
            TriggerState::Armed { .. } => TriggerState::Armed { since: at },
            TriggerState::Triggered => TriggerState::Triggered,
        };

        self.transition(next);
    }

    fn process_reset(&mut self) {
        self.transition(TriggerState::Idle);
    }

    fn transition(&mut self, next: TriggerState) {
        let changed = !matches!(
            (self.state, next),
            (TriggerState::Idle, TriggerState::Idle)
                | (TriggerState::Triggered, TriggerState::Triggered)
        );
        self.state = next;

        if changed {
            self.pending = Some(TriggerOutput::StateChanged(next));
        }
    }
}

pub enum TriggerInput {
    Event(Instant),
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutput {
    StateChanged(TriggerState),
}

impl StateMachine for RapidTriggerMachine {
    type Input = TriggerInput;
    type Output = TriggerOutput;

    fn process_input(&mut self, input: Self::Input) {
        match input {
            TriggerInput::Event(at) => self.process_event(at),
            TriggerInput::Reset => self.process_reset(),
        }
    }

    fn poll_output(&mut self) -> Option<Self::Output> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn event(machine: &mut RapidTriggerMachine, at: Instant) {
        machine.process_input(TriggerInput::Event(at));
    }

    #[test]
    fn test_initial_state() {
        let machine = RapidTriggerMachine::new(Some(secs(5)));
        assert_eq!(machine.state(), TriggerState::Idle);
        assert!(machine.armed_at().is_none());
        assert!(machine.last_seen().is_none());
        assert!(!machine.is_triggered());
    }

    #[test]
    fn test_second_event_within_window_triggers() {
        let t0 = Instant::now();
        let mut machine = RapidTriggerMachine::new(Some(secs(5)));

        event(&mut machine, t0);
        assert_eq!(machine.armed_at(), Some(t0));

        event(&mut machine, t0 + secs(3));
        assert!(machine.is_triggered());
        assert_eq!(machine.last_seen(), Some(t0 + secs(3)));
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let t0 = Instant::now();
        let mut machine = RapidTriggerMachine::new(Some(secs(5)));

        event(&mut machine, t0);
        event(&mut machine, t0 + secs(5));
        assert!(machine.is_triggered());
    }

    #[test]
    fn test_event_outside_window_rearms() {
        let t0 = Instant::now();
        let mut machine = RapidTriggerMachine::new(Some(secs(5)));

        event(&mut machine, t0);
        event(&mut machine, t0 + secs(8));
        assert_eq!(
            machine.state(),
            TriggerState::Armed {
                since: t0 + secs(8)
            }
        );

        // The window is measured from the re-anchored event.
        event(&mut machine, t0 + secs(12));
        assert!(machine.is_triggered());
    }

    #[test]
    fn test_disabled_never_leaves_idle() {
        let t0 = Instant::now();
        let mut machine = RapidTriggerMachine::new(None);

        for offset in [0, 1, 2, 3, 30] {
            event(&mut machine, t0 + secs(offset));
            assert_eq!(machine.state(), TriggerState::Idle);
        }
        assert_eq!(machine.last_seen(), Some(t0 + secs(30)));
        assert!(machine.poll_output().is_none());
    }

    #[test]
    fn test_triggered_is_sticky_until_reset() {
        let t0 = Instant::now();
        let mut machine = RapidTriggerMachine::new(Some(secs(5)));

        event(&mut machine, t0);
        event(&mut machine, t0 + secs(1));
        event(&mut machine, t0 + secs(100));
        assert!(machine.is_triggered());
        assert_eq!(machine.last_seen(), Some(t0 + secs(100)));

        machine.process_input(TriggerInput::Reset);
        assert_eq!(machine.state(), TriggerState::Idle);
        assert!(machine.armed_at().is_none());
        assert!(!machine.is_triggered());
    }

    #[test]
    fn test_reset_from_armed() {
        let t0 = Instant::now();
        let mut machine = RapidTriggerMachine::new(Some(secs(5)));

        event(&mut machine, t0);
        machine.process_input(TriggerInput::Reset);

        // A fresh event after reset only arms again.
        event(&mut machine, t0 + secs(1));
        assert_eq!(machine.armed_at(), Some(t0 + secs(1)));
    }

    #[test]
    fn test_out_of_order_event_saturates() {
        let t0 = Instant::now();
        let mut machine = RapidTriggerMachine::new(Some(secs(5)));

        event(&mut machine, t0 + secs(10));
        event(&mut machine, t0);
        assert!(machine.is_triggered());
    }

    #[test]
    fn test_outputs_report_transitions() {
        let t0 = Instant::now();
        let mut machine = RapidTriggerMachine::new(Some(secs(5)));

        event(&mut machine, t0);
        assert_eq!(
            machine.poll_output(),
            Some(TriggerOutput::StateChanged(TriggerState::Armed { since: t0 }))
        );
        assert!(machine.poll_output().is_none());

        event(&mut machine, t0 + secs(2));
        assert_eq!(
            machine.poll_output(),
            Some(TriggerOutput::StateChanged(TriggerState::Triggered))
        );

        // Staying triggered is not a transition.
        event(&mut machine, t0 + secs(3));
        assert!(machine.poll_output().is_none());

        machine.process_input(TriggerInput::Reset);
        assert_eq!(
            machine.poll_output(),
            Some(TriggerOutput::StateChanged(TriggerState::Idle))
        );

        // Resetting an idle machine is silent.
        machine.process_input(TriggerInput::Reset);
        assert!(machine.poll_output().is_none());
    }
}
