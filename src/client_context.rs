use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::client::ClientId;
use crate::state_machine::StateMachine;
use crate::state_machine::rapid_trigger::{
    RapidTriggerMachine, TriggerInput, TriggerOutput, TriggerState,
};

/// Observable state of one client at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub client_id: ClientId,
    pub display_name: String,
    pub state: TriggerState,
    pub last_seen: Option<Instant>,
    pub last_event: Option<String>,
}

impl ClientSnapshot {
    pub fn is_triggered(&self) -> bool {
        self.state == TriggerState::Triggered
    }

    pub fn armed_at(&self) -> Option<Instant> {
        match self.state {
            TriggerState::Armed { since } => Some(since),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct ClientState {
    display_name: String,
    last_event: Option<String>,
    trigger_machine: RapidTriggerMachine,
}

/// Per-client context held in the [`ClientMap`](crate::client_map::ClientMap).
///
/// Every mutation goes through a single mutex so an update and a reset are each applied whole.
#[derive(Debug)]
pub struct ClientContext {
    client_id: ClientId,
    state: Mutex<ClientState>,
}

impl ClientContext {
    pub fn new(
        client_id: ClientId,
        display_name: impl Into<String>,
        window: Option<Duration>,
    ) -> Self {
        Self {
            client_id,
            state: Mutex::new(ClientState {
                display_name: display_name.into(),
                last_event: None,
                trigger_machine: RapidTriggerMachine::new(window),
            }),
        }
    }

    /// Feed an event received at `at` into the client, returning the trigger transition it caused.
    pub fn update(
        &self,
        at: Instant,
        display_name: &str,
        event: Option<&str>,
    ) -> Option<TriggerState> {
        let mut state = self.lock();

        if state.display_name != display_name {
            state.display_name = display_name.to_string();
        }
        if let Some(event) = event {
            state.last_event = Some(event.to_string());
        }

        state.trigger_machine.process_input(TriggerInput::Event(at));
        state
            .trigger_machine
            .poll_output()
            .map(|out| match out {
                TriggerOutput::StateChanged(next) => next,
            })
    }

    /// Return the client to idle, returning `true` if it was armed or triggered.
    pub fn reset(&self) -> bool {
        let mut state = self.lock();
        state.trigger_machine.process_input(TriggerInput::Reset);
        state.trigger_machine.poll_output().is_some()
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        let state = self.lock();
        ClientSnapshot {
            client_id: self.client_id.clone(),
            display_name: state.display_name.clone(),
            state: state.trigger_machine.state(),
            last_seen: state.trigger_machine.last_seen(),
            last_event: state.last_event.clone(),
        }
    }

    // A panic mid-update cannot leave the machine torn, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn context(window: Option<Duration>) -> ClientContext {
        ClientContext::new(ClientId::normalize("abc").unwrap(), "Living Room", window)
    }

    #[test]
    fn test_update_reports_transitions() {
        let t0 = Instant::now();
        let ctx = context(Some(Duration::from_secs(5)));

        assert_eq!(
            ctx.update(t0, "Living Room", Some("media.play")),
            Some(TriggerState::Armed { since: t0 })
        );
        assert_eq!(
            ctx.update(t0 + Duration::from_secs(1), "Living Room", Some("media.pause")),
            Some(TriggerState::Triggered)
        );
        let snapshot = ctx.snapshot();
        assert!(snapshot.is_triggered());
        assert_eq!(snapshot.last_event.as_deref(), Some("media.pause"));
        assert_eq!(snapshot.last_seen, Some(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_update_follows_display_name() {
        let ctx = context(None);
        ctx.update(Instant::now(), "Bedroom", None);

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.display_name, "Bedroom");
        assert!(snapshot.last_event.is_none());
        assert_eq!(snapshot.state, TriggerState::Idle);
    }

    #[test]
    fn test_reset_reports_whether_anything_cleared() {
        let t0 = Instant::now();
        let ctx = context(Some(Duration::from_secs(5)));

        assert!(!ctx.reset());
        ctx.update(t0, "Living Room", None);
        assert!(ctx.reset());
        assert!(ctx.snapshot().armed_at().is_none());
    }

    #[test]
    fn test_concurrent_update_and_reset_never_tear() {
        let t0 = Instant::now();
        let ctx = Arc::new(context(Some(Duration::from_secs(5))));

        let updater = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                for i in 0..1_000 {
                    ctx.update(t0 + Duration::from_millis(i), "Living Room", None);
                }
            })
        };
        let resetter = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    ctx.reset();
                }
            })
        };
        updater.join().unwrap();
        resetter.join().unwrap();

        // Whatever the interleaving, the state is one the machine can reach on its own.
        let snapshot = ctx.snapshot();
        match snapshot.state {
            TriggerState::Idle | TriggerState::Triggered => {}
            TriggerState::Armed { since } => assert!(since >= t0),
        }
        assert_eq!(snapshot.last_seen, Some(t0 + Duration::from_millis(999)));
    }
}
