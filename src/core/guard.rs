//!  Circuit Guard State Machine:
//!
//!                          threshold reached on a failure
//!
//!             +-----------------------------------------------------------------------+
//!             |                                                                       |
//!             |                                                                       v
//!     +----------------+                   +----------------+      Trial      +----------------+
//!     |                |                   |                |<----------------|                |
//!     |                |   Trial succeed   |                |                 |                |
//!     |     Closed     |<------------------|    HalfOpen    |                 |      Open      |
//!     |                |                   |                |   Trial failed  |                |
//!     |                |                   |                +---------------->|                |
//!     +----------------+                   +----------------+                 +----------------+
//!

use super::{GuardConfig, GuardError, State, StateChangeListener};
use crate::{logging, utils};
use std::fmt;
#[cfg(feature = "async")]
use std::future::Future;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

/// `CircuitGuard` wraps an arbitrary fallible operation and rejects calls while
/// the wrapped dependency is deemed unhealthy.
///
/// All state transitions are serialized under a single internal mutex, held
/// only across the check-and-transition step, never across the protected
/// operation. Two callers racing the open-to-half-open window will therefore
/// admit exactly one trial call; the loser is rejected as if the circuit were
/// still open.
pub struct CircuitGuard {
    config: Arc<GuardConfig>,
    /// state is the state machine of the circuit guard
    state: Mutex<State>,
    /// failures observed since the last success; reset to 0 on any success
    consecutive_failures: AtomicU64,
    /// next_retry_timestamp_ms is the time the guard could admit a trial call;
    /// 0 until the first failure has been recorded
    next_retry_timestamp_ms: AtomicU64,
    listeners: Vec<Arc<dyn StateChangeListener>>,
}

impl CircuitGuard {
    /// Creates a guard with the given configuration and no listeners.
    pub fn new(config: GuardConfig) -> crate::Result<Self> {
        Self::with_listeners(config, Vec::new())
    }

    /// Creates a guard notifying the given listeners on every state transition.
    pub fn with_listeners(
        config: GuardConfig,
        listeners: Vec<Arc<dyn StateChangeListener>>,
    ) -> crate::Result<Self> {
        config.is_valid()?;
        Ok(CircuitGuard {
            config: Arc::new(config),
            state: Mutex::new(State::default()),
            consecutive_failures: AtomicU64::new(0),
            next_retry_timestamp_ms: AtomicU64::new(0),
            listeners,
        })
    }

    #[inline]
    pub fn config(&self) -> &Arc<GuardConfig> {
        &self.config
    }

    /// `current_state` returns current state of the circuit guard.
    #[inline]
    pub fn current_state(&self) -> State {
        *self.state.lock().unwrap()
    }

    #[inline]
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn next_retry_timestamp_ms(&self) -> u64 {
        self.next_retry_timestamp_ms.load(Ordering::SeqCst)
    }

    /// `try_acquire` acquires permission for an invocation only if it is
    /// available at the time of invocation, based on the state machine.
    ///
    /// In the open state the admission itself performs the transition to
    /// half-open, before the trial call has completed. This eager bet keeps a
    /// burst of calls arriving at the cooldown-expiry instant from all being
    /// treated as trials. While a trial is pending (half-open), further calls
    /// are rejected.
    pub fn try_acquire(&self) -> bool {
        match self.current_state() {
            State::Closed => true,
            State::Open => self.retry_timeout_arrived() && self.from_open_to_half_open(),
            State::HalfOpen => false,
        }
    }

    /// `execute` runs `op` under the protection of the guard.
    ///
    /// A rejected call never invokes `op` and mutates no guard state. An
    /// admitted call invokes `op` exactly once, synchronously, with no timeout
    /// imposed; its outcome is recorded before the result is returned. The
    /// operation's own error is re-signaled unchanged as [`GuardError::Inner`].
    pub fn execute<F, T, E>(&self, op: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if !self.try_acquire() {
            return Err(GuardError::Rejected);
        }
        match op() {
            Ok(v) => {
                self.on_success();
                Ok(v)
            }
            Err(e) => {
                self.on_failure();
                Err(GuardError::Inner(e))
            }
        }
    }

    /// `execute_async` is the [`execute`](Self::execute) counterpart for
    /// future-returning operations. No lock is held across the await point.
    #[cfg(feature = "async")]
    #[cfg_attr(docsrs, doc(cfg(feature = "async")))]
    pub async fn execute_async<F, Fut, T, E>(&self, op: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            return Err(GuardError::Rejected);
        }
        match op().await {
            Ok(v) => {
                self.on_success();
                Ok(v)
            }
            Err(e) => {
                self.on_failure();
                Err(GuardError::Inner(e))
            }
        }
    }

    fn retry_timeout_arrived(&self) -> bool {
        // strictly greater: an attempt at exactly the cooldown boundary is
        // still rejected
        utils::curr_time_millis() > self.next_retry_timestamp_ms.load(Ordering::SeqCst)
    }

    fn update_next_retry_timestamp(&self) {
        self.next_retry_timestamp_ms.store(
            utils::curr_time_millis() + self.config.reset_timeout_ms,
            Ordering::SeqCst,
        );
    }

    /// A success observed in any state resets the failure counter and forces
    /// the guard closed.
    fn on_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.reset_to_closed();
    }

    /// Records a failure of an admitted call. The counter update happens
    /// before any state transition so listeners observe the final count.
    fn on_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        self.update_next_retry_timestamp();
        match self.current_state() {
            State::HalfOpen => {
                // a failed trial always re-arms the open state
                self.from_half_open_to_open(failures);
            }
            State::Closed => {
                if failures >= self.config.failure_threshold {
                    self.from_closed_to_open(failures);
                }
            }
            State::Open => {}
        }
    }

    /// `from_closed_to_open` updates the state machine from closed to open.
    /// Return true only if the current caller successfully accomplished the transformation.
    fn from_closed_to_open(&self, consecutive_failures: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == State::Closed {
            *state = State::Open;
            for listener in &self.listeners {
                listener.on_transform_to_open(State::Closed, consecutive_failures);
            }
            logging::warn!(
                "circuit guard opened after {} consecutive failures, next trial not before {}",
                consecutive_failures,
                utils::format_time_millis(self.next_retry_timestamp_ms()),
            );
            true
        } else {
            false
        }
    }

    /// `from_open_to_half_open` updates the state machine from open to half-open.
    /// Return true only if the current caller successfully accomplished the transformation.
    fn from_open_to_half_open(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == State::Open {
            *state = State::HalfOpen;
            for listener in &self.listeners {
                listener.on_transform_to_half_open(State::Open);
            }
            logging::info!("circuit guard half-open, admitting a trial call");
            true
        } else {
            false
        }
    }

    /// `from_half_open_to_open` updates the state machine from half-open to open.
    /// Return true only if the current caller successfully accomplished the transformation.
    fn from_half_open_to_open(&self, consecutive_failures: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == State::HalfOpen {
            *state = State::Open;
            for listener in &self.listeners {
                listener.on_transform_to_open(State::HalfOpen, consecutive_failures);
            }
            logging::warn!(
                "circuit guard re-opened by a failed trial, next trial not before {}",
                utils::format_time_millis(self.next_retry_timestamp_ms()),
            );
            true
        } else {
            false
        }
    }

    /// `reset_to_closed` forces the state machine to closed from whatever state
    /// it is in. Return true only if a transition actually happened.
    fn reset_to_closed(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let prev = *state;
        if prev != State::Closed {
            *state = State::Closed;
            for listener in &self.listeners {
                listener.on_transform_to_closed(prev);
            }
            logging::info!("circuit guard closed, previous state: {:?}", prev);
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for CircuitGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitGuard")
            .field("config", &self.config)
            .field("state", &self.current_state())
            .field("consecutive_failures", &self.consecutive_failures())
            .field("next_retry_timestamp_ms", &self.next_retry_timestamp_ms())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::sleep_for_ms;
    use mockall::predicate::*;
    use mockall::*;

    mock! {
        pub(crate) StateListener {}
        impl StateChangeListener for StateListener {
            fn on_transform_to_closed(&self, prev: State);
            fn on_transform_to_open(&self, prev: State, consecutive_failures: u64);
            fn on_transform_to_half_open(&self, prev: State);
        }
    }

    fn guard(failure_threshold: u64, reset_timeout_ms: u64) -> CircuitGuard {
        CircuitGuard::new(GuardConfig {
            failure_threshold,
            reset_timeout_ms,
        })
        .unwrap()
    }

    fn fail(guard: &CircuitGuard) {
        let res = guard.execute(|| Err::<(), _>("boom"));
        assert_eq!(res, Err(GuardError::Inner("boom")));
    }

    #[test]
    fn invalid_config() {
        assert!(CircuitGuard::new(GuardConfig {
            failure_threshold: 0,
            reset_timeout_ms: 1000,
        })
        .is_err());
    }

    #[test]
    fn try_acquire_closed() {
        let guard = guard(5, 60_000);
        assert!(guard.try_acquire());
        assert_eq!(guard.current_state(), State::Closed);
    }

    #[test]
    fn opens_at_threshold() {
        let guard = guard(3, 60_000);
        fail(&guard);
        fail(&guard);
        assert_eq!(guard.current_state(), State::Closed);
        assert_eq!(guard.consecutive_failures(), 2);
        fail(&guard);
        assert_eq!(guard.current_state(), State::Open);
        assert_eq!(guard.consecutive_failures(), 3);
        assert!(guard.next_retry_timestamp_ms() > 0);
    }

    #[test]
    fn rejects_while_open_without_invoking() {
        let guard = guard(1, 60_000);
        fail(&guard);
        assert_eq!(guard.current_state(), State::Open);

        let mut invoked = false;
        let res = guard.execute(|| {
            invoked = true;
            Ok::<_, &str>(())
        });
        assert_eq!(res, Err(GuardError::Rejected));
        assert!(!invoked);
        // rejected calls record no outcome
        assert_eq!(guard.consecutive_failures(), 1);
        assert_eq!(guard.current_state(), State::Open);
    }

    #[test]
    fn trial_succeeds_and_closes() {
        let guard = guard(1, 100);
        fail(&guard);
        assert_eq!(guard.current_state(), State::Open);
        sleep_for_ms(150);
        let res = guard.execute(|| Ok::<_, &str>(7));
        assert_eq!(res, Ok(7));
        assert_eq!(guard.current_state(), State::Closed);
        assert_eq!(guard.consecutive_failures(), 0);
    }

    #[test]
    fn trial_fails_and_reopens() {
        let guard = guard(1, 100);
        fail(&guard);
        let first_retry_at = guard.next_retry_timestamp_ms();
        sleep_for_ms(150);
        fail(&guard);
        assert_eq!(guard.current_state(), State::Open);
        assert_eq!(guard.consecutive_failures(), 2);
        // the failed trial refreshes the cooldown
        assert!(guard.next_retry_timestamp_ms() > first_retry_at);
        assert!(!guard.try_acquire());
    }

    #[test]
    fn success_resets_counter() {
        let guard = guard(3, 60_000);
        fail(&guard);
        fail(&guard);
        assert_eq!(guard.execute(|| Ok::<_, &str>(1)), Ok(1));
        assert_eq!(guard.consecutive_failures(), 0);
        assert_eq!(guard.current_state(), State::Closed);
        // the counter starts over, so two more failures do not open
        fail(&guard);
        fail(&guard);
        assert_eq!(guard.current_state(), State::Closed);
    }

    #[test]
    fn half_open_rejects_second_caller() {
        let guard = guard(1, 100);
        fail(&guard);
        sleep_for_ms(150);
        // claim the trial slot without completing a call
        assert!(guard.try_acquire());
        assert_eq!(guard.current_state(), State::HalfOpen);
        assert!(!guard.try_acquire());
    }

    #[test]
    fn listener_sees_transitions() {
        let mut listener = MockStateListener::new();
        listener
            .expect_on_transform_to_open()
            .with(eq(State::Closed), eq(1))
            .once()
            .return_const(());
        listener
            .expect_on_transform_to_half_open()
            .with(eq(State::Open))
            .once()
            .return_const(());
        listener
            .expect_on_transform_to_closed()
            .with(eq(State::HalfOpen))
            .once()
            .return_const(());

        let guard = CircuitGuard::with_listeners(
            GuardConfig {
                failure_threshold: 1,
                reset_timeout_ms: 100,
            },
            vec![Arc::new(listener)],
        )
        .unwrap();
        fail(&guard);
        sleep_for_ms(150);
        assert_eq!(guard.execute(|| Ok::<_, &str>(())), Ok(()));
    }

    #[test]
    fn listener_sees_failed_trial() {
        let mut listener = MockStateListener::new();
        listener
            .expect_on_transform_to_open()
            .with(eq(State::Closed), eq(1))
            .once()
            .return_const(());
        listener
            .expect_on_transform_to_half_open()
            .with(eq(State::Open))
            .once()
            .return_const(());
        listener
            .expect_on_transform_to_open()
            .with(eq(State::HalfOpen), eq(2))
            .once()
            .return_const(());

        let guard = CircuitGuard::with_listeners(
            GuardConfig {
                failure_threshold: 1,
                reset_timeout_ms: 100,
            },
            vec![Arc::new(listener)],
        )
        .unwrap();
        fail(&guard);
        sleep_for_ms(150);
        fail(&guard);
    }

    #[test]
    fn no_notification_for_closed_noop() {
        let mut listener = MockStateListener::new();
        listener.expect_on_transform_to_closed().never();
        listener.expect_on_transform_to_open().never();
        listener.expect_on_transform_to_half_open().never();

        let guard = CircuitGuard::with_listeners(
            GuardConfig::default(),
            vec![Arc::new(listener)],
        )
        .unwrap();
        assert_eq!(guard.execute(|| Ok::<_, &str>(())), Ok(()));
        assert_eq!(guard.current_state(), State::Closed);
    }

    #[test]
    fn concurrent_trial_single_winner() {
        let guard = Arc::new(guard(1, 100));
        fail(&guard);
        sleep_for_ms(150);

        let mut handlers = Vec::new();
        for _ in 0..8 {
            let guard = Arc::clone(&guard);
            handlers.push(std::thread::spawn(move || guard.try_acquire()));
        }
        let admitted = handlers
            .into_iter()
            .map(|h| h.join().expect("Couldn't join on the associated thread"))
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(guard.current_state(), State::HalfOpen);
    }
}
