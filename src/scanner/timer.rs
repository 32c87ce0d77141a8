//! Single-shot relative timer used to bound the wait for each probe's answer.

use std::time::{Duration, Instant};

/// Monotonic time source behind [`ProbeTimer`].
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("timer has been closed")]
    Closed,

    #[error("timeout of {0:?} cannot be represented")]
    OutOfRange(Duration),
}

/// Lifecycle of a relative timer.
///
/// `start` arms (or re-arms) it, `expired` polls without blocking, `cancel`
/// disarms it and `close` releases it. Nothing is valid after `close`.
pub trait Timer {
    fn start(&mut self, timeout: Duration) -> Result<(), TimerError>;

    /// True once the armed timeout has elapsed. Stays true until the next
    /// `start`; false while idle or cancelled.
    fn expired(&self) -> bool;

    /// Time left before the armed timeout fires, `None` when not armed.
    fn remaining(&self) -> Option<Duration>;

    /// Time since the last `start`, `None` when not armed.
    fn elapsed(&self) -> Option<Duration>;

    fn cancel(&mut self) -> Result<(), TimerError>;

    fn close(&mut self) -> Result<(), TimerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Armed { started: Instant, deadline: Instant },
    Cancelled,
    Closed,
}

#[derive(Debug)]
pub struct ProbeTimer<C: Clock = SystemClock> {
    clock: C,
    state: State,
}

impl ProbeTimer<SystemClock> {
    pub fn create() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock> ProbeTimer<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: State::Created,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }
}

impl<C: Clock> Timer for ProbeTimer<C> {
    fn start(&mut self, timeout: Duration) -> Result<(), TimerError> {
        if self.is_closed() {
            return Err(TimerError::Closed);
        }
        let started = self.clock.now();
        let deadline = started
            .checked_add(timeout)
            .ok_or(TimerError::OutOfRange(timeout))?;
        self.state = State::Armed { started, deadline };
        Ok(())
    }

    fn expired(&self) -> bool {
        match self.state {
            State::Armed { deadline, .. } => self.clock.now() >= deadline,
            _ => false,
        }
    }

    fn remaining(&self) -> Option<Duration> {
        match self.state {
            State::Armed { deadline, .. } => {
                Some(deadline.saturating_duration_since(self.clock.now()))
            }
            _ => None,
        }
    }

    fn elapsed(&self) -> Option<Duration> {
        match self.state {
            State::Armed { started, .. } => {
                Some(self.clock.now().saturating_duration_since(started))
            }
            _ => None,
        }
    }

    fn cancel(&mut self) -> Result<(), TimerError> {
        if self.is_closed() {
            return Err(TimerError::Closed);
        }
        self.state = State::Cancelled;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TimerError> {
        if self.is_closed() {
            return Err(TimerError::Closed);
        }
        self.state = State::Closed;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Simulated clock; clones share the same instant.
    #[derive(Debug, Clone)]
    pub(crate) struct ManualClock {
        now: Rc<Cell<Instant>>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self {
                now: Rc::new(Cell::new(Instant::now())),
            }
        }

        pub(crate) fn advance(&self, by: Duration) {
            self.now.set(self.now.get() + by);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.now.get()
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn test_not_expired_right_after_start() {
        let clock = ManualClock::new();
        let mut timer = ProbeTimer::with_clock(clock.clone());
        timer.start(TIMEOUT).unwrap();
        assert!(!timer.expired());
        assert_eq!(timer.remaining(), Some(TIMEOUT));
    }

    #[test]
    fn test_expires_after_timeout() {
        let clock = ManualClock::new();
        let mut timer = ProbeTimer::with_clock(clock.clone());
        timer.start(TIMEOUT).unwrap();
        clock.advance(Duration::from_millis(99));
        assert!(!timer.expired());
        clock.advance(Duration::from_millis(1));
        assert!(timer.expired());
        assert_eq!(timer.remaining(), Some(Duration::ZERO));
        assert_eq!(timer.elapsed(), Some(TIMEOUT));
    }

    #[test]
    fn test_cancel_before_expiry_suppresses_expired() {
        let clock = ManualClock::new();
        let mut timer = ProbeTimer::with_clock(clock.clone());
        timer.start(TIMEOUT).unwrap();
        timer.cancel().unwrap();
        clock.advance(TIMEOUT * 2);
        assert!(!timer.expired());
        assert_eq!(timer.remaining(), None);

        timer.start(TIMEOUT).unwrap();
        assert!(!timer.expired());
        clock.advance(TIMEOUT);
        assert!(timer.expired());
    }

    #[test]
    fn test_restart_resets_countdown() {
        let clock = ManualClock::new();
        let mut timer = ProbeTimer::with_clock(clock.clone());
        timer.start(TIMEOUT).unwrap();
        clock.advance(Duration::from_millis(80));
        timer.start(TIMEOUT).unwrap();
        clock.advance(Duration::from_millis(80));
        assert!(!timer.expired());
    }

    #[test]
    fn test_idle_timer_never_expires() {
        let clock = ManualClock::new();
        let timer = ProbeTimer::with_clock(clock.clone());
        clock.advance(Duration::from_secs(10));
        assert!(!timer.expired());
        assert_eq!(timer.elapsed(), None);
    }

    #[test]
    fn test_operations_fail_after_close() {
        let mut timer = ProbeTimer::with_clock(ManualClock::new());
        timer.close().unwrap();
        assert!(timer.is_closed());
        assert_eq!(timer.start(TIMEOUT), Err(TimerError::Closed));
        assert_eq!(timer.cancel(), Err(TimerError::Closed));
        assert_eq!(timer.close(), Err(TimerError::Closed));
        assert!(!timer.expired());
    }

    #[test]
    fn test_unrepresentable_timeout_is_rejected() {
        let mut timer = ProbeTimer::with_clock(ManualClock::new());
        assert_eq!(
            timer.start(Duration::MAX),
            Err(TimerError::OutOfRange(Duration::MAX))
        );
    }

    #[test]
    fn test_system_clock_long_timeout_not_expired() {
        let mut timer = ProbeTimer::create();
        timer.start(Duration::from_secs(60)).unwrap();
        assert!(!timer.expired());
        assert!(timer.remaining().unwrap() > Duration::from_secs(30));
    }

    #[test]
    fn test_system_clock_sub_second_timeout_fires() {
        let mut timer = ProbeTimer::create();
        timer.start(Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(timer.expired());
    }
}
