use crossbeam_utils::Backoff;

use crate::loom_exports::thread;

/// How a `put` or `read` passes time while it waits on another thread.
///
/// None of the strategies park the thread or touch an OS synchronization primitive. They only
/// differ in how much CPU they burn and how quickly they notice progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WaitStrategy {
    /// Give up the rest of the time slice on every iteration.
    #[default]
    Yield,
    /// Spin with exponential backoff, then fall back to yielding once the backoff is exhausted.
    Backoff,
    /// Busy loop with a spin hint. Only sensible when every producer and consumer has a core to
    /// itself.
    Spin,
}

/// Per-operation wait state. Built fresh for every wait so backoff starts short each time.
pub(crate) struct Waiter {
    strategy: WaitStrategy,
    backoff: Backoff,
}

impl Waiter {
    #[inline(always)]
    pub(crate) fn new(strategy: WaitStrategy) -> Self {
        Self {
            strategy,
            backoff: Backoff::new(),
        }
    }

    #[inline(always)]
    pub(crate) fn wait(&self) {
        // Loom only explores other threads when the spinning one yields.
        #[cfg(loom)]
        {
            let _ = (self.strategy, &self.backoff);
            thread::yield_now();
        }
        #[cfg(not(loom))]
        match self.strategy {
            WaitStrategy::Yield => thread::yield_now(),
            WaitStrategy::Backoff => self.backoff.snooze(),
            WaitStrategy::Spin => core::hint::spin_loop(),
        }
    }

    /// Wait until `done` returns true.
    #[inline(always)]
    pub(crate) fn until(&self, mut done: impl FnMut() -> bool) {
        while !done() {
            self.wait();
        }
    }
}

#[cfg(all(test, not(loom)))]
mod test {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn default_strategy_yields() {
        assert_eq!(WaitStrategy::default(), WaitStrategy::Yield);
    }

    #[test]
    fn until_returns_immediately_when_done() {
        for strategy in [WaitStrategy::Yield, WaitStrategy::Backoff, WaitStrategy::Spin] {
            let mut polls = 0;
            Waiter::new(strategy).until(|| {
                polls += 1;
                true
            });
            assert_eq!(polls, 1);
        }
    }

    #[test]
    fn until_observes_other_thread() {
        for strategy in [WaitStrategy::Yield, WaitStrategy::Backoff, WaitStrategy::Spin] {
            let flag = Arc::new(AtomicBool::new(false));
            let setter = {
                let flag = flag.clone();
                std::thread::spawn(move || flag.store(true, Ordering::Release))
            };

            Waiter::new(strategy).until(|| flag.load(Ordering::Acquire));
            setter.join().unwrap();
        }
    }
}
