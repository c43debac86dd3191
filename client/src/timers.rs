use std::cell::Cell;
use std::rc::Rc;

/// Suspension seam for everything that waits on the event loop.
#[allow(async_fn_in_trait)]
pub trait Timers {
    async fn sleep(&self, ms: u32);
}

/// `setTimeout`-backed timers. A zero delay yields to the browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserTimers;

impl Timers for BrowserTimers {
    async fn sleep(&self, ms: u32) {
        gloo_timers::future::TimeoutFuture::new(ms).await;
    }
}

/// Shared liveness flag; cleared when the owning component is torn down so
/// suspended work can bail out when it resumes.
#[derive(Debug, Clone)]
pub struct AliveFlag(Rc<Cell<bool>>);

impl AliveFlag {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.get()
    }

    pub fn kill(&self) {
        self.0.set(false);
    }
}

impl Default for AliveFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub mod testing {
    use std::cell::{Cell, RefCell};
    use std::task::Poll;

    use futures::channel::oneshot;

    use super::Timers;

    /// Yields once per sleep, then resolves; records the requested delays.
    #[derive(Debug, Default)]
    pub struct ImmediateTimers {
        pub requested: RefCell<Vec<u32>>,
    }

    impl Timers for ImmediateTimers {
        async fn sleep(&self, ms: u32) {
            self.requested.borrow_mut().push(ms);
            let mut yielded = false;
            futures::future::poll_fn(|cx| {
                if yielded {
                    Poll::Ready(())
                } else {
                    yielded = true;
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            })
            .await;
        }
    }

    /// Sleeps stay pending until the test fires them.
    #[derive(Debug, Default)]
    pub struct ManualTimers {
        pending: RefCell<Vec<(u32, oneshot::Sender<()>)>>,
        fired: Cell<usize>,
    }

    impl ManualTimers {
        pub fn pending(&self) -> Vec<u32> {
            self.pending.borrow().iter().map(|(ms, _)| *ms).collect()
        }

        /// Resolve every sleep registered so far.
        pub fn fire_all(&self) -> usize {
            let drained: Vec<_> = self.pending.borrow_mut().drain(..).collect();
            let count = drained.len();
            for (_, tx) in drained {
                let _ = tx.send(());
            }
            self.fired.set(self.fired.get() + count);
            count
        }

        pub fn fired(&self) -> usize {
            self.fired.get()
        }
    }

    impl Timers for ManualTimers {
        async fn sleep(&self, ms: u32) {
            let (tx, rx) = oneshot::channel();
            self.pending.borrow_mut().push((ms, tx));
            let _ = rx.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;
    use std::rc::Rc;

    use super::testing::{ImmediateTimers, ManualTimers};
    use super::*;

    #[test]
    fn alive_flag_is_shared_between_clones() {
        let flag = AliveFlag::new();
        let other = flag.clone();
        assert!(other.is_alive());
        flag.kill();
        assert!(!other.is_alive());
    }

    #[test]
    fn immediate_timers_yield_once_and_record_delay() {
        let timers = Rc::new(ImmediateTimers::default());
        let done = Rc::new(Cell::new(false));
        let mut pool = LocalPool::new();
        {
            let timers = timers.clone();
            let done = done.clone();
            pool.spawner()
                .spawn_local(async move {
                    timers.sleep(0).await;
                    done.set(true);
                })
                .expect("spawn");
        }
        pool.run_until_stalled();
        assert!(done.get());
        assert_eq!(*timers.requested.borrow(), vec![0]);
    }

    #[test]
    fn manual_timers_hold_until_fired() {
        let timers = Rc::new(ManualTimers::default());
        let done = Rc::new(Cell::new(false));
        let mut pool = LocalPool::new();
        {
            let timers = timers.clone();
            let done = done.clone();
            pool.spawner()
                .spawn_local(async move {
                    timers.sleep(250).await;
                    done.set(true);
                })
                .expect("spawn");
        }
        pool.run_until_stalled();
        assert!(!done.get());
        assert_eq!(timers.pending(), vec![250]);

        assert_eq!(timers.fire_all(), 1);
        pool.run_until_stalled();
        assert!(done.get());
        assert_eq!(timers.fired(), 1);
    }
}
