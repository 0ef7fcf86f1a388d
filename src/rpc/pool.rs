use crate::rpc::client::RpcStub;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct State {
    idle: VecDeque<RpcStub>,
    stopped: bool,
}

/// Fixed set of pre-built stubs for one remote node. A stub is held by
/// at most one caller at a time; the pool size never changes over its
/// lifetime.
pub struct StubPool {
    state: Mutex<State>,
    available: Condvar,
}

impl StubPool {
    pub fn new(stubs: Vec<RpcStub>) -> Self {
        Self {
            state: Mutex::new(State {
                idle: stubs.into(),
                stopped: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Blocks until a stub is idle. Returns None once the pool is
    /// closed; callers must abort the call.
    pub fn acquire(&self) -> Option<RpcStub> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.stopped {
                return None;
            }
            if let Some(stub) = state.idle.pop_front() {
                return Some(stub);
            }
            state = self.available.wait(state).unwrap();
        }
    }

    /// A stub released after `close` is discarded.
    pub fn release(&self, stub: RpcStub) {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            return;
        }
        state.idle.push_back(stub);
        drop(state);
        self.available.notify_one();
    }

    /// Sticky; wakes every blocked `acquire`.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.stopped = true;
        drop(state);
        self.available.notify_all();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn pool_of(n: usize) -> StubPool {
        StubPool::new(
            (0..n)
                .map(|_| RpcStub::new("127.0.0.1:1".to_string()))
                .collect(),
        )
    }

    #[test]
    pub fn test_acquire_release() {
        let pool = pool_of(2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        pool.release(a);
        pool.release(b);
        assert!(pool.acquire().is_some());
    }

    #[test]
    pub fn test_blocked_acquire_wakes_on_release() {
        let pool = Arc::new(pool_of(1));
        let held = pool.acquire().unwrap();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().is_some())
        };
        thread::sleep(Duration::from_millis(20));
        pool.release(held);
        assert!(waiter.join().unwrap());
    }

    #[test]
    pub fn test_close_unblocks_and_rejects() {
        let pool = Arc::new(pool_of(1));
        let held = pool.acquire().unwrap();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().is_none())
        };
        thread::sleep(Duration::from_millis(20));
        pool.close();
        assert!(waiter.join().unwrap());
        // releasing into a closed pool discards the stub
        pool.release(held);
        assert!(pool.acquire().is_none());
    }
}
