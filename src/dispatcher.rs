use crate::session::Session;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

pub type Job = (Arc<Session>, u16, Vec<u8>);

pub const DEFAULT_CAPACITY: usize = 16384;

struct State {
    queue: VecDeque<Job>,
    stopped: bool,
}

/// One bounded FIFO, exactly one consumer thread: handler execution is
/// serialized, which keeps handlers lock-free and preserves arrival
/// order per sender.
pub struct Dispatcher {
    state: Mutex<State>,
    consume: Condvar,
    capacity: usize,
}

/// Cloneable producer handle.
#[derive(Clone)]
pub struct DispatchQueue(Arc<Dispatcher>);

impl DispatchQueue {
    pub fn push(&self, session: Arc<Session>, msg_id: u16, payload: Vec<u8>) {
        self.0.push(session, msg_id, payload);
    }

    pub fn stop(&self) {
        self.0.stop();
    }
}

impl Dispatcher {
    /// Spawns the consumer thread; `handler` runs for every popped job.
    pub fn start<F>(capacity: usize, handler: F) -> (DispatchQueue, thread::JoinHandle<()>)
    where
        F: Fn(Job) + Send + 'static,
    {
        let dispatcher = Arc::new(Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                stopped: false,
            }),
            consume: Condvar::new(),
            capacity,
        });
        let consumer = dispatcher.clone();
        let worker = thread::spawn(move || consumer.run(handler));
        (DispatchQueue(dispatcher), worker)
    }

    /// Non-blocking; jobs offered after `stop` or over capacity are
    /// dropped with a log line.
    fn push(&self, session: Arc<Session>, msg_id: u16, payload: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            log::info!("dispatcher stopped, dropping msg {}", msg_id);
            return;
        }
        if state.queue.len() >= self.capacity {
            log::warn!("dispatcher queue full, dropping msg {}", msg_id);
            return;
        }
        let was_empty = state.queue.is_empty();
        state.queue.push_back((session, msg_id, payload));
        drop(state);
        if was_empty {
            self.consume.notify_one();
        }
    }

    /// Sticky. The consumer drains everything already queued, then exits.
    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stopped = true;
        drop(state);
        self.consume.notify_all();
    }

    fn run<F>(&self, handler: F)
    where
        F: Fn(Job),
    {
        loop {
            let job = {
                let mut state = self.state.lock().unwrap();
                loop {
                    if let Some(job) = state.queue.pop_front() {
                        break Some(job);
                    }
                    if state.stopped {
                        break None;
                    }
                    state = self.consume.wait(state).unwrap();
                }
            };
            match job {
                Some(job) => handler(job),
                None => break,
            }
        }
        log::info!("dispatcher drained, logic thread exiting");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn job_session() -> Arc<Session> {
        Session::new(8).0
    }

    #[test]
    pub fn test_fifo_per_producer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let (queue, worker) = Dispatcher::start(DEFAULT_CAPACITY, move |(_, _, payload)| {
            sink.lock().unwrap().push(payload[0]);
        });
        let session = job_session();
        for i in 0..100_u8 {
            queue.push(session.clone(), 1017, vec![i]);
        }
        queue.stop();
        worker.join().unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<u8>>());
    }

    #[test]
    pub fn test_handlers_never_overlap() {
        let busy = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let (b, o) = (busy.clone(), overlapped.clone());
        let (queue, worker) = Dispatcher::start(DEFAULT_CAPACITY, move |_| {
            if b.swap(true, Ordering::SeqCst) {
                o.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(1));
            b.store(false, Ordering::SeqCst);
        });
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                let session = job_session();
                thread::spawn(move || {
                    for _ in 0..25 {
                        queue.push(session.clone(), 1017, vec![]);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        queue.stop();
        worker.join().unwrap();
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[test]
    pub fn test_stop_drains_but_rejects_new() {
        let handled = Arc::new(AtomicUsize::new(0));
        let sink = handled.clone();
        let (queue, worker) = Dispatcher::start(DEFAULT_CAPACITY, move |_| {
            thread::sleep(Duration::from_millis(1));
            sink.fetch_add(1, Ordering::SeqCst);
        });
        let session = job_session();
        for _ in 0..20 {
            queue.push(session.clone(), 1017, vec![]);
        }
        queue.stop();
        for _ in 0..20 {
            queue.push(session.clone(), 1017, vec![]);
        }
        worker.join().unwrap();
        assert_eq!(handled.load(Ordering::SeqCst), 20);
    }

    #[test]
    pub fn test_capacity_bound() {
        let gate = Arc::new(Mutex::new(()));
        let handled = Arc::new(AtomicUsize::new(0));
        let held = gate.lock().unwrap();
        let (g, sink) = (gate.clone(), handled.clone());
        let (queue, worker) = Dispatcher::start(2, move |_| {
            let _unused = g.lock().unwrap();
            sink.fetch_add(1, Ordering::SeqCst);
        });
        let session = job_session();
        for _ in 0..10 {
            queue.push(session.clone(), 1017, vec![]);
        }
        drop(held);
        queue.stop();
        worker.join().unwrap();
        // at most one in-flight job plus two queued survive the overflow
        let n = handled.load(Ordering::SeqCst);
        assert!((2..=3).contains(&n), "handled {}", n);
    }
}
