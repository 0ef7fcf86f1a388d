use crate::{codec, context::Context, dispatcher::DispatchQueue, proto::id};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::mpsc::{self, error::TrySendError},
};
use tokio_util::sync::CancellationToken;

pub struct Session {
    session_id: String,
    user_id: AtomicU64,
    closed: AtomicBool,
    // set when this session bumped LOGIN_COUNT, cleared by the one
    // eviction that decrements it back
    counted: AtomicBool,
    outbound: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
}

impl Session {
    /// Returns the session plus the receiver end of its send queue; the
    /// receiver is owned by the session's write loop.
    pub fn new(max_sendq: usize) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(max_sendq);
        let session = Arc::new(Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            counted: AtomicBool::new(false),
            outbound: tx,
            cancel: CancellationToken::new(),
        });
        (session, rx)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 0 until the login handler binds an identity.
    pub fn user_id(&self) -> u64 {
        self.user_id.load(Ordering::SeqCst)
    }

    /// Binds the identity exactly once; a second call is refused.
    pub fn bind_uid(&self, uid: u64) -> bool {
        self.user_id
            .compare_exchange(0, uid, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn mark_counted(&self) {
        self.counted.store(true, Ordering::SeqCst);
    }

    /// True exactly once after `mark_counted`.
    pub fn take_counted(&self) -> bool {
        self.counted.swap(false, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sticky; wakes both I/O loops. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Thread-safe, non-blocking. Backpressure is lossy: a frame offered
    /// to a full queue is dropped and logged, the session stays open.
    pub fn send(&self, msg_id: u16, payload: &[u8]) {
        if self.is_closed() {
            return;
        }
        if payload.len() > codec::MAX_PAYLOAD {
            log::error!(
                "session {}: dropping oversize frame, msg {} carries {} bytes",
                self.session_id,
                msg_id,
                payload.len()
            );
            return;
        }
        match self.outbound.try_send(codec::encode(msg_id, payload)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "session {}: send queue full, dropping msg {}",
                    self.session_id,
                    msg_id
                );
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    pub fn send_json(&self, msg_id: u16, body: &impl Serialize) {
        match serde_json::to_vec(body) {
            Ok(bytes) => self.send(msg_id, &bytes),
            Err(e) => log::error!(
                "session {}: encoding reply for msg {} failed, {:?}",
                self.session_id,
                msg_id,
                e
            ),
        }
    }
}

/// READ_HEAD -> READ_BODY -> READ_HEAD until the peer closes, a read
/// fails, the header violates the bounds, or the session is closed from
/// elsewhere. Whatever the cause, the session ends up evicted and the
/// cleanup job is posted to the dispatcher exactly once.
pub async fn read_loop(
    ctx: Arc<Context>,
    dispatch: DispatchQueue,
    session: Arc<Session>,
    mut rd: OwnedReadHalf,
) {
    loop {
        let mut head = [0_u8; codec::HEADER_LEN];
        tokio::select! {
            _ = session.cancellation().cancelled() => break,
            r = rd.read_exact(&mut head) => {
                if r.is_err() {
                    break;
                }
            }
        }
        let (msg_id, len) = match codec::decode_header(head) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("session {}: {}, closing", session.session_id(), e);
                break;
            }
        };
        let mut body = vec![0_u8; len as usize];
        tokio::select! {
            _ = session.cancellation().cancelled() => break,
            r = rd.read_exact(&mut body) => {
                if r.is_err() {
                    break;
                }
            }
        }
        dispatch.push(session.clone(), msg_id, body);
    }
    if ctx.registry.evict(&session) {
        dispatch.push(session.clone(), id::SESSION_EVICTED, Vec::new());
    }
}

pub async fn write_loop(
    session: Arc<Session>,
    mut wr: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Vec<u8>>,
) {
    loop {
        tokio::select! {
            _ = session.cancellation().cancelled() => break,
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = wr.write_all(&frame).await {
                            log::debug!(
                                "session {}: write failed, {:?}",
                                session.session_id(),
                                e
                            );
                            // the read loop observes the cancellation
                            // and performs the eviction
                            session.close();
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    let _ = wr.shutdown().await;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    pub fn test_bind_once() {
        let (session, _rx) = Session::new(8);
        assert_eq!(session.user_id(), 0);
        assert!(session.bind_uid(42));
        assert!(!session.bind_uid(43));
        assert_eq!(session.user_id(), 42);
    }

    #[test]
    pub fn test_send_fifo_and_backpressure() {
        let cap = 4;
        let (session, mut rx) = Session::new(cap);
        for i in 0..cap as u16 + 2 {
            session.send(1018, format!("{{\"seq\":{}}}", i).as_bytes());
        }
        // the session survives the overflow
        assert!(!session.is_closed());
        // exactly `cap` frames were enqueued, in order
        for i in 0..cap as u16 {
            let frame = rx.try_recv().unwrap();
            let (id, len) = codec::decode_header([frame[0], frame[1], frame[2], frame[3]]).unwrap();
            assert_eq!(id, 1018);
            assert_eq!(
                &frame[codec::HEADER_LEN..codec::HEADER_LEN + len as usize],
                format!("{{\"seq\":{}}}", i).as_bytes()
            );
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    pub fn test_send_after_close() {
        let (session, mut rx) = Session::new(4);
        session.close();
        session.send(1018, b"{}");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    pub fn test_oversize_payload_dropped() {
        let (session, mut rx) = Session::new(4);
        session.send(1018, &vec![0_u8; codec::MAX_PAYLOAD + 1]);
        assert!(rx.try_recv().is_err());
        assert!(!session.is_closed());
    }

    #[test]
    pub fn test_take_counted_once() {
        let (session, _rx) = Session::new(4);
        assert!(!session.take_counted());
        session.mark_counted();
        assert!(session.take_counted());
        assert!(!session.take_counted());
    }
}
