use crate::{context::Context, dispatcher::DispatchQueue, session, session::Session};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;

const ACCEPT_BACKLOG: usize = 64;

/// Fixed set of I/O worker loops, each owning a single-threaded runtime.
/// A connection is handed to one worker by round-robin and all of its
/// reads and writes stay on that loop.
pub struct IoPool {
    workers: Vec<mpsc::Sender<std::net::TcpStream>>,
    next: AtomicUsize,
}

impl IoPool {
    pub fn start(ctx: Arc<Context>, dispatch: DispatchQueue, size: usize) -> Self {
        let mut workers = Vec::with_capacity(size);
        for _ in 0..size {
            let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
            let ctx = ctx.clone();
            let dispatch = dispatch.clone();
            thread::spawn(move || io_worker(ctx, dispatch, rx));
            workers.push(tx);
        }
        Self {
            workers,
            next: AtomicUsize::new(0),
        }
    }

    fn deliver(&self, stream: std::net::TcpStream) {
        let turn = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        if self.workers[turn].blocking_send(stream).is_err() {
            log::error!("io worker {} is gone, dropping connection", turn);
        }
    }
}

fn io_worker(
    ctx: Arc<Context>,
    dispatch: DispatchQueue,
    mut incoming: mpsc::Receiver<std::net::TcpStream>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("building io runtime failed, {:?}", e);
            return;
        }
    };
    rt.block_on(async move {
        while let Some(stream) = incoming.recv().await {
            if let Err(e) = register(&ctx, &dispatch, stream) {
                log::error!("registering session failed, {:?}", e);
            }
        }
    });
}

fn register(
    ctx: &Arc<Context>,
    dispatch: &DispatchQueue,
    stream: std::net::TcpStream,
) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    stream.set_nonblocking(true)?;
    let stream = tokio::net::TcpStream::from_std(stream)?;
    let (rd, wr) = stream.into_split();
    let (session, outbound) = Session::new(ctx.cfg.server.max_sendq);
    ctx.registry.insert(session.clone());
    log::debug!(
        "session {} accepted, {} live",
        session.session_id(),
        ctx.registry.live_sessions()
    );
    tokio::spawn(session::write_loop(session.clone(), wr, outbound));
    tokio::spawn(session::read_loop(
        ctx.clone(),
        dispatch.clone(),
        session,
        rd,
    ));
    Ok(())
}

/// Blocks on the accept loop for the lifetime of the process.
pub fn serve(ctx: Arc<Context>, dispatch: DispatchQueue) -> anyhow::Result<()> {
    let addr = ctx.cfg.server.bind_addr();
    let listener = TcpListener::bind(&addr)?;
    log::info!("chat server listening on {}", addr);
    let pool = IoPool::start(ctx.clone(), dispatch, ctx.cfg.server.io_workers);
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => pool.deliver(stream),
            Err(e) => log::error!("accepting connection failed, {:?}", e),
        }
    }
    Ok(())
}
