//! The TCP acceptor (§6): listens for subscriber connections and spawns one
//! session task per accepted socket, registering it with the [`Broadcaster`]
//! so it starts receiving fan-out immediately.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::broadcaster::{Broadcaster, SessionHandle};
use crate::config;
use crate::sample::SampleSlot;
use crate::session;

/// Binds the listener on the configured port with `config::LISTEN_BACKLOG`.
pub async fn bind() -> std::io::Result<TcpListener> {
    bind_on(config::tcp_port()).await
}

/// Binds on an explicit port (0 for an OS-assigned ephemeral port), used by
/// tests that need to avoid colliding with a real deployment.
pub async fn bind_on(port: u16) -> std::io::Result<TcpListener> {
    let addr: std::net::SocketAddr = format!("0.0.0.0:{port}").parse().expect("valid socket address");
    let socket = TcpSocket::new_v4()?;
    socket.bind(addr)?;
    let listener = socket.listen(config::LISTEN_BACKLOG)?;
    info!(%addr, backlog = config::LISTEN_BACKLOG, "listening for subscribers");
    Ok(listener)
}

/// Runs the accept loop until `shutdown` is set. Each accepted connection
/// becomes a registered session.
pub async fn run(listener: TcpListener, sample: SampleSlot, broadcaster: Broadcaster, shutdown: Arc<AtomicBool>) {
    let next_id = AtomicU64::new(0);
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let accepted = tokio::time::timeout(std::time::Duration::from_millis(200), listener.accept()).await;
        let (stream, peer) = match accepted {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                warn!(error = %e, "accept failed");
                continue;
            }
            Err(_elapsed) => continue,
        };

        let id = next_id.fetch_add(1, Ordering::Relaxed);
        info!(%peer, session = id, "subscriber connected");

        let notify = Arc::new(Notify::new());
        let pending = Arc::new(AtomicU32::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let join = tokio::spawn(session::run(
            id,
            stream,
            sample.clone(),
            notify.clone(),
            pending.clone(),
            finished.clone(),
        ));

        let handle = SessionHandle {
            notify,
            pending,
            finished,
            join,
        };
        if let Err((e, handle)) = broadcaster.register(id, handle).await {
            warn!(error = %e, session = id, "dropping subscriber, registry is full");
            handle.finished.store(true, Ordering::Relaxed);
            handle.join.abort();
        }
    }
}
