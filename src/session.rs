//! A single subscriber session (§6): one task per connected TCP client. The
//! session never blocks the broadcaster — it waits on its own [`Notify`],
//! snapshots whatever the sample slot currently holds, and writes it out. A
//! client that never reads is simply never woken faster than notifications
//! arrive; a client that disconnects is noticed on the next non-blocking peek
//! and the task exits, setting `finished` for the reaper to collect.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, instrument, trace};

use crate::sample::SampleSlot;

#[instrument(skip(stream, sample, notify, pending, finished), fields(session = id))]
pub async fn run(
    id: u64,
    mut stream: TcpStream,
    sample: SampleSlot,
    notify: Arc<Notify>,
    pending: Arc<AtomicU32>,
    finished: Arc<AtomicBool>,
) {
    loop {
        let mut peek = [0u8; 1];
        match stream.try_read(&mut peek) {
            Ok(0) => {
                debug!("subscriber disconnected");
                break;
            }
            Ok(_) => {
                // Subscribers are read-only from the server's perspective; any
                // bytes they send are discarded.
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                debug!(error = %e, "subscriber socket error");
                break;
            }
        }

        notify.notified().await;
        if finished.load(Ordering::Relaxed) {
            break;
        }

        let missed = pending.swap(0, Ordering::Relaxed);
        if missed > 1 {
            trace!(missed, "coalesced publishes into the latest sample");
        }

        if let Some(byte) = sample.latest() {
            if let Err(e) = stream.write_all(&[byte]).await {
                debug!(error = %e, "subscriber write failed");
                break;
            }
        }
    }
    finished.store(true, Ordering::Relaxed);
}
