//! The notification scavenger (§5). Drains whatever the module has buffered
//! since the last cycle, scans backward for the notification sentinel, and
//! publishes the byte that follows it into the shared [`SampleSlot`]. Runs on
//! the same main loop that drives the protocol engine — the two never touch
//! the transport concurrently (§3 invariant), so this takes `&mut T` directly
//! rather than going through `Engine`.

use std::io;

use tracing::{debug, trace};

use crate::config;
use crate::sample::SampleSlot;
use crate::transport::ByteTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScavengeOutcome {
    /// Nothing arrived before the first per-byte timeout.
    Empty,
    /// Bytes arrived but none of them were the sentinel.
    NoSentinel,
    /// A sentinel was found and the following byte was published.
    Published(u8),
}

/// One bounded drain cycle: up to [`config::SCAVENGE_WINDOW`] bytes, each
/// bounded by [`config::PER_BYTE_TIMEOUT`], stopping at the first timeout.
pub async fn scavenge_once<T: ByteTransport + ?Sized>(
    transport: &mut T,
    sample: &SampleSlot,
) -> io::Result<ScavengeOutcome> {
    let mut buf = Vec::with_capacity(config::SCAVENGE_WINDOW);
    loop {
        if buf.len() >= config::SCAVENGE_WINDOW {
            break;
        }
        let mut byte = [0u8; 1];
        match transport
            .recv_with_timeout(&mut byte, config::PER_BYTE_TIMEOUT)
            .await
        {
            Ok(0) => break,
            Ok(_) => buf.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    if buf.is_empty() {
        trace!("scavenge cycle drained nothing");
        return Ok(ScavengeOutcome::Empty);
    }

    for i in (0..buf.len()).rev() {
        if buf[i] == config::NOTIFICATION_SENTINEL && i + 1 < buf.len() {
            let value = buf[i + 1];
            sample.publish(value);
            debug!(value, "notification scavenged");
            return Ok(ScavengeOutcome::Published(value));
        }
    }

    trace!(bytes = buf.len(), "scavenge cycle found no sentinel");
    Ok(ScavengeOutcome::NoSentinel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FakeTransport;

    #[tokio::test]
    async fn empty_stream_is_empty() {
        let mut transport = FakeTransport::new();
        let sample = SampleSlot::new();
        assert_eq!(
            scavenge_once(&mut transport, &sample).await.unwrap(),
            ScavengeOutcome::Empty
        );
        assert_eq!(sample.latest(), None);
    }

    #[tokio::test]
    async fn sentinel_publishes_following_byte() {
        let mut transport = FakeTransport::with_inbound(&[0x01, 0x02, config::NOTIFICATION_SENTINEL, 72]);
        let sample = SampleSlot::new();
        assert_eq!(
            scavenge_once(&mut transport, &sample).await.unwrap(),
            ScavengeOutcome::Published(72)
        );
        assert_eq!(sample.latest(), Some(72));
    }

    #[tokio::test]
    async fn trailing_sentinel_with_no_following_byte_is_no_sentinel() {
        let mut transport = FakeTransport::with_inbound(&[0x01, config::NOTIFICATION_SENTINEL]);
        let sample = SampleSlot::new();
        assert_eq!(
            scavenge_once(&mut transport, &sample).await.unwrap(),
            ScavengeOutcome::NoSentinel
        );
        assert_eq!(sample.latest(), None);
    }

    #[tokio::test]
    async fn picks_the_last_sentinel_in_the_window() {
        let mut transport = FakeTransport::with_inbound(&[
            config::NOTIFICATION_SENTINEL,
            11,
            0xff,
            config::NOTIFICATION_SENTINEL,
            22,
        ]);
        let sample = SampleSlot::new();
        assert_eq!(
            scavenge_once(&mut transport, &sample).await.unwrap(),
            ScavengeOutcome::Published(22)
        );
    }

    #[tokio::test]
    async fn no_sentinel_present() {
        let mut transport = FakeTransport::with_inbound(&[1, 2, 3]);
        let sample = SampleSlot::new();
        assert_eq!(
            scavenge_once(&mut transport, &sample).await.unwrap(),
            ScavengeOutcome::NoSentinel
        );
    }
}
