//! The Byte Transport (§2): the only I/O surface the protocol engine and the
//! scavenger touch. `SerialTransport` backs it with the real UART; `FakeTransport`
//! backs it with an in-memory byte queue so the engine, classifiers, and parser can
//! be exercised without hardware — mirroring how the teacher's `BleConnection`
//! (`ble.rs`) wraps a single notification channel behind `send`/`recv`/`drain`.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;

use crate::config;

#[async_trait]
pub trait ByteTransport: Send {
    /// Writes `buf`, returning the number of bytes actually written (may be a
    /// short write; callers advance and retry).
    async fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Waits indefinitely for at least one byte, writing into `buf` and
    /// returning the number read. `io::ErrorKind::Interrupted` must be retried
    /// by the caller.
    async fn recv_blocking(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Waits up to `timeout` for at least one byte. Returns `Ok(0)` on timeout
    /// (not an error) so callers can distinguish "nothing arrived in time"
    /// from a transport failure.
    async fn recv_with_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    async fn flush(&mut self) -> io::Result<()>;
}

/// The real UART transport, backed by `tokio-serial`.
pub struct SerialTransport {
    port: tokio_serial::SerialStream,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32) -> anyhow::Result<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .timeout(config::PER_BYTE_TIMEOUT)
            .open_native_async()?;
        Ok(Self { port })
    }
}

#[async_trait]
impl ByteTransport for SerialTransport {
    async fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf).await
    }

    async fn recv_blocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf).await
    }

    async fn recv_with_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        match tokio::time::timeout(timeout, self.port.read(buf)).await {
            Ok(result) => result,
            Err(_elapsed) => Ok(0),
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(&mut self.port).await
    }
}

/// An in-memory transport used by unit and end-to-end tests. Bytes queued with
/// [`FakeTransport::push_inbound`] are immediately readable; bytes sent by the
/// engine accumulate in [`FakeTransport::sent`] for assertion.
///
/// [`FakeTransport::queue_response`] models a real device that only speaks
/// when spoken to: a queued response chunk stays invisible to `recv_*` until
/// the next `send()` call "arms" it. Without this, a multi-command sequence
/// sharing one transport would let a bounded-wait read past the end of one
/// command's response straight into the next one's, since nothing otherwise
/// distinguishes "the device fell silent" from "the device paused".
#[derive(Default)]
pub struct FakeTransport {
    armed: VecDeque<u8>,
    queued: VecDeque<VecDeque<u8>>,
    pub sent: Vec<u8>,
    interrupt_once: bool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inbound(bytes: &[u8]) -> Self {
        let mut t = Self::new();
        t.push_inbound(bytes);
        t
    }

    /// Makes `bytes` immediately readable.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.armed.extend(bytes.iter().copied());
    }

    /// Queues `bytes` to become readable only after the next `send()` call.
    pub fn queue_response(&mut self, bytes: &[u8]) {
        self.queued.push_back(bytes.iter().copied().collect());
    }

    /// Arranges for the next `recv_blocking`/`recv_with_timeout` call to fail
    /// with `Interrupted`, exercising the retry-on-signal contract.
    pub fn interrupt_next_recv(&mut self) {
        self.interrupt_once = true;
    }
}

#[async_trait]
impl ByteTransport for FakeTransport {
    async fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sent.extend_from_slice(buf);
        if let Some(next) = self.queued.pop_front() {
            self.armed.extend(next);
        }
        Ok(buf.len())
    }

    async fn recv_blocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.interrupt_once {
            self.interrupt_once = false;
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }
        if self.armed.is_empty() {
            // A well-formed test always supplies enough bytes for a primitive
            // documented to block indefinitely; reaching this means the test
            // scenario under-fed the transport.
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "fake transport starved on a blocking receive",
            ));
        }
        let n = buf.len().min(self.armed.len()).max(1);
        for slot in buf.iter_mut().take(n) {
            *slot = self.armed.pop_front().unwrap();
        }
        Ok(n)
    }

    async fn recv_with_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        if self.interrupt_once {
            self.interrupt_once = false;
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }
        if self.armed.is_empty() {
            return Ok(0);
        }
        let n = buf.len().min(self.armed.len()).max(1);
        for slot in buf.iter_mut().take(n) {
            *slot = self.armed.pop_front().unwrap();
        }
        Ok(n)
    }

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
