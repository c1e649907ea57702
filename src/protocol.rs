//! The AT command engine (§4.1). Owns exclusive access to a [`ByteTransport`] for
//! the lifetime of a request/response exchange, building on the same two
//! primitives as the teacher's `protocol.rs` (`packet_variable_no_payload` /
//! `send_with_payload`): an unconditional prefix wait and a timeout-bounded
//! extension, plus a delimiter-framed bulk parser grounded in
//! `hm11_extrafeatures/main.c`'s probe-then-fetch discovery calls.

use std::io;
use std::time::Duration;

use tracing::{debug, instrument, trace};

use crate::error::ProtocolError;
use crate::transport::ByteTransport;
use crate::types::{EnumerationKind, ResponseDiscipline};

pub use crate::types::{CommandKind, ConnectResult, EchoState, NotifyResult, Role};

type Result<T> = std::result::Result<T, ProtocolError>;

/// The protocol engine. Generic over the transport so tests can swap in
/// [`crate::transport::FakeTransport`].
pub struct Engine<T: ByteTransport> {
    transport: T,
    service_buffer: Option<Vec<u8>>,
    characteristic_buffer: Option<Vec<u8>>,
}

impl<T: ByteTransport> Engine<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            service_buffer: None,
            characteristic_buffer: None,
        }
    }

    /// Hands exclusive access to the transport to the scavenger for one drain
    /// cycle. The engine and the scavenger never run concurrently; the
    /// supervisor's single main loop interleaves them (§3 invariant).
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    // ---- request emission -------------------------------------------------

    #[instrument(level = "debug", skip(self, request), fields(command = ?command))]
    async fn send_request(&mut self, command: CommandKind, request: &[u8]) -> Result<()> {
        let mut sent = 0;
        while sent < request.len() {
            match self.transport.send(&request[sent..]).await {
                Ok(0) => {
                    return Err(ProtocolError::Transport {
                        command,
                        source: io::Error::new(
                            io::ErrorKind::WriteZero,
                            "transport accepted zero bytes",
                        ),
                    })
                }
                Ok(n) => sent += n,
                Err(source) => return Err(ProtocolError::Transport { command, source }),
            }
        }
        trace!(bytes = request.len(), "request sent");
        Ok(())
    }

    // ---- response collection primitives -----------------------------------

    /// Fixed-length blocking: wait indefinitely for exactly `len` bytes.
    async fn recv_fixed(&mut self, command: CommandKind, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len);
        while buf.len() < len {
            let mut byte = [0u8; 1];
            match self.transport.recv_blocking(&mut byte).await {
                Ok(0) => continue,
                Ok(_) => buf.push(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => return Err(ProtocolError::Transport { command, source }),
            }
        }
        Ok(buf)
    }

    async fn recv_one_fixed(&mut self, command: CommandKind) -> Result<u8> {
        Ok(self.recv_fixed(command, 1).await?[0])
    }

    /// Bounded wait: an unconditional (blocking) prefix of `min` bytes,
    /// followed by a per-byte-timeout extension up to `max` bytes. Stops
    /// early the first time a byte times out once `min` has been reached.
    async fn recv_bounded(
        &mut self,
        command: CommandKind,
        min: usize,
        max: usize,
        per_byte_timeout: Duration,
    ) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(max);
        loop {
            if buf.len() >= max {
                break;
            }
            let mut byte = [0u8; 1];
            if buf.len() < min {
                match self.transport.recv_blocking(&mut byte).await {
                    Ok(0) => continue,
                    Ok(_) => buf.push(byte[0]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(source) => return Err(ProtocolError::Transport { command, source }),
                }
            } else {
                match self
                    .transport
                    .recv_with_timeout(&mut byte, per_byte_timeout)
                    .await
                {
                    Ok(0) => break,
                    Ok(_) => buf.push(byte[0]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(source) => return Err(ProtocolError::Transport { command, source }),
                }
            }
        }
        Ok(buf)
    }

    async fn recv_discipline(&mut self, command: CommandKind, discipline: ResponseDiscipline) -> Result<Vec<u8>> {
        match discipline {
            ResponseDiscipline::FixedLenBlocking(n) => self.recv_fixed(command, n).await,
            ResponseDiscipline::BoundedMin {
                min,
                max,
                per_byte_timeout,
            } => self.recv_bounded(command, min, max, per_byte_timeout).await,
            ResponseDiscipline::DelimiterFramed { unit_len } => {
                self.recv_delimiter_framed(command, unit_len).await
            }
        }
    }

    /// A generic exchange: send `request`, collect under `discipline`, hand
    /// the raw window to `classify`.
    async fn exchange<R>(
        &mut self,
        command: CommandKind,
        request: &[u8],
        discipline: ResponseDiscipline,
        classify: impl FnOnce(&[u8]) -> Result<R>,
    ) -> Result<R> {
        self.send_request(command, request).await?;
        let window = self.recv_discipline(command, discipline).await?;
        debug!(command = ?command, observed = window.len(), "response collected");
        classify(&window)
    }

    /// An exchange with no documented classifier in the wire dialect (the
    /// source's stubbed commands — MAC read/write, connect-last, discover,
    /// set-name, sleep): send the request and hand back whatever came back,
    /// unclassified.
    async fn exchange_raw(
        &mut self,
        command: CommandKind,
        request: &[u8],
        discipline: ResponseDiscipline,
    ) -> Result<Vec<u8>> {
        self.send_request(command, request).await?;
        self.recv_discipline(command, discipline).await
    }

    // ---- delimiter-framed parse (§4.1) -------------------------------------

    #[instrument(level = "debug", skip(self), fields(command = ?command, unit_len))]
    async fn recv_delimiter_framed(&mut self, command: CommandKind, unit_len: usize) -> Result<Vec<u8>> {
        // 1. Consume 56 leading bracket bytes unconditionally.
        self.recv_fixed(command, 56).await?;

        let mut out = Vec::with_capacity(unit_len + 1);
        loop {
            let b = self.recv_one_fixed(command).await?;
            if b == b'\r' {
                let _lf = self.recv_one_fixed(command).await?; // expected '\n', discarded
                let next = self.recv_one_fixed(command).await?;
                if next == b'*' {
                    break; // trailing bracket has begun
                }
                out.push(b',');
                out.push(next);
            } else {
                out.push(b);
            }
            if out.capacity() - out.len() < 2 {
                out.reserve(unit_len + 1);
            }
        }

        // 3. Consume the remaining 55 trailing bracket bytes.
        self.recv_fixed(command, 55).await?;

        if out.is_empty() {
            debug!(command = ?command, "delimiter-framed response was empty");
        }
        Ok(out)
    }

    // ---- typed operations (Command Surface, §4.1/§4.2) ---------------------

    pub async fn echo(&mut self) -> Result<EchoState> {
        self.exchange(
            CommandKind::Echo,
            b"AT",
            ResponseDiscipline::BoundedMin {
                min: 2,
                max: 9,
                per_byte_timeout: Duration::from_millis(1000),
            },
            classify_echo,
        )
        .await
    }

    pub async fn connect_mac(&mut self, mac: &str) -> Result<ConnectResult> {
        let request = format!("AT+CON{mac}");
        self.exchange(
            CommandKind::ConnectMac,
            request.as_bytes(),
            ResponseDiscipline::BoundedMin {
                min: 9,
                max: 10,
                per_byte_timeout: Duration::from_millis(1000),
            },
            |w| classify_connect(CommandKind::ConnectMac, w),
        )
        .await
    }

    pub async fn connect_last(&mut self) -> Result<ConnectResult> {
        self.exchange(
            CommandKind::ConnectLast,
            b"AT+CONNL",
            ResponseDiscipline::BoundedMin {
                min: 9,
                max: 10,
                per_byte_timeout: Duration::from_millis(1000),
            },
            |w| classify_connect(CommandKind::ConnectLast, w),
        )
        .await
    }

    pub async fn passive(&mut self) -> Result<()> {
        self.exchange(
            CommandKind::Passive,
            b"AT+IMME1",
            ResponseDiscipline::FixedLenBlocking(8),
            |window| {
                if window == b"OK+Set:1" {
                    Ok(())
                } else {
                    Err(mismatch(CommandKind::Passive, window))
                }
            },
        )
        .await
    }

    pub async fn reset(&mut self) -> Result<()> {
        self.exchange(
            CommandKind::Reset,
            b"AT+RESET",
            ResponseDiscipline::FixedLenBlocking(8),
            |window| {
                if window == b"OK+RESET" {
                    Ok(())
                } else {
                    Err(mismatch(CommandKind::Reset, window))
                }
            },
        )
        .await
    }

    pub async fn set_role(&mut self, role: Role) -> Result<()> {
        let request = format!("AT+ROLE{}", role.digit() as char);
        let expected = [b'O', b'K', b'+', b'S', b'e', b't', b':', role.digit()];
        self.exchange(
            CommandKind::SetRole,
            request.as_bytes(),
            ResponseDiscipline::FixedLenBlocking(8),
            move |window| {
                if window == expected {
                    Ok(())
                } else {
                    Err(mismatch(CommandKind::SetRole, window))
                }
            },
        )
        .await
    }

    pub async fn notify_on(&mut self, characteristic: &str) -> Result<NotifyResult> {
        let request = format!("AT+NOTIFY_ON{characteristic}");
        self.exchange(
            CommandKind::NotifyOn,
            request.as_bytes(),
            ResponseDiscipline::FixedLenBlocking(12),
            |window| classify_notify(CommandKind::NotifyOn, window),
        )
        .await
    }

    pub async fn notify_off(&mut self, characteristic: &str) -> Result<NotifyResult> {
        let request = format!("AT+NOTIFYOFF{characteristic}");
        self.exchange(
            CommandKind::NotifyOff,
            request.as_bytes(),
            ResponseDiscipline::FixedLenBlocking(12),
            |window| classify_notify(CommandKind::NotifyOff, window),
        )
        .await
    }

    pub async fn mac_read(&mut self) -> Result<Vec<u8>> {
        self.exchange_raw(
            CommandKind::MacRead,
            b"AT+ADDR?",
            ResponseDiscipline::FixedLenBlocking(12),
        )
        .await
    }

    pub async fn mac_write(&mut self, mac: &str) -> Result<Vec<u8>> {
        let request = format!("AT+ADDR{mac}");
        self.exchange_raw(
            CommandKind::MacWrite,
            request.as_bytes(),
            ResponseDiscipline::BoundedMin {
                min: 0,
                max: 32,
                per_byte_timeout: Duration::from_millis(1000),
            },
        )
        .await
    }

    pub async fn discover(&mut self) -> Result<Vec<u8>> {
        self.exchange_raw(
            CommandKind::Discover,
            b"AT+DISC?",
            ResponseDiscipline::BoundedMin {
                min: 0,
                max: 1200,
                per_byte_timeout: Duration::from_millis(1000),
            },
        )
        .await
    }

    pub async fn set_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let request = format!("AT+NAME{name}");
        self.exchange_raw(
            CommandKind::SetName,
            request.as_bytes(),
            ResponseDiscipline::BoundedMin {
                min: 0,
                max: 32,
                per_byte_timeout: Duration::from_millis(1000),
            },
        )
        .await
    }

    pub async fn sleep_module(&mut self) -> Result<Vec<u8>> {
        self.exchange_raw(
            CommandKind::Sleep,
            b"AT+SLEEP",
            ResponseDiscipline::BoundedMin {
                min: 0,
                max: 16,
                per_byte_timeout: Duration::from_millis(1000),
            },
        )
        .await
    }

    // ---- enumeration probe/fetch (§4.1) ------------------------------------

    pub async fn service_probe(&mut self) -> Result<usize> {
        self.send_request(CommandKind::ServiceProbe, b"AT+FINDSERVICES?")
            .await?;
        let data = self
            .recv_delimiter_framed(CommandKind::ServiceProbe, EnumerationKind::Service.unit_len())
            .await?;
        let len = data.len();
        self.service_buffer = Some(data);
        Ok(len + 1)
    }

    pub fn service_fetch(&mut self, buffer_len: usize) -> Result<Vec<u8>> {
        fetch(CommandKind::ServiceFetch, &mut self.service_buffer, buffer_len)
    }

    pub async fn characteristic_probe(&mut self) -> Result<usize> {
        self.send_request(CommandKind::CharacteristicProbe, b"AT+FINDALLCHARS?")
            .await?;
        let data = self
            .recv_delimiter_framed(
                CommandKind::CharacteristicProbe,
                EnumerationKind::Characteristic.unit_len(),
            )
            .await?;
        let len = data.len();
        self.characteristic_buffer = Some(data);
        Ok(len + 1)
    }

    pub fn characteristic_fetch(&mut self, buffer_len: usize) -> Result<Vec<u8>> {
        fetch(
            CommandKind::CharacteristicFetch,
            &mut self.characteristic_buffer,
            buffer_len,
        )
    }
}

fn fetch(command: CommandKind, slot: &mut Option<Vec<u8>>, buffer_len: usize) -> Result<Vec<u8>> {
    let data = slot
        .take()
        .ok_or(ProtocolError::InvalidState("fetch with no pending probe"))?;
    if buffer_len != data.len() + 1 {
        let observed = data.len();
        *slot = Some(data);
        return Err(ProtocolError::Mismatch {
            command,
            observed,
            window: Vec::new(),
        });
    }
    Ok(data)
}

fn mismatch(command: CommandKind, window: &[u8]) -> ProtocolError {
    ProtocolError::Mismatch {
        command,
        observed: window.len(),
        window: window.to_vec(),
    }
}

fn classify_echo(window: &[u8]) -> Result<EchoState> {
    match window.len() {
        2 if window == b"OK" => Ok(EchoState::Idle),
        9 if window.starts_with(b"OK+LOST") => Ok(EchoState::PeerLost),
        9 if window.starts_with(b"OK+WAKE") => Ok(EchoState::WokenFromSleep),
        _ => Err(mismatch(CommandKind::Echo, window)),
    }
}

fn classify_connect(command: CommandKind, window: &[u8]) -> Result<ConnectResult> {
    match window.len() {
        9 if window.starts_with(b"OK+CONN") => Ok(ConnectResult::Connected),
        10 if window.starts_with(b"OK+CONNA") => Ok(ConnectResult::Connected),
        10 if window.starts_with(b"OK+CONNE") || window.starts_with(b"OK+CONNF") => {
            Ok(ConnectResult::NoSuchDevice)
        }
        _ => Err(mismatch(command, window)),
    }
}

fn classify_notify(command: CommandKind, window: &[u8]) -> Result<NotifyResult> {
    if window.len() < 10 {
        return Err(mismatch(command, window));
    }
    match &window[..10] {
        b"OK+SEND-OK" | b"OK+DATA-OK" => Ok(NotifyResult::Subscribed),
        b"OK+SEND-ER" | b"OK+DATA-ER" => Ok(NotifyResult::NoSuchDevice),
        _ => Err(mismatch(command, window)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FakeTransport;

    fn engine_with(bytes: &[u8]) -> Engine<FakeTransport> {
        Engine::new(FakeTransport::with_inbound(bytes))
    }

    #[tokio::test]
    async fn echo_idle() {
        let mut engine = engine_with(b"OK");
        assert_eq!(engine.echo().await.unwrap(), EchoState::Idle);
    }

    #[tokio::test]
    async fn echo_peer_lost() {
        let mut engine = engine_with(b"OK+LOST!!");
        assert_eq!(engine.echo().await.unwrap(), EchoState::PeerLost);
    }

    #[tokio::test]
    async fn echo_woken_from_sleep() {
        let mut engine = engine_with(b"OK+WAKE!!");
        assert_eq!(engine.echo().await.unwrap(), EchoState::WokenFromSleep);
    }

    #[tokio::test]
    async fn echo_garbage_is_mismatch() {
        let mut engine = engine_with(b"XX");
        assert!(matches!(
            engine.echo().await,
            Err(ProtocolError::Mismatch { .. })
        ));
    }

    #[tokio::test]
    async fn connect_short_form_is_connected() {
        let mut engine = engine_with(b"OK+CONN??");
        assert_eq!(
            engine.connect_mac("0C8CDC32BDEC").await.unwrap(),
            ConnectResult::Connected
        );
        assert_eq!(engine.transport_mut().sent, b"AT+CON0C8CDC32BDEC".to_vec());
    }

    #[tokio::test]
    async fn connect_failure_is_no_such_device() {
        let mut engine = engine_with(b"OK+CONNE??");
        assert_eq!(
            engine.connect_mac("0C8CDC32BDEC").await.unwrap(),
            ConnectResult::NoSuchDevice
        );
    }

    #[tokio::test]
    async fn reset_ok() {
        let mut engine = engine_with(b"OK+RESET");
        engine.reset().await.unwrap();
    }

    #[tokio::test]
    async fn set_role_controller() {
        let mut engine = engine_with(b"OK+Set:1");
        engine.set_role(Role::Controller).await.unwrap();
    }

    #[tokio::test]
    async fn notify_on_success() {
        let mut engine = engine_with(b"OK+SEND-OK??");
        assert_eq!(
            engine.notify_on("0026").await.unwrap(),
            NotifyResult::Subscribed
        );
    }

    #[tokio::test]
    async fn notify_off_no_such_device() {
        let mut engine = engine_with(b"OK+SEND-ER??");
        assert_eq!(
            engine.notify_off("0026").await.unwrap(),
            NotifyResult::NoSuchDevice
        );
    }

    #[tokio::test]
    async fn service_enumeration_probe_then_fetch() {
        let mut bytes = vec![b'*'; 56];
        bytes.extend_from_slice(b"0001");
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(b"0002");
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(&vec![b'*'; 56]);
        let mut engine = engine_with(&bytes);

        let probe_len = engine.service_probe().await.unwrap();
        assert_eq!(probe_len, b"0001,0002".len() + 1);

        let fetched = engine.service_fetch(probe_len).unwrap();
        assert_eq!(fetched, b"0001,0002");
    }

    #[tokio::test]
    async fn fetch_without_probe_is_invalid_state() {
        let mut engine = engine_with(b"");
        assert!(matches!(
            engine.service_fetch(1),
            Err(ProtocolError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn recv_retries_past_interrupted() {
        let mut engine = engine_with(b"OK");
        engine.transport_mut().interrupt_next_recv();
        assert_eq!(engine.echo().await.unwrap(), EchoState::Idle);
    }
}
