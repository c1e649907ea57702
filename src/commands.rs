//! The Command Surface (§4.2): a thin, typed binding over the protocol engine
//! plus the one operation that never touches the wire — reading the latest
//! scavenged notification out of the shared [`SampleSlot`].

use crate::error::ProtocolError;
use crate::protocol::{ConnectResult, EchoState, Engine, NotifyResult, Role};
use crate::sample::SampleSlot;
use crate::transport::ByteTransport;

type Result<T> = std::result::Result<T, ProtocolError>;

pub struct Commands<T: ByteTransport> {
    engine: Engine<T>,
    sample: SampleSlot,
}

impl<T: ByteTransport> Commands<T> {
    pub fn new(engine: Engine<T>, sample: SampleSlot) -> Self {
        Self { engine, sample }
    }

    pub fn engine_mut(&mut self) -> &mut Engine<T> {
        &mut self.engine
    }

    pub fn into_engine(self) -> Engine<T> {
        self.engine
    }

    /// Exposes the underlying transport for the scavenger, which bypasses the
    /// command surface entirely (it never sends a request).
    pub fn transport_mut(&mut self) -> &mut T {
        self.engine.transport_mut()
    }

    pub fn sample(&self) -> SampleSlot {
        self.sample.clone()
    }

    pub async fn echo(&mut self) -> Result<EchoState> {
        self.engine.echo().await
    }

    pub async fn mac_read(&mut self) -> Result<Vec<u8>> {
        self.engine.mac_read().await
    }

    pub async fn mac_write(&mut self, mac: &str) -> Result<Vec<u8>> {
        self.engine.mac_write(mac).await
    }

    pub async fn connect_last(&mut self) -> Result<ConnectResult> {
        self.engine.connect_last().await
    }

    pub async fn connect_mac(&mut self, mac: &str) -> Result<ConnectResult> {
        self.engine.connect_mac(mac).await
    }

    pub async fn discover(&mut self) -> Result<Vec<u8>> {
        self.engine.discover().await
    }

    pub async fn find_services(&mut self) -> Result<Vec<u8>> {
        let len = self.engine.service_probe().await?;
        self.engine.service_fetch(len)
    }

    pub async fn find_all_characteristics(&mut self) -> Result<Vec<u8>> {
        let len = self.engine.characteristic_probe().await?;
        self.engine.characteristic_fetch(len)
    }

    pub async fn notify_on(&mut self, characteristic: &str) -> Result<NotifyResult> {
        self.engine.notify_on(characteristic).await
    }

    pub async fn notify_off(&mut self, characteristic: &str) -> Result<NotifyResult> {
        self.engine.notify_off(characteristic).await
    }

    pub async fn passive(&mut self) -> Result<()> {
        self.engine.passive().await
    }

    pub async fn set_name(&mut self, name: &str) -> Result<Vec<u8>> {
        self.engine.set_name(name).await
    }

    pub async fn reset(&mut self) -> Result<()> {
        self.engine.reset().await
    }

    pub async fn set_role(&mut self, role: Role) -> Result<()> {
        self.engine.set_role(role).await
    }

    pub async fn sleep_module(&mut self) -> Result<Vec<u8>> {
        self.engine.sleep_module().await
    }

    /// Reads the last notification byte the scavenger observed, without
    /// touching the transport. Returns `None` if nothing has ever arrived.
    pub fn read_latest_notified(&self) -> Option<u8> {
        self.sample.latest()
    }
}
