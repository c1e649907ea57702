//! Startup, the main loop, and shutdown (§3/§5/§6): wires the command
//! surface, scavenger, acceptor, and reaper together the way the original
//! heart-rate monitor's `main()` sequences device setup, a poll loop, and
//! teardown, but expressed as one async task plus two spawned background
//! tasks instead of a blocking `while` loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::acceptor;
use crate::broadcaster::Broadcaster;
use crate::commands::Commands;
use crate::config;
use crate::protocol::{ConnectResult, Engine, NotifyResult, Role};
use crate::reaper;
use crate::sample::SampleSlot;
use crate::scavenger::{self, ScavengeOutcome};
use crate::transport::ByteTransport;

pub async fn run<T: ByteTransport + 'static>(transport: T) -> Result<()> {
    let sample = SampleSlot::new();
    let mut commands = Commands::new(Engine::new(transport), sample.clone());

    startup(&mut commands).await.context("startup sequence failed")?;

    let listener = acceptor::bind().await.context("binding TCP listener")?;
    let broadcaster = Broadcaster::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let acceptor_task = tokio::spawn(acceptor::run(
        listener,
        sample.clone(),
        broadcaster.clone(),
        shutdown.clone(),
    ));
    let reaper_task = tokio::spawn(reaper::run(broadcaster.clone(), shutdown.clone()));

    let mut scavenge_interval = tokio::time::interval(config::SCAVENGE_INTERVAL);
    let mut signal = ShutdownSignal::new()?;

    loop {
        tokio::select! {
            _ = scavenge_interval.tick() => {
                match scavenger::scavenge_once(commands.transport_mut(), &sample).await {
                    Ok(ScavengeOutcome::Published(byte)) => {
                        tracing::trace!(byte, "publishing fresh notification");
                        broadcaster.publish().await;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "scavenge cycle failed"),
                }
            }
            _ = signal.wait() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    if let Err(e) = acceptor_task.await {
        warn!(error = %e, "acceptor task panicked");
    }
    broadcaster.drain().await;
    if let Err(e) = reaper_task.await {
        warn!(error = %e, "reaper task panicked");
    }

    shutdown_sequence(&mut commands).await;
    Ok(())
}

async fn startup<T: ByteTransport>(commands: &mut Commands<T>) -> Result<()> {
    commands.echo().await.context("initial echo failed")?;
    commands.reset().await.context("reset failed")?;
    commands
        .set_role(Role::Controller)
        .await
        .context("setting controller role failed")?;
    commands.passive().await.context("entering passive mode failed")?;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let connect = commands
        .connect_mac(config::HEART_RATE_MAC)
        .await
        .context("connect failed")?;
    if connect != ConnectResult::Connected {
        bail!("failed to connect to {}: {:?}", config::HEART_RATE_MAC, connect);
    }

    let subscribed = commands
        .notify_on(config::HEART_RATE_CHARACTERISTIC)
        .await
        .context("subscribing to notifications failed")?;
    if subscribed != NotifyResult::Subscribed {
        bail!(
            "failed to subscribe to characteristic {}: no such device",
            config::HEART_RATE_CHARACTERISTIC
        );
    }
    info!("startup sequence complete");
    Ok(())
}

async fn shutdown_sequence<T: ByteTransport>(commands: &mut Commands<T>) {
    if let Err(e) = commands.notify_off(config::HEART_RATE_CHARACTERISTIC).await {
        warn!(error = %e, "failed to unsubscribe during shutdown");
    }
    if let Err(e) = commands.echo().await {
        warn!(error = %e, "final echo failed during shutdown");
    }
    info!("shutdown complete");
}

/// Unifies `Ctrl-C` and, on unix, `SIGTERM` behind one awaitable signal.
struct ShutdownSignal {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn wait(&mut self) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = self.sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    async fn wait(&mut self) {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleSlot;
    use crate::transport::FakeTransport;

    #[tokio::test(start_paused = true)]
    async fn startup_sends_the_expected_command_sequence() {
        let mut transport = FakeTransport::new();
        transport.queue_response(b"OK"); // echo
        transport.queue_response(b"OK+RESET"); // reset
        transport.queue_response(b"OK+Set:1"); // set role controller
        transport.queue_response(b"OK+Set:1"); // passive
        transport.queue_response(b"OK+CONN??"); // connect
        transport.queue_response(b"OK+SEND-OK??"); // notify on

        let mut commands = Commands::new(Engine::new(transport), SampleSlot::new());

        startup(&mut commands).await.unwrap();

        let sent = String::from_utf8(commands.transport_mut().sent.clone()).unwrap();
        assert_eq!(
            sent,
            format!(
                "ATAT+RESETAT+ROLE1AT+IMME1AT+CON{}AT+NOTIFY_ON{}",
                config::HEART_RATE_MAC,
                config::HEART_RATE_CHARACTERISTIC
            )
        );
    }

    #[tokio::test]
    async fn startup_fails_when_the_device_cannot_connect() {
        let mut transport = FakeTransport::new();
        transport.queue_response(b"OK");
        transport.queue_response(b"OK+RESET");
        transport.queue_response(b"OK+Set:1");
        transport.queue_response(b"OK+Set:1");
        transport.queue_response(b"OK+CONNE??");

        let mut commands = Commands::new(Engine::new(transport), SampleSlot::new());

        tokio::time::pause();
        let result = startup(&mut commands).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn shutdown_unsubscribes_and_echoes_even_if_one_step_fails() {
        // No bytes queued: both calls fail, but shutdown_sequence must not panic.
        let mut commands = Commands::new(
            Engine::new(FakeTransport::new()),
            SampleSlot::new(),
        );
        shutdown_sequence(&mut commands).await;
    }
}
