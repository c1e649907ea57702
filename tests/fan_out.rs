//! Exercises the acceptor/broadcaster/session machinery over real loopback
//! TCP sockets — no UART involved, the sample slot is published to directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use hm11_bridge::acceptor;
use hm11_bridge::broadcaster::Broadcaster;
use hm11_bridge::sample::SampleSlot;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn fan_out_reaches_every_subscriber_and_drops_the_slow_one() {
    let listener = acceptor::bind_on(0).await.expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();

    let sample = SampleSlot::new();
    let broadcaster = Broadcaster::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let acceptor_task = tokio::spawn(acceptor::run(
        listener,
        sample.clone(),
        broadcaster.clone(),
        shutdown.clone(),
    ));

    let mut a = TcpStream::connect(addr).await.unwrap();
    let mut b = TcpStream::connect(addr).await.unwrap();
    let mut c = TcpStream::connect(addr).await.unwrap();
    settle().await;
    assert_eq!(broadcaster.session_count().await, 3);

    sample.publish(0x5A);
    broadcaster.publish().await;

    let mut buf = [0u8; 1];
    a.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf[0], 0x5A);
    b.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf[0], 0x5A);
    c.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf[0], 0x5A);

    // c disconnects; a and b must still get every subsequent publish.
    drop(c);
    settle().await;

    sample.publish(0x5B);
    broadcaster.publish().await;

    a.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf[0], 0x5B);
    b.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf[0], 0x5B);

    settle().await;
    broadcaster.reap_finished().await;
    assert_eq!(
        broadcaster.session_count().await,
        2,
        "the disconnected session should have been reaped"
    );

    shutdown.store(true, Ordering::Relaxed);
    let _ = acceptor_task.await;
}

#[tokio::test]
async fn publish_never_waits_on_a_silent_subscriber() {
    let listener = acceptor::bind_on(0).await.expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();

    let sample = SampleSlot::new();
    let broadcaster = Broadcaster::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let acceptor_task = tokio::spawn(acceptor::run(
        listener,
        sample.clone(),
        broadcaster.clone(),
        shutdown.clone(),
    ));

    // Connect but never read — a subscriber that just sits there must not
    // block the fan-out.
    let _silent = TcpStream::connect(addr).await.unwrap();
    let mut reader = TcpStream::connect(addr).await.unwrap();
    settle().await;

    // Three publishes land before the reader's session ever gets scheduled:
    // `Notify::notify_one` only ever stores one outstanding permit, so a
    // subscriber that was never woken in between collapses them into a
    // single wakeup and observes only the most recent sample (§8
    // drop-on-slow-consumer). None of the publishes themselves block on it.
    for value in [1u8, 2, 3] {
        sample.publish(value);
        let published = tokio::time::timeout(Duration::from_secs(1), broadcaster.publish());
        published.await.expect("publish must not block on a silent subscriber");
    }

    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf[0], 3, "a consumer woken once should see only the latest sample");

    // And the slot doesn't keep buffering: nothing further arrives until the
    // next publish.
    let drained = tokio::time::timeout(Duration::from_millis(100), reader.read(&mut buf)).await;
    assert!(drained.is_err(), "no further bytes should be queued up");

    shutdown.store(true, Ordering::Relaxed);
    let _ = acceptor_task.await;
}
