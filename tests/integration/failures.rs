use ringcast_core::Message;

use crate::*;

/// An unreachable peer fails the round and keeps its cursor.
#[tokio::test]
async fn test_unreachable_peer_keeps_cursor() -> Result<()> {
    // bound then dropped: nothing listens there any more
    let gone = bind("2000").await?;
    let gone_addr = gone.addr;
    drop(gone);

    let a = start(bind("1000").await?, &[(id("2000"), gone_addr)]);
    let m1 = Message::new(a.id(), id("2000"), 1_700_000_000, "lost?");
    a.handle.state().outgoing.append(m1).await;

    let round = a.handle.flood_now().await;
    assert_eq!(round.peers, 1);
    assert_eq!(round.failed, 1);
    assert_eq!(round.sent, 0);
    assert_eq!(a.handle.state().cursors.get(&id("2000")), 0);
    // no connection, no session records
    assert!(a.audit.sessions().is_empty());

    a.handle.shutdown().await;
    Ok(())
}

/// A peer that accepts but never acks times out; once it starts serving,
/// the next round delivers and nothing is stored twice.
#[tokio::test]
async fn test_stalled_peer_recovers() -> Result<()> {
    let b_pending = bind("2000").await?;
    let b_addr = b_pending.addr;
    let a_pending = bind("1000").await?;
    let a_addr = a_pending.addr;

    let a = start(a_pending, &[(id("2000"), b_addr)]);
    let m1 = Message::new(a.id(), id("2000"), 1_700_000_000, "eventually");
    a.handle.state().outgoing.append(m1.clone()).await;

    // B's port is bound but nobody reads it: the ack never comes
    let round = a.handle.flood_now().await;
    assert_eq!(round.failed, 1);
    assert_eq!(a.handle.state().cursors.get(&id("2000")), 0);

    let b = start(b_pending, &[(id("1000"), a_addr)]);
    let round = a.handle.flood_now().await;
    assert_eq!(round.succeeded, 1);
    assert_eq!(a.handle.state().cursors.get(&id("2000")), 1);

    // the stale connection from the failed round may also have delivered
    // m1; either way B holds it once
    let expected = vec![m1];
    eventually("B to hold m1", || async {
        b.handle.state().inbox.snapshot().await == expected
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(b.handle.state().inbox.len().await, 1);

    shutdown_all(vec![a, b]).await;
    Ok(())
}

/// Short frames are acked and dropped; a frame that is merely not text is
/// stored verbatim like any other.
#[tokio::test]
async fn test_short_frames_dropped_binary_frames_kept() -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let nodes = start_cluster(&[("1000", &["2000"]), ("2000", &["1000"])]).await?;
    let b = &nodes[1];
    let addr = b.handle.local_addr().expect("B is listening");

    let mut stream = tokio::net::TcpStream::connect(addr).await?;
    let mut ack = [0u8; 2];
    for frame in [&b"nonsense\0"[..], &b"1000_2000_1580000000_caf\xe9\0"[..]] {
        stream.write_all(frame).await?;
        stream.read_exact(&mut ack).await?;
        assert_eq!(ack, [0x06, 0x00]);
    }
    drop(stream);

    let stored = b.handle.state().inbox.snapshot().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].payload(), &b"caf\xe9"[..]);
    assert!(b.handle.state().outgoing.is_empty().await);

    // still serving real traffic
    let a = &nodes[0];
    let m1 = a.handle.generate_now().await.expect("A has a peer");
    eventually("B to receive m1", || async {
        b.handle.state().inbox.contains(&m1).await
    })
    .await?;

    shutdown_all(nodes).await;
    Ok(())
}

/// An unterminated oversize frame ends that session only; the node keeps
/// accepting.
#[tokio::test]
async fn test_oversize_frame_aborts_only_its_session() -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let nodes = start_cluster(&[("1000", &["2000"]), ("2000", &["1000"])]).await?;
    let (a, b) = (&nodes[0], &nodes[1]);
    let addr = b.handle.local_addr().expect("B is listening");

    let mut stream = tokio::net::TcpStream::connect(addr).await?;
    stream.write_all(&[b'x'; 400]).await?;
    // B hangs up without acking
    let mut rest = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut rest)).await;
    assert!(matches!(closed, Ok(Ok(0)) | Ok(Err(_))), "session not aborted");
    assert!(b.handle.state().inbox.is_empty().await);

    let m1 = a.handle.generate_now().await.expect("A has a peer");
    let expected = vec![m1];
    eventually("B to receive m1", || async {
        b.handle.state().inbox.snapshot().await == expected
    })
    .await?;

    shutdown_all(nodes).await;
    Ok(())
}
