use ringcast_core::Message;
use ringcast_services::{SessionPhase, SessionRole};

use crate::*;

/// A generated message reaches the receiver's inbox, the cursor moves past
/// it, and a second round sends nothing.
#[tokio::test]
async fn test_message_reaches_receiver_once() -> Result<()> {
    let nodes = start_cluster(&[("1000", &["2000"]), ("2000", &["1000"])]).await?;
    let (a, b) = (&nodes[0], &nodes[1]);

    let m1 = a.handle.generate_now().await.expect("A has a peer to address");
    assert_eq!(m1.receiver(), b.id());
    let expected = vec![m1.clone()];

    // the driver picks up the trigger raised by generation
    eventually("B to receive m1", || async {
        b.handle.state().inbox.snapshot().await == expected
    })
    .await?;
    eventually("A's cursor for B to reach 1", || async {
        a.handle.state().cursors.get(&b.id()) == 1
    })
    .await?;

    let round = a.handle.flood_now().await;
    assert_eq!(round.succeeded, 1);
    assert_eq!(round.sent, 0);
    assert_eq!(a.handle.state().cursors.get(&b.id()), 1);

    // delivered to B, not forwarded by it
    assert_eq!(b.handle.state().inbox.snapshot().await, vec![m1.clone()]);
    assert!(b.handle.state().outgoing.is_empty().await);
    assert_eq!(b.audit.inbox(), vec![(1, m1)]);

    shutdown_all(nodes).await;
    Ok(())
}

/// A message forwarded through B comes back to A as a duplicate and is not
/// stored again, while C gets it in its inbox.
#[tokio::test]
async fn test_forwarded_message_is_deduplicated() -> Result<()> {
    let nodes = start_cluster(&[
        ("1000", &["2000"]),
        ("2000", &["1000", "3000"]),
        ("3000", &["2000"]),
    ])
    .await?;
    let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);

    let m1 = Message::new(a.id(), c.id(), 1_700_000_000, "via B");
    assert!(!a.handle.state().outgoing.append(m1.clone()).await.is_duplicate());
    a.handle.trigger_flood();

    let expected = vec![m1.clone()];
    eventually("C to receive m1", || async {
        c.handle.state().inbox.snapshot().await == expected
    })
    .await?;
    eventually("B to push m1 back to A", || async {
        b.handle.state().cursors.get(&a.id()) == 1
    })
    .await?;

    // A saw m1 again from B and dropped it as a duplicate
    assert_eq!(a.handle.state().outgoing.len().await, 1);
    assert!(a.handle.state().inbox.is_empty().await);
    assert_eq!(b.handle.state().outgoing.snapshot().await, vec![m1.clone()]);
    assert!(b.handle.state().inbox.is_empty().await);
    assert_eq!(b.handle.state().cursors.get(&c.id()), 1);

    // C keeps it for itself only
    assert!(c.handle.state().outgoing.is_empty().await);
    assert_eq!(c.audit.inbox(), vec![(1, m1)]);

    shutdown_all(nodes).await;
    Ok(())
}

/// Several messages to the same peer arrive in append order.
#[tokio::test]
async fn test_messages_arrive_in_order() -> Result<()> {
    let nodes = start_cluster(&[("1000", &["2000"]), ("2000", &["1000"])]).await?;
    let (a, b) = (&nodes[0], &nodes[1]);

    let sent: Vec<Message> = (0..5)
        .map(|n| Message::new(a.id(), b.id(), 1_700_000_000 + n, "burst"))
        .collect();
    for msg in &sent {
        a.handle.state().outgoing.append(msg.clone()).await;
    }

    let round = a.handle.flood_now().await;
    assert_eq!(round.sent, 5);
    assert_eq!(a.handle.state().cursors.get(&b.id()), 5);
    eventually("B to store all five", || async {
        b.handle.state().inbox.snapshot().await == sent
    })
    .await?;

    shutdown_all(nodes).await;
    Ok(())
}

/// Both ends of a session leave start and end records.
#[tokio::test]
async fn test_sessions_are_audited() -> Result<()> {
    let nodes = start_cluster(&[("1000", &["2000"]), ("2000", &["1000"])]).await?;
    let (a, b) = (&nodes[0], &nodes[1]);

    a.handle.flood_now().await;

    let outbound: Vec<_> = a
        .audit
        .sessions()
        .into_iter()
        .filter(|(role, _, _)| *role == SessionRole::Outbound)
        .map(|(_, phase, addr)| (phase, addr))
        .collect();
    let b_addr = b.handle.local_addr().expect("B is listening");
    assert_eq!(
        outbound,
        vec![(SessionPhase::Start, b_addr), (SessionPhase::End, b_addr)]
    );

    eventually("B to record the inbound session end", || async {
        b.audit
            .sessions()
            .iter()
            .any(|(role, phase, _)| *role == SessionRole::Inbound && *phase == SessionPhase::End)
    })
    .await?;

    shutdown_all(nodes).await;
    Ok(())
}
