//! Tests for the Client against a scripted service on an in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use chainwire::ErrorCode;
use chainwire::Multipart;
use chainwire::encode_response;

use crate::Client;
use crate::ClientSettings;
use crate::Error;
use crate::SequenceIds;
use crate::memory::ChannelTransport;
use crate::transport::Transport;
use crate::transport::TransportError;

const LAST_HEIGHT: &[u8] = b"blockchain.fetch_last_height";
const SUBSCRIBE: &[u8] = b"subscribe.address";

/// A client whose ids are always `2`, plus the service end of its transport.
fn client_with_fixed_id(timeout: Option<Duration>) -> (Arc<Client>, ChannelTransport) {
    client_with(SequenceIds::fixed(2), timeout)
}

fn client_with(ids: SequenceIds, timeout: Option<Duration>) -> (Arc<Client>, ChannelTransport) {
    let (client_end, service_end) = ChannelTransport::pair();
    let settings = ClientSettings::new().with_ids(ids);
    let settings = match timeout {
        Some(timeout) => settings.with_timeout(timeout),
        None => settings.without_timeout(),
    };
    (Arc::new(Client::new(client_end, settings)), service_end)
}

/// Next request the client sent.
async fn next_request(service: &ChannelTransport) -> Multipart {
    service.recv().await.expect("transport").expect("client hung up")
}

async fn respond(service: &ChannelTransport, command: &[u8], id: u32, error: Option<ErrorCode>, data: &[u8]) {
    service
        .send(encode_response(command, id, error, data))
        .await
        .expect("client hung up");
}

/// Lets the receive loop drain whatever was sent to it.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_request_is_encoded() {
    let (client, service) = client_with_fixed_id(Some(Duration::from_millis(20)));

    let _ = client.call(LAST_HEIGHT, b"").await.unwrap();

    let request = next_request(&service).await;
    assert_eq!(
        request,
        vec![LAST_HEIGHT.to_vec(), b"\x02\x00\x00\x00".to_vec(), Vec::new()]
    );
}

#[tokio::test]
async fn test_call_delivers_raw_body() {
    let (client, service) = client_with_fixed_id(Some(Duration::from_secs(5)));

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.call(LAST_HEIGHT, b"").await }
    });

    next_request(&service).await;
    service
        .send(vec![
            LAST_HEIGHT.to_vec(),
            b"\x02\x00\x00\x00".to_vec(),
            b"\x00\x00\x00\x00\xe8\x03\x00\x00".to_vec(),
        ])
        .await
        .unwrap();

    let (error, data) = call.await.unwrap().unwrap();
    assert_eq!(error, None);
    assert_eq!(data.unwrap(), b"\xe8\x03\x00\x00");
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_last_height_decodes_body() {
    let (client, service) = client_with_fixed_id(Some(Duration::from_secs(5)));

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.last_height().await }
    });

    next_request(&service).await;
    respond(&service, LAST_HEIGHT, 2, None, &1000u32.to_le_bytes()).await;

    assert_eq!(call.await.unwrap().unwrap(), (None, Some(1000)));
}

#[tokio::test]
async fn test_spend_sends_output_point_and_decodes_input() {
    const SPEND: &[u8] = b"blockchain.fetch_spend";
    let hash = "e400712f48693950b78aef3e298b590cfd4bc9a1a91beb0547fb25bc73d220b9";
    let (client, service) = client_with_fixed_id(Some(Duration::from_secs(5)));

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.spend(hash, 3).await }
    });

    let request = next_request(&service).await;
    assert_eq!(request[0], SPEND);
    assert_eq!(request[2].len(), 36);
    assert_eq!(request[2][0], 0xb9);
    assert_eq!(&request[2][32..], b"\x03\x00\x00\x00");

    let mut input = vec![0x77; 32];
    input.extend_from_slice(&9u32.to_le_bytes());
    respond(&service, SPEND, 2, None, &input).await;

    let (error, point) = call.await.unwrap().unwrap();
    assert_eq!(error, None);
    let point = point.unwrap();
    assert_eq!(point.hash, [0x77; 32]);
    assert_eq!(point.index, 9);
}

#[tokio::test]
async fn test_remote_error_is_a_reply() {
    let (client, service) = client_with_fixed_id(Some(Duration::from_secs(5)));

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.call(b"blockchain.fetch_block_height", &[0u8; 32]).await }
    });

    next_request(&service).await;
    respond(&service, b"blockchain.fetch_block_height", 2, Some(ErrorCode::NotFound), b"").await;

    let (error, data) = call.await.unwrap().unwrap();
    assert_eq!(error, Some(ErrorCode::NotFound));
    assert_eq!(data, Some(Vec::new()));
}

#[tokio::test]
async fn test_timeout_then_late_response_is_dropped() {
    let (client, service) = client_with_fixed_id(Some(Duration::from_millis(20)));

    let started = tokio::time::Instant::now();
    let reply = client.call(LAST_HEIGHT, b"").await.unwrap();
    assert_eq!(reply, (Some(ErrorCode::ChannelTimeout), None));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(client.pending_count(), 0);

    next_request(&service).await;
    respond(&service, LAST_HEIGHT, 2, None, b"late").await;
    settle().await;

    assert!(client.is_running());
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_command_mismatch_is_a_protocol_violation() {
    let (client, service) = client_with_fixed_id(Some(Duration::from_secs(5)));

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.call(LAST_HEIGHT, b"").await }
    });

    next_request(&service).await;
    respond(&service, b"blockchain.fetch_transaction", 2, None, b"x").await;

    assert!(matches!(call.await.unwrap(), Err(Error::ProtocolViolation(_))));
}

#[tokio::test]
async fn test_malformed_frame_does_not_stop_the_loop() {
    let (client, service) = client_with_fixed_id(Some(Duration::from_secs(5)));

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.call(LAST_HEIGHT, b"").await }
    });

    next_request(&service).await;
    service.send(vec![LAST_HEIGHT.to_vec(), b"\x02\x00\x00\x00".to_vec()]).await.unwrap();
    service.send(vec![b"junk".to_vec()]).await.unwrap();
    respond(&service, LAST_HEIGHT, 2, None, b"ok").await;

    let (error, data) = call.await.unwrap().unwrap();
    assert_eq!(error, None);
    assert_eq!(data.unwrap(), b"ok");
}

#[tokio::test]
async fn test_unroutable_response_is_dropped() {
    let (client, service) = client_with_fixed_id(Some(Duration::from_secs(5)));

    respond(&service, LAST_HEIGHT, 99, None, b"nobody asked").await;
    settle().await;

    assert!(client.is_running());
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_subscription_ack_then_pushes() {
    let (client, service) = client_with_fixed_id(Some(Duration::from_secs(5)));

    let subscribe = tokio::spawn({
        let client = client.clone();
        async move { client.subscribe(SUBSCRIBE, &[0xab; 20]).await }
    });

    let request = next_request(&service).await;
    assert_eq!(request[2], vec![0xab; 20]);
    respond(&service, SUBSCRIBE, 2, None, b"").await;

    let (error, subscription) = subscribe.await.unwrap().unwrap();
    assert_eq!(error, None);
    let mut subscription = subscription.expect("acknowledged");
    assert_eq!(subscription.id(), 2);

    respond(&service, SUBSCRIBE, 2, None, b"first").await;
    respond(&service, SUBSCRIBE, 2, None, b"second").await;
    respond(&service, SUBSCRIBE, 2, None, b"third").await;

    assert_eq!(subscription.next().await.unwrap(), b"first");
    assert_eq!(subscription.next().await.unwrap(), b"second");
    assert_eq!(subscription.next().await.unwrap(), b"third");
    assert!(subscription.try_next().is_none());
    assert_eq!(client.pending_count(), 1);
}

#[tokio::test]
async fn test_subscription_rejected() {
    let (client, service) = client_with_fixed_id(Some(Duration::from_secs(5)));

    let subscribe = tokio::spawn({
        let client = client.clone();
        async move { client.subscribe_address(&[1; 20]).await }
    });

    next_request(&service).await;
    respond(&service, SUBSCRIBE, 2, Some(ErrorCode::OperationFailed), b"").await;

    let (error, subscription) = subscribe.await.unwrap().unwrap();
    assert_eq!(error, Some(ErrorCode::OperationFailed));
    assert!(subscription.is_none());
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_subscription_timeout() {
    let (client, _service) = client_with_fixed_id(Some(Duration::from_millis(20)));

    let (error, subscription) = client.subscribe(SUBSCRIBE, b"").await.unwrap();
    assert_eq!(error, Some(ErrorCode::ChannelTimeout));
    assert!(subscription.is_none());
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_unsubscribe_keeps_entry_until_terminal_frame() {
    let (client, service) = client_with(SequenceIds::new([2, 3]), Some(Duration::from_secs(5)));

    let subscribe = tokio::spawn({
        let client = client.clone();
        async move { client.subscribe_address(&[7; 20]).await }
    });
    next_request(&service).await;
    respond(&service, SUBSCRIBE, 2, None, b"").await;
    let mut subscription = subscribe.await.unwrap().unwrap().1.unwrap();

    let unsubscribe = tokio::spawn({
        let client = client.clone();
        async move { client.unsubscribe_address(&[7; 20]).await }
    });
    let request = next_request(&service).await;
    assert_eq!(request[0], b"unsubscribe_address");
    assert_eq!(request[1], 3u32.to_le_bytes());
    respond(&service, b"unsubscribe_address", 3, None, b"").await;
    assert_eq!(unsubscribe.await.unwrap().unwrap(), (None, Some(Vec::new())));

    // the unsubscribe call alone leaves the subscription in place
    assert_eq!(client.pending_count(), 1);

    respond(&service, SUBSCRIBE, 2, Some(ErrorCode::ServiceStopped), b"").await;
    assert!(subscription.next().await.is_none());
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_cancel_subscription_closes_queue() {
    let (client, service) = client_with_fixed_id(Some(Duration::from_secs(5)));

    let subscribe = tokio::spawn({
        let client = client.clone();
        async move { client.subscribe(SUBSCRIBE, b"").await }
    });
    next_request(&service).await;
    respond(&service, SUBSCRIBE, 2, None, b"").await;
    let mut subscription = subscribe.await.unwrap().unwrap().1.unwrap();

    assert!(client.cancel_subscription(subscription.id()));
    assert!(!client.cancel_subscription(subscription.id()));
    assert!(subscription.next().await.is_none());

    respond(&service, SUBSCRIBE, 2, None, b"after cancel").await;
    settle().await;
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_colliding_id_is_redrawn() {
    let (client, service) = client_with(SequenceIds::new([7, 7, 8]), None);

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.call(LAST_HEIGHT, b"").await }
    });
    assert_eq!(next_request(&service).await[1], 7u32.to_le_bytes());

    let second = tokio::spawn({
        let client = client.clone();
        async move { client.call(LAST_HEIGHT, b"").await }
    });
    assert_eq!(next_request(&service).await[1], 8u32.to_le_bytes());

    respond(&service, LAST_HEIGHT, 8, None, b"eight").await;
    respond(&service, LAST_HEIGHT, 7, None, b"seven").await;

    assert_eq!(first.await.unwrap().unwrap().1.unwrap(), b"seven");
    assert_eq!(second.await.unwrap().unwrap().1.unwrap(), b"eight");
}

#[tokio::test]
async fn test_exhausted_id_space() {
    let (client, service) = client_with_fixed_id(None);

    let _first = tokio::spawn({
        let client = client.clone();
        async move { client.call(LAST_HEIGHT, b"").await }
    });
    next_request(&service).await;

    let second = client.call(LAST_HEIGHT, b"").await;
    assert!(matches!(second, Err(Error::IdSpaceExhausted(_))));
    assert_eq!(client.pending_count(), 1);
}

#[tokio::test]
async fn test_stop_reports_abandoned_requests() {
    let (client, service) = client_with(SequenceIds::new([1, 2, 3]), None);

    let calls: Vec<_> = (0..3)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.call(LAST_HEIGHT, b"").await })
        })
        .collect();
    for _ in 0..3 {
        next_request(&service).await;
    }

    assert_eq!(client.stop().await, 3);
    assert!(!client.is_running());
    for call in calls {
        assert!(matches!(call.await.unwrap(), Err(Error::Stopped)));
    }

    // nothing is routed any more
    respond(&service, LAST_HEIGHT, 1, None, b"too late").await;
    settle().await;
    assert_eq!(client.pending_count(), 0);
    assert!(matches!(client.call(LAST_HEIGHT, b"").await, Err(Error::Stopped)));
    assert_eq!(client.stop().await, 0);
}

#[tokio::test]
async fn test_transport_loss_fails_waiters() {
    let (client, service) = client_with_fixed_id(None);

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.call(LAST_HEIGHT, b"").await }
    });
    next_request(&service).await;
    drop(service);

    assert!(matches!(
        call.await.unwrap(),
        Err(Error::Transport(TransportError::Closed))
    ));
    assert!(!client.is_running());
    assert!(matches!(
        client.call(LAST_HEIGHT, b"").await,
        Err(Error::Transport(_))
    ));
}
