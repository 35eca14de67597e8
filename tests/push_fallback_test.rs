//! Fallback to plain HTTP when the dashboard never accepts the WebSocket
//! upgrade: the downgrade happens once, on the first attempt, and sticks.

use meterflux::encode::FieldValue;
use meterflux::{Client, ClientConfig, ClientError, PushConfig, RecordOp};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn push_client(port: u16) -> Client {
    Client::new(ClientConfig::push(
        PushConfig {
            host: "127.0.0.1".into(),
            port,
            token: "tok".into(),
            push_id: "meters".into(),
            verify_tls: true,
        },
        100,
    ))
    .unwrap()
}

fn meter_record() -> Vec<RecordOp<'static>> {
    vec![
        RecordOp::Measurement("Meter1"),
        RecordOp::Field {
            key: "Power",
            value: FieldValue::Float { value: 120.5, precision: 2 },
        },
        RecordOp::Timestamp(1_700_000_000_000_000_000),
    ]
}

#[tokio::test]
async fn failed_upgrade_downgrades_once_and_posts_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/live/push/meters"))
        .and(header("authorization", "Bearer tok"))
        .and(header("content-type", "text/plain; charset=utf-8"))
        .and(body_string_contains("Meter1 Power=120.50"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    // The mock server answers the upgrade request like any other HTTP
    // request, so the handshake fails and the transport downgrades.
    let mut client = push_client(server.address().port());
    client.post(&meter_record()).await.unwrap();
    assert!(client.is_downgraded());
    assert_eq!(client.queued(), 0);

    // Later sends go straight to HTTP without retrying the upgrade.
    client.post(&meter_record()).await.unwrap();
    assert!(client.is_downgraded());

    let upgrades = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "GET")
        .count();
    assert_eq!(upgrades, 1);
}

#[tokio::test]
async fn keepalive_on_downgraded_channel_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = push_client(server.address().port());
    client.post(&meter_record()).await.unwrap();
    assert!(client.is_downgraded());

    // No persistent connection means nothing to keep alive.
    client.keepalive().await.unwrap();
}

#[tokio::test]
async fn rejected_http_post_is_queued() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut client = push_client(server.address().port());
    let err = client.post(&meter_record()).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected { status: 503 }));
    assert!(client.is_downgraded());
    assert_eq!(client.queued(), 1);
}
