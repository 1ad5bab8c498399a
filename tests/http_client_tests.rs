//! HTTP client tests against a mocked HAP instance

use hap_assistant_bridge::client::{
    CharacteristicWrite, HapClient, HttpHapClient, PushMessage, WriteRequest,
};
use hap_assistant_bridge::config::{HapConfig, StaticInstance};
use hap_assistant_bridge::BridgeError;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const PIN: &str = "031-45-154";

struct MockInstance {
    server: MockServer,
    client: HttpHapClient,
}

fn hap_config(instances: Vec<StaticInstance>) -> HapConfig {
    HapConfig {
        pin: PIN.to_string(),
        instances,
        mdns: false,
        browse_timeout: Duration::from_millis(10),
        request_timeout: Duration::from_secs(2),
    }
}

impl MockInstance {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let address = *server.address();
        let config = hap_config(vec![
            StaticInstance {
                host: address.ip().to_string(),
                port: address.port(),
                username: "AA:BB:CC:DD:EE:01".to_string(),
            },
            // Nothing listens on port 1
            StaticInstance {
                host: "127.0.0.1".to_string(),
                port: 1,
                username: "AA:BB:CC:DD:EE:02".to_string(),
            },
        ]);
        let (events, _rx) = mpsc::channel(8);
        let client = HttpHapClient::new(&config, events).unwrap();
        Self { server, client }
    }

    fn host(&self) -> String {
        self.server.address().ip().to_string()
    }

    fn port(&self) -> u16 {
        self.server.address().port()
    }
}

fn on_write(value: bool) -> WriteRequest {
    WriteRequest::new(vec![CharacteristicWrite::value(2, 9, value)])
}

#[tokio::test]
async fn test_list_instances_sends_pin_and_skips_unreachable() {
    let instance = MockInstance::start().await;
    let accessories = json!({"accessories": [{"aid": 1, "services": []}]});
    Mock::given(method("GET"))
        .and(path("/accessories"))
        .and(header("authorization", PIN))
        .respond_with(ResponseTemplate::new(200).set_body_json(accessories.clone()))
        .expect(1)
        .mount(&instance.server)
        .await;

    let instances = instance.client.list_instances().await.unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].username, "AA:BB:CC:DD:EE:01");
    assert_eq!(instances[0].port, instance.port());
    assert_eq!(instances[0].accessories, accessories);
}

#[tokio::test]
async fn test_control_accepts_no_content() {
    let instance = MockInstance::start().await;
    Mock::given(method("PUT"))
        .and(path("/characteristics"))
        .and(body_json(json!({"characteristics": [{"aid": 2, "iid": 9, "value": true}]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&instance.server)
        .await;

    instance
        .client
        .control(&instance.host(), instance.port(), &on_write(true))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_control_checks_multi_status_entries() {
    let instance = MockInstance::start().await;
    Mock::given(method("PUT"))
        .and(path("/characteristics"))
        .respond_with(ResponseTemplate::new(207).set_body_json(json!({
            "characteristics": [{"aid": 2, "iid": 9, "status": -70402}]
        })))
        .mount(&instance.server)
        .await;

    let result = instance
        .client
        .control(&instance.host(), instance.port(), &on_write(false))
        .await;
    assert!(matches!(result, Err(BridgeError::Transport(_))));
}

#[tokio::test]
async fn test_ping_failure_entry_is_reachable() {
    let instance = MockInstance::start().await;
    Mock::given(method("PUT"))
        .and(path("/characteristics"))
        .and(body_json(json!({"characteristics": [{"aid": -1, "iid": -1}]})))
        .respond_with(ResponseTemplate::new(207).set_body_json(json!({
            "characteristics": [{"aid": -1, "iid": -1, "status": -70409}]
        })))
        .mount(&instance.server)
        .await;

    instance
        .client
        .control(&instance.host(), instance.port(), &WriteRequest::ping())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_pin_is_reported() {
    let instance = MockInstance::start().await;
    Mock::given(method("PUT"))
        .and(path("/characteristics"))
        .respond_with(ResponseTemplate::new(470))
        .mount(&instance.server)
        .await;

    let error = instance
        .client
        .control(&instance.host(), instance.port(), &on_write(true))
        .await
        .unwrap_err();
    assert!(error.to_string().contains("rejected the pin"));
}

#[tokio::test]
async fn test_status_reads_requested_pairs() {
    let instance = MockInstance::start().await;
    Mock::given(method("GET"))
        .and(path("/characteristics"))
        .and(query_param("id", "2.9,2.10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "characteristics": [
                {"aid": 2, "iid": 9, "value": true},
                {"aid": 2, "iid": 10, "value": 55}
            ]
        })))
        .expect(1)
        .mount(&instance.server)
        .await;

    let statuses = instance
        .client
        .status(&instance.host(), instance.port(), &[(2, 9), (2, 10)])
        .await
        .unwrap();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].value, json!(true));
    assert_eq!(statuses[1].value, json!(55));

    let none = instance
        .client
        .status(&instance.host(), instance.port(), &[])
        .await
        .unwrap();
    assert!(none.is_empty());
}

/// Accept one event registration, answer it, then hang up
async fn accept_and_close(listener: TcpListener) {
    let (socket, _) = listener.accept().await.unwrap();
    let mut reader = BufReader::new(socket);
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = value.trim().parse().unwrap();
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await.unwrap();

    let mut socket = reader.into_inner();
    socket.write_all(b"HTTP/1.1 204 No Content\r\n\r\n").await.unwrap();
    socket.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_event_connection_close_is_signalled() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(accept_and_close(listener));

    let (events, mut rx) = mpsc::channel(8);
    let client = HttpHapClient::new(&hap_config(Vec::new()), events).unwrap();
    let request = WriteRequest::new(vec![CharacteristicWrite::subscribe(2, 9)]);
    client.subscribe("127.0.0.1", port, &request).await.unwrap();
    server.await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(
        message,
        Some(PushMessage::Closed {
            host: "127.0.0.1".to_string(),
            port,
        })
    );
}
