use std::time::Duration;

use {
    async_trait::async_trait,
    courier_channels::{ChannelOutbound, Error, Presence, Result},
    courier_common::types::MediaKind,
    courier_config::ChannelConfig,
    secrecy::{ExposeSecret, Secret},
    serde_json::{Value, json},
    tracing::debug,
};

/// Outbound sender for a Send API account.
pub struct SendApiOutbound {
    http: reqwest::Client,
    messages_url: String,
    sender_id: String,
    access_token: Secret<String>,
}

impl SendApiOutbound {
    pub fn new(config: &ChannelConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(Error::invalid_input("channel base_url is not configured"));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::external("building Send API client", e))?;
        Ok(Self {
            http,
            messages_url: format!("{}/messages", config.base_url.trim_end_matches('/')),
            sender_id: config.sender_id.clone(),
            access_token: config.access_token.clone(),
        })
    }

    /// Post `{sender, recipient, <field>: value}` to the messages endpoint.
    async fn post(&self, to: &str, field: &str, value: Value) -> Result<()> {
        let mut payload = json!({
            "sender": { "id": self.sender_id },
            "recipient": { "id": to },
        });
        if let Some(obj) = payload.as_object_mut() {
            obj.insert(field.to_string(), value);
        }
        let resp = self
            .http
            .post(&self.messages_url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::external(format!("Send API request to {to}"), e))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::status(status, body));
        }
        debug!(to, field, "Send API request accepted");
        Ok(())
    }
}

fn sender_action(presence: Presence) -> &'static str {
    match presence {
        Presence::Composing => "typing_on",
        Presence::Idle => "typing_off",
    }
}

#[async_trait]
impl ChannelOutbound for SendApiOutbound {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::invalid_input("refusing to send empty text"));
        }
        self.post(to, "message", json!({ "text": text })).await
    }

    async fn send_media(&self, to: &str, kind: MediaKind, url: &str) -> Result<()> {
        let attachment = json!({
            "attachment": {
                "type": kind.as_str(),
                "payload": { "url": url },
            }
        });
        self.post(to, "message", attachment).await
    }

    async fn send_presence(&self, to: &str, presence: Presence) -> Result<()> {
        self.post(to, "sender_action", json!(sender_action(presence)))
            .await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{
            Json, Router,
            extract::State,
            http::{HeaderMap, StatusCode},
            routing::post,
        },
        std::sync::{Arc, Mutex},
        tokio::sync::oneshot,
    };

    #[derive(Debug, Clone)]
    struct Captured {
        authorization: Option<String>,
        body: Value,
    }

    #[derive(Clone, Default)]
    struct MockSendApi {
        requests: Arc<Mutex<Vec<Captured>>>,
        /// Status returned for every request; 200 when unset.
        status: Option<StatusCode>,
    }

    async fn messages_handler(
        State(mock): State<MockSendApi>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, String) {
        mock.requests.lock().unwrap().push(Captured {
            authorization: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body,
        });
        match mock.status {
            Some(status) => (status, "rejected by mock".into()),
            None => (StatusCode::OK, r#"{"message_id": "m-1"}"#.into()),
        }
    }

    struct MockServer {
        base_url: String,
        shutdown: oneshot::Sender<()>,
    }

    async fn spawn_mock(mock: MockSendApi) -> MockServer {
        let app = Router::new()
            .route("/v1/messages", post(messages_handler))
            .with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock send api");
        });
        MockServer {
            base_url: format!("http://{addr}/v1/"),
            shutdown,
        }
    }

    fn outbound(base_url: &str) -> SendApiOutbound {
        SendApiOutbound::new(&ChannelConfig {
            base_url: base_url.into(),
            access_token: Secret::new("test-token".into()),
            sender_id: "page-1".into(),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn text_media_and_presence_payloads() {
        let mock = MockSendApi::default();
        let requests = Arc::clone(&mock.requests);
        let server = spawn_mock(mock).await;
        let outbound = outbound(&server.base_url);

        outbound.send_text("psid-1", "hello").await.unwrap();
        outbound
            .send_media("psid-1", MediaKind::Image, "https://h/a.png")
            .await
            .unwrap();
        outbound
            .send_presence("psid-1", Presence::Composing)
            .await
            .unwrap();
        let _ = server.shutdown.send(());

        let requests = requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 3);
        assert!(
            requests
                .iter()
                .all(|r| r.authorization.as_deref() == Some("Bearer test-token"))
        );
        assert_eq!(
            requests[0].body,
            json!({
                "sender": { "id": "page-1" },
                "recipient": { "id": "psid-1" },
                "message": { "text": "hello" },
            })
        );
        assert_eq!(
            requests[1].body["message"]["attachment"],
            json!({ "type": "image", "payload": { "url": "https://h/a.png" } })
        );
        assert_eq!(requests[2].body["sender_action"], "typing_on");
    }

    #[rstest::rstest]
    #[case(StatusCode::BAD_REQUEST, false)]
    #[case(StatusCode::TOO_MANY_REQUESTS, true)]
    #[case(StatusCode::BAD_GATEWAY, true)]
    #[tokio::test]
    async fn error_status_is_classified(#[case] status: StatusCode, #[case] transient: bool) {
        let server = spawn_mock(MockSendApi {
            status: Some(status),
            ..Default::default()
        })
        .await;
        let err = outbound(&server.base_url)
            .send_text("psid-1", "hello")
            .await
            .unwrap_err();
        let _ = server.shutdown.send(());

        match &err {
            Error::Status { status: code, body } => {
                assert_eq!(*code, status.as_u16());
                assert_eq!(body, "rejected by mock");
            },
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.is_transient(), transient);
    }

    #[tokio::test]
    async fn unreachable_host_is_transient() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = outbound(&format!("http://{addr}"))
            .send_text("psid-1", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::External { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn empty_text_is_rejected_locally() {
        let err = outbound("http://127.0.0.1:9")
            .send_text("psid-1", "   ")
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn missing_base_url_is_rejected() {
        assert!(SendApiOutbound::new(&ChannelConfig::default()).is_err());
    }
}
