use std::time::Duration;

use {
    anyhow::Context,
    async_trait::async_trait,
    courier_auto_reply::reply::{LabelledPart, Reply, ReplyGenerator, ReplyRequest},
    serde::Deserialize,
    tracing::debug,
};

/// Body returned by the reply endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeneratorResponse {
    Markdown { reply: String },
    Parts { parts: Vec<LabelledPart> },
}

impl From<GeneratorResponse> for Reply {
    fn from(response: GeneratorResponse) -> Self {
        match response {
            GeneratorResponse::Markdown { reply } => Self::Markdown(reply),
            GeneratorResponse::Parts { parts } => Self::Parts(parts),
        }
    }
}

/// Asks an HTTP endpoint for the reply to each coalesced turn.
pub struct HttpReplyGenerator {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpReplyGenerator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building reply endpoint client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ReplyGenerator for HttpReplyGenerator {
    async fn generate(&self, request: &ReplyRequest) -> anyhow::Result<Reply> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .with_context(|| format!("calling reply endpoint {}", self.endpoint))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("reply endpoint returned {status}: {body}");
        }
        let response: GeneratorResponse = resp
            .json()
            .await
            .context("decoding reply endpoint response")?;
        debug!(conversation_id = %request.conversation_id, "reply generated");
        Ok(response.into())
    }
}
