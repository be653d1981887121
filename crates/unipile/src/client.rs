use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use leadflow_core::config::UnipileConfig;
use leadflow_core::payload;

use crate::receipt::SendReceipt;

const API_KEY_HEADER: &str = "X-API-KEY";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("no send endpoint accepted the message: {0}")]
    AllEndpointsRejected(String),
}

/// Seam between the sync services and the external messaging gateway.
/// Production code talks to [`UnipileClient`]; tests substitute fakes.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_chat_message(
        &self,
        account_id: &str,
        chat_id: &str,
        text: &str,
    ) -> Result<SendReceipt, GatewayError>;

    /// Resolves an attendee's display profile. `None` means the gateway
    /// does not know the attendee; callers treat that as a soft miss.
    async fn fetch_attendee(
        &self,
        account_id: &str,
        attendee_id: &str,
    ) -> Result<Option<AttendeeProfile>, GatewayError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttendeeProfile {
    pub name: Option<String>,
    pub profile_url: Option<String>,
}

impl AttendeeProfile {
    pub fn from_response(body: &Value) -> Self {
        Self {
            name: payload::string_at(body, &["name", "display_name", "attendee.name"]),
            profile_url: payload::string_at(
                body,
                &["profile_url", "public_profile_url", "attendee.profile_url", "profile.url"],
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.profile_url.is_none()
    }
}

pub struct UnipileClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl UnipileClient {
    pub fn from_config(config: &UnipileConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, url);
        if let Some(api_key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, api_key.expose_secret());
        }
        builder
    }
}

/// Ordered send endpoints. The chat-scoped route is the current API; the
/// flat route is kept for gateway deployments that predate it. The first
/// 2xx response wins.
fn send_endpoints(base_url: &str, chat_id: &str) -> Vec<String> {
    let chat_id = urlencoding::encode(chat_id);
    vec![
        format!("{base_url}/api/v1/chats/{chat_id}/messages"),
        format!("{base_url}/api/v1/messages"),
    ]
}

#[async_trait]
impl MessagingGateway for UnipileClient {
    async fn send_chat_message(
        &self,
        account_id: &str,
        chat_id: &str,
        text: &str,
    ) -> Result<SendReceipt, GatewayError> {
        let body = json!({
            "account_id": account_id,
            "chat_id": chat_id,
            "text": text,
        });

        let mut rejections = Vec::new();
        for url in send_endpoints(&self.base_url, chat_id) {
            let response = match self
                .request(reqwest::Method::POST, &url)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(error) => {
                    warn!(event_name = "unipile.send.transport_error", url, error = %error);
                    rejections.push(format!("POST {url}: {error}"));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                debug!(event_name = "unipile.send.accepted", url, status = status.as_u16());
                let body = response.json::<Value>().await.unwrap_or(Value::Null);
                return Ok(SendReceipt::from_response(&body));
            }

            let detail = response.text().await.unwrap_or_default();
            warn!(
                event_name = "unipile.send.rejected",
                url,
                status = status.as_u16(),
                detail = detail.as_str(),
            );
            rejections.push(format!("POST {url}: {status}"));
        }

        Err(GatewayError::AllEndpointsRejected(rejections.join("; ")))
    }

    async fn fetch_attendee(
        &self,
        account_id: &str,
        attendee_id: &str,
    ) -> Result<Option<AttendeeProfile>, GatewayError> {
        let url = format!(
            "{}/api/v1/chat_attendees/{}?account_id={}",
            self.base_url,
            urlencoding::encode(attendee_id),
            urlencoding::encode(account_id),
        );

        let response = self.request(reqwest::Method::GET, &url).send().await?;
        let status = response.status();
        if !status.is_success() {
            if status != reqwest::StatusCode::NOT_FOUND {
                warn!(event_name = "unipile.attendee.lookup_failed", url, status = status.as_u16());
            }
            return Ok(None);
        }

        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        let profile = AttendeeProfile::from_response(&body);
        Ok(if profile.is_empty() { None } else { Some(profile) })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{send_endpoints, AttendeeProfile};

    #[test]
    fn send_endpoints_try_the_chat_scoped_route_first() {
        let endpoints = send_endpoints("https://gw.example", "chat-1");
        assert_eq!(
            endpoints,
            vec![
                "https://gw.example/api/v1/chats/chat-1/messages".to_string(),
                "https://gw.example/api/v1/messages".to_string(),
            ],
        );
    }

    #[test]
    fn chat_ids_are_path_encoded() {
        let endpoints = send_endpoints("https://gw.example", "chat/with spaces");
        assert_eq!(
            endpoints[0],
            "https://gw.example/api/v1/chats/chat%2Fwith%20spaces/messages",
        );
    }

    #[test]
    fn attendee_profile_reads_candidate_fields() {
        let profile = AttendeeProfile::from_response(&json!({
            "display_name": "Jane Doe",
            "profile": {"url": "https://linkedin.com/in/jane"},
        }));
        assert_eq!(profile.name.as_deref(), Some("Jane Doe"));
        assert_eq!(profile.profile_url.as_deref(), Some("https://linkedin.com/in/jane"));
        assert!(!profile.is_empty());

        assert!(AttendeeProfile::from_response(&json!({})).is_empty());
    }
}
