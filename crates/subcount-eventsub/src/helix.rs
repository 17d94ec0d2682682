//! Provider REST client: subscription creation and total counts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use subcount_core::{
    AuthError, AuthProvider, CountSource, CounterKind, Credentials, EventKind, ReconcileError,
    SubscriptionError,
};
use tracing::debug;

/// Result of a successful subscription-creation call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateOutcome {
    /// The provider created the subscription.
    Created,
    /// The subscription already existed (HTTP 409).
    AlreadyExists,
}

#[derive(Deserialize)]
struct TotalResponse {
    total: u64,
}

/// Client for the provider's REST API.
pub struct HelixClient {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HelixClient {
    /// Client rooted at `base_url` (no trailing slash) with a per-request
    /// timeout.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth,
        })
    }

    /// Current credentials from the auth collaborator.
    pub async fn credentials(&self) -> Result<Credentials, AuthError> {
        self.auth.bearer().await
    }

    /// Subscribe `session_id` to `kind`.
    #[tracing::instrument(skip_all, fields(subscription_type = kind.subscription_type()))]
    pub async fn create_subscription(
        &self,
        creds: &Credentials,
        kind: EventKind,
        session_id: &str,
    ) -> Result<CreateOutcome, SubscriptionError> {
        let body = subscription_body(kind, &creds.broadcaster_id, session_id);
        let resp = self
            .http
            .post(format!("{}/eventsub/subscriptions", self.base_url))
            .bearer_auth(&creds.access_token)
            .header("Client-Id", &creds.client_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| SubscriptionError::Transport {
                subscription_type: kind.subscription_type().to_owned(),
                message: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        match status {
            200..=299 => Ok(CreateOutcome::Created),
            409 => {
                debug!("subscription already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            401 => Err(AuthError::Unauthorized.into()),
            _ => Err(SubscriptionError::Rejected {
                subscription_type: kind.subscription_type().to_owned(),
                status,
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Fetch the provider's total for `kind`.
    #[tracing::instrument(skip_all, fields(%kind))]
    pub async fn fetch_count(
        &self,
        creds: &Credentials,
        kind: CounterKind,
    ) -> Result<u64, ReconcileError> {
        let path = match kind {
            CounterKind::Follow => "channels/followers",
            CounterKind::Sub => "subscriptions",
        };
        let resp = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .query(&[("broadcaster_id", creds.broadcaster_id.as_str())])
            .bearer_auth(&creds.access_token)
            .header("Client-Id", &creds.client_id)
            .send()
            .await
            .map_err(|e| ReconcileError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        if status == 401 {
            return Err(AuthError::Unauthorized.into());
        }
        if !(200..300).contains(&status) {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReconcileError::Status { status, body });
        }
        let data: TotalResponse = resp
            .json()
            .await
            .map_err(|e| ReconcileError::Decode(e.to_string()))?;
        Ok(data.total)
    }
}

#[async_trait]
impl CountSource for HelixClient {
    async fn fetch_total(&self, kind: CounterKind) -> Result<u64, ReconcileError> {
        let creds = self.credentials().await?;
        self.fetch_count(&creds, kind).await
    }
}

/// Request body for one subscription type.
pub fn subscription_body(kind: EventKind, broadcaster_id: &str, session_id: &str) -> Value {
    let condition = match kind {
        EventKind::Follow => json!({
            "broadcaster_user_id": broadcaster_id,
            "moderator_user_id": broadcaster_id,
        }),
        _ => json!({ "broadcaster_user_id": broadcaster_id }),
    };
    json!({
        "type": kind.subscription_type(),
        "version": kind.version(),
        "condition": condition,
        "transport": {
            "method": "websocket",
            "session_id": session_id,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use subcount_core::StaticAuth;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds() -> Credentials {
        Credentials {
            client_id: "cid".into(),
            access_token: "tok".into(),
            broadcaster_id: "42".into(),
        }
    }

    fn client(server: &MockServer) -> HelixClient {
        HelixClient::new(
            server.uri(),
            Duration::from_secs(5),
            Arc::new(StaticAuth::new(creds())),
        )
        .unwrap()
    }

    #[test]
    fn follow_body_has_moderator_condition() {
        let body = subscription_body(EventKind::Follow, "42", "sess");
        assert_eq!(body["type"], "channel.follow");
        assert_eq!(body["version"], "2");
        assert_eq!(body["condition"]["moderator_user_id"], "42");
        assert_eq!(body["transport"]["method"], "websocket");
        assert_eq!(body["transport"]["session_id"], "sess");
    }

    #[test]
    fn other_bodies_have_broadcaster_only() {
        let body = subscription_body(EventKind::SubscriptionGift, "42", "sess");
        assert_eq!(body["version"], "1");
        assert!(body["condition"].get("moderator_user_id").is_none());
    }

    #[tokio::test]
    async fn create_sends_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/eventsub/subscriptions"))
            .and(header("Authorization", "Bearer tok"))
            .and(header("Client-Id", "cid"))
            .and(body_partial_json(json!({"type": "channel.subscribe", "transport": {"session_id": "s1"}})))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client(&server)
            .create_subscription(&creds(), EventKind::Subscribe, "s1")
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Created);
    }

    #[tokio::test]
    async fn conflict_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("subscription already exists"))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .create_subscription(&creds(), EventKind::Follow, "s1")
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn other_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad condition"))
            .mount(&server)
            .await;

        let result = client(&server)
            .create_subscription(&creds(), EventKind::SubscriptionEnd, "s1")
            .await;
        assert_matches!(
            result,
            Err(SubscriptionError::Rejected { status: 400, body, subscription_type })
                if body == "bad condition" && subscription_type == "channel.subscription.end"
        );
    }

    #[tokio::test]
    async fn unauthorized_create_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = client(&server)
            .create_subscription(&creds(), EventKind::Follow, "s1")
            .await;
        assert_matches!(result, Err(SubscriptionError::Auth(AuthError::Unauthorized)));
    }

    #[tokio::test]
    async fn fetch_follow_total() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/followers"))
            .and(query_param("broadcaster_id", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 120, "data": []})))
            .mount(&server)
            .await;

        assert_eq!(client(&server).fetch_total(CounterKind::Follow).await.unwrap(), 120);
    }

    #[tokio::test]
    async fn fetch_sub_total() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 7, "points": 9})))
            .mount(&server)
            .await;

        assert_eq!(client(&server).fetch_total(CounterKind::Sub).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn fetch_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/followers"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let helix = client(&server);
        assert_matches!(
            helix.fetch_total(CounterKind::Follow).await,
            Err(ReconcileError::Status { status: 500, .. })
        );
        assert_matches!(
            helix.fetch_total(CounterKind::Sub).await,
            Err(ReconcileError::Decode(_))
        );
    }

    #[tokio::test]
    async fn fetch_without_credentials_fails_before_request() {
        let server = MockServer::start().await;
        let helix = HelixClient::new(
            server.uri(),
            Duration::from_secs(5),
            Arc::new(StaticAuth::unconfigured()),
        )
        .unwrap();
        assert_matches!(
            helix.fetch_total(CounterKind::Follow).await,
            Err(ReconcileError::Auth(AuthError::MissingToken))
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
