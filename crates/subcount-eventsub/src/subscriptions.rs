//! Subscription bootstrap for a freshly welcomed session.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use subcount_core::EventKind;
use tracing::{info, warn};

use crate::helix::{CreateOutcome, HelixClient};

/// Outcome of bootstrapping every event kind against one session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Kinds now subscribed on the session, including pre-existing ones.
    pub confirmed: BTreeSet<EventKind>,
    /// Kinds that could not be subscribed, with the error text.
    pub failures: Vec<(Option<EventKind>, String)>,
}

impl BootstrapReport {
    /// No kind could be confirmed.
    pub fn is_failed(&self) -> bool {
        self.confirmed.is_empty()
    }

    /// Short description of the failures, for logs and events.
    pub fn failure_summary(&self) -> String {
        self.failures
            .iter()
            .map(|(kind, message)| match kind {
                Some(kind) => format!("{kind}: {message}"),
                None => message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Creates the subscriptions a session needs.
#[async_trait]
pub trait SubscriptionBootstrap: Send + Sync {
    /// Subscribe `session_id` to every event kind. Never fails as a whole;
    /// per-kind errors land in the report.
    async fn bootstrap(&self, session_id: &str) -> BootstrapReport;
}

/// [`SubscriptionBootstrap`] over the provider REST API.
pub struct SubscriptionManager {
    helix: Arc<HelixClient>,
}

impl SubscriptionManager {
    /// Manager issuing calls through `helix`.
    pub fn new(helix: Arc<HelixClient>) -> Self {
        Self { helix }
    }
}

#[async_trait]
impl SubscriptionBootstrap for SubscriptionManager {
    #[tracing::instrument(skip(self))]
    async fn bootstrap(&self, session_id: &str) -> BootstrapReport {
        let mut report = BootstrapReport::default();

        let creds = match self.helix.credentials().await {
            Ok(creds) => creds,
            Err(e) => {
                warn!(error = %e, "no credentials, skipping subscription bootstrap");
                report.failures.push((None, e.to_string()));
                return report;
            }
        };

        for kind in EventKind::ALL {
            match self.helix.create_subscription(&creds, kind, session_id).await {
                Ok(CreateOutcome::Created | CreateOutcome::AlreadyExists) => {
                    let _ = report.confirmed.insert(kind);
                }
                Err(e) => {
                    warn!(subscription_type = %kind, error = %e, "subscription failed");
                    report.failures.push((Some(kind), e.to_string()));
                }
            }
        }

        info!(
            confirmed = report.confirmed.len(),
            failed = report.failures.len(),
            "subscription bootstrap finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use serde_json::json;
    use subcount_core::{Credentials, StaticAuth};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager(server: &MockServer, auth: StaticAuth) -> SubscriptionManager {
        let helix = HelixClient::new(server.uri(), Duration::from_secs(5), Arc::new(auth)).unwrap();
        SubscriptionManager::new(Arc::new(helix))
    }

    fn auth() -> StaticAuth {
        StaticAuth::new(Credentials {
            client_id: "cid".into(),
            access_token: "tok".into(),
            broadcaster_id: "42".into(),
        })
    }

    #[tokio::test]
    async fn all_kinds_confirmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/eventsub/subscriptions"))
            .respond_with(ResponseTemplate::new(202))
            .expect(5)
            .mount(&server)
            .await;

        let report = manager(&server, auth()).bootstrap("s1").await;
        assert_eq!(report.confirmed.len(), 5);
        assert!(report.failures.is_empty());
        assert!(!report.is_failed());
    }

    #[tokio::test]
    async fn conflict_counts_as_confirmed_and_errors_do_not_abort() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"type": "channel.follow"})))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"type": "channel.subscribe"})))
            .respond_with(ResponseTemplate::new(403).set_body_string("missing scope"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let report = manager(&server, auth()).bootstrap("s1").await;
        assert!(report.confirmed.contains(&EventKind::Follow));
        assert!(!report.confirmed.contains(&EventKind::Subscribe));
        assert!(report.confirmed.contains(&EventKind::SubscriptionEnd));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, Some(EventKind::Subscribe));
        assert!(report.failure_summary().contains("missing scope"));
        assert!(!report.is_failed());
    }

    #[tokio::test]
    async fn every_kind_rejected_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let report = manager(&server, auth()).bootstrap("s1").await;
        assert!(report.is_failed());
        assert_eq!(report.failures.len(), 5);
    }

    #[tokio::test]
    async fn missing_credentials_is_failure_without_requests() {
        let server = MockServer::start().await;
        let report = manager(&server, StaticAuth::unconfigured()).bootstrap("s1").await;
        assert!(report.is_failed());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, None);
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
