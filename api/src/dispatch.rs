use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use database::notification::{NewNotification, Notification};
use database::subscription::Subscription;

use crate::payload::{self, NotificationAction};
use crate::transport::{DeliveryError, PushTarget, PushTransport};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Structurally invalid input, rejected before any side effect.
    #[error("notification {0} must not be blank")]
    BlankField(&'static str),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("failed to encode push payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Per-target result of one dispatch call. Transient: aggregated into the
/// report and never persisted.
#[derive(Clone, Debug, Serialize)]
pub struct DeliveryOutcome {
    pub endpoint: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub notification: Notification,
    pub outcomes: Vec<DeliveryOutcome>,
    pub total_sent: usize,
    pub total_failed: usize,
}

/// The dispatch engine: resolves the target set, delivers the encoded
/// payload to every target concurrently, retires subscriptions the push
/// service reports gone, and aggregates the per-endpoint outcomes.
#[derive(Clone)]
pub struct Dispatcher {
    pool: SqlitePool,
    transport: Arc<dyn PushTransport>,
}

impl Dispatcher {
    pub fn new(pool: SqlitePool, transport: Arc<dyn PushTransport>) -> Self {
        Self { pool, transport }
    }

    /// Broadcasts to every subscription active when the call starts.
    pub async fn send_to_all(
        &self,
        new: NewNotification,
        actions: Vec<NotificationAction>,
    ) -> Result<DispatchReport, DispatchError> {
        self.dispatch(new, actions, None).await
    }

    /// Sends to a single endpoint. An unknown or inactive endpoint is not an
    /// error: the report simply carries zero outcomes.
    pub async fn send_to_one(
        &self,
        endpoint: &str,
        new: NewNotification,
        actions: Vec<NotificationAction>,
    ) -> Result<DispatchReport, DispatchError> {
        self.dispatch(new, actions, Some(endpoint)).await
    }

    async fn dispatch(
        &self,
        new: NewNotification,
        actions: Vec<NotificationAction>,
        endpoint: Option<&str>,
    ) -> Result<DispatchReport, DispatchError> {
        if new.title.trim().is_empty() {
            return Err(DispatchError::BlankField("title"));
        }
        if new.body.trim().is_empty() {
            return Err(DispatchError::BlankField("body"));
        }

        let notification = Notification::create(&self.pool, &new).await?;

        // Snapshot of the target set; subscriptions registered after this
        // point are not part of this dispatch.
        let targets = match endpoint {
            Some(endpoint) => Subscription::find_active_by_endpoint(&self.pool, endpoint)
                .await?
                .into_iter()
                .collect(),
            None => Subscription::list_active(&self.pool).await?,
        };

        let outcomes = if targets.is_empty() {
            Vec::new()
        } else {
            let body = payload::encode(&notification, &actions)?;
            join_all(targets.iter().map(|sub| self.deliver_one(sub, &body))).await
        };

        // The join point: every delivery has been attempted, so the record
        // flips to sent exactly once. A zero-target dispatch still counts as
        // a completed dispatch.
        let sent_at = Utc::now();
        Notification::mark_sent(&self.pool, notification.id, sent_at).await?;
        let notification = Notification {
            sent: true,
            sent_at: Some(sent_at),
            ..notification
        };

        let total_sent = outcomes.iter().filter(|o| o.success).count();
        let total_failed = outcomes.len() - total_sent;
        info!(
            notification = notification.id,
            total_sent, total_failed, "dispatch finished"
        );

        Ok(DispatchReport {
            notification,
            outcomes,
            total_sent,
            total_failed,
        })
    }

    async fn deliver_one(&self, subscription: &Subscription, body: &[u8]) -> DeliveryOutcome {
        let target = PushTarget::from(subscription);

        match self.transport.deliver(&target, body).await {
            Ok(()) => DeliveryOutcome {
                endpoint: target.endpoint,
                success: true,
                error: None,
            },
            Err(err) => {
                match &err {
                    DeliveryError::EndpointGone(_) => {
                        // Prune the dead endpoint right away; only this row
                        // is touched, so concurrent deliveries are unaffected.
                        match Subscription::deactivate(&self.pool, &target.endpoint).await {
                            Ok(true) => {
                                info!(endpoint = %target.endpoint, "retired expired subscription")
                            }
                            Ok(false) => {}
                            Err(db_err) => warn!(
                                endpoint = %target.endpoint,
                                error = %db_err,
                                "failed to retire expired subscription"
                            ),
                        }
                    }
                    DeliveryError::Failed(_) => {
                        warn!(endpoint = %target.endpoint, error = %err, "push delivery failed")
                    }
                }

                DeliveryOutcome {
                    endpoint: target.endpoint,
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}
