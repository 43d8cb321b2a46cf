use async_trait::async_trait;
use web_push::{
    ContentEncoding, HyperWebPushClient, SubscriptionInfo, WebPushClient, WebPushError,
    WebPushMessageBuilder,
};

use database::subscription::Subscription;

use crate::vapid::VapidConfig;

/// How long the push service may hold an undelivered message.
const TTL_SECONDS: u32 = 86400;

/// One delivery target: the endpoint plus the encryption keys the browser
/// registered for it.
#[derive(Clone, Debug)]
pub struct PushTarget {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

impl From<&Subscription> for PushTarget {
    fn from(subscription: &Subscription) -> Self {
        Self {
            endpoint: subscription.endpoint.clone(),
            p256dh: subscription.p256dh.clone(),
            auth: subscription.auth.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The push service reported the subscription gone for good
    /// (HTTP 404/410). The caller should retire the subscription.
    #[error("subscription gone: {0}")]
    EndpointGone(String),
    /// Anything else: network trouble, throttling, server errors. The
    /// subscription may still be valid.
    #[error("delivery failed: {0}")]
    Failed(String),
}

impl From<WebPushError> for DeliveryError {
    fn from(err: WebPushError) -> Self {
        match err {
            WebPushError::EndpointNotFound | WebPushError::EndpointNotValid => {
                Self::EndpointGone(err.to_string())
            }
            _ => Self::Failed(err.to_string()),
        }
    }
}

/// The wire seam of the dispatcher. Production uses [`WebPushTransport`];
/// tests substitute a stub so no dispatch test touches the network.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(&self, target: &PushTarget, payload: &[u8]) -> Result<(), DeliveryError>;
}

/// Delivers over the Web Push protocol: aes128gcm-encrypted body, fresh
/// VAPID authorization per target.
pub struct WebPushTransport {
    vapid: VapidConfig,
    client: HyperWebPushClient,
}

impl WebPushTransport {
    pub fn new(vapid: VapidConfig) -> Self {
        Self {
            vapid,
            client: HyperWebPushClient::new(),
        }
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(&self, target: &PushTarget, payload: &[u8]) -> Result<(), DeliveryError> {
        let subscription_info =
            SubscriptionInfo::new(&target.endpoint, &target.p256dh, &target.auth);

        let signature = self.vapid.signature_for(&subscription_info)?;

        let mut builder = WebPushMessageBuilder::new(&subscription_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature);
        builder.set_ttl(TTL_SECONDS);
        let message = builder.build()?;

        self.client.send(message).await?;

        Ok(())
    }
}
