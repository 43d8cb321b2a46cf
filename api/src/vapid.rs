use web_push::{
    SubscriptionInfo, VapidSignature, VapidSignatureBuilder, WebPushError, URL_SAFE_NO_PAD,
};

#[derive(Debug, thiserror::Error)]
pub enum VapidError {
    #[error("invalid VAPID private key: {0}")]
    InvalidKey(#[from] WebPushError),
    #[error("VAPID contact must be a mailto: or https: URI, got {0:?}")]
    InvalidContact(String),
}

/// The sender identity: the VAPID key pair browsers subscribed against and
/// the contact URI push services may use to reach the operator.
///
/// Constructed once at startup and injected into the dispatcher; a key that
/// does not parse aborts the process before the server accepts any dispatch.
#[derive(Clone)]
pub struct VapidConfig {
    public_key: String,
    private_key: String,
    contact: String,
}

impl VapidConfig {
    /// `private_key` is the raw 32-byte P-256 scalar, base64url without
    /// padding, as produced by the usual `web-push generate-vapid-keys`
    /// tooling. `public_key` is the matching uncompressed point in the same
    /// encoding, handed out verbatim to subscribing browsers.
    pub fn new(
        public_key: String,
        private_key: String,
        contact: String,
    ) -> Result<Self, VapidError> {
        if !contact.starts_with("mailto:") && !contact.starts_with("https://") {
            return Err(VapidError::InvalidContact(contact));
        }

        VapidSignatureBuilder::from_base64_no_sub(&private_key, URL_SAFE_NO_PAD)?;

        Ok(Self {
            public_key,
            private_key,
            contact,
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Signs a short-lived authorization token scoped to the target's push
    /// service origin. Derived fresh for every target of every dispatch call,
    /// so a token can never outlive its validity window in our hands.
    pub fn signature_for(
        &self,
        subscription: &SubscriptionInfo,
    ) -> Result<VapidSignature, WebPushError> {
        let mut builder =
            VapidSignatureBuilder::from_base64(&self.private_key, URL_SAFE_NO_PAD, subscription)?;
        builder.add_claim("sub", self.contact.as_str());
        builder.build()
    }
}
