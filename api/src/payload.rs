use database::notification::Notification;
use serde::{Deserialize, Serialize};

/// Browsers render at most a few buttons per notification; anything past
/// three is silently dropped by the platform, so we cap before encoding.
pub const MAX_ACTIONS: usize = 3;

/// A notification button. `url` overrides where a click on this button
/// navigates; without it the service worker falls back to its default route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Serialize)]
struct WirePayload<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    actions: Option<&'a [NotificationAction]>,
}

/// Encodes the wire payload the service worker receives.
///
/// Absent optional fields are omitted rather than sent as nulls, and the
/// output is deterministic, so a dispatch encodes once and reuses the bytes
/// for every target.
pub fn encode(
    notification: &Notification,
    actions: &[NotificationAction],
) -> serde_json::Result<Vec<u8>> {
    let actions = &actions[..actions.len().min(MAX_ACTIONS)];

    serde_json::to_vec(&WirePayload {
        title: &notification.title,
        body: &notification.body,
        icon: notification.icon.as_deref(),
        badge: notification.badge.as_deref(),
        data: notification.data.as_deref(),
        actions: (!actions.is_empty()).then_some(actions),
    })
}
