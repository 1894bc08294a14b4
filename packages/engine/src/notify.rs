//! User-facing alert payloads and the notification dispatch seam.
//!
//! The engine decides *that* and *what* to notify. Delivery belongs to a
//! [`Notifier`] implementation supplied by the embedding application.

use async_trait::async_trait;
use safezone_incident_models::Incident;
use safezone_zone_models::ZoneId;
use serde::{Deserialize, Serialize};

use crate::DispatchError;
use crate::engine::AlertIntent;

/// A rendered alert ready for a notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    pub title: String,
    pub body: String,
    pub zone_id: ZoneId,
    pub distance_km: f64,
    /// The incident the alert is about, for downstream deep links.
    pub incident: Incident,
}

impl From<&AlertIntent> for AlertNotification {
    fn from(intent: &AlertIntent) -> Self {
        let incident = &intent.incident;
        let (title, verb) = if intent.zone.is_self() {
            ("Crime alert nearby".to_string(), "reported")
        } else {
            (format!("Alert in {}", intent.zone.name), "detected")
        };

        let mut body = format!(
            "{} {verb} {:.1} km away (severity: {})",
            incident.incident_type, intent.distance_km, incident.severity
        );
        if let Some(description) = &incident.description {
            body.push_str(": ");
            body.push_str(description);
        }

        Self {
            title,
            body,
            zone_id: intent.zone.id.clone(),
            distance_km: intent.distance_km,
            incident: incident.clone(),
        }
    }
}

/// A channel that can show an [`AlertNotification`] to the user.
///
/// Dispatch is fire-and-forget from the engine's point of view: a failure is
/// logged and the alert is not retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the channel could not deliver it.
    async fn dispatch(&self, notification: &AlertNotification) -> Result<(), DispatchError>;
}

/// Writes alerts to the log at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn dispatch(&self, notification: &AlertNotification) -> Result<(), DispatchError> {
        log::info!("[{}] {}", notification.title, notification.body);
        Ok(())
    }
}
