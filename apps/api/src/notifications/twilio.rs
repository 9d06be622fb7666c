//! WhatsApp alerts through the Twilio Messages REST API.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::TwilioSettings;
use crate::notifications::{Notifier, NotifyError};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Clone)]
pub struct TwilioNotifier {
    client: Client,
    settings: Option<TwilioSettings>,
}

impl TwilioNotifier {
    /// `None` settings build a notifier that only logs.
    pub fn new(settings: Option<TwilioSettings>) -> Self {
        if settings.is_none() {
            warn!("Twilio is not configured; reply alerts will only be logged");
        }
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            settings,
        }
    }
}

fn whatsapp_address(number: &str) -> String {
    let number = number.trim();
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let Some(settings) = &self.settings else {
            info!("Alert not sent (Twilio not configured): {text}");
            return Ok(());
        };

        let url = format!(
            "{TWILIO_API_BASE}/Accounts/{}/Messages.json",
            settings.account_sid
        );
        let from = whatsapp_address(&settings.from);
        let to = whatsapp_address(&settings.to);
        let response = self
            .client
            .post(url)
            .basic_auth(&settings.account_sid, Some(&settings.auth_token))
            .form(&[("Body", text), ("From", from.as_str()), ("To", to.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Provider {
                status: status.as_u16(),
                body,
            });
        }
        info!("WhatsApp alert sent");
        Ok(())
    }
}
