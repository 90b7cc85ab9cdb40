use anyhow::Context;
use async_trait::async_trait;

use super::{Email, Mailer};

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

pub struct SendGridMailer {
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl SendGridMailer {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            api_key,
            from,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        anyhow::ensure!(self.is_configured(), "SENDGRID_API_KEY is not set");

        let body = serde_json::json!({
            "personalizations": [{ "to": [{ "email": email.to }] }],
            "from": { "email": self.from },
            "subject": email.subject,
            "content": [{ "type": "text/html", "value": email.html }],
        });

        self.client
            .post(SENDGRID_SEND_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to reach SendGrid")?
            .error_for_status()
            .context("SendGrid API returned error")?;

        tracing::debug!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}
