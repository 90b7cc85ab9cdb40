pub mod sendgrid;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;

    /// False when the transport has no credentials and every send would fail.
    fn is_configured(&self) -> bool {
        true
    }
}
