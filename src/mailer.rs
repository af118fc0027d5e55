use async_trait::async_trait;
use tracing::info;

/// Delivery failure. The dispatcher logs and counts these; they never reach
/// a request path.
#[derive(Debug)]
pub struct MailError(pub String);

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mail delivery failed: {}", self.0)
    }
}

impl std::error::Error for MailError {}

/// Narrow interface to the mail system.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Default delivery: write the mail to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        info!("mail to {to} [{subject}]: {body}");
        Ok(())
    }
}

/// Captures outbound mail for assertions.
#[cfg(test)]
pub struct RecordingMailer {
    pub sent: std::sync::Mutex<Vec<(String, String, String)>>,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            sent: std::sync::Mutex::new(Vec::new()),
        })
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.into(), subject.into(), body.into()));
        Ok(())
    }
}

/// Always fails; exercises the swallow-and-log path.
#[cfg(test)]
pub struct FailingMailer;

#[cfg(test)]
#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), MailError> {
        Err(MailError("smtp unreachable".into()))
    }
}
