//! Contact form messages and the relay that delivers them.

use async_trait::async_trait;
use tracing::info;

/// Maximum accepted length of any contact field, in bytes.
const MAX_FIELD_LENGTH: usize = 10_000;

/// A validated contact form message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl ContactMessage {
    /// Build a message from raw form fields. Every field is required.
    pub fn new(
        name: Option<String>,
        email: Option<String>,
        subject: Option<String>,
        message: Option<String>,
    ) -> Result<Self, &'static str> {
        let required = |value: Option<String>| -> Result<String, &'static str> {
            let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
            if value.is_empty() {
                return Err("Please provide valid details");
            }
            if value.len() > MAX_FIELD_LENGTH {
                return Err("Contact message is too long");
            }
            Ok(value)
        };

        let contact = Self {
            name: required(name)?,
            email: required(email)?,
            subject: required(subject)?,
            message: required(message)?,
        };

        if !contact.email.contains('@') {
            return Err("Please provide valid details");
        }
        Ok(contact)
    }

    /// Plain-text body as delivered to the recipient.
    pub fn body(&self) -> String {
        format!(
            "You received a new message from {} ({}):\n\n{}",
            self.name, self.email, self.message
        )
    }
}

/// Delivery failure.
#[derive(Debug)]
pub struct RelayError {
    pub message: String,
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to relay contact message: {}", self.message)
    }
}

impl std::error::Error for RelayError {}

/// Something that forwards contact messages to the shop owner.
#[async_trait]
pub trait ContactRelay: Send + Sync {
    async fn send(&self, message: &ContactMessage) -> Result<(), RelayError>;
}

/// Relay that records messages in the structured log.
#[derive(Debug, Clone)]
pub struct LogRelay {
    recipient: String,
}

impl LogRelay {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
        }
    }
}

#[async_trait]
impl ContactRelay for LogRelay {
    async fn send(&self, message: &ContactMessage) -> Result<(), RelayError> {
        info!(
            to = %self.recipient,
            from_name = %message.name,
            from_email = %message.email,
            subject = %message.subject,
            body = %message.body(),
            "Contact message received"
        );
        Ok(())
    }
}
