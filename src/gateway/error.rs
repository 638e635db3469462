//! Error types for the delivery gateway

use std::io;
use std::net::IpAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Client {0} is not in the allowlist")]
    AdmissionDenied(IpAddr),

    #[error("Recipient {0} is not in the whitelist")]
    RecipientRejected(String),

    #[error("Recipient address {0:?} has no usable local part")]
    MalformedAddress(String),

    #[error("No valid recipients")]
    NoValidRecipients,

    #[error("Mailbox {mailbox} unavailable: {source}")]
    MailboxUnavailable {
        mailbox: String,
        #[source]
        source: io::Error,
    },

    #[error("Write to mailbox {mailbox} failed: {source}")]
    DeliveryWriteFailure {
        mailbox: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to commit delivery for {}", failed.join(", "))]
    CommitFailed { failed: Vec<String> },

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Session already closed")]
    SessionClosed,
}

impl GatewayError {
    /// Whether the engine must drop the connection after replying
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::AdmissionDenied(_)
                | GatewayError::InvalidState(_)
                | GatewayError::SessionClosed
        )
    }
}
