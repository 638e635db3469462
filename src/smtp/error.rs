//! Error types for the SMTP engine

use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid command")]
    InvalidCommand,

    #[error("Invalid state for command")]
    InvalidState(String),

    #[error("Invalid syntax")]
    InvalidSyntax(String),

    #[error("Line too long (max {max} characters)")]
    LineTooLong { max: usize },

    #[error("Path too long (max {max} characters)")]
    PathTooLong { max: usize },

    #[error("Too many recipients (max {max})")]
    TooManyRecipients { max: usize },

    #[error("Too much mail data (max {max} bytes)")]
    TooMuchData { max: usize },

    #[error("Domain name too long (max {max} characters)")]
    DomainTooLong { max: usize },

    #[error("User name too long (max {max} characters)")]
    UserTooLong { max: usize },

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// SMTP size limits as defined in RFC 821
pub struct SmtpLimits;

impl SmtpLimits {
    /// Maximum length of a user name
    pub const USER_MAX_LENGTH: usize = 64;

    /// Maximum length of a domain name
    pub const DOMAIN_MAX_LENGTH: usize = 64;

    /// Maximum length of a path (reverse-path or forward-path)
    pub const PATH_MAX_LENGTH: usize = 256;

    /// Maximum length of a command line including CRLF
    pub const COMMAND_LINE_MAX_LENGTH: usize = 512;

    /// Maximum length of a reply line including CRLF
    pub const REPLY_LINE_MAX_LENGTH: usize = 512;

    /// Maximum length of a text line including CRLF
    pub const TEXT_LINE_MAX_LENGTH: usize = 1000;

    /// Maximum number of recipients per message
    pub const MAX_RECIPIENTS: usize = 100;

    /// Maximum total size of a message
    pub const MAX_DATA_SIZE: usize = 10 * 1024 * 1024; // 10MB
}

impl SmtpError {
    /// Whether the connection must be closed after replying
    pub fn is_fatal(&self) -> bool {
        match self {
            SmtpError::Io(_) | SmtpError::ConnectionClosed => true,
            SmtpError::Gateway(e) => e.is_fatal(),
            _ => false,
        }
    }
}
