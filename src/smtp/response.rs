//! Replies sent by letterbox
//!
//! Every reply the server can send is built here, including the fixed
//! replies for gateway decisions (admission, recipients, Maildir failures).

use crate::gateway::GatewayError;
#[cfg(feature = "ehlo")]
use crate::smtp::error::SmtpLimits;
use crate::smtp::error::SmtpError;

/// An SMTP reply: a code and one or more lines of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    pub code: u16,
    /// Reply lines, sent as a multiline reply when there is more than one
    pub lines: Vec<String>,
}

impl SmtpResponse {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    pub fn greeting(hostname: &str) -> Self {
        Self::new(220, format!("{hostname} ESMTP letterbox"))
    }

    pub fn helo(hostname: &str, client_domain: &str) -> Self {
        Self::new(250, format!("{hostname} Hello {client_domain}"))
    }

    /// EHLO reply advertising PIPELINING and the message size limit
    #[cfg(feature = "ehlo")]
    pub fn ehlo(hostname: &str, client_domain: &str) -> Self {
        Self {
            code: 250,
            lines: vec![
                format!("{hostname} Hello {client_domain}"),
                "PIPELINING".to_owned(),
                format!("SIZE {}", SmtpLimits::MAX_DATA_SIZE),
            ],
        }
    }

    pub fn data_start() -> Self {
        Self::new(354, "End data with <CR><LF>.<CR><LF>")
    }

    pub fn quit() -> Self {
        Self::new(221, "Bye")
    }

    /// The message reached every open Maildir
    pub fn delivered() -> Self {
        Self::new(250, "OK: message delivered")
    }

    /// Sent instead of the greeting to clients outside the allowlist
    pub fn client_rejected() -> Self {
        Self::new(554, "5.7.1 Client host rejected")
    }

    pub fn recipient_rejected() -> Self {
        Self::new(550, "5.1.1 Recipient not in whitelist")
    }

    pub fn no_valid_recipients() -> Self {
        Self::new(554, "5.5.1 Error: no valid recipients")
    }

    /// Transient Maildir failure, the client should retry later
    pub fn maildir_unavailable() -> Self {
        Self::new(450, "Error: maildir unavailable")
    }

    pub fn closing() -> Self {
        Self::new(421, "Service not available, closing transmission channel")
    }

    /// First line of the reply text
    pub fn text(&self) -> &str {
        self.lines.first().map_or("", String::as_str)
    }

    /// Format the reply for the wire, with `-` continuation on all but the last line
    pub fn format(&self) -> String {
        let last = self.lines.len().saturating_sub(1);
        let mut result = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            let separator = if i == last { ' ' } else { '-' };
            result.push_str(&format!("{}{separator}{line}\r\n", self.code));
        }
        result
    }

    /// 4xx or 5xx
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }
}

impl From<&GatewayError> for SmtpResponse {
    fn from(e: &GatewayError) -> Self {
        match e {
            GatewayError::AdmissionDenied(_) => Self::client_rejected(),
            GatewayError::RecipientRejected(_) | GatewayError::MalformedAddress(_) => {
                Self::recipient_rejected()
            }
            GatewayError::NoValidRecipients => Self::no_valid_recipients(),
            GatewayError::MailboxUnavailable { .. }
            | GatewayError::DeliveryWriteFailure { .. }
            | GatewayError::CommitFailed { .. } => Self::maildir_unavailable(),
            GatewayError::InvalidState(_) | GatewayError::SessionClosed => Self::closing(),
        }
    }
}

impl From<&SmtpError> for SmtpResponse {
    fn from(e: &SmtpError) -> Self {
        match e {
            SmtpError::Io(_) | SmtpError::ConnectionClosed => {
                Self::new(421, "Service not available")
            }
            SmtpError::InvalidCommand => Self::new(500, "Syntax error, command unrecognized"),
            SmtpError::InvalidState(msg) => {
                Self::new(503, format!("Bad sequence of commands: {msg}"))
            }
            SmtpError::InvalidSyntax(msg) => Self::new(501, format!("Syntax error: {msg}")),
            SmtpError::LineTooLong { .. } => Self::new(500, e.to_string()),
            SmtpError::PathTooLong { .. }
            | SmtpError::DomainTooLong { .. }
            | SmtpError::UserTooLong { .. } => Self::new(501, e.to_string()),
            SmtpError::TooManyRecipients { .. } | SmtpError::TooMuchData { .. } => {
                Self::new(552, e.to_string())
            }
            SmtpError::Gateway(e) => Self::from(e),
        }
    }
}
