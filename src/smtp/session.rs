//! SMTP session state management

use crate::gateway::Envelope;
use crate::smtp::error::{SmtpError, SmtpLimits};

/// Represents the current state of an SMTP session
#[derive(Debug, Clone, PartialEq)]
pub enum SmtpState {
    /// Initial state - waiting for HELO
    Initial,
    /// HELO received - ready for MAIL command
    GreetingReceived,
    /// MAIL FROM received - ready for RCPT commands
    MailReceived,
    /// At least one RCPT TO accepted - ready for DATA or more RCPT commands
    RecipientsReceived,
    /// DATA command accepted - streaming message lines
    DataMode,
}

/// Manages the protocol state of a single SMTP connection.
///
/// The mail transaction itself lives in the envelope, which is created on
/// MAIL FROM and dropped when the transaction ends.
#[derive(Debug)]
pub struct SmtpSession<E: Envelope> {
    /// Current state of the session
    pub state: SmtpState,
    /// Sender address from MAIL FROM command
    pub from: Option<String>,
    /// Recipients accepted by the envelope
    pub to: Vec<String>,
    /// Current mail transaction
    pub envelope: Option<E>,
    /// Whether we're currently in data mode
    pub in_data_mode: bool,
    /// Total size of data streamed so far
    pub data_size: usize,
    /// First error hit while streaming data, reported at end of data
    pub data_error: Option<SmtpError>,
    /// Client domain from HELO command
    pub client_domain: Option<String>,
}

impl<E: Envelope> SmtpSession<E> {
    /// Create a new SMTP session
    pub fn new() -> Self {
        Self {
            state: SmtpState::Initial,
            from: None,
            to: Vec::new(),
            envelope: None,
            in_data_mode: false,
            data_size: 0,
            data_error: None,
            client_domain: None,
        }
    }

    /// Reset the session to post-HELO state, aborting any open transaction
    pub fn reset(&mut self) {
        self.abort_transaction();
        self.state = SmtpState::GreetingReceived;
        // Keep client_domain as it's set by HELO
    }

    /// Complete reset including HELO state
    pub fn full_reset(&mut self) {
        self.abort_transaction();
        self.state = SmtpState::Initial;
        self.client_domain = None;
    }

    fn abort_transaction(&mut self) {
        if let Some(mut envelope) = self.envelope.take() {
            envelope.abort();
        }
        self.from = None;
        self.to.clear();
        self.in_data_mode = false;
        self.data_size = 0;
        self.data_error = None;
    }

    /// Set the sender address and start a new transaction
    pub fn set_sender(&mut self, sender: String, envelope: E) -> Result<(), SmtpError> {
        if sender.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        self.abort_transaction();
        self.from = Some(sender);
        self.envelope = Some(envelope);
        self.state = SmtpState::MailReceived;
        Ok(())
    }

    /// Add a recipient address
    pub fn add_recipient(&mut self, recipient: String) -> Result<(), SmtpError> {
        if recipient.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        if self.to.len() >= SmtpLimits::MAX_RECIPIENTS {
            return Err(SmtpError::TooManyRecipients {
                max: SmtpLimits::MAX_RECIPIENTS,
            });
        }

        let envelope = self
            .envelope
            .as_mut()
            .ok_or_else(|| SmtpError::InvalidState("RCPT command requires MAIL first".to_string()))?;
        envelope.add_recipient(&recipient)?;

        self.to.push(recipient);
        self.state = SmtpState::RecipientsReceived;
        Ok(())
    }

    /// Open the mailboxes and start data mode.
    ///
    /// If the envelope refuses, the transaction is dropped and the client
    /// has to start over with MAIL.
    pub fn start_data_mode(&mut self) -> Result<(), SmtpError> {
        if self.state != SmtpState::MailReceived && self.state != SmtpState::RecipientsReceived {
            return Err(SmtpError::InvalidState(
                "DATA command requires MAIL first".to_string(),
            ));
        }

        let envelope = self
            .envelope
            .as_mut()
            .ok_or_else(|| SmtpError::InvalidState("No mail transaction".to_string()))?;
        if let Err(e) = envelope.begin_data() {
            self.reset();
            return Err(e.into());
        }

        self.in_data_mode = true;
        self.data_size = 0;
        self.data_error = None;
        self.state = SmtpState::DataMode;
        Ok(())
    }

    /// Stream one line of message data (without its line ending).
    ///
    /// After the first failure the transaction is aborted and the remaining
    /// lines are discarded; the error is reported when the data ends.
    pub fn add_data_line(&mut self, line: &[u8]) {
        if self.data_error.is_some() {
            return;
        }

        if let Err(e) = self.write_data_line(line) {
            if let Some(envelope) = self.envelope.as_mut() {
                envelope.abort();
            }
            self.data_error = Some(e);
        }
    }

    fn write_data_line(&mut self, line: &[u8]) -> Result<(), SmtpError> {
        let line_size = line.len() + 2; // +2 for CRLF

        if line_size > SmtpLimits::TEXT_LINE_MAX_LENGTH {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::TEXT_LINE_MAX_LENGTH,
            });
        }

        if self.data_size + line_size > SmtpLimits::MAX_DATA_SIZE {
            return Err(SmtpError::TooMuchData {
                max: SmtpLimits::MAX_DATA_SIZE,
            });
        }

        let envelope = self
            .envelope
            .as_mut()
            .ok_or_else(|| SmtpError::InvalidState("Not in data mode".to_string()))?;

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line);
        buf.push(b'\n');
        envelope.write(&buf)?;

        self.data_size += line_size;
        Ok(())
    }

    /// Finish data mode, committing the message to every mailbox
    pub fn finish_data_collection(&mut self) -> Result<(), SmtpError> {
        if !self.in_data_mode {
            return Err(SmtpError::InvalidState(
                "Not in data collection mode".to_string(),
            ));
        }

        let result = match self.data_error.take() {
            Some(e) => Err(e),
            None => match self.envelope.as_mut() {
                Some(envelope) => envelope.close().map_err(SmtpError::from),
                None => Err(SmtpError::InvalidState("No mail transaction".to_string())),
            },
        };

        self.reset();
        result
    }

    /// Set the client domain from HELO command
    pub fn set_client_domain(&mut self, domain: String) -> Result<(), SmtpError> {
        if domain.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
            return Err(SmtpError::DomainTooLong {
                max: SmtpLimits::DOMAIN_MAX_LENGTH,
            });
        }

        self.client_domain = Some(domain);
        self.reset(); // Clear any existing transaction
        Ok(())
    }

    /// Check if the session is ready for a specific command
    pub fn can_execute_command(&self, command: &str) -> bool {
        match command.to_uppercase().as_str() {
            #[cfg(feature = "ehlo")]
            "EHLO" => true, // EHLO can be sent at any time
            "HELO" => true, // HELO can be sent at any time
            "MAIL" => self.state == SmtpState::GreetingReceived,
            "RCPT" => {
                self.state == SmtpState::MailReceived || self.state == SmtpState::RecipientsReceived
            }
            // The envelope decides whether zero recipients is acceptable
            "DATA" => {
                self.state == SmtpState::MailReceived || self.state == SmtpState::RecipientsReceived
            }
            "RSET" => self.state != SmtpState::Initial,
            "NOOP" => true, // NOOP can be sent at any time
            "QUIT" => true, // QUIT can be sent at any time
            _ => false,
        }
    }

    /// Get the current recipient count
    pub fn recipient_count(&self) -> usize {
        self.to.len()
    }
}

impl<E: Envelope> Default for SmtpSession<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Envelope> Drop for SmtpSession<E> {
    fn drop(&mut self) {
        self.abort_transaction();
    }
}
