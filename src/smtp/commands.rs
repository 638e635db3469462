//! Implementation of SMTP commands

use std::net::IpAddr;

use crate::gateway::Hooks;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;

/// Handles SMTP commands for one client and returns appropriate responses
#[derive(Debug)]
pub struct SmtpCommandHandler<'a, H> {
    hostname: &'a str,
    hooks: &'a H,
    client: IpAddr,
}

impl<'a, H: Hooks> SmtpCommandHandler<'a, H> {
    /// Create a new command handler
    pub fn new(hostname: &'a str, hooks: &'a H, client: IpAddr) -> Self {
        Self {
            hostname,
            hooks,
            client,
        }
    }

    /// Process a command line and return a response
    pub fn process_command(
        &self,
        command_line: &str,
        session: &mut SmtpSession<H::Envelope>,
    ) -> Result<SmtpResponse, SmtpError> {
        // Check command line length
        if command_line.len() > SmtpLimits::COMMAND_LINE_MAX_LENGTH {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::COMMAND_LINE_MAX_LENGTH,
            });
        }

        let parts: Vec<&str> = command_line.split_whitespace().collect();
        if parts.is_empty() {
            return Err(SmtpError::InvalidCommand);
        }

        let cmd = parts[0].to_uppercase();

        match cmd.as_str() {
            #[cfg(feature = "ehlo")]
            "EHLO" => self.handle_ehlo(parts, session),
            "HELO" => self.handle_helo(parts, session),
            "MAIL" => self.handle_mail(parts, session),
            "RCPT" => self.handle_rcpt(parts, session),
            "DATA" => self.handle_data(parts, session),
            "RSET" => self.handle_rset(session),
            "NOOP" => self.handle_noop(),
            "QUIT" => self.handle_quit(),
            _ => Err(SmtpError::InvalidCommand),
        }
    }

    /// Handle EHLO command
    #[cfg(feature = "ehlo")]
    fn handle_ehlo(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession<H::Envelope>,
    ) -> Result<SmtpResponse, SmtpError> {
        if parts.len() < 2 {
            return Err(SmtpError::InvalidSyntax(
                "EHLO requires domain argument".to_string(),
            ));
        }

        let client_domain = parts[1].to_string();
        session.set_client_domain(client_domain.clone())?;

        Ok(SmtpResponse::ehlo(self.hostname, &client_domain))
    }

    /// Handle HELO command
    fn handle_helo(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession<H::Envelope>,
    ) -> Result<SmtpResponse, SmtpError> {
        if parts.len() < 2 {
            return Err(SmtpError::InvalidSyntax(
                "HELO requires domain argument".to_string(),
            ));
        }

        let client_domain = parts[1].to_string();
        session.set_client_domain(client_domain.clone())?;

        Ok(SmtpResponse::helo(self.hostname, &client_domain))
    }

    /// Handle MAIL command
    fn handle_mail(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession<H::Envelope>,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("MAIL") {
            return Err(SmtpError::InvalidState(
                "MAIL command requires HELO first".to_string(),
            ));
        }

        if parts.len() < 2 {
            return Err(SmtpError::InvalidSyntax(
                "MAIL requires FROM argument".to_string(),
            ));
        }

        let addr = parse_path(&parts[1..].join(" "), "FROM:")?;

        // The null reverse-path is used for bounces and is always allowed
        if !addr.is_empty() {
            self.validate_email_address(&addr)?;
        }

        let envelope = self.hooks.on_mail_from(self.client, &addr)?;
        session.set_sender(addr, envelope)?;

        Ok(SmtpResponse::ok())
    }

    /// Handle RCPT command
    fn handle_rcpt(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession<H::Envelope>,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("RCPT") {
            return Err(SmtpError::InvalidState(
                "RCPT command requires MAIL first".to_string(),
            ));
        }

        if parts.len() < 2 {
            return Err(SmtpError::InvalidSyntax(
                "RCPT requires TO argument".to_string(),
            ));
        }

        let addr = parse_path(&parts[1..].join(" "), "TO:")?;
        if addr.is_empty() {
            return Err(SmtpError::InvalidSyntax(
                "TO address cannot be empty".to_string(),
            ));
        }

        // Validate email address components
        self.validate_email_address(&addr)?;

        session.add_recipient(addr)?;

        Ok(SmtpResponse::ok())
    }

    /// Handle DATA command
    fn handle_data(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession<H::Envelope>,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("DATA") {
            return Err(SmtpError::InvalidState(
                "DATA command requires MAIL first".to_string(),
            ));
        }

        if parts.len() > 1 {
            return Err(SmtpError::InvalidSyntax(
                "DATA command takes no arguments".to_string(),
            ));
        }

        session.start_data_mode()?;

        Ok(SmtpResponse::data_start())
    }

    /// Handle RSET command
    fn handle_rset(
        &self,
        session: &mut SmtpSession<H::Envelope>,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("RSET") {
            return Err(SmtpError::InvalidState(
                "RSET command requires HELO first".to_string(),
            ));
        }

        session.reset();
        Ok(SmtpResponse::ok())
    }

    /// Handle NOOP command
    fn handle_noop(&self) -> Result<SmtpResponse, SmtpError> {
        Ok(SmtpResponse::ok())
    }

    /// Handle QUIT command
    fn handle_quit(&self) -> Result<SmtpResponse, SmtpError> {
        Ok(SmtpResponse::quit())
    }

    /// Validate email address format and size limits
    fn validate_email_address(&self, addr: &str) -> Result<(), SmtpError> {
        let Some((user_part, domain_part)) = addr.rsplit_once('@') else {
            return Err(SmtpError::InvalidSyntax(
                "Email address must contain @ symbol".to_string(),
            ));
        };

        if user_part.len() > SmtpLimits::USER_MAX_LENGTH {
            return Err(SmtpError::UserTooLong {
                max: SmtpLimits::USER_MAX_LENGTH,
            });
        }

        if domain_part.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
            return Err(SmtpError::DomainTooLong {
                max: SmtpLimits::DOMAIN_MAX_LENGTH,
            });
        }

        // Basic validation - must have user and domain parts
        if user_part.is_empty() || domain_part.is_empty() {
            return Err(SmtpError::InvalidSyntax(
                "Invalid email address format".to_string(),
            ));
        }

        Ok(())
    }
}

/// Extract the address from `FROM:<addr> [params]` or `TO:<addr> [params]`.
///
/// ESMTP parameters after the closing bracket are ignored.
fn parse_path(argument: &str, keyword: &str) -> Result<String, SmtpError> {
    let head = argument.get(..keyword.len()).unwrap_or_default();
    if !head.eq_ignore_ascii_case(keyword) {
        return Err(SmtpError::InvalidSyntax(format!(
            "Argument must be '{keyword}<address>'"
        )));
    }

    let path = argument[keyword.len()..].trim_start();
    let inner = path
        .strip_prefix('<')
        .and_then(|rest| rest.split_once('>'))
        .map(|(addr, _params)| addr);

    match inner {
        Some(addr) => Ok(addr.trim().to_string()),
        None => Err(SmtpError::InvalidSyntax(
            "Address must be enclosed in angle brackets".to_string(),
        )),
    }
}
