//! # Letterbox
//!
//! Letterbox is an SMTP server that delivers mail into local Maildirs.
//!
//! Only allowlisted client hosts may connect, and only whitelisted recipient
//! addresses are accepted. Every accepted recipient gets a Maildir named after
//! the local part of its address, and each message is written to all of them
//! at once: it either lands in every `new/` directory or in none.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use letterbox::{Allowlist, Gateway, Maildirs, RecipientWhitelist, SmtpServer};
//!
//! let gateway = Gateway::new(
//!     Allowlist::from_hosts(["127.0.0.1", "192.168.0.0/16"]),
//!     RecipientWhitelist::from_addresses(["user@example.com"]),
//!     Maildirs::new("/var/spool/maildirs"),
//! );
//!
//! let server = SmtpServer::new("mx.example.com", gateway);
//! server.start("127.0.0.1:2525").unwrap();
//! ```
//!
//! A message for `user@example.com` then ends up in
//! `/var/spool/maildirs/user/new/`.
//!
//! ## Supported SMTP commands
//!
//! - `HELO` - Identify the sender
//! - `MAIL FROM` - Specify the sender's address (any sender is accepted)
//! - `RCPT TO` - Specify a destination (must be whitelisted)
//! - `DATA` - Send the email body
//! - `RSET` - Reset the current transaction
//! - `NOOP` - Do nothing
//! - `QUIT` - Close connection
//!
//! The `ehlo` feature, enabled by default, adds the `EHLO` command.
//!
//! ## Replies
//!
//! - Client not in the allowlist: `554 5.7.1` in place of the greeting
//! - Recipient not in the whitelist: `550 5.1.1`, the session goes on
//! - `DATA` when no recipient's Maildir could be created or opened: `554 5.5.1`.
//!   Recipients whose Maildir fails are skipped while at least one remains.
//! - Write failure while receiving the message: `450`, nothing is delivered
//! - Commit failure: `450`, recipients whose copy did commit keep it
//!
//! ## Notes
//!
//! - SMTP authentication is not supported.
//! - SSL/TLS connection is not supported.
//! - Mail relay is not supported.
//!
//! ## Size Limits
//!
//! The server enforces RFC 821 size limits:
//! - User names: 64 characters max
//! - Domain names: 64 characters max
//! - Paths: 256 characters max
//! - Command lines: 512 characters max
//! - Text lines: 1000 characters max
//! - Recipients: 100 max per message

mod args;
pub mod config;
pub mod gateway;
mod smtp;

pub use args::Args;
pub use config::{Config, ConfigError};
pub use gateway::{
    Allowlist, Envelope, Gateway, GatewayError, Hooks, MailboxStore, Maildirs, RecipientWhitelist,
};
pub use smtp::{SmtpError, SmtpLimits, SmtpResponse, SmtpServer, SmtpSession, SmtpState};
