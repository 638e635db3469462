//! Lifecycle hooks called by the SMTP engine

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::gateway::allowlist::Allowlist;
use crate::gateway::delivery::Delivery;
use crate::gateway::error::GatewayError;
use crate::gateway::maildir::MailboxStore;
use crate::gateway::recipients::RecipientWhitelist;

/// A mail transaction as seen by the SMTP engine.
///
/// The engine calls these in protocol order: recipients, then `begin_data`,
/// then `write` once per line, then `close`. `abort` may be called at any
/// time to tear the transaction down.
pub trait Envelope {
    fn add_recipient(&mut self, recipient: &str) -> Result<(), GatewayError>;

    fn begin_data(&mut self) -> Result<(), GatewayError>;

    fn write(&mut self, line: &[u8]) -> Result<(), GatewayError>;

    fn close(&mut self) -> Result<(), GatewayError>;

    fn abort(&mut self);
}

/// Connection-level decisions made on behalf of the SMTP engine.
///
/// One value is shared by every connection, so implementations must not
/// rely on interior mutability for per-session state.
pub trait Hooks: Send + Sync {
    type Envelope: Envelope;

    /// Decide whether a client may open a session at all
    fn on_connect(&self, client: IpAddr) -> Result<(), GatewayError>;

    /// Start a new mail transaction
    fn on_mail_from(&self, client: IpAddr, from: &str) -> Result<Self::Envelope, GatewayError>;
}

/// The mail gateway: admission by client address, recipients by whitelist,
/// delivery into a mailbox store
#[derive(Debug)]
pub struct Gateway<S> {
    allowlist: Allowlist,
    whitelist: Arc<RecipientWhitelist>,
    store: Arc<S>,
}

impl<S: MailboxStore> Gateway<S> {
    pub fn new(allowlist: Allowlist, whitelist: RecipientWhitelist, store: S) -> Self {
        Self {
            allowlist,
            whitelist: Arc::new(whitelist),
            store: Arc::new(store),
        }
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    pub fn whitelist(&self) -> &RecipientWhitelist {
        &self.whitelist
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> Hooks for Gateway<S>
where
    S: MailboxStore + Send + Sync,
{
    type Envelope = Delivery<S>;

    fn on_connect(&self, client: IpAddr) -> Result<(), GatewayError> {
        debug!(%client, "Connection");
        if self.allowlist.is_allowed(client) {
            Ok(())
        } else {
            info!(%client, "Client not allowed");
            Err(GatewayError::AdmissionDenied(client))
        }
    }

    fn on_mail_from(&self, client: IpAddr, from: &str) -> Result<Delivery<S>, GatewayError> {
        debug!(%client, from, "New mail");
        Ok(Delivery::new(
            client,
            from,
            Arc::clone(&self.whitelist),
            Arc::clone(&self.store),
        ))
    }
}

impl<S: MailboxStore> Envelope for Delivery<S> {
    fn add_recipient(&mut self, recipient: &str) -> Result<(), GatewayError> {
        Delivery::add_recipient(self, recipient)
    }

    fn begin_data(&mut self) -> Result<(), GatewayError> {
        Delivery::begin_data(self)
    }

    fn write(&mut self, line: &[u8]) -> Result<(), GatewayError> {
        Delivery::write(self, line)
    }

    fn close(&mut self) -> Result<(), GatewayError> {
        Delivery::close(self)
    }

    fn abort(&mut self) {
        Delivery::abort(self)
    }
}
