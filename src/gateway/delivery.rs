//! Per-transaction delivery state machine

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::gateway::error::GatewayError;
use crate::gateway::maildir::{MailboxStore, WriteDestination};
use crate::gateway::recipients::{RecipientWhitelist, derive_local_name};

/// Lifecycle of a [`Delivery`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// No recipient accepted yet
    Idle,
    /// At least one recipient accepted
    RecipientsAccumulating,
    /// Destinations are open and accepting message data
    DataOpen,
    /// Every destination was committed
    Committed,
    /// Every destination was discarded
    Aborted,
}

impl DeliveryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryState::Committed | DeliveryState::Aborted)
    }
}

/// An open destination together with the recipient it delivers to
struct OpenDelivery<D> {
    recipient: String,
    mailbox: String,
    destination: D,
}

/// One mail transaction: the accepted recipients and their open mailboxes.
///
/// Message data is written to every open mailbox. A failed write aborts all
/// of them, so either every recipient gets an identical copy or none does.
/// Dropping a delivery that still has open mailboxes aborts them.
pub struct Delivery<S: MailboxStore> {
    client: IpAddr,
    sender: String,
    state: DeliveryState,
    recipients: Vec<String>,
    open: Vec<OpenDelivery<S::Destination>>,
    whitelist: Arc<RecipientWhitelist>,
    store: Arc<S>,
}

impl<S: MailboxStore> Delivery<S> {
    pub fn new(
        client: IpAddr,
        sender: impl Into<String>,
        whitelist: Arc<RecipientWhitelist>,
        store: Arc<S>,
    ) -> Self {
        Self {
            client,
            sender: sender.into(),
            state: DeliveryState::Idle,
            recipients: Vec::new(),
            open: Vec::new(),
            whitelist,
            store,
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    pub fn client(&self) -> IpAddr {
        self.client
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Recipients accepted so far, in the order they were given
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Mailboxes currently open for writing, in recipient order
    pub fn open_mailboxes(&self) -> impl Iterator<Item = &str> {
        self.open.iter().map(|d| d.mailbox.as_str())
    }

    /// Accept a recipient if it is whitelisted.
    ///
    /// A rejected recipient leaves the transaction usable.
    pub fn add_recipient(&mut self, recipient: &str) -> Result<(), GatewayError> {
        match self.state {
            DeliveryState::Idle | DeliveryState::RecipientsAccumulating => {}
            _ => return Err(GatewayError::InvalidState("recipient after data phase began")),
        }

        if !recipient.contains('@') {
            return Err(GatewayError::MalformedAddress(recipient.to_string()));
        }

        if !self.whitelist.is_eligible(recipient) {
            debug!(client = %self.client, recipient, "Recipient not in whitelist");
            return Err(GatewayError::RecipientRejected(recipient.to_string()));
        }

        // A repeated RCPT must not deliver a second copy
        if !self.recipients.iter().any(|r| r == recipient) {
            self.recipients.push(recipient.to_string());
        }
        self.state = DeliveryState::RecipientsAccumulating;
        Ok(())
    }

    /// Open a mailbox for every accepted recipient.
    ///
    /// Recipients whose mailbox cannot be opened are skipped. Fails with
    /// [`GatewayError::NoValidRecipients`] if nothing could be opened.
    pub fn begin_data(&mut self) -> Result<(), GatewayError> {
        match self.state {
            DeliveryState::RecipientsAccumulating => {}
            DeliveryState::Idle => return Err(GatewayError::NoValidRecipients),
            _ => return Err(GatewayError::InvalidState("data phase already began")),
        }

        for recipient in &self.recipients {
            match open_mailbox(self.store.as_ref(), recipient) {
                Ok(delivery) => self.open.push(delivery),
                Err(e) => warn!(client = %self.client, %recipient, error = %e, "Skipping recipient"),
            }
        }

        if self.open.is_empty() {
            self.state = DeliveryState::Aborted;
            return Err(GatewayError::NoValidRecipients);
        }

        debug!(
            client = %self.client,
            mailboxes = self.open.len(),
            "Data phase started"
        );
        self.state = DeliveryState::DataOpen;
        Ok(())
    }

    /// Append bytes to every open mailbox, aborting all of them on failure
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), GatewayError> {
        match self.state {
            DeliveryState::DataOpen => {}
            DeliveryState::Committed | DeliveryState::Aborted => {
                return Err(GatewayError::SessionClosed);
            }
            _ => return Err(GatewayError::InvalidState("write before data phase")),
        }

        let failure = self.open.iter_mut().find_map(|d| {
            d.destination
                .append(bytes)
                .err()
                .map(|source| (d.mailbox.clone(), source))
        });

        if let Some((mailbox, source)) = failure {
            error!(
                client = %self.client,
                %mailbox,
                error = %source,
                "Write failed, aborting all deliveries"
            );
            self.abort();
            return Err(GatewayError::DeliveryWriteFailure { mailbox, source });
        }

        Ok(())
    }

    /// Commit every open mailbox.
    ///
    /// A failed commit does not stop the remaining ones; the failed
    /// recipients are reported once all were tried. Closing before the data
    /// phase aborts the transaction, and closing a finished one does nothing.
    pub fn close(&mut self) -> Result<(), GatewayError> {
        match self.state {
            DeliveryState::DataOpen => {}
            DeliveryState::Committed | DeliveryState::Aborted => return Ok(()),
            DeliveryState::Idle | DeliveryState::RecipientsAccumulating => {
                self.state = DeliveryState::Aborted;
                return Ok(());
            }
        }

        let mut failed = Vec::new();
        for OpenDelivery {
            recipient,
            mailbox,
            destination,
        } in self.open.drain(..)
        {
            match destination.commit() {
                Ok(()) => info!(
                    client = %self.client,
                    from = %self.sender,
                    %recipient,
                    %mailbox,
                    "Delivered"
                ),
                Err(e) => {
                    warn!(client = %self.client, %recipient, %mailbox, error = %e, "Commit failed");
                    failed.push(recipient);
                }
            }
        }

        self.state = DeliveryState::Committed;
        if failed.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::CommitFailed { failed })
        }
    }

    /// Discard every open mailbox. Safe to call repeatedly.
    pub fn abort(&mut self) {
        for OpenDelivery {
            mailbox,
            destination,
            ..
        } in self.open.drain(..)
        {
            if let Err(e) = destination.abort() {
                warn!(client = %self.client, %mailbox, error = %e, "Abort failed");
            }
        }

        if !self.state.is_terminal() {
            debug!(client = %self.client, "Delivery aborted");
            self.state = DeliveryState::Aborted;
        }
    }
}

fn open_mailbox<S: MailboxStore>(
    store: &S,
    recipient: &str,
) -> Result<OpenDelivery<S::Destination>, GatewayError> {
    let mailbox = derive_local_name(recipient)?;

    let unavailable = |source| GatewayError::MailboxUnavailable {
        mailbox: mailbox.clone(),
        source,
    };
    store.create_if_absent(&mailbox).map_err(unavailable)?;
    let destination = store.open_delivery(&mailbox).map_err(unavailable)?;

    Ok(OpenDelivery {
        recipient: recipient.to_string(),
        mailbox,
        destination,
    })
}

impl<S: MailboxStore> Drop for Delivery<S> {
    fn drop(&mut self) {
        if !self.open.is_empty() {
            self.abort();
        }
    }
}

impl<S: MailboxStore> fmt::Debug for Delivery<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("client", &self.client)
            .field("sender", &self.sender)
            .field("state", &self.state)
            .field("recipients", &self.recipients)
            .field("open", &self.open.iter().map(|d| &d.mailbox).collect::<Vec<_>>())
            .finish()
    }
}
