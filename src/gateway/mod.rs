//! Session admission and multi-recipient delivery
//!
//! Everything the SMTP engine needs to decide is answered here: whether a
//! client may connect ([`Allowlist`]), which recipients are accepted
//! ([`RecipientWhitelist`]), and how one message is fanned out to one
//! mailbox per recipient ([`Delivery`]). The engine reaches all of it
//! through the [`Hooks`] and [`Envelope`] traits, implemented by [`Gateway`].

pub mod allowlist;
pub mod delivery;
pub mod error;
pub mod hooks;
pub mod maildir;
pub mod recipients;

#[cfg(test)]
pub(crate) mod testing;

pub use allowlist::{Allowlist, AllowlistEntry};
pub use delivery::{Delivery, DeliveryState};
pub use error::GatewayError;
pub use hooks::{Envelope, Gateway, Hooks};
pub use maildir::{MailboxStore, MaildirDelivery, Maildirs, WriteDestination};
pub use recipients::{RecipientWhitelist, derive_local_name};
