//! Recipient whitelist and mailbox name derivation

use std::collections::HashSet;

use crate::gateway::error::GatewayError;

/// The set of addresses eligible to receive mail
#[derive(Debug, Clone, Default)]
pub struct RecipientWhitelist {
    addresses: HashSet<String>,
}

impl RecipientWhitelist {
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact, case-sensitive match against the configured addresses
    pub fn is_eligible(&self, recipient: &str) -> bool {
        self.addresses.contains(recipient)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Derive the mailbox directory name for a recipient address.
///
/// The local part is cleaned like a path and only its final component is
/// kept, so the result is always a single path segment that is neither `.`
/// nor `..`.
pub fn derive_local_name(address: &str) -> Result<String, GatewayError> {
    let malformed = || GatewayError::MalformedAddress(address.to_string());

    let (local, _domain) = address.split_once('@').ok_or_else(malformed)?;

    match last_segment(local) {
        Some(name) if !name.contains('\0') => Ok(name.to_string()),
        _ => Err(malformed()),
    }
}

/// Final component of the lexically cleaned path
fn last_segment(path: &str) -> Option<&str> {
    let rooted = path.starts_with(['/', '\\']);
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                // ".." at the root stays at the root
                _ if rooted => {}
                _ => segments.push(".."),
            },
            _ => segments.push(segment),
        }
    }

    segments.last().copied().filter(|&last| last != "..")
}
