//! In-memory mailbox store with failure injection, for unit tests

use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::gateway::maildir::{MailboxStore, WriteDestination};

/// What happened to every delivery opened against a [`MemoryStore`]
#[derive(Debug, Default)]
pub struct Ledger {
    pub created: Vec<String>,
    pub opened: Vec<String>,
    pub committed: Vec<(String, Vec<u8>)>,
    pub aborted: Vec<(String, Vec<u8>)>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    ledger: Arc<Mutex<Ledger>>,
    fail_create: HashSet<String>,
    fail_open: HashSet<String>,
    fail_append: HashSet<String>,
    fail_commit: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_create(mut self, mailbox: &str) -> Self {
        self.fail_create.insert(mailbox.to_string());
        self
    }

    pub fn failing_open(mut self, mailbox: &str) -> Self {
        self.fail_open.insert(mailbox.to_string());
        self
    }

    pub fn failing_append(mut self, mailbox: &str) -> Self {
        self.fail_append.insert(mailbox.to_string());
        self
    }

    pub fn failing_commit(mut self, mailbox: &str) -> Self {
        self.fail_commit.insert(mailbox.to_string());
        self
    }

    pub fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap()
    }
}

impl MailboxStore for MemoryStore {
    type Destination = MemoryDelivery;

    fn create_if_absent(&self, mailbox: &str) -> io::Result<()> {
        if self.fail_create.contains(mailbox) {
            return Err(io::Error::other("create failed"));
        }
        self.ledger().created.push(mailbox.to_string());
        Ok(())
    }

    fn open_delivery(&self, mailbox: &str) -> io::Result<MemoryDelivery> {
        if self.fail_open.contains(mailbox) {
            return Err(io::Error::other("open failed"));
        }
        self.ledger().opened.push(mailbox.to_string());
        Ok(MemoryDelivery {
            mailbox: mailbox.to_string(),
            buffer: Vec::new(),
            fail_append: self.fail_append.contains(mailbox),
            fail_commit: self.fail_commit.contains(mailbox),
            ledger: Arc::clone(&self.ledger),
        })
    }
}

#[derive(Debug)]
pub struct MemoryDelivery {
    mailbox: String,
    buffer: Vec<u8>,
    fail_append: bool,
    fail_commit: bool,
    ledger: Arc<Mutex<Ledger>>,
}

impl WriteDestination for MemoryDelivery {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.fail_append {
            return Err(io::Error::other("append failed"));
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn commit(self) -> io::Result<()> {
        let mut ledger = self.ledger.lock().unwrap();
        if self.fail_commit {
            ledger.aborted.push((self.mailbox, self.buffer));
            return Err(io::Error::other("commit failed"));
        }
        ledger.committed.push((self.mailbox, self.buffer));
        Ok(())
    }

    fn abort(self) -> io::Result<()> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.aborted.push((self.mailbox, self.buffer));
        Ok(())
    }
}
