//! Mailbox storage
//!
//! The delivery coordinator only sees the [`MailboxStore`] and
//! [`WriteDestination`] traits. [`Maildirs`] implements them on top of a
//! directory of Maildirs: a delivery is written to `tmp/` and renamed into
//! `new/` on commit, so a partially written message is never visible.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;
use uuid::Uuid;

/// An in-progress delivery to one mailbox
pub trait WriteDestination {
    /// Append bytes to the message
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Make the message visible in the mailbox
    fn commit(self) -> io::Result<()>;

    /// Discard everything written so far
    fn abort(self) -> io::Result<()>;
}

/// A collection of mailboxes addressed by local name
pub trait MailboxStore {
    type Destination: WriteDestination;

    fn create_if_absent(&self, mailbox: &str) -> io::Result<()>;

    fn open_delivery(&self, mailbox: &str) -> io::Result<Self::Destination>;
}

const SUBDIRS: [&str; 3] = ["tmp", "new", "cur"];

/// Maildirs stored under a common root, one per local name
#[derive(Debug, Clone)]
pub struct Maildirs {
    root: PathBuf,
    hostname: String,
}

impl Maildirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hostname: maildir_hostname(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the Maildir for a local name
    pub fn path(&self, mailbox: &str) -> PathBuf {
        self.root.join(mailbox)
    }

    fn unique_name(&self) -> String {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        format!("{secs}.{}.{}", Uuid::new_v4().simple(), self.hostname)
    }
}

impl MailboxStore for Maildirs {
    type Destination = MaildirDelivery;

    fn create_if_absent(&self, mailbox: &str) -> io::Result<()> {
        let dir = self.path(mailbox);
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        for sub in SUBDIRS {
            builder.create(dir.join(sub))?;
        }
        Ok(())
    }

    fn open_delivery(&self, mailbox: &str) -> io::Result<MaildirDelivery> {
        let dir = self.path(mailbox);
        let name = self.unique_name();
        let tmp_path = dir.join("tmp").join(&name);
        let new_path = dir.join("new").join(&name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        debug!(path = %tmp_path.display(), "Opened delivery");

        Ok(MaildirDelivery {
            file,
            tmp_path,
            new_path,
        })
    }
}

/// A message being written into a Maildir's `tmp/` directory
#[derive(Debug)]
pub struct MaildirDelivery {
    file: File,
    tmp_path: PathBuf,
    new_path: PathBuf,
}

impl MaildirDelivery {
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    pub fn new_path(&self) -> &Path {
        &self.new_path
    }

    /// Send appended bytes to `file` instead, keeping the Maildir paths
    #[cfg(test)]
    pub(crate) fn with_file(self, file: File) -> Self {
        Self { file, ..self }
    }
}

impl WriteDestination for MaildirDelivery {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    fn commit(self) -> io::Result<()> {
        let MaildirDelivery {
            file,
            tmp_path,
            new_path,
        } = self;

        let moved = file
            .sync_all()
            .and_then(|()| fs::rename(&tmp_path, &new_path));
        if let Err(e) = moved {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        debug!(path = %new_path.display(), "Committed delivery");
        Ok(())
    }

    fn abort(self) -> io::Result<()> {
        let MaildirDelivery { file, tmp_path, .. } = self;
        drop(file);
        fs::remove_file(&tmp_path)
    }
}

/// Hostname for unique file names, with `/` and `:` escaped as Maildir requires
fn maildir_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .map(|name| name.replace('/', "\\057").replace(':', "\\072"))
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entries(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[test]
    fn test_create_if_absent() {
        let root = tempdir().unwrap();
        let store = Maildirs::new(root.path());

        store.create_if_absent("user").unwrap();
        // Creating again is fine
        store.create_if_absent("user").unwrap();

        for sub in SUBDIRS {
            assert!(root.path().join("user").join(sub).is_dir());
        }
    }

    #[test]
    fn test_create_missing_root() {
        let root = tempdir().unwrap();
        let store = Maildirs::new(root.path().join("spool").join("maildirs"));

        store.create_if_absent("user").unwrap();
        assert!(store.path("user").join("new").is_dir());
    }

    #[test]
    fn test_commit_moves_into_new() {
        let root = tempdir().unwrap();
        let store = Maildirs::new(root.path());
        store.create_if_absent("user").unwrap();

        let mut delivery = store.open_delivery("user").unwrap();
        let tmp_path = delivery.tmp_path().to_path_buf();
        let new_path = delivery.new_path().to_path_buf();
        assert!(tmp_path.exists());

        delivery.append(b"Subject: x\n").unwrap();
        delivery.append(b"\n").unwrap();
        delivery.append(b"body\n").unwrap();
        delivery.commit().unwrap();

        assert!(!tmp_path.exists());
        assert_eq!(fs::read(&new_path).unwrap(), b"Subject: x\n\nbody\n");
        assert!(entries(&store.path("user").join("tmp")).is_empty());
    }

    #[test]
    fn test_abort_removes_tmp_file() {
        let root = tempdir().unwrap();
        let store = Maildirs::new(root.path());
        store.create_if_absent("user").unwrap();

        let mut delivery = store.open_delivery("user").unwrap();
        delivery.append(b"partial").unwrap();
        delivery.abort().unwrap();

        assert!(entries(&store.path("user").join("tmp")).is_empty());
        assert!(entries(&store.path("user").join("new")).is_empty());
    }

    #[test]
    fn test_append_reaches_disk_before_commit() {
        let root = tempdir().unwrap();
        let store = Maildirs::new(root.path());
        store.create_if_absent("user").unwrap();

        let mut delivery = store.open_delivery("user").unwrap();
        let line = b"Subject: a short line that fits any buffer\n";
        for _ in 0..50 {
            delivery.append(line).unwrap();
        }

        let on_disk = fs::metadata(delivery.tmp_path()).unwrap().len();
        assert_eq!(on_disk, (line.len() * 50) as u64);
        delivery.abort().unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_append_error_is_immediate() {
        let root = tempdir().unwrap();
        let store = Maildirs::new(root.path());
        store.create_if_absent("user").unwrap();

        let full = OpenOptions::new().write(true).open("/dev/full").unwrap();
        let mut delivery = store.open_delivery("user").unwrap().with_file(full);

        assert!(delivery.append(b"x\n").is_err());
        delivery.abort().unwrap();
        assert!(entries(&store.path("user").join("tmp")).is_empty());
    }

    #[test]
    fn test_failed_rename_removes_tmp_file() {
        let root = tempdir().unwrap();
        let store = Maildirs::new(root.path());
        store.create_if_absent("user").unwrap();

        let mut delivery = store.open_delivery("user").unwrap();
        delivery.append(b"body\n").unwrap();
        fs::remove_dir(store.path("user").join("new")).unwrap();

        assert!(delivery.commit().is_err());
        assert!(entries(&store.path("user").join("tmp")).is_empty());
    }

    #[test]
    fn test_unique_names() {
        let root = tempdir().unwrap();
        let store = Maildirs::new(root.path());
        store.create_if_absent("user").unwrap();

        let first = store.open_delivery("user").unwrap();
        let second = store.open_delivery("user").unwrap();
        assert_ne!(first.tmp_path(), second.tmp_path());

        first.commit().unwrap();
        second.commit().unwrap();
        assert_eq!(entries(&store.path("user").join("new")).len(), 2);
    }

    #[test]
    fn test_open_without_maildir_fails() {
        let root = tempdir().unwrap();
        let store = Maildirs::new(root.path());

        assert!(store.open_delivery("missing").is_err());
    }

    #[test]
    fn test_create_under_file_fails() {
        let root = tempdir().unwrap();
        let file = root.path().join("not-a-dir");
        fs::write(&file, b"").unwrap();
        let store = Maildirs::new(&file);

        assert!(store.create_if_absent("user").is_err());
    }

    #[test]
    fn test_hostname_has_no_separators() {
        let name = maildir_hostname();
        assert!(!name.is_empty());
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
    }
}
