//! Gateway configuration file

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::gateway::{Allowlist, RecipientWhitelist};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Contents of the TOML configuration file.
///
/// ```toml
/// hosts = ["192.168.101.0/24", "fozzy.example.com", "192.168.103.15"]
/// emails = ["user@domain.com", "root@domain.com"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Clients allowed to connect: addresses, CIDR networks or hostnames
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Recipient addresses that get a mailbox
    #[serde(default)]
    pub emails: Vec<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    pub fn from_reader(mut reader: impl Read) -> Result<Self, ConfigError> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|source| ConfigError::Read {
                path: PathBuf::from("<reader>"),
                source,
            })?;
        content.parse()
    }

    /// Resolve `hosts` into an allowlist. Hostnames are looked up once, here.
    pub fn allowlist(&self) -> Allowlist {
        Allowlist::from_hosts(&self.hosts)
    }

    pub fn whitelist(&self) -> RecipientWhitelist {
        RecipientWhitelist::from_addresses(self.emails.iter().cloned())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}
