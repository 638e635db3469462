use std::net::IpAddr;
use std::path::PathBuf;

/// SMTP to Maildir delivery gateway
#[derive(Debug, Clone, clap::Parser)]
#[command(version, about)]
pub struct Args {
    /// Path of the TOML configuration file
    #[arg(short, long, default_value = "letterbox.toml")]
    pub config: PathBuf,

    /// Address to listen on, all interfaces when empty
    #[arg(long, default_value = "")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 2525)]
    pub port: u16,

    /// Root directory holding one Maildir per recipient
    #[arg(short, long, default_value = "/var/spool/maildirs")]
    pub maildirs: PathBuf,

    /// Append logs to this file instead of stderr
    #[arg(short, long)]
    pub log: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Args {
    /// The `host:port` pair to bind
    pub fn listen_addr(&self) -> String {
        match self.host.as_str() {
            "" => format!("0.0.0.0:{}", self.port),
            host if host.parse::<IpAddr>().is_ok_and(|ip| ip.is_ipv6()) => {
                format!("[{host}]:{}", self.port)
            }
            host => format!("{host}:{}", self.port),
        }
    }
}
