use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use letterbox::{Args, Config, Gateway, Maildirs, SmtpServer};

/// Install the global subscriber. `RUST_LOG` overrides the level picked by
/// `--debug`.
///
/// The returned guard flushes the log file when dropped.
fn init_logs(args: &Args) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match &args.log {
        Some(path) => {
            let file = open_log_file(path)
                .with_context(|| format!("Error opening logfile {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            registry
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
            Ok(None)
        }
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn server_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = init_logs(&args)?;

    let config = Config::load(&args.config)
        .with_context(|| format!("Error reading config file {}", args.config.display()))?;

    let addr = args.listen_addr();
    info!(%addr, maildirs = %args.maildirs.display(), "Starting letterbox");

    let allowlist = config.allowlist();
    for host in allowlist.hosts() {
        info!(%host, "Allowed host");
    }
    for network in allowlist.networks() {
        info!(%network, "Allowed network");
    }
    if allowlist.is_empty() {
        warn!("No allowed hosts, every connection will be rejected");
    }

    let whitelist = config.whitelist();
    if whitelist.is_empty() {
        warn!("No recipient addresses, every recipient will be rejected");
    }

    let gateway = Gateway::new(allowlist, whitelist, Maildirs::new(&args.maildirs));
    let server = SmtpServer::new(&server_hostname(), gateway);
    server
        .start(&addr)
        .with_context(|| format!("Failed to listen on {addr}"))?;

    Ok(())
}
