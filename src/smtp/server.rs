//! SMTP server implementation

use crate::gateway::Hooks;
use crate::smtp::commands::SmtpCommandHandler;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn};

/// Idle time allowed between two reads before the connection is dropped
const READ_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Main SMTP server. Every connection gets its own thread and session; the
/// hooks are shared by all of them.
#[derive(Debug)]
pub struct SmtpServer<H> {
    /// Server hostname
    hostname: String,
    hooks: Arc<H>,
}

impl<H> Clone for SmtpServer<H> {
    fn clone(&self) -> Self {
        Self {
            hostname: self.hostname.clone(),
            hooks: Arc::clone(&self.hooks),
        }
    }
}

impl<H: Hooks + 'static> SmtpServer<H> {
    /// Create a new SMTP server
    pub fn new(hostname: &str, hooks: H) -> Self {
        Self {
            hostname: hostname.to_owned(),
            hooks: Arc::new(hooks),
        }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Start the server on the specified address (blocking)
    pub fn start(&self, addr: &str) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener)
    }

    /// Start the server with an existing listener (blocking)
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        info!(addr = %listener.local_addr()?, "SMTP server listening");

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let server = self.clone();
                    thread::spawn(move || {
                        if let Err(e) = server.handle_client(stream) {
                            warn!(error = %e, "Error handling client");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Error accepting connection");
                }
            }
        }

        Ok(())
    }

    /// Handle a client connection
    fn handle_client(&self, mut stream: TcpStream) -> Result<(), SmtpError> {
        let client = stream.peer_addr()?.ip();
        let span = info_span!("session", %client);
        let _enter = span.enter();

        if let Err(e) = self.hooks.on_connect(client) {
            // Refused clients get the error in place of the greeting
            self.send_response(&mut stream, &SmtpResponse::from(&e))?;
            return Ok(());
        }
        info!("Connection accepted");

        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        let command_handler = SmtpCommandHandler::new(&self.hostname, &*self.hooks, client);
        let mut session: SmtpSession<H::Envelope> = SmtpSession::new();
        let mut reader = BufReader::new(stream.try_clone()?);

        // Send greeting
        self.send_response(&mut stream, &SmtpResponse::greeting(&self.hostname))?;

        let mut line_buffer = Vec::new();
        loop {
            line_buffer.clear();

            match reader.read_until(b'\n', &mut line_buffer) {
                Ok(0) => {
                    if session.in_data_mode {
                        warn!("{}", SmtpError::ConnectionClosed);
                    }
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Error reading from client");
                    break;
                }
            }

            // Handle data mode specially
            if session.in_data_mode {
                if let Some(response) = self.handle_data_line(&line_buffer, &mut session) {
                    self.send_response(&mut stream, &response)?;
                }
                continue;
            }

            // Handle potential UTF-8 issues gracefully
            let line = String::from_utf8_lossy(&line_buffer);
            let command = line.trim();
            if command.is_empty() {
                continue;
            }

            let (response, close) = match command_handler.process_command(command, &mut session) {
                Ok(response) => {
                    let quit = response.code == 221;
                    (response, quit)
                }
                Err(e) => {
                    debug!(error = %e, "Command failed");
                    (SmtpResponse::from(&e), e.is_fatal())
                }
            };

            self.send_response(&mut stream, &response)?;
            if close {
                break;
            }
        }

        // Whatever is still open never reaches new/
        session.full_reset();
        debug!("Connection closed");
        Ok(())
    }

    /// Handle a raw line of data during DATA mode.
    ///
    /// Returns a response only once the terminating dot arrives.
    fn handle_data_line(
        &self,
        raw: &[u8],
        session: &mut SmtpSession<H::Envelope>,
    ) -> Option<SmtpResponse> {
        let line = raw.strip_suffix(b"\n").unwrap_or(raw);
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if line == b"." {
            let recipients = session.recipient_count();
            return Some(match session.finish_data_collection() {
                Ok(()) => {
                    info!(recipients, "Message delivered");
                    SmtpResponse::delivered()
                }
                Err(e) => {
                    warn!(error = %e, "Delivery failed");
                    SmtpResponse::from(&e)
                }
            });
        }

        // Dot-unstuffing
        let line = line.strip_prefix(b".").unwrap_or(line);
        session.add_data_line(line);
        None
    }

    /// Send a response to the client
    fn send_response(
        &self,
        stream: &mut TcpStream,
        response: &SmtpResponse,
    ) -> Result<(), SmtpError> {
        if response.is_error() {
            debug!(code = response.code, text = response.text(), "Replying with error");
        }

        // Ensure response doesn't exceed maximum line length
        let formatted = response.format();
        if formatted.len() > SmtpLimits::REPLY_LINE_MAX_LENGTH {
            // Truncate message if too long
            let truncated_response =
                SmtpResponse::new(response.code, "Response too long (truncated)");
            stream.write_all(truncated_response.format().as_bytes())?;
        } else {
            stream.write_all(formatted.as_bytes())?;
        }
        stream.flush()?;
        Ok(())
    }
}
