//! Minimal SMTP request.
//!
//! Implements just enough of the command dialogue to collect one message:
//! greeting, HELO/EHLO, MAIL, RCPT, DATA, RSET, NOOP and QUIT. Once the DATA
//! terminator arrives the request is processable until it is reset.

use crate::config::LimitsConfig;
use crate::net::transport::BoxedTransport;
use crate::protocol::base::RequestBase;
use crate::protocol::error::RequestError;

const DATA_TERMINATOR: &[u8] = b"\r\n.\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Command,
    Data,
}

/// SMTP request bound to one connection.
#[derive(Debug)]
pub struct SmtpRequest {
    base: RequestBase,
    server_name: String,
    buffer: Vec<u8>,
    mode: Mode,
    command: Option<String>,
    from: Option<String>,
    to: Vec<String>,
    body: Vec<u8>,
    can_process: bool,
    quit: bool,
}

impl SmtpRequest {
    pub fn new(transport: BoxedTransport, server_name: impl Into<String>) -> Self {
        Self {
            base: RequestBase::new(transport),
            server_name: server_name.into(),
            buffer: Vec::new(),
            mode: Mode::Command,
            command: None,
            from: None,
            to: Vec::new(),
            body: Vec::new(),
            can_process: false,
            quit: false,
        }
    }

    pub fn base(&self) -> &RequestBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut RequestBase {
        &mut self.base
    }

    /// Send the service-ready greeting.
    pub async fn send_ack(&mut self) -> Result<(), RequestError> {
        let greeting = format!("220 {} ESMTP ready", self.server_name);
        self.reply(&greeting).await
    }

    async fn reply(&mut self, line: &str) -> Result<(), RequestError> {
        let mut bytes = Vec::with_capacity(line.len() + 2);
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        self.base.write_all(&bytes).await
    }

    /// Read one command, or the whole message body while in DATA mode.
    pub async fn receive(&mut self, limits: &LimitsConfig) -> Result<(), RequestError> {
        match self.mode {
            Mode::Command => self.receive_command(limits).await,
            Mode::Data => self.receive_data(limits).await,
        }
    }

    async fn receive_command(&mut self, limits: &LimitsConfig) -> Result<(), RequestError> {
        let line = loop {
            if let Some(end) = find(&self.buffer, b"\r\n") {
                let line = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
                self.buffer.drain(..end + 2);
                break line;
            }
            if self.buffer.len() > limits.max_header_bytes {
                return Err(RequestError::HeadersTooLarge(limits.max_header_bytes));
            }
            if self.base.read_into(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    self.base.set_peer_closed();
                    return Ok(());
                }
                return Err(RequestError::UnexpectedEof);
            }
        };

        let (verb, argument) = match line.split_once(' ') {
            Some((verb, rest)) => (verb.to_ascii_uppercase(), rest.trim().to_string()),
            None => (line.trim().to_ascii_uppercase(), String::new()),
        };
        self.command = Some(verb.clone());

        match verb.as_str() {
            "HELO" | "EHLO" => {
                let reply = format!("250 {}", self.server_name);
                self.reply(&reply).await?;
            }
            "MAIL" => {
                self.from = Some(address_of(&argument));
                self.reply("250 OK").await?;
            }
            "RCPT" => {
                self.to.push(address_of(&argument));
                self.reply("250 OK").await?;
            }
            "DATA" => {
                if self.from.is_none() || self.to.is_empty() {
                    self.reply("503 Bad sequence of commands").await?;
                } else {
                    self.mode = Mode::Data;
                    self.reply("354 Start mail input; end with <CRLF>.<CRLF>")
                        .await?;
                }
            }
            "RSET" => {
                self.reset();
                self.reply("250 OK").await?;
            }
            "NOOP" => self.reply("250 OK").await?,
            "QUIT" => {
                self.quit = true;
                self.reply("221 Bye").await?;
            }
            _ => self.reply("500 Command unrecognised").await?,
        }

        self.base.complete_exchange();
        Ok(())
    }

    async fn receive_data(&mut self, limits: &LimitsConfig) -> Result<(), RequestError> {
        // An empty message arrives as a bare ".\r\n".
        let (body_end, consumed) = loop {
            if self.buffer.starts_with(b".\r\n") {
                break (0, 3);
            }
            if let Some(idx) = find(&self.buffer, DATA_TERMINATOR) {
                break (idx, idx + DATA_TERMINATOR.len());
            }
            if self.buffer.len() > limits.max_body_bytes {
                return Err(RequestError::BodyTooLarge(limits.max_body_bytes));
            }
            if self.base.read_into(&mut self.buffer).await? == 0 {
                return Err(RequestError::UnexpectedEof);
            }
        };

        self.body = unstuff(&self.buffer[..body_end]);
        self.buffer.drain(..consumed);
        self.mode = Mode::Command;
        self.can_process = true;
        self.reply("250 OK: message queued").await?;

        self.base.complete_exchange();
        Ok(())
    }

    /// Forget the current message so a new one can be collected.
    pub fn reset(&mut self) {
        self.mode = Mode::Command;
        self.from = None;
        self.to.clear();
        self.body.clear();
        self.can_process = false;
    }

    /// A full message has been received and not yet reset.
    pub fn can_process(&self) -> bool {
        self.can_process
    }

    pub fn is_keep_alive(&self) -> bool {
        !self.quit && !self.close_immediately()
    }

    pub fn close_immediately(&self) -> bool {
        self.base.peer_closed() || !self.base.is_ready()
    }

    /// Last command verb received, upper-cased.
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn recipients(&self) -> &[String] {
        &self.to
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Extract `addr` from `FROM:<addr>` / `TO:<addr>`.
fn address_of(argument: &str) -> String {
    let value = argument
        .split_once(':')
        .map(|(_, v)| v)
        .unwrap_or(argument)
        .trim();
    value
        .trim_start_matches('<')
        .split('>')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Undo dot-stuffing: a leading ".." on any line becomes ".".
fn unstuff(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut line_start = true;
    let mut i = 0;
    while i < raw.len() {
        if line_start && raw[i] == b'.' && raw.get(i + 1) == Some(&b'.') {
            i += 1;
        }
        let byte = raw[i];
        out.push(byte);
        line_start = byte == b'\n';
        i += 1;
    }
    out
}
