//! Line-oriented request/response link to the actuator board.

use std::time::Duration;

use async_trait::async_trait;
use smartcam_core::config::ActuatorConfig;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::Instant;

use crate::command::{ActuatorCommand, ActuatorReply};
use crate::error::ActuatorError;

/// Upper bound on establishing a TCP connection to a networked board.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A command channel to the actuator. At most one command is in flight:
/// `send` takes `&mut self` and returns only once both reply lines arrived.
#[async_trait]
pub trait ActuatorLink: Send {
    async fn send(&mut self, command: ActuatorCommand) -> Result<ActuatorReply, ActuatorError>;

    /// Port or address this link talks to, for logs.
    fn endpoint(&self) -> &str;
}

#[async_trait]
impl<L: ActuatorLink + ?Sized> ActuatorLink for Box<L> {
    async fn send(&mut self, command: ActuatorCommand) -> Result<ActuatorReply, ActuatorError> {
        (**self).send(command).await
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }
}

// ── Stream-backed link ────────────────────────────────────────

/// Speaks the actuator protocol over any byte stream.
///
/// Each command is written as one `\n`-terminated line and answered by two
/// non-blank lines (ack, then state). Blank lines are skipped. Each reply
/// line must arrive within `line_timeout`.
///
/// The board answers strictly in order, so reply lines a failed command
/// never received are still owed. They are read and discarded ahead of the
/// next reply instead of being taken as its answer.
pub struct LineActuator<R, W> {
    reader: BufReader<R>,
    writer: W,
    line_timeout: Duration,
    endpoint: String,
    /// Bytes of a reply line whose read was cut off by a timeout.
    partial: Vec<u8>,
    /// Reply lines still due for earlier commands.
    owed: usize,
}

enum LineOutcome {
    Line(String),
    Eof,
    TimedOut,
}

impl<R, W> LineActuator<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, line_timeout: Duration, endpoint: impl Into<String>) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            line_timeout,
            endpoint: endpoint.into(),
            partial: Vec::new(),
            owed: 0,
        }
    }

    /// Reply lines owed by earlier commands that failed mid-reply.
    pub fn owed_lines(&self) -> usize {
        self.owed
    }

    /// Drop output nobody asked for. Only runs when no reply is owed, and
    /// never waits: whatever is readable right now is discarded.
    async fn discard_unsolicited(&mut self) -> Result<(), ActuatorError> {
        let mut dropped = std::mem::take(&mut self.partial).len();
        loop {
            let ready = match tokio::time::timeout(Duration::ZERO, self.reader.fill_buf()).await {
                Ok(Ok(buf)) => buf.len(),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => 0,
            };
            if ready == 0 {
                break;
            }
            self.reader.consume(ready);
            dropped += ready;
        }
        if dropped > 0 {
            tracing::debug!(endpoint = %self.endpoint, bytes = dropped, "discarding unsolicited actuator output");
        }
        Ok(())
    }

    /// Read and drop the lines still owed to earlier commands.
    async fn skip_owed(&mut self, command: ActuatorCommand) -> Result<(), ActuatorError> {
        while self.owed > 0 {
            match self.next_line(command).await {
                Ok(LineOutcome::Line(line)) => {
                    self.owed -= 1;
                    tracing::debug!(endpoint = %self.endpoint, %line, "dropping late reply line");
                }
                Ok(LineOutcome::Eof) => return Err(ActuatorError::ShortReply { command, got: 0 }),
                Ok(LineOutcome::TimedOut) => {
                    self.owed += 2;
                    return Err(ActuatorError::Timeout {
                        command,
                        after: self.line_timeout,
                    });
                }
                Err(ActuatorError::Malformed { .. }) => self.owed -= 1,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn next_line(&mut self, command: ActuatorCommand) -> Result<LineOutcome, ActuatorError> {
        let deadline = Instant::now() + self.line_timeout;
        loop {
            // `partial` survives a timeout, so a line cut off mid-read is
            // completed on the next call instead of split in two.
            let read = tokio::time::timeout_at(deadline, self.reader.read_until(b'\n', &mut self.partial)).await;
            let n = match read {
                Ok(result) => result?,
                Err(_) => return Ok(LineOutcome::TimedOut),
            };
            if n == 0 && self.partial.is_empty() {
                return Ok(LineOutcome::Eof);
            }
            let buf = std::mem::take(&mut self.partial);
            if n == 0 {
                tracing::debug!(endpoint = %self.endpoint, bytes = buf.len(), "stream ended mid-line");
            }
            let line = String::from_utf8(buf).map_err(|_| ActuatorError::Malformed {
                command,
                reason: "reply is not valid UTF-8".into(),
            })?;
            let line = line.trim();
            if !line.is_empty() {
                return Ok(LineOutcome::Line(line.to_string()));
            }
            if n == 0 {
                return Ok(LineOutcome::Eof);
            }
        }
    }

    async fn read_reply(&mut self, command: ActuatorCommand) -> Result<ActuatorReply, ActuatorError> {
        let ack = match self.next_line(command).await {
            Ok(LineOutcome::Line(line)) => line,
            Ok(LineOutcome::Eof) => return Err(ActuatorError::ShortReply { command, got: 0 }),
            Ok(LineOutcome::TimedOut) => {
                self.owed += 2;
                return Err(ActuatorError::Timeout {
                    command,
                    after: self.line_timeout,
                });
            }
            Err(e) => {
                if matches!(e, ActuatorError::Malformed { .. }) {
                    self.owed += 1;
                }
                return Err(e);
            }
        };
        let state = match self.next_line(command).await? {
            LineOutcome::Line(line) => line,
            LineOutcome::Eof => return Err(ActuatorError::ShortReply { command, got: 1 }),
            LineOutcome::TimedOut => {
                self.owed += 1;
                return Err(ActuatorError::ShortReply { command, got: 1 });
            }
        };

        if ack.starts_with("ERR") {
            return Err(ActuatorError::Rejected { command, ack });
        }
        Ok(ActuatorReply { ack, state })
    }
}

#[async_trait]
impl<R, W> ActuatorLink for LineActuator<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, command: ActuatorCommand) -> Result<ActuatorReply, ActuatorError> {
        if self.owed == 0 {
            self.discard_unsolicited().await?;
        }

        let line = format!("{}\n", command.wire());
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        tracing::debug!(endpoint = %self.endpoint, %command, owed = self.owed, "actuator command sent");

        self.skip_owed(command).await?;
        let reply = self.read_reply(command).await?;
        tracing::debug!(endpoint = %self.endpoint, %command, ack = %reply.ack, state = %reply.state, "actuator replied");
        Ok(reply)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Open the link described by `config`.
///
/// `tcp://host:port` connects to a networked board or serial bridge;
/// anything else is opened as a device path. The serial line settings
/// (baud rate, raw mode) must already be configured on the device, e.g.
/// with `stty -F /dev/ttyACM0 9600 raw -echo`. After opening, the call
/// waits `settle_ms` because boards reset when the port opens.
pub async fn open_link(config: &ActuatorConfig) -> Result<Box<dyn ActuatorLink>, ActuatorError> {
    let port = config.port.as_str();
    let line_timeout = Duration::from_millis(config.line_timeout_ms);
    let open_err = |source: std::io::Error| ActuatorError::Open {
        port: port.to_string(),
        source,
    };

    let link: Box<dyn ActuatorLink> = if let Some(addr) = port.strip_prefix("tcp://") {
        if addr.is_empty() {
            return Err(ActuatorError::Address(port.to_string()));
        }
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, tokio::net::TcpStream::connect(addr))
            .await
            .map_err(|_| open_err(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")))?
            .map_err(open_err)?;
        let (reader, writer) = stream.into_split();
        Box::new(LineActuator::new(reader, writer, line_timeout, port))
    } else {
        let device = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(port)
            .await
            .map_err(open_err)?;
        let writer = device.try_clone().await.map_err(open_err)?;
        Box::new(LineActuator::new(device, writer, line_timeout, port))
    };

    tracing::info!(port, settle_ms = config.settle_ms, "actuator link opened");
    if config.settle_ms > 0 {
        tokio::time::sleep(Duration::from_millis(config.settle_ms)).await;
    }
    Ok(link)
}

// ── Simulated board ───────────────────────────────────────────

/// In-process stand-in for the board, used for dry runs.
///
/// Always acknowledges and tracks arm/alarm state the way the board does.
#[derive(Debug, Default)]
pub struct DryRunLink {
    armed: bool,
    alarm: bool,
    sent: Vec<ActuatorCommand>,
}

impl DryRunLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command received so far, in order.
    pub fn sent(&self) -> &[ActuatorCommand] {
        &self.sent
    }

    fn state_line(&self) -> String {
        format!(
            "ARMED:{} ALARM:{}",
            u8::from(self.armed),
            if self.alarm { "ON" } else { "OFF" }
        )
    }
}

#[async_trait]
impl ActuatorLink for DryRunLink {
    async fn send(&mut self, command: ActuatorCommand) -> Result<ActuatorReply, ActuatorError> {
        self.sent.push(command);
        match command {
            ActuatorCommand::Status => {}
            ActuatorCommand::Arm => self.armed = true,
            ActuatorCommand::Disarm => self.armed = false,
            ActuatorCommand::AlarmOn => self.alarm = true,
            ActuatorCommand::AlarmOff => self.alarm = false,
        }
        tracing::info!(%command, "dry run: actuator command");
        Ok(ActuatorReply {
            ack: format!("OK {}", command.wire()),
            state: self.state_line(),
        })
    }

    fn endpoint(&self) -> &str {
        "dry-run"
    }
}
