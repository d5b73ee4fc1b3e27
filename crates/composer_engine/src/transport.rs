use std::io::{self, Write};
use std::sync::Mutex;

use composer_core::protocol::{decode_event, encode_command};
use composer_core::{HostCommand, ProtocolError, SurfaceEvent};
use engine_logging::{engine_debug, engine_warn};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("surface transport closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Host→surface half of the message channel.
pub trait SurfaceSink: Send + Sync {
    fn deliver(&self, command: &HostCommand) -> Result<(), TransportError>;
}

/// Writes one JSON envelope per line.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> SurfaceSink for JsonLinesSink<W> {
    fn deliver(&self, command: &HostCommand) -> Result<(), TransportError> {
        let line = encode_command(command)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| TransportError::Closed)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Forwards commands to an in-process receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<HostCommand>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SurfaceSink for ChannelSink {
    fn deliver(&self, command: &HostCommand) -> Result<(), TransportError> {
        self.tx.send(command.clone()).map_err(|_| TransportError::Closed)
    }
}

/// One line read from the host's inbound stream.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundLine {
    /// Validated surface envelope.
    Surface(SurfaceEvent),
    /// Host-side control object, recognised by its `action` key.
    Control(Value),
}

/// Reads the inbound stream line by line, handing every accepted line to `on_line`.
///
/// Malformed, unversioned or unknown surface envelopes are logged and skipped.
/// Returns the number of rejected lines once the stream ends or `on_line`
/// returns `false`.
pub async fn read_inbound<R, F>(reader: R, mut on_line: F) -> Result<usize, TransportError>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(InboundLine) -> bool,
{
    let mut lines = reader.lines();
    let mut rejected = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match classify(line) {
            Ok(inbound) => {
                engine_debug!("inbound {:?}", inbound);
                if !on_line(inbound) {
                    break;
                }
            }
            Err(err) => {
                rejected += 1;
                engine_warn!("rejected inbound line: {}", err);
            }
        }
    }
    Ok(rejected)
}

fn classify(line: &str) -> Result<InboundLine, ProtocolError> {
    if let Ok(value) = serde_json::from_str::<Value>(line) {
        if value.get("action").is_some() {
            return Ok(InboundLine::Control(value));
        }
    }
    decode_event(line).map(InboundLine::Surface)
}

#[cfg(test)]
mod tests {
    use super::*;
    use composer_core::protocol::decode_command;

    #[tokio::test]
    async fn inbound_lines_are_validated_and_routed() {
        let input = concat!(
            "{\"v\":1,\"type\":\"ready\"}\n",
            "not json\n",
            "\n",
            "{\"v\":2,\"type\":\"ready\"}\n",
            "{\"v\":1,\"type\":\"explode\"}\n",
            "{\"action\":\"quit\"}\n",
            "{\"v\":1,\"type\":\"element-deselected\",\"id\":\"gen-1\"}\n",
        );
        let mut seen = Vec::new();
        let rejected = read_inbound(input.as_bytes(), |line| {
            seen.push(line);
            true
        })
        .await
        .unwrap();

        assert_eq!(rejected, 3);
        assert_eq!(
            seen,
            vec![
                InboundLine::Surface(SurfaceEvent::Ready),
                InboundLine::Control(serde_json::json!({"action": "quit"})),
                InboundLine::Surface(SurfaceEvent::ElementDeselected { id: "gen-1".into() }),
            ]
        );
    }

    #[test]
    fn json_lines_sink_writes_one_envelope_per_line() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.deliver(&HostCommand::DeleteElement { id: "ph-1".into() })
            .unwrap();
        sink.deliver(&HostCommand::QuerySelection).unwrap();

        let written = String::from_utf8(sink.into_inner()).unwrap();
        let commands: Vec<_> = written
            .lines()
            .map(|line| decode_command(line).unwrap())
            .collect();
        assert_eq!(
            commands,
            vec![
                HostCommand::DeleteElement { id: "ph-1".into() },
                HostCommand::QuerySelection,
            ]
        );
    }
}
