//! Stimulus Driver
//!
//! Line-oriented command input used by an external test harness to push
//! server-initiated signals at a connected client. Each line is a JSON
//! value: either `{"client": <role>, "action": <action>}` or the literal
//! string `"close"` to shut the relay down.
//!
//! A command naming a role with no bound connection is reported and
//! skipped, never fatal; the same goes for malformed lines.

use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::connection::protocol::{Role, ServerSignal};
use crate::registry::ConnectionRegistry;

/// Push actions the harness can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Action {
    #[serde(rename = "send-ping")]
    SendPing,
    #[serde(rename = "send-JSON-error")]
    SendJsonError,
    #[serde(rename = "send-js-error")]
    SendJsError,
}

/// A push command addressed at the connection bound to `client`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PushCommand {
    pub client: Role,
    pub action: Action,
}

/// One parsed input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Push(PushCommand),
    Close,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCommand {
    Word(String),
    Push(PushCommand),
}

/// Parse a single input line into a command.
pub fn parse_command(line: &str) -> Result<Command> {
    match serde_json::from_str(line)? {
        RawCommand::Word(word) if word == "close" => Ok(Command::Close),
        RawCommand::Word(word) => bail!("unknown command: {word}"),
        RawCommand::Push(push) => Ok(Command::Push(push)),
    }
}

/// Reads commands line by line and pushes the corresponding signals
/// through the registry.
pub struct StimulusDriver {
    registry: ConnectionRegistry,
}

impl StimulusDriver {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Run against stdin until a `close` command or end of input.
    pub async fn run(self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        self.run_on(stdin).await
    }

    /// Run against an arbitrary line source.
    pub async fn run_on<R: AsyncBufRead + Unpin>(&self, reader: R) -> Result<()> {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_command(line) {
                Ok(Command::Close) => {
                    info!("close command received");
                    break;
                }
                Ok(Command::Push(push)) => self.dispatch(push),
                Err(e) => warn!(error = %e, "ignoring malformed stimulus line"),
            }
        }
        Ok(())
    }

    fn dispatch(&self, push: PushCommand) {
        let Some(handle) = self.registry.lookup(push.client) else {
            warn!(role = %push.client, "no connection bound for stimulus target");
            return;
        };

        let signal = match push.action {
            Action::SendPing => ServerSignal::Ping(json!({"ping": "data"})),
            Action::SendJsonError => ServerSignal::Error(json!({"message": "error"})),
            Action::SendJsError => ServerSignal::Error(Value::String("Error: error".to_string())),
        };

        if handle.push(signal).is_err() {
            warn!(role = %push.client, "stimulus target disconnected");
        }
    }
}
