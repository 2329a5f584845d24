use serde::{Deserialize, Serialize};

use crate::models::DEFAULT_INTERVAL_MS;
use crate::registry::{RegistryError, TargetRegistry};

/// A validated control-channel command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add {
        name: String,
        host: String,
        interval_ms: u64,
    },
    Del {
        name: String,
    },
    Set {
        name: String,
        interval_ms: u64,
    },
}

/// Wire shape of a command datagram. Unrelated keys are ignored.
#[derive(Debug, Serialize, Deserialize)]
struct CommandFrame {
    #[serde(default)]
    cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    itvl: Option<u64>,
}

impl Command {
    /// Parse and validate one datagram. Malformed JSON, unknown verbs
    /// and missing required fields all yield `None`; there is no error
    /// reply on this channel.
    pub fn parse(buf: &[u8]) -> Option<Command> {
        let frame: CommandFrame = serde_json::from_slice(buf).ok()?;
        let name = frame.name.filter(|n| !n.is_empty());
        match frame.cmd.as_str() {
            "add" => Some(Command::Add {
                name: name?,
                host: frame.host.filter(|h| !h.is_empty())?,
                // An explicit itvl is taken as-is, zero included.
                interval_ms: frame.itvl.unwrap_or(DEFAULT_INTERVAL_MS),
            }),
            "del" => Some(Command::Del { name: name? }),
            "set" => Some(Command::Set {
                name: name?,
                interval_ms: frame.itvl.filter(|ms| *ms > 0)?,
            }),
            _ => None,
        }
    }

    /// Serialize for the wire, used by remote senders (viewer console,
    /// HTTP relay).
    pub fn encode(&self) -> Vec<u8> {
        let frame = match self {
            Command::Add {
                name,
                host,
                interval_ms,
            } => CommandFrame {
                cmd: "add".into(),
                name: Some(name.clone()),
                host: Some(host.clone()),
                itvl: Some(*interval_ms),
            },
            Command::Del { name } => CommandFrame {
                cmd: "del".into(),
                name: Some(name.clone()),
                host: None,
                itvl: None,
            },
            Command::Set { name, interval_ms } => CommandFrame {
                cmd: "set".into(),
                name: Some(name.clone()),
                host: None,
                itvl: Some(*interval_ms),
            },
        };
        serde_json::to_vec(&frame).unwrap_or_default()
    }
}

pub fn apply(registry: &mut TargetRegistry, cmd: &Command) -> Result<(), RegistryError> {
    match cmd {
        Command::Add {
            name,
            host,
            interval_ms,
        } => registry.add(name, host, *interval_ms),
        Command::Del { name } => registry.remove(name).map(|_| ()),
        Command::Set { name, interval_ms } => registry.set_interval(name, *interval_ms),
    }
}
