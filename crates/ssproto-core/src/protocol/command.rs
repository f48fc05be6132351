//! Typed device commands and their element trees.

use std::fmt;

use super::legacy::LegacyCommand;
use crate::ebml::{CodecError, ElementNode, Value};
use crate::schema::command::CLOCK_LEN;
use crate::schema::{ElementDescriptor, Registry};

/// One network entry for `SetWiFi`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiFiCredentials {
    pub ssid: String,
    /// `None` keeps the password already stored on the device.
    pub password: Option<String>,
    pub selected: bool,
}

impl WiFiCredentials {
    pub fn new(ssid: impl Into<String>, password: Option<&str>, selected: bool) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.map(str::to_string),
            selected,
        }
    }
}

/// A command the host can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bare two-byte command. `SetKeys` needs its key material, see [`Command::SetKeys`].
    Legacy(LegacyCommand),
    /// Legacy `sk` with its `KeyVals` payload.
    SetKeys(Vec<u8>),
    WiFiScan,
    ApplyPackage { path: String, reboot_after: bool },
    EspFirmware { path: String },
    SetWiFi(Vec<WiFiCredentials>),
    QueryWiFi,
    NetworkStatus,
    SetClock([u8; CLOCK_LEN]),
    GetClock,
    GetBattery,
    /// Payload is echoed back in `PingReply`.
    SendPing(Vec<u8>),
}

impl Command {
    /// Legacy commands are fire-and-forget; everything else is answered.
    pub fn expects_response(&self) -> bool {
        !self.is_legacy()
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Command::Legacy(_) | Command::SetKeys(_))
    }

    /// Element name of the command (the `EBMLCommand` child for structured ones).
    pub fn name(&self) -> &'static str {
        match self {
            Command::Legacy(cmd) => cmd.name(),
            Command::SetKeys(_) => LegacyCommand::SetKeys.name(),
            Command::WiFiScan => "WiFiScan",
            Command::ApplyPackage { .. } => "ApplyPackage",
            Command::EspFirmware { .. } => "ESPFW",
            Command::SetWiFi(_) => "SetWiFi",
            Command::QueryWiFi => "QueryWiFi",
            Command::NetworkStatus => "NetworkStatus",
            Command::SetClock(_) => "SetClock",
            Command::GetClock => "GetClock",
            Command::GetBattery => "GetBattery",
            Command::SendPing(_) => "SendPing",
        }
    }

    /// Build the top-level element for this command.
    pub fn to_node<'r>(&self, registry: &'r Registry) -> Result<ElementNode<'r>, CodecError> {
        match self {
            Command::Legacy(cmd) => Ok(ElementNode::master(
                registry.lookup(None, cmd.name())?,
                Vec::new(),
            )),
            Command::SetKeys(keys) => {
                let sk = registry.lookup(None, LegacyCommand::SetKeys.name())?;
                Ok(ElementNode::master(
                    sk,
                    vec![leaf(registry, sk, "KeyVals", Value::Binary(keys.clone()))?],
                ))
            }
            _ => {
                let root = registry.lookup(None, "EBMLCommand")?;
                let body = self.body(registry, root)?;
                Ok(ElementNode::master(root, vec![body]))
            }
        }
    }

    fn body<'r>(
        &self,
        registry: &'r Registry,
        root: &'r ElementDescriptor,
    ) -> Result<ElementNode<'r>, CodecError> {
        let desc = registry.lookup(Some(root), self.name())?;
        let node = match self {
            Command::ApplyPackage { path, reboot_after } => ElementNode::master(
                desc,
                vec![
                    leaf(registry, desc, "PackagePath", Value::String(path.clone()))?,
                    leaf(registry, desc, "RebootAfter", Value::UInteger(u64::from(*reboot_after)))?,
                ],
            ),
            Command::EspFirmware { path } => ElementNode::master(
                desc,
                vec![leaf(registry, desc, "PackagePath", Value::String(path.clone()))?],
            ),
            Command::SetWiFi(networks) => {
                let ap = registry.lookup(Some(desc), "AP")?;
                let mut entries = Vec::with_capacity(networks.len());
                for net in networks {
                    let mut fields = vec![leaf(registry, ap, "SSID", Value::Unicode(net.ssid.clone()))?];
                    if let Some(password) = &net.password {
                        fields.push(leaf(registry, ap, "Password", Value::Unicode(password.clone()))?);
                    }
                    fields.push(leaf(registry, ap, "Selected", Value::UInteger(u64::from(net.selected)))?);
                    entries.push(ElementNode::master(ap, fields));
                }
                ElementNode::master(desc, entries)
            }
            Command::SetClock(time) => ElementNode::new(desc, Value::Binary(time.to_vec())),
            Command::SendPing(payload) => ElementNode::new(desc, Value::Binary(payload.clone())),
            Command::WiFiScan
            | Command::QueryWiFi
            | Command::NetworkStatus
            | Command::GetClock
            | Command::GetBattery => ElementNode::master(desc, Vec::new()),
            Command::Legacy(_) | Command::SetKeys(_) => {
                return Err(CodecError::UnknownName {
                    name: self.name().to_string(),
                    parent: root.name.to_string(),
                });
            }
        };
        Ok(node)
    }

    /// Recover a command from a decoded top-level element.
    pub fn from_node(node: &ElementNode<'_>) -> Result<Self, CodecError> {
        let invalid = |element: &str, reason: &str| CodecError::InvalidPayload {
            element: element.to_string(),
            reason: reason.to_string(),
        };

        if node.descriptor.legacy {
            let cmd = u16::try_from(node.id)
                .ok()
                .and_then(LegacyCommand::from_tag)
                .ok_or_else(|| invalid(node.name(), "not a legacy command"))?;
            if cmd == LegacyCommand::SetKeys
                && let Some(keys) = node.child("KeyVals").and_then(ElementNode::as_bytes)
            {
                return Ok(Command::SetKeys(keys.to_vec()));
            }
            return Ok(Command::Legacy(cmd));
        }

        if node.name() != "EBMLCommand" {
            return Err(invalid(node.name(), "not a command"));
        }
        let body = node
            .children()
            .iter()
            .find(|c| !c.is_opaque())
            .ok_or_else(|| invalid("EBMLCommand", "empty command"))?;

        let path = |n: &ElementNode<'_>| {
            n.child("PackagePath")
                .and_then(ElementNode::as_str)
                .map(str::to_string)
                .ok_or_else(|| invalid(n.name(), "missing PackagePath"))
        };
        let flag = |n: &ElementNode<'_>, name: &str| {
            n.child(name).and_then(ElementNode::as_uint).unwrap_or(0) != 0
        };

        let cmd = match body.name() {
            "WiFiScan" => Command::WiFiScan,
            "ApplyPackage" => Command::ApplyPackage {
                path: path(body)?,
                reboot_after: flag(body, "RebootAfter"),
            },
            "ESPFW" => Command::EspFirmware { path: path(body)? },
            "SetWiFi" => Command::SetWiFi(
                body.children_named("AP")
                    .map(|ap| WiFiCredentials {
                        ssid: ap
                            .child("SSID")
                            .and_then(ElementNode::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        password: ap
                            .child("Password")
                            .and_then(ElementNode::as_str)
                            .map(str::to_string),
                        selected: flag(ap, "Selected"),
                    })
                    .collect(),
            ),
            "QueryWiFi" => Command::QueryWiFi,
            "NetworkStatus" => Command::NetworkStatus,
            "SetClock" => {
                let bytes = body.as_bytes().unwrap_or_default();
                let time = <[u8; CLOCK_LEN]>::try_from(bytes)
                    .map_err(|_| invalid("SetClock", "clock payload must be 10 bytes"))?;
                Command::SetClock(time)
            }
            "GetClock" => Command::GetClock,
            "GetBattery" => Command::GetBattery,
            "SendPing" => Command::SendPing(body.as_bytes().unwrap_or_default().to_vec()),
            other => return Err(invalid(other, "unsupported command")),
        };
        Ok(cmd)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Legacy(cmd) => write!(f, "{cmd}"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

fn leaf<'r>(
    registry: &'r Registry,
    parent: &'r ElementDescriptor,
    name: &str,
    value: Value<'r>,
) -> Result<ElementNode<'r>, CodecError> {
    Ok(ElementNode::new(registry.lookup(Some(parent), name)?, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml::{DecodeOptions, decode, encode};

    fn round_trip(cmd: Command) -> Command {
        let reg = Registry::command().unwrap();
        let bytes = encode(&cmd.to_node(reg).unwrap(), reg).unwrap();
        let decoded = decode(&bytes, reg, DecodeOptions::strict()).unwrap();
        assert_eq!(decoded.consumed, bytes.len());
        Command::from_node(decoded.first().unwrap()).unwrap()
    }

    #[test]
    fn test_reset_is_two_bytes() {
        let reg = Registry::command().unwrap();
        let node = Command::Legacy(LegacyCommand::Reset).to_node(reg).unwrap();
        assert_eq!(encode(&node, reg).unwrap(), vec![0x72, 0x74]);
    }

    #[test]
    fn test_legacy_decodes_bare() {
        let reg = Registry::command().unwrap();
        let decoded = decode(b"rs", reg, DecodeOptions::default()).unwrap();
        assert_eq!(
            Command::from_node(decoded.first().unwrap()).unwrap(),
            Command::Legacy(LegacyCommand::RecStart)
        );
    }

    #[test]
    fn test_structured_commands_survive() {
        let commands = [
            Command::WiFiScan,
            Command::QueryWiFi,
            Command::GetBattery,
            Command::ApplyPackage {
                path: "SYSTEM/update.pkg".into(),
                reboot_after: true,
            },
            Command::SetWiFi(vec![
                WiFiCredentials::new("office_wifi", Some("pass123"), true),
                WiFiCredentials::new("ssid_2", None, false),
            ]),
            Command::SetClock([1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
            Command::SendPing(vec![0xDE, 0xAD]),
            Command::SetKeys(vec![0x11; 32]),
        ];
        for cmd in commands {
            assert_eq!(round_trip(cmd.clone()), cmd);
        }
    }

    #[test]
    fn test_set_keys_needs_keys() {
        let reg = Registry::command().unwrap();
        let node = Command::Legacy(LegacyCommand::SetKeys).to_node(reg).unwrap();
        assert!(matches!(
            encode(&node, reg),
            Err(CodecError::StructureViolation(_))
        ));
    }

    #[test]
    fn test_expects_response() {
        assert!(!Command::Legacy(LegacyCommand::Reset).expects_response());
        assert!(!Command::SetKeys(vec![]).expects_response());
        assert!(Command::GetClock.expects_response());
    }
}
