//! Typed view of an `EBMLResponse`.
//!
//! Every sub-response is optional. The device only sends what is meaningful
//! for its state, e.g. `RSSI` only while connected.

use std::fmt;

use super::constants::{AP_DEFAULT_AUTH_TYPE, AP_DEFAULT_RSSI};
use crate::ebml::{CodecError, ElementNode};

/// `WiFiConnectionStatus` / `CurrentWiFiStatus` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WiFiConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Other(u64),
}

impl From<u64> for WiFiConnectionStatus {
    fn from(value: u64) -> Self {
        match value {
            0 => WiFiConnectionStatus::Idle,
            1 => WiFiConnectionStatus::Connecting,
            2 => WiFiConnectionStatus::Connected,
            other => WiFiConnectionStatus::Other(other),
        }
    }
}

impl fmt::Display for WiFiConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WiFiConnectionStatus::Idle => write!(f, "idle"),
            WiFiConnectionStatus::Connecting => write!(f, "connecting"),
            WiFiConnectionStatus::Connected => write!(f, "connected"),
            WiFiConnectionStatus::Other(v) => write!(f, "status {v}"),
        }
    }
}

/// One access point from a scan, with absent fields defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String,
    pub rssi: i64,
    /// 0 for open networks, 1 for any authentication.
    pub auth_type: u64,
    /// The device has a stored password for this network.
    pub known: bool,
    pub selected: bool,
}

impl AccessPoint {
    fn from_node(node: &ElementNode<'_>) -> Self {
        let flag = |name: &str| node.child(name).and_then(ElementNode::as_uint).unwrap_or(0) != 0;
        Self {
            ssid: node
                .child("SSID")
                .and_then(ElementNode::as_str)
                .unwrap_or_default()
                .to_string(),
            rssi: node
                .child("RSSI")
                .and_then(ElementNode::as_int)
                .unwrap_or(AP_DEFAULT_RSSI),
            auth_type: node
                .child("AuthType")
                .and_then(ElementNode::as_uint)
                .unwrap_or(AP_DEFAULT_AUTH_TYPE),
            known: flag("Known"),
            selected: flag("Selected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiFiScanResult {
    pub scan_version: Option<u64>,
    pub access_points: Vec<AccessPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiFiQueryResult {
    pub ssid: Option<String>,
    pub status: WiFiConnectionStatus,
    /// Only reported while idle after a failure.
    pub error: Option<u64>,
    /// Only reported while connected.
    pub rssi: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStatus {
    pub ipv4: Option<[u8; 4]>,
    pub mac: Vec<u8>,
    pub wifi_status: Option<WiFiConnectionStatus>,
}

/// A decoded device response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceResponse {
    pub response_idx: u64,
    pub queue_depth: u64,
    pub wifi_scan: Option<WiFiScanResult>,
    pub wifi_query: Option<WiFiQueryResult>,
    pub network_status: Option<NetworkStatus>,
    pub clock_time: Option<Vec<u8>>,
    pub battery_state: Option<u64>,
    pub ping_reply: Option<Vec<u8>>,
    pub status_code: Option<i64>,
    pub status_message: Option<String>,
}

impl DeviceResponse {
    /// Read an `EBMLResponse` node. `ResponseIdx` and `CMDQueueDepth` are required.
    pub fn from_node(node: &ElementNode<'_>) -> Result<Self, CodecError> {
        let required = |name: &str| {
            node.child(name)
                .and_then(ElementNode::as_uint)
                .ok_or_else(|| CodecError::InvalidPayload {
                    element: node.name().to_string(),
                    reason: format!("missing {name}"),
                })
        };
        let uint = |n: &ElementNode<'_>, name: &str| n.child(name).and_then(ElementNode::as_uint);
        let text = |n: &ElementNode<'_>, name: &str| {
            n.child(name)
                .and_then(ElementNode::as_str)
                .map(str::to_string)
        };
        let bytes = |name: &str| {
            node.child(name)
                .and_then(ElementNode::as_bytes)
                .map(<[u8]>::to_vec)
        };

        Ok(Self {
            response_idx: required("ResponseIdx")?,
            queue_depth: required("CMDQueueDepth")?,
            wifi_scan: node.child("WiFiScanResult").map(|scan| WiFiScanResult {
                scan_version: uint(scan, "ScanVersion"),
                access_points: scan.children_named("AP").map(AccessPoint::from_node).collect(),
            }),
            wifi_query: node.child("QueryWiFiResponse").map(|query| WiFiQueryResult {
                ssid: text(query, "SSID"),
                status: uint(query, "WiFiConnectionStatus")
                    .map_or(WiFiConnectionStatus::Idle, WiFiConnectionStatus::from),
                error: uint(query, "WiFiConnectionError"),
                rssi: query.child("RSSI").and_then(ElementNode::as_int),
            }),
            network_status: node.child("NetworkStatusResponse").map(|net| NetworkStatus {
                ipv4: net
                    .child("IPV4Address")
                    .and_then(ElementNode::as_bytes)
                    .and_then(|b| <[u8; 4]>::try_from(b).ok()),
                mac: net
                    .child("MACAddress")
                    .and_then(ElementNode::as_bytes)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default(),
                wifi_status: uint(net, "CurrentWiFiStatus").map(WiFiConnectionStatus::from),
            }),
            clock_time: bytes("ClockTime"),
            battery_state: uint(node, "BatteryState"),
            ping_reply: bytes("PingReply"),
            status_code: node.child("DeviceStatusCode").and_then(ElementNode::as_int),
            status_message: text(node, "DeviceStatusMessage"),
        })
    }

    /// Access points from a scan; empty when the scan found none.
    pub fn access_points(&self) -> &[AccessPoint] {
        self.wifi_scan
            .as_ref()
            .map(|scan| scan.access_points.as_slice())
            .unwrap_or_default()
    }
}

impl fmt::Display for DeviceResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ResponseIdx: {}", self.response_idx)?;
        writeln!(f, "CMDQueueDepth: {}", self.queue_depth)?;
        for ap in self.access_points() {
            writeln!(
                f,
                "AP: {:?} rssi={} auth={} known={} selected={}",
                ap.ssid, ap.rssi, ap.auth_type, ap.known, ap.selected
            )?;
        }
        if let Some(query) = &self.wifi_query {
            write!(f, "WiFi: {}", query.status)?;
            if let Some(ssid) = &query.ssid {
                write!(f, " ssid={ssid:?}")?;
            }
            if let Some(rssi) = query.rssi {
                write!(f, " rssi={rssi}")?;
            }
            if let Some(error) = query.error {
                write!(f, " error={error}")?;
            }
            writeln!(f)?;
        }
        if let Some(net) = &self.network_status {
            let mac: Vec<String> = net.mac.iter().map(|b| format!("{b:02X}")).collect();
            write!(f, "MAC: {}", mac.join(":"))?;
            if let Some([a, b, c, d]) = net.ipv4 {
                write!(f, " IPv4: {a}.{b}.{c}.{d}")?;
            }
            writeln!(f)?;
        }
        if let Some(clock) = &self.clock_time {
            writeln!(f, "Clock: {clock:02X?}")?;
        }
        if let Some(battery) = self.battery_state {
            writeln!(f, "Battery: {battery}")?;
        }
        if let Some(reply) = &self.ping_reply {
            writeln!(f, "Ping: {reply:02X?}")?;
        }
        if let Some(code) = self.status_code {
            writeln!(f, "Status: {code}")?;
        }
        if let Some(message) = &self.status_message {
            writeln!(f, "Message: {message}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml::{DecodeOptions, Value, decode, encode};
    use crate::schema::Registry;

    fn response<'r>(
        reg: &'r Registry,
        idx: u64,
        depth: u64,
        extra: Vec<ElementNode<'r>>,
    ) -> ElementNode<'r> {
        let resp = reg.lookup(None, "EBMLResponse").unwrap();
        let mut children = vec![
            ElementNode::new(reg.lookup(Some(resp), "ResponseIdx").unwrap(), Value::UInteger(idx)),
            ElementNode::new(reg.lookup(Some(resp), "CMDQueueDepth").unwrap(), Value::UInteger(depth)),
        ];
        children.extend(extra);
        ElementNode::master(resp, children)
    }

    #[test]
    fn test_wifi_query_connected() {
        let reg = Registry::command().unwrap();
        let resp = reg.lookup(None, "EBMLResponse").unwrap();
        let query = reg.lookup(Some(resp), "QueryWiFiResponse").unwrap();
        let field = |name, value| ElementNode::new(reg.lookup(Some(query), name).unwrap(), value);
        let tree = response(
            reg,
            5,
            3,
            vec![ElementNode::master(
                query,
                vec![
                    field("SSID", Value::Unicode("Lab5G".into())),
                    field("WiFiConnectionStatus", Value::UInteger(2)),
                    field("RSSI", Value::Integer(80)),
                ],
            )],
        );
        let bytes = encode(&tree, reg).unwrap();
        let decoded = decode(&bytes, reg, DecodeOptions::strict()).unwrap();
        let parsed = DeviceResponse::from_node(decoded.first().unwrap()).unwrap();

        assert_eq!(parsed.response_idx, 5);
        assert_eq!(parsed.queue_depth, 3);
        let query = parsed.wifi_query.unwrap();
        assert_eq!(query.ssid.as_deref(), Some("Lab5G"));
        assert_eq!(query.status, WiFiConnectionStatus::Connected);
        assert_eq!(query.rssi, Some(80));
        assert_eq!(query.error, None);
        assert!(parsed.wifi_scan.is_none());
    }

    #[test]
    fn test_scan_defaults() {
        let reg = Registry::command().unwrap();
        let resp = reg.lookup(None, "EBMLResponse").unwrap();
        let scan = reg.lookup(Some(resp), "WiFiScanResult").unwrap();
        let ap = reg.lookup(Some(scan), "AP").unwrap();
        let tree = response(
            reg,
            1,
            1,
            vec![ElementNode::master(
                scan,
                vec![
                    ElementNode::master(
                        ap,
                        vec![
                            ElementNode::new(reg.lookup(Some(ap), "SSID").unwrap(), Value::Unicode("lab".into())),
                            ElementNode::new(reg.lookup(Some(ap), "Known").unwrap(), Value::UInteger(1)),
                        ],
                    ),
                    ElementNode::master(ap, Vec::new()),
                ],
            )],
        );
        let parsed = DeviceResponse::from_node(&tree).unwrap();
        let aps = parsed.access_points();
        assert_eq!(aps.len(), 2);
        assert_eq!(aps[0].ssid, "lab");
        assert!(aps[0].known);
        assert_eq!(aps[0].rssi, -1);
        assert_eq!(
            aps[1],
            AccessPoint {
                ssid: String::new(),
                rssi: -1,
                auth_type: 0,
                known: false,
                selected: false,
            }
        );
    }

    #[test]
    fn test_missing_index_is_error() {
        let reg = Registry::command().unwrap();
        let resp = reg.lookup(None, "EBMLResponse").unwrap();
        let node = ElementNode::master(resp, Vec::new());
        assert!(DeviceResponse::from_node(&node).is_err());
        assert!(DeviceResponse::from_node(&response(reg, 0, 0, Vec::new())).is_ok());
    }
}
