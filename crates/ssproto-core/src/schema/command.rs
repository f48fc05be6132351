//! `mide.ss.cmd`: device commands, responses and the legacy ASCII commands.

use super::descriptor::{ElementDef, SchemaDef};
use super::header::{CRC32, EBML_HEADER, VOID};

pub const DOC_TYPE: &str = "mide.ss.cmd";

pub const EBML_COMMAND_ID: u32 = 0x80;
pub const EBML_RESPONSE_ID: u32 = 0x86;

// EBMLCommand children
pub const WIFI_SCAN_ID: u32 = 0x5501;
pub const APPLY_PACKAGE_ID: u32 = 0x5502;
pub const ESP_FW_ID: u32 = 0x5503;
pub const SET_WIFI_ID: u32 = 0x5504;
pub const QUERY_WIFI_ID: u32 = 0x5505;
pub const NETWORK_STATUS_ID: u32 = 0x5506;
pub const SET_CLOCK_ID: u32 = 0x5507;
pub const GET_CLOCK_ID: u32 = 0x5508;
pub const GET_BATTERY_ID: u32 = 0x5509;
pub const SEND_PING_ID: u32 = 0x550A;
pub const PACKAGE_PATH_ID: u32 = 0x5510;
pub const REBOOT_AFTER_ID: u32 = 0x5511;

// Access point fields, shared by SetWiFi and WiFiScanResult
pub const AP_ID: u32 = 0x5520;
pub const SSID_ID: u32 = 0x5521;
pub const PASSWORD_ID: u32 = 0x5522;
pub const SELECTED_ID: u32 = 0x5523;
pub const RSSI_ID: u32 = 0x5524;
pub const AUTH_TYPE_ID: u32 = 0x5525;
pub const KNOWN_ID: u32 = 0x5526;

// EBMLResponse children
pub const RESPONSE_IDX_ID: u32 = 0x5600;
pub const CMD_QUEUE_DEPTH_ID: u32 = 0x5601;
pub const WIFI_SCAN_RESULT_ID: u32 = 0x5610;
pub const SCAN_VERSION_ID: u32 = 0x5611;
pub const QUERY_WIFI_RESPONSE_ID: u32 = 0x5620;
pub const WIFI_CONNECTION_STATUS_ID: u32 = 0x5621;
pub const WIFI_CONNECTION_ERROR_ID: u32 = 0x5622;
pub const NETWORK_STATUS_RESPONSE_ID: u32 = 0x5630;
pub const IPV4_ADDRESS_ID: u32 = 0x5631;
pub const MAC_ADDRESS_ID: u32 = 0x5632;
pub const CURRENT_WIFI_STATUS_ID: u32 = 0x5633;
pub const CLOCK_TIME_ID: u32 = 0x5640;
pub const BATTERY_STATE_ID: u32 = 0x5650;
pub const PING_REPLY_ID: u32 = 0x5660;
pub const DEVICE_STATUS_CODE_ID: u32 = 0x5670;
pub const DEVICE_STATUS_MESSAGE_ID: u32 = 0x5671;

pub const KEY_VALS_ID: u32 = 0x5700;

/// Payload length of `SetClock` / `ClockTime`.
pub const CLOCK_LEN: usize = 10;

const PACKAGE_FIELDS: &[ElementDef] = &[
    ElementDef::string("PackagePath", PACKAGE_PATH_ID).mandatory(),
    ElementDef::uint("RebootAfter", REBOOT_AFTER_ID),
];

const ESP_FIELDS: &[ElementDef] = &[ElementDef::string("PackagePath", PACKAGE_PATH_ID).mandatory()];

const SET_AP_FIELDS: &[ElementDef] = &[
    ElementDef::unicode("SSID", SSID_ID).mandatory(),
    ElementDef::unicode("Password", PASSWORD_ID),
    ElementDef::uint("Selected", SELECTED_ID),
];

const SET_WIFI_FIELDS: &[ElementDef] = &[ElementDef::master("AP", AP_ID, SET_AP_FIELDS).multiple()];

const COMMAND_CHILDREN: &[ElementDef] = &[
    ElementDef::master("WiFiScan", WIFI_SCAN_ID, &[]),
    ElementDef::master("ApplyPackage", APPLY_PACKAGE_ID, PACKAGE_FIELDS),
    ElementDef::master("ESPFW", ESP_FW_ID, ESP_FIELDS),
    ElementDef::master("SetWiFi", SET_WIFI_ID, SET_WIFI_FIELDS),
    ElementDef::master("QueryWiFi", QUERY_WIFI_ID, &[]),
    ElementDef::master("NetworkStatus", NETWORK_STATUS_ID, &[]),
    ElementDef::binary("SetClock", SET_CLOCK_ID),
    ElementDef::master("GetClock", GET_CLOCK_ID, &[]),
    ElementDef::master("GetBattery", GET_BATTERY_ID, &[]),
    ElementDef::binary("SendPing", SEND_PING_ID),
];

const SCAN_AP_FIELDS: &[ElementDef] = &[
    ElementDef::unicode("SSID", SSID_ID),
    ElementDef::int("RSSI", RSSI_ID),
    ElementDef::uint("AuthType", AUTH_TYPE_ID),
    ElementDef::uint("Known", KNOWN_ID),
    ElementDef::uint("Selected", SELECTED_ID),
];

const SCAN_RESULT_FIELDS: &[ElementDef] = &[
    ElementDef::uint("ScanVersion", SCAN_VERSION_ID),
    ElementDef::master("AP", AP_ID, SCAN_AP_FIELDS).multiple(),
];

const QUERY_WIFI_FIELDS: &[ElementDef] = &[
    ElementDef::unicode("SSID", SSID_ID),
    ElementDef::uint("WiFiConnectionStatus", WIFI_CONNECTION_STATUS_ID).mandatory(),
    ElementDef::uint("WiFiConnectionError", WIFI_CONNECTION_ERROR_ID),
    ElementDef::int("RSSI", RSSI_ID),
];

const NETWORK_STATUS_FIELDS: &[ElementDef] = &[
    ElementDef::binary("IPV4Address", IPV4_ADDRESS_ID),
    ElementDef::binary("MACAddress", MAC_ADDRESS_ID).mandatory(),
    ElementDef::uint("CurrentWiFiStatus", CURRENT_WIFI_STATUS_ID),
];

const RESPONSE_CHILDREN: &[ElementDef] = &[
    ElementDef::uint("ResponseIdx", RESPONSE_IDX_ID).mandatory(),
    ElementDef::uint("CMDQueueDepth", CMD_QUEUE_DEPTH_ID).mandatory(),
    ElementDef::master("WiFiScanResult", WIFI_SCAN_RESULT_ID, SCAN_RESULT_FIELDS),
    ElementDef::master("QueryWiFiResponse", QUERY_WIFI_RESPONSE_ID, QUERY_WIFI_FIELDS),
    ElementDef::master(
        "NetworkStatusResponse",
        NETWORK_STATUS_RESPONSE_ID,
        NETWORK_STATUS_FIELDS,
    ),
    ElementDef::binary("ClockTime", CLOCK_TIME_ID),
    ElementDef::uint("BatteryState", BATTERY_STATE_ID),
    ElementDef::binary("PingReply", PING_REPLY_ID),
    ElementDef::int("DeviceStatusCode", DEVICE_STATUS_CODE_ID),
    ElementDef::unicode("DeviceStatusMessage", DEVICE_STATUS_MESSAGE_ID),
];

const SET_KEYS_FIELDS: &[ElementDef] = &[ElementDef::binary("KeyVals", KEY_VALS_ID).mandatory()];

const ELEMENTS: &[ElementDef] = &[
    EBML_HEADER,
    VOID,
    CRC32,
    ElementDef::master("EBMLCommand", EBML_COMMAND_ID, COMMAND_CHILDREN),
    ElementDef::master("EBMLResponse", EBML_RESPONSE_ID, RESPONSE_CHILDREN),
    ElementDef::legacy("RecStart", *b"rs", &[]),
    ElementDef::legacy("LegacyFW", *b"fw", &[]),
    ElementDef::legacy("LegacyBL", *b"bl", &[]),
    ElementDef::legacy("LegacyAll", *b"ua", &[]),
    ElementDef::legacy("FlashPackage", *b"pk", &[]),
    ElementDef::legacy("LegacyUP", *b"up", &[]),
    ElementDef::legacy("LegacyESP", *b"uw", &[]),
    ElementDef::legacy("SecureUpdateAll", *b"sa", &[]),
    ElementDef::legacy("Reset", *b"rt", &[]),
    ElementDef::legacy("SetKeys", *b"sk", SET_KEYS_FIELDS),
];

pub const COMMAND_SCHEMA: SchemaDef = SchemaDef {
    doc_type: DOC_TYPE,
    version: 2,
    read_version: 2,
    elements: ELEMENTS,
};
