//! Protocol module - device command and response definitions.

pub mod command;
pub mod constants;
pub mod legacy;
pub mod response;

pub use command::{Command, WiFiCredentials};
pub use constants::*;
pub use legacy::LegacyCommand;
pub use response::{
    AccessPoint, DeviceResponse, NetworkStatus, WiFiConnectionStatus, WiFiQueryResult,
    WiFiScanResult,
};
