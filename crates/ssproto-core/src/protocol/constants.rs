//! Device protocol constants.
//!
//! Element IDs live with their schema tables in `crate::schema`; this module
//! holds the values the framer and session need around them.

// ============================================================================
// Legacy ASCII Commands (Host -> Device)
// ============================================================================

/// Start recording
pub const CMD_REC_START: u16 = 0x7273; // 'rs'
/// Legacy firmware update
pub const CMD_LEGACY_FW: u16 = 0x6677; // 'fw'
/// Legacy bootloader update
pub const CMD_LEGACY_BL: u16 = 0x626C; // 'bl'
/// Legacy update of firmware, bootloader and userpage
pub const CMD_LEGACY_ALL: u16 = 0x7561; // 'ua'
/// Flash a staged package
pub const CMD_FLASH_PACKAGE: u16 = 0x706B; // 'pk'
/// Legacy userpage update
pub const CMD_LEGACY_UP: u16 = 0x7570; // 'up'
/// Legacy ESP32 (WiFi) firmware update
pub const CMD_LEGACY_ESP: u16 = 0x7577; // 'uw'
/// Secure (signed) update of everything staged
pub const CMD_SECURE_UPDATE_ALL: u16 = 0x7361; // 'sa'
/// Reset the device
pub const CMD_RESET: u16 = 0x7274; // 'rt'
/// Install encryption keys (carries a `KeyVals` child)
pub const CMD_SET_KEYS: u16 = 0x736B; // 'sk'

// ============================================================================
// File Mailbox (relative to the device's mount point)
// ============================================================================

/// Commands are written here.
pub const COMMAND_FILE: &str = "SYSTEM/DEV/COMMAND";
/// Responses are read from here.
pub const RESPONSE_FILE: &str = "SYSTEM/DEV/RESPONSE";
/// Update packages are staged here before `FlashPackage` / `SecureUpdateAll`.
pub const UPDATE_PACKAGE_FILE: &str = "SYSTEM/update.pkg";

// ============================================================================
// Timing
// ============================================================================

/// Default time to wait for a response.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Default delay between response file polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

// ============================================================================
// Response Values
// ============================================================================

/// `CMDQueueDepth` value meaning the device cannot accept another command.
pub const QUEUE_FULL: u64 = 0;

/// Scan result defaults for access points missing optional fields.
pub const AP_DEFAULT_RSSI: i64 = -1;
pub const AP_DEFAULT_AUTH_TYPE: u64 = 0;
