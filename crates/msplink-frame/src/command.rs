//! Well-known MSP v1 command codes.
//!
//! Codes 1–99 identify the firmware, 100–199 read state, 200–249 write
//! state, 250+ are maintenance operations. Only the codes this engine and
//! its tools actually speak are listed; the codec itself accepts any code
//! in 0–255.

/// API version (major, minor, protocol).
pub const MSP_API_VERSION: u8 = 1;

/// Firmware variant identifier (e.g. "BTFL", "INAV").
pub const MSP_FC_VARIANT: u8 = 2;

/// Firmware semantic version.
pub const MSP_FC_VERSION: u8 = 3;

/// Board identifier and hardware revision.
pub const MSP_BOARD_INFO: u8 = 4;

/// Build date and time.
pub const MSP_BUILD_INFO: u8 = 5;

/// Cycle time, i2c errors, sensor flags, flight mode boxes.
pub const MSP_STATUS: u8 = 101;

/// Raw accelerometer/gyro/magnetometer samples.
pub const MSP_RAW_IMU: u8 = 102;

/// RC channel values.
pub const MSP_RC: u8 = 105;

/// Roll/pitch/yaw attitude.
pub const MSP_ATTITUDE: u8 = 108;

/// Barometric altitude and vario.
pub const MSP_ALTITUDE: u8 = 109;

/// Battery voltage, current draw, RSSI.
pub const MSP_ANALOG: u8 = 110;

/// Inject RC channel values.
pub const MSP_SET_RAW_RC: u8 = 200;

/// Start accelerometer calibration.
pub const MSP_ACC_CALIBRATION: u8 = 205;

/// Reset configuration to defaults.
pub const MSP_RESET_CONF: u8 = 208;

/// Commit settings to EEPROM.
pub const MSP_EEPROM_WRITE: u8 = 250;

/// Returns a human-readable name for a command code.
pub fn command_name(command: u8) -> &'static str {
    match command {
        MSP_API_VERSION => "API_VERSION",
        MSP_FC_VARIANT => "FC_VARIANT",
        MSP_FC_VERSION => "FC_VERSION",
        MSP_BOARD_INFO => "BOARD_INFO",
        MSP_BUILD_INFO => "BUILD_INFO",
        MSP_STATUS => "STATUS",
        MSP_RAW_IMU => "RAW_IMU",
        MSP_RC => "RC",
        MSP_ATTITUDE => "ATTITUDE",
        MSP_ALTITUDE => "ALTITUDE",
        MSP_ANALOG => "ANALOG",
        MSP_SET_RAW_RC => "SET_RAW_RC",
        MSP_ACC_CALIBRATION => "ACC_CALIBRATION",
        MSP_RESET_CONF => "RESET_CONF",
        MSP_EEPROM_WRITE => "EEPROM_WRITE",
        _ => "UNKNOWN",
    }
}

/// Returns true for commands that mutate firmware state.
pub fn is_write(command: u8) -> bool {
    (200..=250).contains(&command)
}
