use uuid::Uuid;

/**
 * How long (milliseconds) a scan pass runs before the radio is told to stop.
 */
pub const SCAN_DURATION: u64 = 10_000;

/**
 * How long (milliseconds) establishing a connection may take.
 */
pub const CONNECT_DEADLINE: u64 = 10_000;

/**
 * How long (milliseconds) service discovery may take.
 */
pub const DISCOVERY_DEADLINE: u64 = 15_000;

/**
 * How long (milliseconds) a write to a characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2_000;

/**
 * The UUID of the standard Bluetooth GATT Heart Rate service.
 */
pub const HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);

/**
 * The UUID of the Heart Rate Measurement characteristic, which notifies the readings.
 */
pub const HEART_RATE_MEASUREMENT_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

/**
 * The UUID of the Client Characteristic Configuration descriptor used to turn notifications on.
 */
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/**
 * Value written to the CCCD to enable notifications.
 */
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

pub const FLAG_VALUE_FORMAT_U16: u8 = 0x01;
pub const FLAG_SENSOR_CONTACT_SUPPORTED: u8 = 0x02;
pub const FLAG_SENSOR_CONTACT_DETECTED: u8 = 0x04;
pub const FLAG_ENERGY_EXPENDED_PRESENT: u8 = 0x08;
pub const FLAG_RR_INTERVAL_PRESENT: u8 = 0x10;

/**
 * RR intervals are reported in units of 1/1024 second.
 */
pub const RR_INTERVAL_RESOLUTION: u32 = 1024;
