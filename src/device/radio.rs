use uuid::Uuid;

use crate::error::DeviceError;

/// Commands the platform bluetooth driver has to accept.
///
/// Every command only starts the operation. The outcome arrives later as a
/// [`RadioEvent`](crate::device::types::RadioEvent) on the event stream handed
/// out together with the radio. An `Err` return means the command could not
/// even be issued.
pub trait Radio: Clone + Send + 'static {
    fn scan_start(&self) -> Result<(), DeviceError>;

    fn scan_stop(&self) -> Result<(), DeviceError>;

    fn connect(&self, identifier: &str) -> Result<(), DeviceError>;

    fn disconnect(&self) -> Result<(), DeviceError>;

    fn discover_services(&self) -> Result<(), DeviceError>;

    fn set_notify(&self, characteristic: Uuid, enabled: bool) -> Result<(), DeviceError>;

    fn write_characteristic(&self, characteristic: Uuid, bytes: Vec<u8>) -> Result<(), DeviceError>;
}
