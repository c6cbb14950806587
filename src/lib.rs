//! `meter-listener` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing and process exit
//! codes. The core logic lives in [`crate::app`] where it can be tested
//! deterministically with an injected scanner, output stream, and shutdown
//! signal.

pub mod advert;
pub mod app;
pub mod mac_address;
pub mod meter;
pub mod scanner;

// Re-export commonly used types at the crate root
pub use advert::{Advertisement, SCAN_RESPONSE_UUID, ServiceData, scan_response_records};
pub use app::{Options, RealScanner, RunError, Scanner, run_with_io};
pub use mac_address::MacAddress;
pub use meter::{DecodeError, METER_SERVICE_DATA_UUID, Metric, is_meter_service_data};
pub use scanner::ScanError;
