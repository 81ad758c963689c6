pub mod btle;
pub mod constants;
pub mod fake;
pub mod radio;
pub mod registry;
pub mod scan;
pub mod session;
pub mod types;
