//! Component layers of the PAX1000 driver.
//!
//! - [`connection`]: discovery, initialization, configuration, teardown
//! - [`scan_buffer`]: outstanding-scan bookkeeping and release ordering
//! - [`acquisition`]: measurement reads and draining

pub mod acquisition;
pub mod connection;
pub mod scan_buffer;
