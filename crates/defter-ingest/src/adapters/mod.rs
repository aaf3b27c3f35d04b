//! Built-in document parsers.

pub mod date_scan;

pub use date_scan::{scan_dates, DateScanParser};
