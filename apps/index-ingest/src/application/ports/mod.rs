//! Application Ports
//!
//! Ports define the interfaces the ingestion pipeline needs from the
//! outside world.
//!
//! ## Driven Ports (Outbound)
//!
//! - `BrowserLauncher` / `BrowserHandle`: headless browser automation

mod browser_port;

pub use browser_port::{BrowserHandle, BrowserLauncher, RawRow};
