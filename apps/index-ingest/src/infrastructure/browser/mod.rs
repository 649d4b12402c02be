//! Browser adapters implementing the browser port.

pub mod chromium;
pub mod mock;

pub use chromium::{ChromiumHandle, ChromiumLauncher, find_chromium};
pub use mock::{MockBrowser, MockHandle, MockPage, NavigationStep};
