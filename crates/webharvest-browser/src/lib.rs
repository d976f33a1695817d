//! Chromium-backed driver for the webharvest engine, speaking CDP through
//! chromiumoxide, plus a reqwest client that reuses the browser's session.

pub mod driver;
pub mod error;
pub mod factory;
pub mod http;
pub mod options;

pub use driver::CdpDriver;
pub use error::{BrowserError, Result};
pub use factory::CdpDriverFactory;
pub use http::BridgedHttpClient;
pub use options::BrowserOptions;
