//! Chrome DevTools Protocol binding for UXability
//!
//! [`ChromeLauncher`] implements [`uxa_core::BrowserLauncher`]: every session
//! is a fresh headless Chrome with a throwaway profile, one attached page
//! ([`CdpPage`]) and a debugging port the secondary audit can reuse.

pub mod cdp;
pub mod error;
pub mod launcher;
pub mod page;

pub use cdp::{CdpConnection, CdpEvent};
pub use error::{CdpError, CdpResult};
pub use launcher::{ChromeConfig, ChromeLauncher, ChromeSession};
pub use page::CdpPage;
