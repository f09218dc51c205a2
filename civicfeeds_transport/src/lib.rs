//! Transport layer for civic record sources: a cookie-carrying HTTP session
//! and a browser-automation capability with a Chromium implementation.

pub mod browser;
pub mod chromium;
mod errors;
mod session;
mod user_agent;

pub use self::browser::{with_browser, BrowserLauncher, BrowserOptions, BrowserSession};
pub use self::chromium::ChromiumLauncher;
pub use self::errors::TransportError;
pub use self::session::{resolve_link, HttpSession};
pub use self::user_agent::get_user_agent;
