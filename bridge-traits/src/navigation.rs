//! Page Navigation Abstraction
//!
//! The redirect flow needs three things from the host page: the URL the page
//! loaded with (to find an authorization callback), the ability to leave the
//! application entirely for the provider's consent screen, and the ability to
//! rewrite the visible URL in place so a manual refresh does not re-deliver
//! consumed callback parameters.

use crate::error::Result;
use crate::platform::PlatformSendSync;

/// Host page navigation surface.
///
/// Browser implementations map onto `window.location` and
/// `history.replaceState`; test harnesses hold the URL in memory.
pub trait PageNavigator: PlatformSendSync {
    /// The full URL of the current page load, including query parameters.
    fn current_url(&self) -> Result<String>;

    /// Leave the application for `url`. On a real browser this never returns
    /// control to the caller's logical flow; the next page load starts fresh.
    fn navigate(&self, url: &str) -> Result<()>;

    /// Rewrite the visible URL without triggering a reload. Used to strip
    /// `code`/`error` query parameters once they have been processed.
    fn replace_url(&self, url: &str) -> Result<()>;
}
