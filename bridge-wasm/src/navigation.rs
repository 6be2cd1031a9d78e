//! Browser implementation of the `PageNavigator` bridge trait.
//!
//! `current_url` and `navigate` map onto `window.location`;
//! `replace_url` uses `history.replaceState` so stripping consumed OAuth
//! parameters does not push a history entry or reload the page.

use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    navigation::PageNavigator,
};
use wasm_bindgen::JsValue;
use web_sys::Window;

use crate::error::js_error;

/// Page navigation backed by `window.location` and the History API.
pub struct BrowserNavigator {
    window: Window,
}

impl BrowserNavigator {
    /// Create a navigator bound to the current browser window.
    pub fn new() -> BridgeResult<Self> {
        let window =
            web_sys::window().ok_or_else(|| BridgeError::NotAvailable("window".to_string()))?;
        Ok(Self { window })
    }
}

impl PageNavigator for BrowserNavigator {
    fn current_url(&self) -> BridgeResult<String> {
        self.window
            .location()
            .href()
            .map_err(|err| js_error("location.href", err))
    }

    fn navigate(&self, url: &str) -> BridgeResult<()> {
        self.window
            .location()
            .set_href(url)
            .map_err(|err| js_error("location.assign", err))
    }

    fn replace_url(&self, url: &str) -> BridgeResult<()> {
        let history = self
            .window
            .history()
            .map_err(|err| js_error("window.history", err))?;
        history
            .replace_state_with_url(&JsValue::NULL, "", Some(url))
            .map_err(|err| js_error("history.replaceState", err))
    }
}
