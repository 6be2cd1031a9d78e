//! JavaScript error translation shared by the bridge implementations.

use bridge_traits::error::BridgeError;
use wasm_bindgen::{JsCast, JsValue};

/// Fold a `JsValue` thrown by a browser API into a `BridgeError`, keeping
/// whatever message the exception carried.
pub fn js_error(context: &str, err: JsValue) -> BridgeError {
    let message = if err.is_string() {
        err.as_string().unwrap_or_default()
    } else if let Some(js_err) = err.dyn_ref::<js_sys::Error>() {
        js_err.message().into()
    } else {
        format!("{err:?}")
    };
    BridgeError::OperationFailed(format!("{context}: {message}"))
}
