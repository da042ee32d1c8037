pub mod converter;
pub mod error;
pub mod fit;
pub mod gpx_types;
pub mod merger;
pub mod options;
pub mod parser;
pub mod writer;
pub mod xml_node;

use js_sys::{Array, Reflect, Uint8Array};
use log::{error, info};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_console_logger::DEFAULT_LOGGER;

pub use crate::error::{CombineError, FileError};
pub use crate::merger::{combine, decode_binary_log};
pub use crate::options::CombineOptions;

/// Route `log` output to the browser console and install the panic hook.
#[wasm_bindgen(js_name = initLogs)]
pub fn init_logs() {
    match log::set_logger(&DEFAULT_LOGGER) {
        Ok(_) => info!("Initialized console.logger"),
        Err(e) => error!("failed to set console.logger: {e}"),
    };
    console_error_panic_hook::set_once();
}

/// Set the maximum log level: "error", "warn", "info", "debug" or "trace".
/// Anything else turns logging off.
#[wasm_bindgen(js_name = updateLogLevel)]
pub fn update_log_level(level: &str) {
    let filter = level.parse().unwrap_or(log::LevelFilter::Off);
    log::set_max_level(filter);
}

/// Combine track files into one GPX string.
///
/// `files` is an array of `{ name: string, content: Uint8Array }`.
#[wasm_bindgen(js_name = combineTracks)]
pub fn combine_tracks(files: Array, options: JsValue) -> Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let inputs = read_files(&files)?;
    Ok(combine(&inputs, &opts)?)
}

/// Convert one FIT file to a GPX string.
#[wasm_bindgen(js_name = fitToGpx)]
pub fn fit_to_gpx(content: &[u8]) -> Result<String, JsValue> {
    console_error_panic_hook::set_once();

    Ok(decode_binary_log(content)?)
}

fn parse_options(options: JsValue) -> Result<CombineOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(CombineOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

fn read_files(files: &Array) -> Result<Vec<(String, Vec<u8>)>, JsValue> {
    files
        .iter()
        .map(|file| {
            let name = Reflect::get(&file, &JsValue::from_str("name"))?
                .as_string()
                .ok_or_else(|| JsValue::from_str("file entry is missing a string 'name'"))?;
            let content = Reflect::get(&file, &JsValue::from_str("content"))?;
            if !content.is_instance_of::<Uint8Array>() {
                return Err(JsValue::from_str(&format!(
                    "content of '{name}' must be a Uint8Array"
                )));
            }
            Ok((name, Uint8Array::new(&content).to_vec()))
        })
        .collect()
}
