//! Base64 codecs: the standard alphabet for stored ciphertext, and the
//! URL-safe alphabet for values that end up in URL path segments
//! (encrypted filenames).

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;

use cbx_core::{CbxError, CbxResult};

pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode(text: &str) -> CbxResult<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| CbxError::crypto(format!("base64 decode: {e}")))
}

pub fn encode_url(data: &[u8]) -> String {
    URL_SAFE.encode(data)
}

pub fn decode_url(text: &str) -> CbxResult<Vec<u8>> {
    URL_SAFE
        .decode(text)
        .map_err(|e| CbxError::crypto(format!("url-safe base64 decode: {e}")))
}
