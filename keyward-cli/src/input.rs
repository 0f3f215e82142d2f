//! Input loading shared across commands.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use keyward_core::base64url;
use tracing::debug;

/// Read a file, or stdin when `path` is `-`.
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

/// Decode a hex or base64url string.
pub fn decode_text(text: &str) -> Result<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 == 0 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
        debug!(encoding = "hex", "Decoding input");
        return hex::decode(text).context("Malformed hex input");
    }
    debug!(encoding = "base64url", "Decoding input");
    Ok(base64url::decode("input", text)?)
}

/// Extract attestation object bytes from raw CBOR, hex, base64url, or a
/// registration response JSON.
pub fn attestation_object_bytes(raw: &[u8]) -> Result<Vec<u8>> {
    let Ok(text) = std::str::from_utf8(raw) else {
        debug!(encoding = "cbor", "Decoding input");
        return Ok(raw.to_vec());
    };
    let text = text.trim();

    if text.starts_with('{') {
        debug!(encoding = "json", "Decoding input");
        let json: serde_json::Value =
            serde_json::from_str(text).context("Malformed registration response JSON")?;
        let encoded = json
            .pointer("/response/attestationObject")
            .or_else(|| json.get("attestationObject"))
            .and_then(serde_json::Value::as_str)
            .context("Malformed registration response JSON: no attestationObject")?;
        return Ok(base64url::decode("attestationObject", encoded)?);
    }

    decode_text(text)
}
