//! Base64 helpers for binary data carried inside event payloads.
//!
//! Payloads are structured values, so binary data travels as text. Decoding is
//! lenient about the alphabet and padding: URL-safe (`-`, `_`) and standard
//! (`+`, `/`) characters are both accepted, and missing `=` padding is
//! restored before decoding. Non-zero trailing bits in the last character are
//! ignored, so `"SGVsbG9"` decodes like `"SGVsbG8"`.

use crate::error::DecodeError;
use base64::{
    alphabet,
    engine::{general_purpose, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Decodes a base64 string (URL-safe or standard, padded or not) into bytes.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, DecodeError> {
    let padding = (4 - input.len() % 4) % 4;

    let mut normalized = String::with_capacity(input.len() + padding);
    for c in input.chars() {
        normalized.push(match c {
            '-' => '+',
            '_' => '/',
            other => other,
        });
    }
    normalized.extend(std::iter::repeat('=').take(padding));

    Ok(LENIENT.decode(normalized)?)
}

/// Encodes bytes as unpadded URL-safe base64.
pub fn encode_base64_url(bytes: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
