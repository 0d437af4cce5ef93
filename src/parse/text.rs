//! Best-effort UTF-8 decoding for plain-text and markdown documents

const BOM: char = '\u{feff}';

/// Decode bytes as UTF-8, dropping invalid sequences instead of failing.
///
/// Unlike `String::from_utf8_lossy`, invalid bytes are removed rather than
/// replaced with U+FFFD, so they never reach chunk text or embeddings.
pub fn decode_text(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    match out.strip_prefix(BOM) {
        Some(rest) => rest.to_string(),
        None => out,
    }
}
