//! Line protocol spoken over the UART characteristic
//!
//! Outbound commands are UTF-8 text followed by a line terminator. Inbound
//! notifications are UTF-8 text, possibly framed with whitespace or CR/LF.

use tracing::trace;

/// Terminator appended to every outbound command
pub const LINE_TERMINATOR: &str = "\n";

/// Encode a command for the wire
pub fn encode_line(text: &str, terminator: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + terminator.len());
    bytes.extend_from_slice(text.as_bytes());
    bytes.extend_from_slice(terminator.as_bytes());
    bytes
}

/// Decode a notification payload.
///
/// Invalid UTF-8 sequences become U+FFFD. Returns `None` when nothing but
/// framing characters remain.
pub fn decode_notification(payload: &[u8]) -> Option<String> {
    #[cfg(debug_assertions)]
    trace!("Raw notification: {:02X?}", payload);

    let text = String::from_utf8_lossy(payload);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.to_string())
}
