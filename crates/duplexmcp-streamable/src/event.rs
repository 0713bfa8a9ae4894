//! SSE event identifiers.
//!
//! Every event is tagged `"<streamID>_<index>"`: the delivery channel it
//! belongs to and its zero-based position within that channel. The format
//! round-trips exactly for all non-negative decimal pairs, which is what
//! makes `Last-Event-ID` resumption possible.

/// Format an event ID from stream and index.
pub fn format_event_id(stream_id: u64, index: u64) -> String {
    format!("{stream_id}_{index}")
}

/// Parse an event ID back into (stream, index).
///
/// Both parts must be plain non-negative decimal integers; anything else
/// (signs, empty parts, extra separators) is rejected.
pub fn parse_event_id(id: &str) -> Option<(u64, u64)> {
    let (stream, index) = id.split_once('_')?;
    Some((parse_decimal(stream)?, parse_decimal(index)?))
}

fn parse_decimal(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}
