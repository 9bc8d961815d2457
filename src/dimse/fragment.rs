//! Fragmentation of opaque byte streams into PDV-sized chunks.

/// Bytes of each P-DATA-TF PDU reserved for the PDV item header
/// (item length, presentation context ID and message control header),
/// which the fragment itself must leave room for.
const PDV_OVERHEAD: u32 = 6;

/// The maximum number of value bytes that fit in one PDV
/// of a PDU bounded by `max_pdu_length`.
#[inline]
pub fn max_fragment_length(max_pdu_length: u32) -> usize {
    max_pdu_length.saturating_sub(PDV_OVERHEAD).max(1) as usize
}

/// Split `data` into fragments of at most `max_pdu_length - 6` bytes each,
/// whose concatenation is `data`.
///
/// Always produces at least one fragment:
/// an empty input yields a single empty fragment,
/// so that a message with an empty payload
/// still emits a last-fragment marker on the wire.
/// `max_pdu_length` must be at least 7.
pub fn fragment(max_pdu_length: u32, data: &[u8]) -> Vec<Vec<u8>> {
    if data.is_empty() {
        return vec![Vec::new()];
    }
    data.chunks(max_fragment_length(max_pdu_length))
        .map(<[u8]>::to_vec)
        .collect()
}
