//! Record and block framing of header text.
//!
//! A header is a run of 80-byte records closed by an `END` record and
//! padded with blanks to a whole number of 2880-byte blocks.

/// Bytes in one header record.
pub const CARD_SIZE: usize = 80;

/// Bytes in one block.
pub const BLOCK_SIZE: usize = 2880;

pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// Fill byte after the `END` record.
pub const HEADER_PAD_BYTE: u8 = b' ';

/// Blocks spanned by `num_bytes` bytes of header text.
pub const fn blocks_needed(num_bytes: usize) -> usize {
    num_bytes.div_ceil(BLOCK_SIZE)
}

/// `num_bytes` rounded up to a block boundary.
pub const fn padded_byte_len(num_bytes: usize) -> usize {
    blocks_needed(num_bytes) * BLOCK_SIZE
}

/// Bytes occupied by a header whose `END` record is record number
/// `end_record` (zero-based), padding included.
pub const fn header_byte_len(end_record: usize) -> usize {
    (end_record / CARDS_PER_BLOCK + 1) * BLOCK_SIZE
}

/// The leading whole blocks of `data`. A trailing partial block is ignored.
pub fn complete_blocks(data: &[u8]) -> &[u8] {
    &data[..data.len() / BLOCK_SIZE * BLOCK_SIZE]
}

/// Split text into 80-byte records. The text must be ASCII; a short last
/// record is returned as is.
pub(crate) fn records(text: &str) -> Vec<&str> {
    (0..text.len())
        .step_by(CARD_SIZE)
        .map(|start| &text[start..text.len().min(start + CARD_SIZE)])
        .collect()
}

/// Header records followed by blank padding to a block boundary.
pub fn pad_header_blocks(records: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(padded_byte_len(records.len()));
    buf.extend_from_slice(records);
    buf.resize(padded_byte_len(records.len()), HEADER_PAD_BYTE);
    buf
}
