//! Physical row codec.
//!
//! A row of R bytes carries two things at once: `[0, R/2)` is the data half, a full
//! snapshot of the logical sub-range owned by the row's position-slot, and the rest is
//! the header, a log record of the raw write that produced the row:
//!
//! ```text
//! [0, R/2)          data half (slot snapshot)
//! [R/2, R/2+4)      sequence number, u32 LE
//! [R/2+4, R/2+8)    logical address, u32 LE
//! [R/2+8, R/2+12)   payload length, u32 LE
//! [R/2+12, ..)      header payload
//! [R-4, R)          checksum word, low byte = CRC-8 of the data half
//! ```
//!
//! The checksum word is only written (and its row tail only reserved) when the
//! redundant copy is configured.

use crate::layout::Layout;
use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;

/// Sequence number, logical address and length field.
pub(crate) const HEADER_FIXED_LEN: u32 = 12;
/// Checksum word at the row tail.
pub(crate) const CHECKSUM_LEN: u32 = 4;

const CRC8_SEED: u8 = 0xFF;
const CRC8_POLYNOMIAL: u8 = 0x31;

/// Decoded header fields of one physical row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct RowHeader {
    pub(crate) seq: u32,
    pub(crate) address: u32,
    pub(crate) len: u32,
}

impl RowHeader {
    /// Sequence numbers start at 1; 0 never occurs and all-ones is the erased flash
    /// pattern, so both mark a row that was never written.
    pub(crate) fn written(&self) -> bool {
        self.seq != 0 && self.seq != u32::MAX
    }

    /// Guards against garbage length/address fields in rows whose header half was
    /// damaged without redundancy enabled.
    pub(crate) fn fits(&self, layout: &Layout, eeprom_size: u32) -> bool {
        self.len <= layout.header_payload_len()
            && self
                .address
                .checked_add(self.len)
                .is_some_and(|end| end <= eeprom_size)
    }

    pub(crate) fn range(&self) -> Range<u32> {
        self.address..self.address + self.len
    }
}

fn read_u32(row: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([row[offset], row[offset + 1], row[offset + 2], row[offset + 3]])
}

pub(crate) fn decode_header(layout: &Layout, row: &[u8]) -> RowHeader {
    let base = layout.data_len() as usize;
    RowHeader {
        seq: read_u32(row, base),
        address: read_u32(row, base + 4),
        len: read_u32(row, base + 8),
    }
}

/// The header payload of a decoded row, clamped to the row's capacity.
pub(crate) fn header_payload<'a>(layout: &Layout, row: &'a [u8], header: &RowHeader) -> &'a [u8] {
    let start = (layout.data_len() + HEADER_FIXED_LEN) as usize;
    let len = header.len.min(layout.header_payload_len()) as usize;
    &row[start..start + len]
}

/// Builds the R-byte image of one row. `data_half` has to be exactly half a row;
/// `payload` at most [`Layout::header_payload_len`] bytes.
pub(crate) fn encode(
    layout: &Layout,
    seq: u32,
    address: u32,
    payload: &[u8],
    data_half: &[u8],
) -> Vec<u8> {
    let mut row = vec![0u8; layout.row_size as usize];
    let base = layout.data_len() as usize;
    row[..base].copy_from_slice(data_half);
    row[base..base + 4].copy_from_slice(&seq.to_le_bytes());
    row[base + 4..base + 8].copy_from_slice(&address.to_le_bytes());
    row[base + 8..base + 12].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    row[base + 12..base + 12 + payload.len()].copy_from_slice(payload);
    if layout.redundant {
        let checksum = u32::from(crc8(data_half));
        let tail = row.len() - CHECKSUM_LEN as usize;
        row[tail..].copy_from_slice(&checksum.to_le_bytes());
    }
    row
}

/// Verifies the stored checksum word against the data half. Erased rows fail, their
/// checksum word reads as all-ones.
pub(crate) fn checksum_ok(layout: &Layout, row: &[u8]) -> bool {
    let tail = row.len() - CHECKSUM_LEN as usize;
    read_u32(row, tail) == u32::from(crc8(&row[..layout.data_len() as usize]))
}

/// CRC-8, polynomial 0x31, seed 0xFF, non-reflected.
pub(crate) fn crc8(data: &[u8]) -> u8 {
    let mut crc = CRC8_SEED;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLYNOMIAL
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Copies the intersection of two logical byte windows: `src` covering
/// `[src_start, src_start + src.len())` onto `dst` covering
/// `[dst_start, dst_start + dst.len())`.
pub(crate) fn overlay(src: &[u8], src_start: u32, dst: &mut [u8], dst_start: u32) {
    let begin = src_start.max(dst_start);
    let end = (src_start + src.len() as u32).min(dst_start + dst.len() as u32);
    if begin >= end {
        return;
    }
    let len = (end - begin) as usize;
    let src_offset = (begin - src_start) as usize;
    let dst_offset = (begin - dst_start) as usize;
    dst[dst_offset..dst_offset + len].copy_from_slice(&src[src_offset..src_offset + len]);
}
