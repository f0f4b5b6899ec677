//! Geometry of the physical region, expressed as an arena of fixed-size row slots
//! addressed by integer index. "Next row", "same slot one pass earlier" and the
//! primary/mirror pairing are all index arithmetic, so the engines never juggle raw
//! byte addresses.

use crate::Config;
use crate::error::Error;
use core::ops::Range;

/// The smallest row that still fits a header with payload next to the checksum word.
const MIN_ROW_SIZE: u32 = 64;

/// Derived geometry of one emulated EEPROM region. Pure data, no flash access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Layout {
    pub(crate) base: u32,
    pub(crate) row_size: u32,
    /// Position-slots the logical range is split into; one row per slot and pass.
    pub(crate) row_count: u32,
    pub(crate) wear_leveling_factor: u32,
    pub(crate) redundant: bool,
}

impl Layout {
    pub(crate) fn new(config: &Config, erase_size: usize) -> Result<Layout, Error> {
        let row_size = erase_size as u32;
        if row_size < MIN_ROW_SIZE || !row_size.is_multiple_of(2) {
            return Err(Error::InvalidConfig);
        }
        if config.eeprom_size == 0 {
            return Err(Error::InvalidConfig);
        }
        if !(1..=10).contains(&config.wear_leveling_factor) {
            return Err(Error::InvalidConfig);
        }
        if !config.start_address.is_multiple_of(row_size) {
            return Err(Error::InvalidConfig);
        }

        let data_len = row_size / 2;
        let layout = Layout {
            base: config.start_address,
            row_size,
            row_count: config.eeprom_size.div_ceil(data_len),
            wear_leveling_factor: u32::from(config.wear_leveling_factor),
            redundant: config.redundant_copy,
        };

        let copies = if layout.redundant { 2u64 } else { 1 };
        let physical =
            u64::from(layout.total_rows()) * u64::from(layout.row_size) * copies;
        if physical > u64::from(u32::MAX - layout.base) {
            return Err(Error::RegionTooSmall);
        }

        Ok(layout)
    }

    /// Bytes of logical storage snapshotted by each row, i.e. half the row.
    pub(crate) fn data_len(&self) -> u32 {
        self.row_size / 2
    }

    /// Largest header payload one row carries. The checksum word at the row tail is
    /// only reserved when redundancy is configured.
    pub(crate) fn header_payload_len(&self) -> u32 {
        let reserved = if self.redundant {
            crate::row::HEADER_FIXED_LEN + crate::row::CHECKSUM_LEN
        } else {
            crate::row::HEADER_FIXED_LEN
        };
        self.data_len() - reserved
    }

    /// Rows in the primary wear rotation set.
    pub(crate) fn total_rows(&self) -> u32 {
        self.row_count * self.wear_leveling_factor
    }

    /// Size of one region copy (primary or mirror).
    pub(crate) fn region_size(&self) -> u32 {
        self.total_rows() * self.row_size
    }

    /// Flash occupied overall, mirror included.
    pub(crate) fn physical_size(&self) -> u32 {
        if self.redundant {
            self.region_size() * 2
        } else {
            self.region_size()
        }
    }

    /// First address past the primary rotation set; the mirror region starts here.
    pub(crate) fn wear_level_end(&self) -> u32 {
        self.base + self.region_size()
    }

    pub(crate) fn row_address(&self, index: u32) -> u32 {
        self.base + index * self.row_size
    }

    pub(crate) fn mirror_address(&self, index: u32) -> u32 {
        self.wear_level_end() + index * self.row_size
    }

    /// Rotation step: one row forward, wrapping to the region base.
    pub(crate) fn next_row(&self, index: u32) -> u32 {
        (index + 1) % self.total_rows()
    }

    /// The row that held this row's slot one full pass earlier. With a wear leveling
    /// factor of 1 this is the row itself.
    pub(crate) fn prev_pass_row(&self, index: u32) -> u32 {
        (index + self.total_rows() - self.row_count) % self.total_rows()
    }

    /// The position-slot a physical row belongs to.
    pub(crate) fn slot_of(&self, index: u32) -> u32 {
        index % self.row_count
    }

    /// Logical byte range owned by a position-slot.
    pub(crate) fn slot_range(&self, slot: u32) -> Range<u32> {
        let start = slot * self.data_len();
        start..start + self.data_len()
    }

    /// Position-slots overlapping a logical range. `len` has to be non-zero.
    pub(crate) fn slots_of_range(&self, address: u32, len: u32) -> Range<u32> {
        let first = address / self.data_len();
        let last = (address + len - 1) / self.data_len();
        first..last + 1
    }

    /// The most recently written row of a slot, walking backward from the last
    /// written row. Only meaningful once at least one write happened; the caller
    /// still has to check that the row carries a valid sequence number.
    pub(crate) fn current_row_of_slot(&self, last_row: u32, slot: u32) -> u32 {
        let behind = (self.slot_of(last_row) + self.row_count - slot) % self.row_count;
        (last_row + self.total_rows() - behind) % self.total_rows()
    }
}
