#![doc = include_str!("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

pub mod error;
mod engine;
mod layout;
pub mod platform;
mod row;

extern crate alloc;

use crate::error::Error;
use crate::layout::Layout;
use crate::platform::Platform;

/// Immutable description of one emulated EEPROM instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// First byte of the flash region reserved for the emulation. Has to be aligned to
    /// the flash row size.
    pub start_address: u32,
    /// Logical EEPROM size in bytes.
    pub eeprom_size: u32,
    /// Number of physical copies of the row set that writes rotate across (1..=10).
    /// Higher values spread erase wear over more flash at a proportional space cost.
    pub wear_leveling_factor: u8,
    /// Keep a full mirror of the region and fall back to it when a row fails checksum
    /// validation. Doubles the flash footprint.
    pub redundant_copy: bool,
    /// When false, row programming polls [`platform::Platform::is_busy`] in 1 ms steps
    /// instead of relying on the driver to block, and reports a timeout as
    /// [`error::Error::FlashError`].
    pub blocking_write: bool,
}

/// One emulated EEPROM: the derived physical layout plus the rotation state recovered
/// from flash. Owns the flash driver; independent instances over disjoint regions
/// coexist without any shared state.
///
/// All operations are synchronous and take `&mut self`; callers sharing an instance
/// across execution contexts have to serialize access themselves.
pub struct Eeprom<T: Platform> {
    pub(crate) hal: T,
    pub(crate) config: Config,
    pub(crate) layout: Layout,
    // index of the most recently written physical row; stays at 0 in the virgin state
    pub(crate) last_row: u32,
    // global sequence number, 0 until the first write
    pub(crate) seq: u32,
}

impl<T: Platform> Eeprom<T> {
    /// Validates the configuration, derives the physical layout and scans the whole
    /// rotation set for the row with the highest sequence number. A virgin region
    /// comes up with sequence number 0 and reads as all zeroes.
    pub fn new(config: Config, hal: T) -> Result<Eeprom<T>, Error> {
        let layout = Layout::new(&config, T::ERASE_SIZE)?;
        let available = hal.capacity().saturating_sub(config.start_address as usize);
        if layout.physical_size() as usize > available {
            return Err(Error::RegionTooSmall);
        }

        let mut eeprom = Self {
            hal,
            config,
            layout,
            last_row: 0,
            seq: 0,
        };
        eeprom.scan_last_written()?;
        Ok(eeprom)
    }

    /// Reads `buf.len()` bytes starting at logical `address`.
    ///
    /// Bytes that were never written read as zero. With `redundant_copy` enabled a
    /// corrupted primary row is transparently replaced by its mirror and rewritten;
    /// if both copies fail validation the whole request is withheld and
    /// [`error::Error::ChecksumMismatch`] is returned.
    pub fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Error> {
        self.read_range(address, buf)
    }

    /// Writes `data` at logical `address`.
    ///
    /// The data is split into row-sized chunks; each chunk costs exactly one physical
    /// row write (two with `redundant_copy`). A failed chunk leaves the previous state
    /// authoritative, so the call may simply be retried.
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        self.write_range(address, data)
    }

    /// Erases the whole emulated EEPROM.
    ///
    /// Walks backward across every physical row (and mirror), then writes one zeroed
    /// placeholder row carrying the continuing sequence number so later writes keep
    /// their position in the wear rotation. Erase is not atomic: a failure mid-walk
    /// leaves the content inconsistent, though the erase may be retried.
    pub fn erase(&mut self) -> Result<(), Error> {
        self.erase_all()
    }

    /// Current global sequence number, i.e. the number of row writes performed over
    /// the lifetime of this region.
    pub fn num_writes(&self) -> u32 {
        self.seq
    }

    /// Configured logical size in bytes.
    pub fn capacity(&self) -> u32 {
        self.config.eeprom_size
    }

    /// Flash taken up by the emulation, including wear leveling copies and the mirror
    /// region.
    pub fn physical_size(&self) -> u32 {
        self.layout.physical_size()
    }
}
