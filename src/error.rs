use thiserror::Error;

/// Errors returned by the emulated EEPROM. All failures are reported as values, never
/// panics; the only automatic recovery is the redundant-copy fallback inside reads.
/// Marked non-exhaustive to allow future additions without breaking the API.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The configuration was rejected: zero logical size, a wear leveling factor
    /// outside 1..=10, a start address not aligned to the flash row size, or a flash
    /// row too small to carry the row header.
    #[error("invalid configuration")]
    InvalidConfig,

    /// The physical image (rows x wear leveling factor x copies) does not fit into
    /// the flash reported by the driver.
    #[error("emulated EEPROM does not fit the flash region")]
    RegionTooSmall,

    /// Read and write requests need at least one byte.
    #[error("empty buffer")]
    EmptyBuffer,

    /// The requested range lies outside the configured logical size.
    #[error("address range out of bounds")]
    OutOfBounds,

    /// Both the primary row and its redundant copy failed checksum validation; the
    /// data covering the requested range is lost.
    #[error("checksum mismatch on both row copies")]
    ChecksumMismatch,

    /// The underlying flash driver reported a failure, or a polled program/erase did
    /// not finish within the timeout.
    #[error("flash operation failed")]
    FlashError,
}
