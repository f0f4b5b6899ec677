//! Scanner/recovery plus the write, read and erase engines.
//!
//! All recency reasoning rests on one invariant: sequence numbers strictly increase
//! across the whole rotation set and at most one row holds the global maximum. A
//! row's data half is a snapshot of its slot as of the row's own sequence number;
//! header records with higher sequence numbers override it byte-wise.

use crate::Eeprom;
use crate::error::Error;
use crate::platform::Platform;
use crate::row;
use alloc::vec;
use alloc::vec::Vec;
#[cfg(feature = "defmt")]
use defmt::trace;

/// Upper bound for one polled row program/erase before it counts as failed.
const ROW_PROGRAM_TIMEOUT_MS: u32 = 50;
const BUSY_POLL_STEP_MS: u32 = 1;

// Flash primitives. Rows are always moved whole, which keeps every access aligned to
// the driver's read/write granularity.
impl<T: Platform> Eeprom<T> {
    fn read_row(&mut self, address: u32) -> Result<Vec<u8>, Error> {
        #[cfg(feature = "defmt")]
        trace!("read_row: @{:#08x}", address);

        let mut buf = vec![0u8; self.layout.row_size as usize];
        self.hal
            .read(address, &mut buf)
            .map_err(|_| Error::FlashError)?;
        Ok(buf)
    }

    fn erase_row(&mut self, address: u32) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("erase_row: @{:#08x}", address);

        #[cfg(feature = "debug-logs")]
        println!("  engine: erase_row @{address:#08x}");

        self.hal
            .erase(address, address + self.layout.row_size)
            .map_err(|_| Error::FlashError)?;
        self.wait_ready()
    }

    fn program_row(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("program_row: @{:#08x}", address);

        #[cfg(feature = "debug-logs")]
        println!("  engine: program_row @{address:#08x}");

        self.erase_row(address)?;
        self.hal
            .write(address, data)
            .map_err(|_| Error::FlashError)?;
        self.wait_ready()
    }

    /// On the polled write path, waits for the flash to finish the issued operation.
    /// A driver that never deasserts busy within the timeout counts as failed.
    fn wait_ready(&mut self) -> Result<(), Error> {
        if self.config.blocking_write {
            return Ok(());
        }

        let mut waited = 0;
        while self.hal.is_busy() {
            if waited >= ROW_PROGRAM_TIMEOUT_MS {
                return Err(Error::FlashError);
            }
            self.hal.delay_ms(BUSY_POLL_STEP_MS);
            waited += BUSY_POLL_STEP_MS;
        }
        Ok(())
    }
}

// Scanner and recovery.
impl<T: Platform> Eeprom<T> {
    /// Full scan of the rotation set for the row with the strictly largest sequence
    /// number. A virgin region leaves the state at row 0, sequence 0.
    pub(crate) fn scan_last_written(&mut self) -> Result<(), Error> {
        let mut last_row = 0;
        let mut seq = 0;
        for index in 0..self.layout.total_rows() {
            let buf = self.read_row(self.layout.row_address(index))?;
            let header = row::decode_header(&self.layout, &buf);
            if header.written() && header.seq > seq {
                seq = header.seq;
                last_row = index;
            }
        }

        #[cfg(feature = "defmt")]
        trace!("scan_last_written: row {}, sequence {}", last_row, seq);

        self.last_row = last_row;
        self.seq = seq;
        Ok(())
    }

    /// Linear probe of the rotation set for the row carrying `seq`. Rows overwritten
    /// since drop out of the set, so absence is a normal outcome.
    fn row_by_sequence(&mut self, seq: u32) -> Result<Option<(u32, Vec<u8>)>, Error> {
        for index in 0..self.layout.total_rows() {
            let buf = self.read_row(self.layout.row_address(index))?;
            let header = row::decode_header(&self.layout, &buf);
            if header.written() && header.seq == seq {
                return Ok(Some((index, buf)));
            }
        }
        Ok(None)
    }

    /// Returns the trustworthy image of a row that is known to be written.
    ///
    /// Without redundancy the primary is trusted unconditionally. With redundancy the
    /// primary's checksum is verified; on mismatch the mirror takes over and is copied
    /// back over the primary, healing it in place. Two failing copies mean the row is
    /// lost.
    fn validate_and_recover(&mut self, index: u32, primary: Vec<u8>) -> Result<Vec<u8>, Error> {
        if !self.layout.redundant || row::checksum_ok(&self.layout, &primary) {
            return Ok(primary);
        }

        #[cfg(feature = "defmt")]
        trace!("validate_and_recover: row {} corrupt, trying mirror", index);

        #[cfg(feature = "debug-logs")]
        println!("  engine: row {index} failed checksum, falling back to mirror");

        let mirror = self.read_row(self.layout.mirror_address(index))?;
        if !row::checksum_ok(&self.layout, &mirror) {
            return Err(Error::ChecksumMismatch);
        }
        self.program_row(self.layout.row_address(index), &mirror)?;
        Ok(mirror)
    }

    fn check_range(&self, address: u32, len: usize) -> Result<u32, Error> {
        if len == 0 {
            return Err(Error::EmptyBuffer);
        }
        let Ok(len) = u32::try_from(len) else {
            return Err(Error::OutOfBounds);
        };
        match address.checked_add(len) {
            Some(end) if end <= self.config.eeprom_size => Ok(len),
            _ => Err(Error::OutOfBounds),
        }
    }
}

// Write engine.
impl<T: Platform> Eeprom<T> {
    pub(crate) fn write_range(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        self.check_range(address, data.len())?;

        #[cfg(feature = "debug-logs")]
        println!("engine: write {} bytes @{address}", data.len());

        let chunk_capacity = self.layout.header_payload_len() as usize;
        let mut offset = 0;
        while offset < data.len() {
            let chunk_len = (data.len() - offset).min(chunk_capacity);
            self.write_chunk(address + offset as u32, &data[offset..offset + chunk_len])?;
            offset += chunk_len;
        }
        Ok(())
    }

    /// Writes one chunk into the next row of the rotation. The rotation state only
    /// advances after both copies landed, so a failure leaves the previous state
    /// authoritative and the chunk retryable.
    fn write_chunk(&mut self, chunk_address: u32, chunk: &[u8]) -> Result<(), Error> {
        let target = self.layout.next_row(self.last_row);
        let slot = self.layout.slot_of(target);
        let slot_range = self.layout.slot_range(slot);
        let data_len = self.layout.data_len() as usize;
        let seq = self.seq + 1;

        #[cfg(feature = "defmt")]
        trace!(
            "write_chunk: sequence {} -> row {} (slot {})",
            seq, target, slot
        );

        // Carry the slot's previous snapshot forward so bytes outside this write
        // survive. With a wear leveling factor of 1 the previous pass is the target
        // row itself, read here before it is erased.
        let mut data_half = vec![0u8; data_len];
        let historic = self.layout.prev_pass_row(target);
        let primary = self.read_row(self.layout.row_address(historic))?;
        if row::decode_header(&self.layout, &primary).written() {
            let buf = self.validate_and_recover(historic, primary)?;
            data_half.copy_from_slice(&buf[..data_len]);
        }

        // Replay the header records the snapshot may predate, oldest first so the
        // newest write wins. One slot pass is exactly `row_count` sequence numbers,
        // which bounds how far back a record relevant to this slot can sit.
        let lookback = seq.saturating_sub(self.layout.row_count - 1).max(1);
        for replay_seq in lookback..seq {
            let Some((_, buf)) = self.row_by_sequence(replay_seq)? else {
                continue;
            };
            let header = row::decode_header(&self.layout, &buf);
            if !header.fits(&self.layout, self.config.eeprom_size) {
                continue;
            }
            row::overlay(
                row::header_payload(&self.layout, &buf, &header),
                header.address,
                &mut data_half,
                slot_range.start,
            );
        }

        // The chunk being written is the newest record of all.
        row::overlay(chunk, chunk_address, &mut data_half, slot_range.start);

        let encoded = row::encode(&self.layout, seq, chunk_address, chunk, &data_half);
        self.program_row(self.layout.row_address(target), &encoded)?;
        if self.layout.redundant {
            self.program_row(self.layout.mirror_address(target), &encoded)?;
        }

        self.last_row = target;
        self.seq = seq;
        Ok(())
    }
}

// Read engine.
impl<T: Platform> Eeprom<T> {
    pub(crate) fn read_range(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Error> {
        let len = self.check_range(address, buf.len())?;

        #[cfg(feature = "debug-logs")]
        println!("engine: read {len} bytes @{address}");

        // Bytes no write ever touched read as zero.
        buf.fill(0);
        if self.seq == 0 {
            return Ok(());
        }

        // Phase 1: merge the snapshot of every slot the request overlaps. Has to
        // complete for the whole range before any overlay is applied.
        for slot in self.layout.slots_of_range(address, len) {
            let index = self.layout.current_row_of_slot(self.last_row, slot);
            let primary = self.read_row(self.layout.row_address(index))?;
            if !row::decode_header(&self.layout, &primary).written() {
                continue;
            }
            let validated = self.validate_and_recover(index, primary)?;
            row::overlay(
                &validated[..self.layout.data_len() as usize],
                self.layout.slot_range(slot).start,
                buf,
                address,
            );
        }

        // Phase 2: header records newer than the snapshots win, applied oldest to
        // newest.
        let lookback = self.seq.saturating_sub(self.layout.row_count).max(1);
        for replay_seq in lookback..=self.seq {
            let Some((index, row_buf)) = self.row_by_sequence(replay_seq)? else {
                continue;
            };
            let header = row::decode_header(&self.layout, &row_buf);
            if !header.fits(&self.layout, self.config.eeprom_size) {
                continue;
            }
            if header.range().end <= address || header.range().start >= address + len {
                continue;
            }
            let validated = self.validate_and_recover(index, row_buf)?;
            // after a mirror fallback the recovered row's header is the one to trust
            let header = row::decode_header(&self.layout, &validated);
            if !header.fits(&self.layout, self.config.eeprom_size) {
                continue;
            }
            row::overlay(
                row::header_payload(&self.layout, &validated, &header),
                header.address,
                buf,
                address,
            );
        }
        Ok(())
    }
}

// Erase engine.
impl<T: Platform> Eeprom<T> {
    pub(crate) fn erase_all(&mut self) -> Result<(), Error> {
        #[cfg(feature = "debug-logs")]
        println!("engine: erase, sequence {}", self.seq);

        // Backward walk from the last written row, wrapping across the whole
        // rotation set; the globally-largest sequence number disappears first.
        let total = self.layout.total_rows();
        let mut index = self.last_row;
        for _ in 0..total {
            self.erase_row(self.layout.row_address(index))?;
            if self.layout.redundant {
                self.erase_row(self.layout.mirror_address(index))?;
            }
            index = if index == 0 { total - 1 } else { index - 1 };
        }

        // One zeroed placeholder row at the position the next write would have
        // taken carries the continuing sequence number and the rotation position.
        // With redundancy enabled the placeholder is mirrored like any other row.
        let next = self.layout.next_row(self.last_row);
        let seq = self.seq + 1;
        let data_half = vec![0u8; self.layout.data_len() as usize];
        let encoded = row::encode(&self.layout, seq, 0, &[], &data_half);
        self.program_row(self.layout.row_address(next), &encoded)?;
        if self.layout.redundant {
            self.program_row(self.layout.mirror_address(next), &encoded)?;
        }

        self.last_row = next;
        self.seq = seq;
        Ok(())
    }
}
