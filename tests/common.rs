#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use em_eeprom::platform::Platform;
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

pub const ROW_SIZE: usize = 512;
pub const WORD_SIZE: usize = 4;

pub const DATA_LEN: usize = ROW_SIZE / 2;
pub const SEQ_OFFSET: usize = DATA_LEN;
pub const ADDR_OFFSET: usize = DATA_LEN + 4;
pub const LEN_OFFSET: usize = DATA_LEN + 8;
pub const HEADER_DATA_OFFSET: usize = DATA_LEN + 12;
pub const CHECKSUM_OFFSET: usize = ROW_SIZE - 4;

pub struct Flash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
    /// Times `is_busy` still reports busy before the flash counts as ready.
    pub busy_polls: usize,
    pub slept_ms: u32,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32, len: usize },
}

impl Flash {
    pub fn new(rows: usize) -> Self {
        Self {
            buf: vec![0xFFu8; ROW_SIZE * rows],
            fail_after_operation: usize::MAX,
            operations: vec![],
            busy_polls: 0,
            slept_ms: 0,
        }
    }

    pub fn new_with_fault(rows: usize, fail_after_operation: usize) -> Self {
        Self {
            fail_after_operation,
            ..Self::new(rows)
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    /// Raw image of one physical row.
    pub fn row(&self, index: usize) -> &[u8] {
        &self.buf[index * ROW_SIZE..(index + 1) * ROW_SIZE]
    }

    /// Sequence number a physical row carries; erased rows read as all-ones.
    pub fn row_seq(&self, index: usize) -> u32 {
        let offset = index * ROW_SIZE + SEQ_OFFSET;
        u32::from_le_bytes(self.buf[offset..offset + 4].try_into().unwrap())
    }

    pub fn erases(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Erase { .. }))
            .count()
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }
}

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl ErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = WORD_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::READ_SIZE as _));

        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = WORD_SIZE;

    const ERASE_SIZE: usize = ROW_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert!(from.is_multiple_of(Self::ERASE_SIZE as _));
        assert!(to.is_multiple_of(Self::ERASE_SIZE as _));

        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }

        self.operations.push(Operation::Erase {
            offset: from,
            len: (to - from) as usize,
        });

        for addr in from..to {
            self.buf[addr as usize] = 0xFF;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::WRITE_SIZE as _));
        assert!(bytes.len().is_multiple_of(Self::WRITE_SIZE as _));
        assert!(!bytes.is_empty());

        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }

        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        for (i, &val) in bytes.iter().enumerate() {
            // programming only flips bits from 1 to 0
            self.buf[offset + i] &= val;
        }
        Ok(())
    }
}

impl Platform for Flash {
    fn delay_ms(&mut self, ms: u32) {
        self.slept_ms += ms;
    }

    fn is_busy(&mut self) -> bool {
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            true
        } else {
            false
        }
    }
}
