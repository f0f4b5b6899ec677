use embedded_storage::nor_flash::NorFlash;

/// Hardware services the emulation consumes: row-granular program/erase through
/// [`NorFlash`], plus the delay and busy-poll primitives used when
/// `Config::blocking_write` is disabled.
///
/// `ERASE_SIZE` doubles as the emulation's row size, so the trait has to be
/// implemented on the driver for the flash bank that backs the EEPROM region.
///
/// See README.md for an example implementation.
pub trait Platform: NorFlash {
    /// Sleep for at least `ms` milliseconds. Only called on the polled write path.
    fn delay_ms(&mut self, ms: u32);

    /// Reports whether a previously issued program/erase is still running. Drivers
    /// whose `write`/`erase` only return once the operation finished keep the
    /// default.
    fn is_busy(&mut self) -> bool {
        false
    }
}

impl<T: Platform> Platform for &mut T {
    fn delay_ms(&mut self, ms: u32) {
        T::delay_ms(self, ms)
    }

    fn is_busy(&mut self) -> bool {
        T::is_busy(self)
    }
}
