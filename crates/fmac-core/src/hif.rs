//! Low-level host interface: indirect SRAM access and bounded polling.
//!
//! The chip exposes its SRAM through a window register pair (base address
//! plus data port) rather than a flat address space. Reads additionally go
//! through a prefetch handshake in the config register. Everything in this
//! module is a thin, bus-agnostic wrapper over those sequences.

use std::thread;
use std::time::Duration;

use crate::protocol::Register;
use crate::protocol::registers::CFG_PREFETCH_BIT;
use crate::transport::{BusError, BusTransport};

/// Polls `probe` up to `retries` times, sleeping `delay_ms` between attempts.
///
/// `probe` returns `Ok(Some(value))` when the condition is met, `Ok(None)` to
/// keep waiting. Exhausting the budget yields [`BusError::Timeout`]. This is
/// the only spin-wait in the crate; every bounded wait goes through it.
pub fn poll_until<T, F>(retries: u32, delay_ms: u64, mut probe: F) -> Result<T, BusError>
where
    F: FnMut() -> Result<Option<T>, BusError>,
{
    for attempt in 0..retries {
        if let Some(value) = probe()? {
            return Ok(value);
        }
        if attempt + 1 < retries {
            thread::sleep(Duration::from_millis(delay_ms));
        }
    }
    Err(BusError::Timeout {
        timeout_ms: u64::from(retries) * delay_ms,
    })
}

/// Writes a block of bytes into chip SRAM at `addr`.
pub fn sram_write<B: BusTransport>(bus: &B, addr: u32, data: &[u8]) -> Result<(), BusError> {
    bus.write_u32(Register::SramBaseAddr, addr)?;
    bus.write_block(Register::SramDport, data)
}

/// Writes one 32-bit word into chip SRAM at `addr`.
pub fn sram_write_u32<B: BusTransport>(bus: &B, addr: u32, value: u32) -> Result<(), BusError> {
    bus.write_u32(Register::SramBaseAddr, addr)?;
    bus.write_u32(Register::SramDport, value)
}

/// Reads one 32-bit word from chip SRAM at `addr`.
///
/// The window must be armed, the prefetch bit raised, and the bit polled
/// back down before the data port holds the word.
pub fn sram_read_u32<B: BusTransport>(bus: &B, addr: u32) -> Result<u32, BusError> {
    use crate::protocol::constants::{PREFETCH_POLL_DELAY_MS, PREFETCH_POLL_RETRIES};

    bus.write_u32(Register::SramBaseAddr, addr)?;
    let config = bus.read_u32(Register::Config)?;
    bus.write_u32(Register::Config, config | CFG_PREFETCH_BIT)?;
    poll_until(PREFETCH_POLL_RETRIES, PREFETCH_POLL_DELAY_MS, || {
        let config = bus.read_u32(Register::Config)?;
        Ok((config & CFG_PREFETCH_BIT == 0).then_some(()))
    })?;
    bus.read_u32(Register::SramDport)
}

/// Polls an SRAM word until it equals `expected`.
pub fn poll_sram_for_value<B: BusTransport>(
    bus: &B,
    addr: u32,
    expected: u32,
    retries: u32,
    delay_ms: u64,
) -> Result<(), BusError> {
    poll_until(retries, delay_ms, || {
        let value = sram_read_u32(bus, addr)?;
        Ok((value == expected).then_some(()))
    })
}

/// Read-modify-write helper setting bits in the config register.
pub fn config_set_bits<B: BusTransport>(bus: &B, bits: u32) -> Result<(), BusError> {
    let config = bus.read_u32(Register::Config)?;
    bus.write_u32(Register::Config, config | bits)
}

/// Read-modify-write helper clearing bits in the config register.
pub fn config_clear_bits<B: BusTransport>(bus: &B, bits: u32) -> Result<(), BusError> {
    let config = bus.read_u32(Register::Config)?;
    bus.write_u32(Register::Config, config & !bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockBus;

    #[test]
    fn sram_word_roundtrip() {
        let bus = MockBus::new();
        sram_write_u32(&bus, 0x0900_4000, 0xDEAD_BEEF).unwrap();
        assert_eq!(sram_read_u32(&bus, 0x0900_4000).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn sram_block_write_lands_bytes() {
        let bus = MockBus::new();
        sram_write(&bus, 0x0900_0000, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(sram_read_u32(&bus, 0x0900_0000).unwrap(), 0x0403_0201);
        assert_eq!(sram_read_u32(&bus, 0x0900_0004).unwrap(), 0x0807_0605);
    }

    #[test]
    fn poll_until_times_out() {
        let err = poll_until::<(), _>(3, 0, || Ok(None)).unwrap_err();
        assert!(matches!(err, BusError::Timeout { .. }));
    }

    #[test]
    fn poll_sram_sees_value_written_later() {
        let bus = MockBus::new();
        sram_write_u32(&bus, 0x0900_C010, 0x1234_5678).unwrap();
        poll_sram_for_value(&bus, 0x0900_C010, 0x1234_5678, 3, 0).unwrap();

        let err = poll_sram_for_value(&bus, 0x0900_C010, 0xFFFF_FFFF, 3, 0).unwrap_err();
        assert!(matches!(err, BusError::Timeout { .. }));
    }

    #[test]
    fn config_bit_helpers_read_modify_write() {
        let bus = MockBus::new();
        let before = bus.read_u32(crate::protocol::Register::Config).unwrap();
        config_set_bits(&bus, 1 << 3).unwrap();
        assert_eq!(
            bus.read_u32(crate::protocol::Register::Config).unwrap(),
            before | (1 << 3)
        );
        config_clear_bits(&bus, 1 << 3).unwrap();
        assert_eq!(bus.read_u32(crate::protocol::Register::Config).unwrap(), before);
    }
}
