//! Chip register file and field accessors.
//!
//! The chip exposes seven addressable registers over SPI/SDIO. Field
//! extraction is done with explicit shift/mask helpers; the layouts are a
//! wire contract, not a compiler artifact.

use std::fmt;

/// Addressable registers on the chip side of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Chip configuration and mode control (32-bit).
    Config,
    /// Queue status and piggyback source (16-bit).
    Control,
    /// Frame queue data port.
    InOutQueue,
    /// Direct AHB data port.
    AhbDport,
    /// SRAM window base address.
    SramBaseAddr,
    /// SRAM window data port.
    SramDport,
    /// Scratch register used for the bus probe.
    TsetGenRW,
    /// Outbound frame staging.
    FrameOut,
}

impl Register {
    /// Bus address of the register.
    pub const fn id(self) -> u16 {
        match self {
            Register::Config => 0x0000,
            Register::Control => 0x0001,
            Register::InOutQueue => 0x0002,
            Register::AhbDport => 0x0003,
            Register::SramBaseAddr => 0x0004,
            Register::SramDport => 0x0005,
            Register::TsetGenRW => 0x0006,
            Register::FrameOut => 0x0007,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Register::Config => "CONFIG",
            Register::Control => "CONTROL",
            Register::InOutQueue => "IN_OUT_QUEUE",
            Register::AhbDport => "AHB_DPORT",
            Register::SramBaseAddr => "SRAM_BASE_ADDR",
            Register::SramDport => "SRAM_DPORT",
            Register::TsetGenRW => "TSET_GEN_R_W",
            Register::FrameOut => "FRAME_OUT",
        };
        f.write_str(name)
    }
}

// Control register layout.
const CTRL_NEXT_LEN_MASK: u16 = 0x0FFF;
const CTRL_FRAME_TYPE_OFFSET: u16 = 14;
const CTRL_FRAME_TYPE_MASK: u16 = 0x3;
pub const CTRL_WUP_BIT: u16 = 1 << 12;
pub const CTRL_RDY_BIT: u16 = 1 << 13;

/// Byte length of the next pending frame encoded in a control word.
/// The register stores it in 16-bit words; zero means nothing pending.
#[inline]
pub const fn ctrl_next_frame_len(ctrl: u16) -> u32 {
    (ctrl & CTRL_NEXT_LEN_MASK) as u32 * 2
}

/// Queue class of the next pending frame (confirmation/indication vs data).
#[inline]
pub const fn ctrl_frame_type(ctrl: u16) -> u8 {
    ((ctrl >> CTRL_FRAME_TYPE_OFFSET) & CTRL_FRAME_TYPE_MASK) as u8
}

#[inline]
pub const fn ctrl_is_ready(ctrl: u16) -> bool {
    ctrl & CTRL_RDY_BIT != 0
}

// Config register layout.
pub const CFG_ACCESS_MODE_BIT: u32 = 1 << 10;
pub const CFG_CPU_CLK_DIS_BIT: u32 = 1 << 12;
pub const CFG_PREFETCH_BIT: u32 = 1 << 13;
pub const CFG_CPU_RESET_BIT: u32 = 1 << 14;
/// Data-ready plus wake-up interrupt sources.
pub const CFG_IRQ_ENABLE_BITS: u32 = (1 << 16) | (1 << 17);

const CFG_HW_REVISION_OFFSET: u32 = 24;
const CFG_HW_REVISION_MASK: u32 = 0x7;
const CFG_HW_TYPE_OFFSET: u32 = 31;
const CFG_HW_TYPE_MASK: u32 = 0x1;

/// Silicon revision field of the config register.
#[inline]
pub const fn cfg_hardware_revision(cfg: u32) -> u8 {
    ((cfg >> CFG_HW_REVISION_OFFSET) & CFG_HW_REVISION_MASK) as u8
}

/// Hardware type field of the config register.
#[inline]
pub const fn cfg_hardware_type(cfg: u32) -> u8 {
    ((cfg >> CFG_HW_TYPE_OFFSET) & CFG_HW_TYPE_MASK) as u8
}

/// True while the chip is still in direct-access (register) mode.
#[inline]
pub const fn cfg_in_direct_access_mode(cfg: u32) -> bool {
    cfg & CFG_ACCESS_MODE_BIT != 0
}
