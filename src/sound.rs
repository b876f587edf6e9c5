// license:BSD-3-Clause
mod ay8910;
mod nes_apu;
mod nes_bus;
mod nes_cartridge;
mod nes_cpu;

pub use crate::sound::ay8910::{
    Ay8910, CHIP_TYPE_AY8910, CHIP_TYPE_AY8912, CHIP_TYPE_AY8913, CHIP_TYPE_AY8914,
    CHIP_TYPE_AY8930, CHIP_TYPE_YM2149, CHIP_TYPE_YM3439, CHIP_TYPE_YMZ284, CHIP_TYPE_YMZ294,
};
pub use crate::sound::nes_apu::{ApuMemoryView, NesApu};
pub use crate::sound::nes_bus::NesBus;
pub use crate::sound::nes_cartridge::NsfCartridge;
pub use crate::sound::nes_cpu::{CpuError, Mos6502, NesCpuState};

/// Silent amplitude of the unsigned 16-bit samples produced by the chips.
pub const SILENCE_LEVEL: u16 = 0x8000;

/// One silent stereo sample, already packed.
pub const SILENT_SAMPLE: u32 = pack_sample(SILENCE_LEVEL, SILENCE_LEVEL);

/// Packs one stereo sample as `(right << 16) | left`.
#[inline]
pub const fn pack_sample(left: u16, right: u16) -> u32 {
    (right as u32) << 16 | left as u32
}

/// Splits a packed stereo sample back into `(left, right)`.
#[inline]
pub const fn unpack_sample(sample: u32) -> (u16, u16) {
    (sample as u16, (sample >> 16) as u16)
}
