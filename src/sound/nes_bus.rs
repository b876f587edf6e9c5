// license:BSD-3-Clause
//! NES memory bus.
//!
//! Owns the 2 KiB work RAM, the APU and the cartridge, and arbitrates
//! every CPU access between them. The DMC sample fetch inside
//! [`NesBus::sample`] reads the same address space through a read-only
//! view, with APU register reads pinned to 0.

use crate::sound::nes_apu::{ApuMemoryView, NesApu};
use crate::sound::nes_cartridge::NsfCartridge;

const NES_RAM_SIZE: usize = 0x800;

/// CPU-visible memory map: RAM, APU registers and cartridge space.
pub struct NesBus {
    ram: Box<[u8; NES_RAM_SIZE]>,
    apu: NesApu,
    cartridge: NsfCartridge,
}

impl NesBus {
    pub fn new() -> Self {
        NesBus {
            ram: Box::new([0; NES_RAM_SIZE]),
            apu: NesApu::new(),
            cartridge: NsfCartridge::new(),
        }
    }

    pub fn apu(&mut self) -> &mut NesApu {
        &mut self.apu
    }

    pub fn cartridge_mut(&mut self) -> &mut NsfCartridge {
        &mut self.cartridge
    }

    /// Reinitializes chip state, keeping RAM and cartridge contents.
    pub fn reset(&mut self) {
        self.apu.reset();
        self.cartridge.reset();
    }

    /// Cold boot: also clears work RAM.
    pub fn power(&mut self) {
        self.ram.fill(0);
        self.apu.power();
        self.cartridge.power();
    }

    pub fn read(&self, address: u16) -> u8 {
        if address < 0x2000 {
            let data = self.ram[(address & 0x07FF) as usize];
            log::trace!("[{:04X}] ==> {:02X}", address, data);
            return data;
        }
        if (0x4000..0x4020).contains(&address) {
            return self.apu.read(address);
        }
        if address >= 0x4020 {
            return self.cartridge.read(address);
        }
        log::error!("memory data fetch error 0x{:04X}", address);
        0xFF
    }

    pub fn write(&mut self, address: u16, data: u8) -> bool {
        if address < 0x2000 {
            self.ram[(address & 0x07FF) as usize] = data;
            log::trace!("[{:04X}] <== {:02X}", address, data);
            return true;
        }
        if (0x4000..0x4020).contains(&address) {
            self.apu.write(address, data);
            return true;
        }
        if address >= 0x4020 {
            return self.cartridge.write(address, data);
        }
        log::error!("memory data write error 0x{:04X}", address);
        false
    }

    /// Renders one APU sample. DMC fetches read RAM and cartridge
    /// space synchronously through [`DmcView`].
    pub fn sample(&mut self) -> u32 {
        let NesBus {
            ram,
            apu,
            cartridge,
        } = self;
        let view = DmcView {
            ram: &**ram,
            cartridge: &*cartridge,
        };
        apu.sample(&view)
    }
}

impl Default for NesBus {
    fn default() -> Self {
        Self::new()
    }
}

struct DmcView<'a> {
    ram: &'a [u8; NES_RAM_SIZE],
    cartridge: &'a NsfCartridge,
}

impl ApuMemoryView for DmcView<'_> {
    fn read(&self, address: u16) -> u8 {
        if address < 0x2000 {
            return self.ram[(address & 0x07FF) as usize];
        }
        if (0x4000..0x4020).contains(&address) {
            return 0;
        }
        if address >= 0x4020 {
            return self.cartridge.read(address);
        }
        0xFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::{unpack_sample, SILENCE_LEVEL};

    #[test]
    fn ram_is_mirrored_through_0x1fff() {
        let mut bus = NesBus::new();
        bus.write(0x0001, 0xAB);
        assert_eq!(bus.read(0x0801), 0xAB);
        assert_eq!(bus.read(0x1001), 0xAB);
        assert_eq!(bus.read(0x1801), 0xAB);
    }

    #[test]
    fn ppu_holes_read_0xff_and_ignore_writes() {
        let mut bus = NesBus::new();
        assert!(!bus.write(0x2000, 0x12));
        assert_eq!(bus.read(0x3FFF), 0xFF);
    }

    #[test]
    fn apu_window_reads_zero() {
        let bus = NesBus::new();
        assert_eq!(bus.read(0x4015), 0);
        assert_eq!(bus.read(0x4000), 0);
    }

    #[test]
    fn power_clears_ram() {
        let mut bus = NesBus::new();
        bus.write(0x0100, 0x42);
        bus.power();
        assert_eq!(bus.read(0x0100), 0x00);
    }

    #[test]
    fn idle_bus_renders_silence() {
        let mut bus = NesBus::new();
        for _ in 0..64 {
            let (l, r) = unpack_sample(bus.sample());
            assert_eq!(l, SILENCE_LEVEL);
            assert_eq!(r, SILENCE_LEVEL);
        }
    }

    #[test]
    fn dmc_fetches_from_cartridge_space() {
        let mut bus = NesBus::new();
        // 17 bytes of delta-up data at the DMC base address
        bus.cartridge_mut().set_data_block(0xC000, &[0xFF; 17]);
        bus.write(0x4010, 0x0F);
        bus.write(0x4012, 0x00);
        bus.write(0x4013, 0x01);
        bus.write(0x4015, 0x10);
        let mut peak = 0u16;
        for _ in 0..4096 {
            let (l, _) = unpack_sample(bus.sample());
            peak = peak.max(l);
        }
        assert!(peak > SILENCE_LEVEL);
    }
}
