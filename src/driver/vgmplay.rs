// license:BSD-3-Clause
use std::io::Read;

use flate2::read::GzDecoder;

use crate::driver::meta::Jsonlize;
use crate::driver::vgmmeta;
use crate::driver::vgmmeta::{Gd3, VgmHeader};
use crate::driver::DecoderError;
use crate::sound::{Ay8910, NesBus, SILENT_SAMPLE};

/// VGM command streams are timed in 44 100 Hz samples.
pub const VGM_TICK_RATE: u32 = 44100;

/// VGM command-log decoder.
///
/// Walks the command stream and routes register writes into the chips
/// selected by the header clocks: AY-3-8910 family (command 0xA0) and
/// NES APU (command 0xB4). All other chip writes are length-skipped.
pub struct VgmDecoder {
    vgm_data: Vec<u8>,
    vgm_header: VgmHeader,
    vgm_gd3: Gd3,
    vgm_pos: usize,
    vgm_loop_offset: usize,
    vgm_loops: u8,
    wait_samples: u32,
    samples_played: u64,
    msx_chip: Option<Ay8910>,
    nes_chip: Option<NesBus>,
}

impl VgmDecoder {
    pub fn new(vgm_file: &[u8]) -> Result<Self, DecoderError> {
        let vgm_data = extract(vgm_file);
        if vgm_data.len() < 0x40 {
            return Err(DecoderError::BadFormat("vgm header too short"));
        }
        let (header, gd3) =
            vgmmeta::parse_vgm_meta(&vgm_data).map_err(DecoderError::BadFormat)?;
        if header.eof_offset as usize != vgm_data.len() - 4 {
            return Err(DecoderError::BadFormat("vgm eof offset mismatch"));
        }
        log::info!(
            "vgm version {:X}.{:02X}",
            header.version >> 8,
            header.version & 0xFF
        );

        let mut vgm_pos = 0x40;
        if header.version >= 0x150 && header.vgm_data_offset != 0 {
            vgm_pos = 0x34 + header.vgm_data_offset as usize;
        }
        if vgm_pos >= vgm_data.len() {
            return Err(DecoderError::BadFormat("vgm data offset out of range"));
        }
        let (vgm_loop_offset, vgm_loops) = if header.offset_loop != 0 {
            (0x1C + header.offset_loop as usize, 2)
        } else {
            (0, 1)
        };

        let mut msx_chip = None;
        let mut nes_chip = None;
        if header.clock_ay8910 != 0 {
            let mut chip = Ay8910::new();
            chip.set_type(header.ay8910_chip_type, header.ay8910_flags);
            chip.set_frequency(header.clock_ay8910 & 0x3FFF_FFFF);
            log::info!(
                "ay8910 clock {} Hz, type 0x{:02X}",
                header.clock_ay8910,
                header.ay8910_chip_type
            );
            msx_chip = Some(chip);
        } else if header.clock_nes_apu != 0 {
            log::info!("nes apu clock {} Hz", header.clock_nes_apu);
            nes_chip = Some(NesBus::new());
        }

        Ok(VgmDecoder {
            vgm_data,
            vgm_header: header,
            vgm_gd3: gd3,
            vgm_pos,
            vgm_loop_offset,
            vgm_loops,
            wait_samples: 0,
            samples_played: 0,
            msx_chip,
            nes_chip,
        })
    }

    pub fn header(&self) -> &VgmHeader {
        &self.vgm_header
    }

    pub fn gd3(&self) -> &Gd3 {
        &self.vgm_gd3
    }

    pub fn header_json(&self) -> String {
        self.vgm_header.get_json()
    }

    pub fn gd3_json(&self) -> String {
        self.vgm_gd3.get_json()
    }

    pub fn track_count(&self) -> usize {
        1
    }

    pub fn set_track(&mut self, track: usize) -> bool {
        track == 0
    }

    pub fn set_volume(&mut self, volume: u16) {
        if let Some(chip) = self.msx_chip.as_mut() {
            chip.set_volume(volume);
        }
        if let Some(bus) = self.nes_chip.as_mut() {
            bus.apu().set_volume(volume);
        }
    }

    /// Runs commands until the next wait, returning the number of
    /// samples to consume: -1 on a corrupt stream, 0 at end of stream.
    pub fn decode_block(&mut self) -> i32 {
        self.wait_samples = 0;
        while self.wait_samples == 0 {
            match self.next_command() {
                Err(err) => {
                    log::error!("{}", err);
                    return -1;
                }
                Ok(false) => return 0,
                Ok(true) => {}
            }
        }
        self.wait_samples as i32
    }

    /// Renders one chip sample at the 44 100 Hz tick rate.
    pub fn sample(&mut self) -> u32 {
        self.samples_played += 1;
        if let Some(chip) = self.msx_chip.as_mut() {
            return chip.sample();
        }
        if let Some(bus) = self.nes_chip.as_mut() {
            return bus.sample();
        }
        SILENT_SAMPLE
    }

    pub fn samples_played(&self) -> u64 {
        self.samples_played
    }

    fn get_u8(&mut self) -> Result<u8, DecoderError> {
        let data = *self
            .vgm_data
            .get(self.vgm_pos)
            .ok_or(DecoderError::BadFormat("truncated vgm command stream"))?;
        self.vgm_pos += 1;
        Ok(data)
    }

    fn get_u16(&mut self) -> Result<u16, DecoderError> {
        Ok(self.get_u8()? as u16 | (self.get_u8()? as u16) << 8)
    }

    fn get_u32(&mut self) -> Result<u32, DecoderError> {
        Ok(self.get_u16()? as u32 | (self.get_u16()? as u32) << 16)
    }

    fn skip(&mut self, count: usize) -> Result<(), DecoderError> {
        if self.vgm_pos + count > self.vgm_data.len() {
            return Err(DecoderError::BadFormat("truncated vgm command stream"));
        }
        self.vgm_pos += count;
        Ok(())
    }

    /// Consumes one command. `Ok(true)` continues, `Ok(false)` ends the
    /// stream; waits are left in `self.wait_samples`.
    fn next_command(&mut self) -> Result<bool, DecoderError> {
        let command_pos = self.vgm_pos;
        let command = self.get_u8()?;
        match command {
            // AY8910 stereo mask
            0x31 => self.skip(1)?,
            // Game Gear PSG stereo
            0x4F => self.skip(1)?,
            // PSG (SN76489/SN76496)
            0x50 => self.skip(1)?,
            // FM chips this decoder does not emulate
            0x51..=0x5F => self.skip(2)?,
            0x61 => {
                self.wait_samples = self.get_u16()? as u32 + 1;
            }
            0x62 => {
                self.wait_samples = 735;
            }
            0x63 => {
                self.wait_samples = 882;
            }
            0x66 => {
                // end of stream; rewind when a loop remains
                if self.vgm_loop_offset != 0 && self.vgm_loops != 1 {
                    self.vgm_pos = self.vgm_loop_offset;
                    if self.vgm_loops > 0 {
                        self.vgm_loops -= 1;
                    }
                } else {
                    log::info!("end of vgm stream");
                    return Ok(false);
                }
            }
            0x67 => {
                // data block: 0x67 0x66 tt ss ss ss ss data
                self.get_u8()?; // 0x66 compatibility byte
                let data_type = self.get_u8()?;
                let data_length = self.get_u32()? as usize;
                let data_pos = self.vgm_pos;
                self.skip(data_length)?;
                log::info!("data block type 0x{:02X} len {}", data_type, data_length);
                if let Some(bus) = self.nes_chip.as_mut() {
                    bus.cartridge_mut()
                        .set_data_block_prefixed(&self.vgm_data[data_pos..data_pos + data_length]);
                }
            }
            // PCM RAM write
            0x68 => self.skip(11)?,
            0x70..=0x7F => {
                self.wait_samples = (command & 0x0F) as u32 + 1;
            }
            // YM2612 data-bank write; only the wait is modeled
            0x80..=0x8F => {
                self.wait_samples = (command & 0x0F) as u32;
            }
            // DAC stream control
            0x90 | 0x91 | 0x95 => self.skip(4)?,
            0x92 => self.skip(5)?,
            0x93 => self.skip(10)?,
            0x94 => self.skip(1)?,
            0xA0 => {
                let reg = self.get_u8()?;
                let data = self.get_u8()?;
                if let Some(chip) = self.msx_chip.as_mut() {
                    chip.write(reg, data as u16);
                }
            }
            0xB4 => {
                let reg = self.get_u8()?;
                let data = self.get_u8()?;
                if let Some(bus) = self.nes_chip.as_mut() {
                    bus.apu().write(reg as u16, data);
                }
            }
            // other two-operand chip writes
            0xB0..=0xB3 | 0xB5..=0xBF => self.skip(2)?,
            // dual chip selects
            0x30 | 0x3F => self.skip(1)?,
            0x32..=0x3E => self.skip(1)?,
            // reserved two-operand range
            0x40..=0x4E => self.skip(2)?,
            // second-chip writes
            0xA1..=0xAF => self.skip(2)?,
            // three-operand chip writes and reserved ranges
            0xC0..=0xC8 | 0xD0..=0xD6 => self.skip(3)?,
            0xC9..=0xCF | 0xD7..=0xDF => self.skip(3)?,
            // four-operand commands
            0xE0..=0xFF => self.skip(4)?,
            _ => {
                log::error!(
                    "unknown vgm command 0x{:02X} at position 0x{:08X}",
                    command,
                    command_pos
                );
                return Err(DecoderError::BadFormat("unknown vgm command"));
            }
        }
        Ok(true)
    }
}

/// Transparently gunzips `.vgz` data; raw data is used when the gzip
/// probe fails.
fn extract(vgm_file: &[u8]) -> Vec<u8> {
    let mut decoder = GzDecoder::new(vgm_file);
    let mut vgm_data = Vec::new();
    if decoder.read_to_end(&mut vgm_data).is_err() {
        vgm_data = vgm_file.to_vec();
    }
    vgm_data
}
