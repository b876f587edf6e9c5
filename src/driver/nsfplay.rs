// license:BSD-3-Clause
use crate::driver::meta::Jsonlize;
use crate::driver::nsfmeta;
use crate::driver::nsfmeta::NsfHeader;
use crate::driver::vgmplay::VGM_TICK_RATE;
use crate::driver::DecoderError;
use crate::sound::{Mos6502, NesBus};

/// Instruction budget for one PLAY tick. A driver that is still running
/// after this many instructions is treated as looping forever.
const PLAY_INSTRUCTION_BUDGET: i32 = 20_000;

/// NSF decoder.
///
/// Installs the ROM body as a cartridge data block, then drives the
/// tune by calling its INIT subroutine once per track selection and
/// its PLAY subroutine once per tick on the embedded 6502.
pub struct NsfDecoder {
    nsf_header: NsfHeader,
    bus: NesBus,
    cpu: Mos6502,
    wait_samples: u32,
}

impl NsfDecoder {
    pub fn new(data: &[u8]) -> Result<Self, DecoderError> {
        let header = nsfmeta::parse_nsf_meta(data).map_err(DecoderError::BadFormat)?;
        log::info!(
            "nsf \"{}\" by \"{}\", {} track(s), ntsc rate {} us",
            header.name,
            header.artist,
            header.song_index,
            header.ntsc_play_speed
        );
        let mut bus = NesBus::new();
        bus.cartridge_mut()
            .set_data_block(header.load_address as u32, &data[0x80..]);
        let mut decoder = NsfDecoder {
            nsf_header: header,
            bus,
            cpu: Mos6502::new(),
            wait_samples: 0,
        };
        if !decoder.set_track(0) {
            return Err(DecoderError::BadFormat("nsf init subroutine faulted"));
        }
        Ok(decoder)
    }

    pub fn header(&self) -> &NsfHeader {
        &self.nsf_header
    }

    pub fn header_json(&self) -> String {
        self.nsf_header.get_json()
    }

    pub fn track_count(&self) -> usize {
        self.nsf_header.song_index as usize
    }

    /// Selects and initializes a track. An out-of-range index silently
    /// selects track 0.
    pub fn set_track(&mut self, track: usize) -> bool {
        self.bus.reset();
        if self.nsf_header.bank_switch.iter().any(|&bank| bank != 0) {
            for i in 0..8u16 {
                self.bus
                    .write(0x5FF8 + i, self.nsf_header.bank_switch[i as usize]);
            }
        }
        // Clear RAM and APU registers, then enable pulse/tri/noise in
        // 4-step frame-counter mode, as hardware players do before INIT.
        for addr in 0x0000..=0x07FFu16 {
            self.bus.write(addr, 0x00);
        }
        for addr in 0x4000..=0x4013u16 {
            self.bus.write(addr, 0x00);
        }
        self.bus.write(0x4015, 0x00);
        self.bus.write(0x4015, 0x0F);
        self.bus.write(0x4017, 0x40);

        let state = self.cpu.state_mut();
        state.a = if track < self.nsf_header.song_index as usize {
            track as u8
        } else {
            0
        };
        state.x = 0; // ntsc
        state.sp = 0xEF;
        if self
            .cpu
            .call_subroutine(&mut self.bus, self.nsf_header.init_address, -1)
            < 0
        {
            log::error!("failed to call the nsf init subroutine");
            return false;
        }
        true
    }

    pub fn set_volume(&mut self, volume: u16) {
        self.bus.apu().set_volume(volume);
    }

    /// Runs one PLAY tick; returns the number of samples to consume
    /// until the next tick, 0 to stop, -1 on a CPU fault.
    pub fn decode_block(&mut self) -> i32 {
        let result = self.cpu.call_subroutine(
            &mut self.bus,
            self.nsf_header.play_address,
            PLAY_INSTRUCTION_BUDGET,
        );
        if result < 0 {
            log::error!("play subroutine faulted, stopping");
            return -1;
        }
        if result == 0 {
            log::error!("play subroutine looks like an infinite loop, stopping");
            return 0;
        }
        self.wait_samples = (VGM_TICK_RATE as u64 * self.nsf_header.ntsc_play_speed as u64
            / 1_000_000) as u32;
        self.wait_samples as i32
    }

    /// Renders one chip sample at the 44 100 Hz tick rate.
    pub fn sample(&mut self) -> u32 {
        self.bus.sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::{unpack_sample, SILENCE_LEVEL};

    /// Builds an NSF whose INIT routine runs `init_code` and whose PLAY
    /// routine is a bare RTS, loaded at 0x8000.
    fn build_nsf(tracks: u8, init_code: &[u8]) -> Vec<u8> {
        let mut body = init_code.to_vec();
        body.push(0x60); // RTS closing INIT
        let play_address = 0x8000 + body.len() as u16;
        body.push(0x60); // PLAY: RTS
        let mut data = vec![0u8; 0x80];
        data[0..5].copy_from_slice(b"NESM\x1A");
        data[0x05] = 1;
        data[0x06] = tracks;
        data[0x08..0x0A].copy_from_slice(&0x8000u16.to_le_bytes());
        data[0x0A..0x0C].copy_from_slice(&0x8000u16.to_le_bytes());
        data[0x0C..0x0E].copy_from_slice(&play_address.to_le_bytes());
        data[0x6E..0x70].copy_from_slice(&16666u16.to_le_bytes());
        data.extend_from_slice(&body);
        data
    }

    /// INIT writes a pulse-1 tone: $4015=01, $4002=80, $4003=00, $4000=3F.
    fn pulse_init() -> Vec<u8> {
        vec![
            0xA9, 0x01, 0x8D, 0x15, 0x40, // LDA #$01; STA $4015
            0xA9, 0x80, 0x8D, 0x02, 0x40, // LDA #$80; STA $4002
            0xA9, 0x00, 0x8D, 0x03, 0x40, // LDA #$00; STA $4003
            0xA9, 0x3F, 0x8D, 0x00, 0x40, // LDA #$3F; STA $4000
        ]
    }

    #[test]
    fn open_rejects_bad_magic() {
        let mut data = build_nsf(1, &[]);
        data[0] = b'X';
        assert!(NsfDecoder::new(&data).is_err());
    }

    #[test]
    fn play_tick_returns_sample_count_from_header_rate() {
        let data = build_nsf(1, &[]);
        let mut decoder = NsfDecoder::new(&data).unwrap();
        // 44100 * 16666 / 1e6
        assert_eq!(decoder.decode_block(), 734);
    }

    #[test]
    fn init_register_writes_produce_a_tone() {
        let data = build_nsf(1, &pulse_init());
        let mut decoder = NsfDecoder::new(&data).unwrap();
        assert!(decoder.decode_block() > 0);
        let samples: Vec<u16> = (0..2048).map(|_| unpack_sample(decoder.sample()).0).collect();
        assert!(samples.iter().any(|&s| s > SILENCE_LEVEL));
        assert!(samples.iter().any(|&s| s == SILENCE_LEVEL));
    }

    #[test]
    fn out_of_range_track_selects_track_zero() {
        let data = build_nsf(1, &pulse_init());
        let mut decoder = NsfDecoder::new(&data).unwrap();
        assert!(decoder.set_track(5));
        // A register was preloaded with 0, and the tune still plays
        assert!(decoder.decode_block() > 0);
    }

    #[test]
    fn faulting_init_fails_open() {
        // 0x02 is an undefined opcode
        let data = build_nsf(1, &[0x02]);
        assert!(NsfDecoder::new(&data).is_err());
    }

    #[test]
    fn infinite_play_loop_stops_decoding() {
        // PLAY jumps to itself; patch the PLAY vector onto a JMP loop
        let mut data = build_nsf(1, &[]);
        let play = 0x8000 + 1 + 1; // after INIT's RTS and PLAY's RTS
        data[0x0C..0x0E].copy_from_slice(&(play as u16).to_le_bytes());
        data.extend_from_slice(&[0x4C, (play & 0xFF) as u8, (play >> 8) as u8]);
        let mut decoder = NsfDecoder::new(&data).unwrap();
        assert_eq!(decoder.decode_block(), 0);
    }

    #[test]
    fn initial_banks_from_header_are_installed() {
        // 8 KiB body so bank pages exist; bankSwitch selects page 1 for
        // the first window
        let mut body = vec![0u8; 0x2000];
        body[0] = 0x60; // INIT: RTS
        body[1] = 0x60; // PLAY: RTS
        for byte in body[0x1000..0x2000].iter_mut() {
            *byte = 0xAB;
        }
        let mut data = vec![0u8; 0x80];
        data[0..5].copy_from_slice(b"NESM\x1A");
        data[0x05] = 1;
        data[0x06] = 1;
        data[0x08..0x0A].copy_from_slice(&0x8000u16.to_le_bytes());
        data[0x0A..0x0C].copy_from_slice(&0x8000u16.to_le_bytes());
        data[0x0C..0x0E].copy_from_slice(&0x8001u16.to_le_bytes());
        data[0x6E..0x70].copy_from_slice(&16666u16.to_le_bytes());
        data[0x70] = 0; // window 0 keeps page 0 so INIT stays reachable
        data[0x71] = 1;
        data.extend_from_slice(&body);
        let mut decoder = NsfDecoder::new(&data).unwrap();
        // window 1 (0x9000) shows page 1 of the payload
        assert_eq!(decoder.bus.read(0x9000), 0xAB);
        assert!(decoder.decode_block() > 0);
    }
}
