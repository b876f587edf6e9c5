// license:BSD-3-Clause
use crate::driver::nsfplay::NsfDecoder;
use crate::driver::vgmplay::{VgmDecoder, VGM_TICK_RATE};
use crate::driver::DecoderError;
use crate::sound::{unpack_sample, SILENCE_LEVEL, SILENT_SAMPLE};

/// Default duration cap in milliseconds.
pub const DEFAULT_MAX_DURATION_MS: u32 = 90_000;

/// The fade window covers the last two seconds of the duration cap.
const FADE_WINDOW: u64 = 2 * VGM_TICK_RATE as u64;

/// Format dispatch over the two supported decoders.
pub enum MusicDecoder {
    Vgm(VgmDecoder),
    Nsf(NsfDecoder),
}

impl MusicDecoder {
    /// Sniffs the file magic and opens the matching decoder.
    pub fn open(data: &[u8]) -> Result<Self, DecoderError> {
        if data.starts_with(b"NESM\x1A") {
            return Ok(MusicDecoder::Nsf(NsfDecoder::new(data)?));
        }
        // plain "Vgm " or a gzip stream (.vgz)
        if data.starts_with(b"Vgm ") || data.starts_with(&[0x1F, 0x8B]) {
            return Ok(MusicDecoder::Vgm(VgmDecoder::new(data)?));
        }
        Err(DecoderError::BadFormat("unrecognized file magic"))
    }

    fn decode_block(&mut self) -> i32 {
        match self {
            MusicDecoder::Vgm(decoder) => decoder.decode_block(),
            MusicDecoder::Nsf(decoder) => decoder.decode_block(),
        }
    }

    fn sample(&mut self) -> u32 {
        match self {
            MusicDecoder::Vgm(decoder) => decoder.sample(),
            MusicDecoder::Nsf(decoder) => decoder.sample(),
        }
    }

    pub fn set_volume(&mut self, volume: u16) {
        match self {
            MusicDecoder::Vgm(decoder) => decoder.set_volume(volume),
            MusicDecoder::Nsf(decoder) => decoder.set_volume(volume),
        }
    }

    pub fn track_count(&self) -> usize {
        match self {
            MusicDecoder::Vgm(decoder) => decoder.track_count(),
            MusicDecoder::Nsf(decoder) => decoder.track_count(),
        }
    }

    pub fn set_track(&mut self, track: usize) -> bool {
        match self {
            MusicDecoder::Vgm(decoder) => decoder.set_track(track),
            MusicDecoder::Nsf(decoder) => decoder.set_track(track),
        }
    }
}

/// PCM front end: resamples the 44 100 Hz decoder output to the
/// requested rate (nearest-neighbor, held-sample), applies the
/// end-of-track fade and enforces the duration cap.
pub struct MusicPlayer {
    decoder: MusicDecoder,
    write_counter: u32,
    write_scaler: u32,
    pending_sample: Option<u32>,
    wait_samples: u32,
    samples_played: u64,
    max_duration_samples: u64,
    fade_enabled: bool,
    finished: bool,
}

impl MusicPlayer {
    pub fn open(data: &[u8]) -> Result<Self, DecoderError> {
        Ok(MusicPlayer {
            decoder: MusicDecoder::open(data)?,
            write_counter: 0,
            write_scaler: VGM_TICK_RATE,
            pending_sample: None,
            wait_samples: 0,
            samples_played: 0,
            max_duration_samples: DEFAULT_MAX_DURATION_MS as u64 * VGM_TICK_RATE as u64 / 1000,
            fade_enabled: true,
            finished: false,
        })
    }

    pub fn decoder(&self) -> &MusicDecoder {
        &self.decoder
    }

    /// Sets the output sample rate (default 44 100 Hz).
    pub fn set_sample_frequency(&mut self, frequency: u32) {
        if frequency != 0 {
            self.write_scaler = frequency;
        }
    }

    /// Caps total emission regardless of what the decoder returns.
    pub fn set_max_duration_ms(&mut self, milliseconds: u32) {
        self.max_duration_samples = milliseconds as u64 * VGM_TICK_RATE as u64 / 1000;
    }

    pub fn set_fade(&mut self, enabled: bool) {
        self.fade_enabled = enabled;
    }

    pub fn set_volume(&mut self, volume: u16) {
        self.decoder.set_volume(volume);
    }

    pub fn track_count(&self) -> usize {
        self.decoder.track_count()
    }

    pub fn set_track(&mut self, track: usize) -> bool {
        self.decoder.set_track(track)
    }

    pub fn samples_played(&self) -> u64 {
        self.samples_played
    }

    /// Fills `out` with interleaved little-endian unsigned 16-bit
    /// stereo PCM. Returns the number of bytes written; `Ok(0)` means
    /// end of stream. A corrupt stream that produced no output at all
    /// surfaces as an error.
    pub fn decode_pcm(&mut self, out: &mut [u8]) -> Result<usize, DecoderError> {
        let mut decoded = 0usize;
        if self.finished {
            return Ok(0);
        }
        'fill: while decoded + 4 <= out.len() {
            if self.samples_played >= self.max_duration_samples {
                self.finished = true;
                break;
            }
            while self.wait_samples == 0 {
                let block = self.decoder.decode_block();
                if block < 0 {
                    self.finished = true;
                    if decoded == 0 {
                        return Err(DecoderError::DecodeFailed);
                    }
                    break 'fill;
                }
                if block == 0 {
                    self.finished = true;
                    break 'fill;
                }
                self.wait_samples = block as u32;
            }
            while self.wait_samples > 0
                && decoded + 4 <= out.len()
                && self.samples_played < self.max_duration_samples
            {
                let sample = self.decoder.sample();
                if self.pending_sample.is_none() {
                    self.pending_sample = Some(sample);
                }
                self.write_counter += self.write_scaler;
                self.wait_samples -= 1;
                self.samples_played += 1;
                if self.write_counter >= VGM_TICK_RATE {
                    let held = self.pending_sample.take().unwrap_or(SILENT_SAMPLE);
                    let (left, right) = unpack_sample(held);
                    let (left, right) = self.apply_fade(left, right);
                    out[decoded..decoded + 2].copy_from_slice(&left.to_le_bytes());
                    out[decoded + 2..decoded + 4].copy_from_slice(&right.to_le_bytes());
                    decoded += 4;
                    self.write_counter -= VGM_TICK_RATE;
                }
            }
        }
        Ok(decoded)
    }

    /// Linear attenuation over the last [`FADE_WINDOW`] samples of the
    /// duration cap, applied to the bias-centered value.
    fn apply_fade(&self, left: u16, right: u16) -> (u16, u16) {
        if !self.fade_enabled {
            return (left, right);
        }
        let remaining = self.max_duration_samples.saturating_sub(self.samples_played);
        if remaining >= FADE_WINDOW {
            return (left, right);
        }
        let shifter = (remaining >> 7) as i64;
        let scale = |value: u16| -> u16 {
            let centered = value as i64 - SILENCE_LEVEL as i64;
            (centered * shifter / 1024 + SILENCE_LEVEL as i64) as u16
        };
        (scale(left), scale(right))
    }
}
