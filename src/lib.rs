// license:BSD-3-Clause
//! Decoder for retro video game music files.
//!
//! Two input formats are supported: the VGM command log (AY-3-8910 and
//! NES APU writes are emulated, other chips are parsed and skipped) and
//! the NSF ROM image, which is driven by executing its INIT/PLAY 6502
//! subroutines on an embedded interpreter. Output is 16-bit unsigned
//! stereo PCM, resampled from the internal 44 100 Hz tick rate to the
//! caller-chosen rate.

pub mod driver;
pub mod sound;
