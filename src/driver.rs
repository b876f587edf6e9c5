// license:BSD-3-Clause
mod meta;
mod nsfmeta;
mod nsfplay;
mod player;
mod vgmmeta;
mod vgmplay;

pub use crate::driver::nsfmeta::NsfHeader;
pub use crate::driver::nsfplay::NsfDecoder;
pub use crate::driver::player::{MusicDecoder, MusicPlayer, DEFAULT_MAX_DURATION_MS};
pub use crate::driver::vgmmeta::{Gd3, VgmHeader};
pub use crate::driver::vgmplay::VgmDecoder;
pub use crate::driver::vgmplay::VGM_TICK_RATE;

use thiserror::Error;

use crate::sound::CpuError;

/// Decoder-level failures surfaced to the caller. Everything else
/// (unknown chips, memory faults, bank traces) is absorbed with a log
/// line so playback degrades gracefully.
#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("bad format: {0}")]
    BadFormat(&'static str),
    #[error("decoder failed mid-stream")]
    DecodeFailed,
    #[error(transparent)]
    Cpu(#[from] CpuError),
}
