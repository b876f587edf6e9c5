// license:BSD-3-Clause
use nom::bytes::complete::{tag, take};
use nom::number::complete::{le_u16, le_u8};
use nom::IResult;

use crate::driver::meta::Jsonlize;

/// 128-byte NSF header.
///
/// `song_index` is the 1-based track count; `ntsc_play_speed` is the
/// PLAY period in microseconds.
#[derive(serde::Deserialize, serde::Serialize, Default, Debug, Clone)]
pub struct NsfHeader {
    pub version: u8,
    pub song_index: u8,
    pub load_address: u16,
    pub init_address: u16,
    pub play_address: u16,
    pub name: String,
    pub artist: String,
    pub copyright: String,
    pub ntsc_play_speed: u16,
    pub bank_switch: [u8; 8],
    pub pal_play_speed: u16,
    pub pal_ntsc_bits: u8,
    pub extra_sound_chip: u8,
}

impl NsfHeader {
    pub fn is_pal(&self) -> bool {
        self.pal_ntsc_bits & 0x01 != 0
    }

    pub fn is_dual(&self) -> bool {
        self.pal_ntsc_bits & 0x02 != 0
    }
}

fn parse_text_field(i: &[u8]) -> IResult<&[u8], String> {
    let (i, raw) = take(32usize)(i)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok((i, String::from_utf8_lossy(&raw[..end]).into_owned()))
}

fn parse_nsf_header(i: &[u8]) -> IResult<&[u8], NsfHeader> {
    let (i, _) = tag(b"NESM\x1A")(i)?;
    let (i, version) = le_u8(i)?;
    let (i, song_index) = le_u8(i)?;
    let (i, _) = take(1usize)(i)?; // starting song, unused
    let (i, load_address) = le_u16(i)?;
    let (i, init_address) = le_u16(i)?;
    let (i, play_address) = le_u16(i)?;
    let (i, name) = parse_text_field(i)?;
    let (i, artist) = parse_text_field(i)?;
    let (i, copyright) = parse_text_field(i)?;
    let (i, ntsc_play_speed) = le_u16(i)?;
    let (i, bank) = take(8usize)(i)?;
    let (i, pal_play_speed) = le_u16(i)?;
    let (i, pal_ntsc_bits) = le_u8(i)?;
    let (i, extra_sound_chip) = le_u8(i)?;

    let mut bank_switch = [0u8; 8];
    bank_switch.copy_from_slice(bank);

    Ok((
        i,
        NsfHeader {
            version,
            song_index,
            load_address,
            init_address,
            play_address,
            name,
            artist,
            copyright,
            ntsc_play_speed,
            bank_switch,
            pal_play_speed,
            pal_ntsc_bits,
            extra_sound_chip,
        },
    ))
}

pub(crate) fn parse_nsf_meta(data: &[u8]) -> Result<NsfHeader, &'static str> {
    if data.len() < 0x80 {
        return Err("nsf header too short");
    }
    match parse_nsf_header(data) {
        Ok((_, header)) => Ok(header),
        Err(_) => Err("nsf header parse error"),
    }
}

impl Jsonlize for NsfHeader {}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_header() -> Vec<u8> {
        let mut data = vec![0u8; 0x80];
        data[0..5].copy_from_slice(b"NESM\x1A");
        data[0x05] = 1; // version
        data[0x06] = 3; // songs
        data[0x08..0x0A].copy_from_slice(&0x8000u16.to_le_bytes());
        data[0x0A..0x0C].copy_from_slice(&0x8000u16.to_le_bytes());
        data[0x0C..0x0E].copy_from_slice(&0x8003u16.to_le_bytes());
        data[0x0E..0x13].copy_from_slice(b"Title");
        data[0x2E..0x34].copy_from_slice(b"Artist");
        data[0x4E..0x52].copy_from_slice(b"2020");
        data[0x6E..0x70].copy_from_slice(&16666u16.to_le_bytes());
        data
    }

    #[test]
    fn parses_header_fields() {
        let header = parse_nsf_meta(&build_header()).unwrap();
        assert_eq!(header.song_index, 3);
        assert_eq!(header.load_address, 0x8000);
        assert_eq!(header.init_address, 0x8000);
        assert_eq!(header.play_address, 0x8003);
        assert_eq!(header.name, "Title");
        assert_eq!(header.artist, "Artist");
        assert_eq!(header.copyright, "2020");
        assert_eq!(header.ntsc_play_speed, 16666);
        assert!(!header.is_pal());
        assert!(!header.is_dual());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut data = build_header();
        data[0] = b'X';
        assert!(parse_nsf_meta(&data).is_err());
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert!(parse_nsf_meta(&build_header()[..0x40]).is_err());
    }

    #[test]
    fn bank_switch_bytes_are_copied() {
        let mut data = build_header();
        data[0x70..0x78].copy_from_slice(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let header = parse_nsf_meta(&data).unwrap();
        assert_eq!(header.bank_switch, [0, 1, 2, 3, 4, 5, 6, 7]);
    }
}
