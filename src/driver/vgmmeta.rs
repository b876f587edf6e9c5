// license:BSD-3-Clause
use nom::bytes::complete::{tag, take};
use nom::number::complete::{le_u16, le_u32, le_u8};
use nom::IResult;

use crate::driver::meta::Jsonlize;

/// VGM header, https://vgmrips.net/wiki/VGM_Specification
///
/// Only the fields this decoder acts on are carried beyond the v1.01
/// block; the version is kept as the raw little-endian BCD word so it
/// compares directly against 0x150/0x161 style thresholds.
#[derive(serde::Deserialize, serde::Serialize, Default, Debug)]
pub struct VgmHeader {
    pub eof_offset: u32,
    pub version: u32,
    pub clock_sn76489: u32,
    pub clock_ym2413: u32,
    pub offset_gd3: u32,
    pub total_samples: u32,
    pub offset_loop: u32,
    pub loop_samples: u32,
    pub rate: u32,
    pub sn76489_fb: u16,
    pub sn76489_w: u8,
    pub sn76489_f: u8,
    pub clock_ym2612: u32,
    pub clock_ym2151: u32,
    pub vgm_data_offset: u32,
    pub sega_pcm_clock: u32,
    pub spcm_interface: u32,
    pub clock_rf5c68: u32,
    pub clock_ym2203: u32,
    pub clock_ym2608: u32,
    pub clock_ym2610_b: u32,
    pub clock_ym3812: u32,
    pub clock_ym3526: u32,
    pub clock_y8950: u32,
    pub clock_ymf262: u32,
    pub clock_ymf278_b: u32,
    pub clock_ymf271: u32,
    pub clock_ymz280b: u32,
    pub clock_rf5c164: u32,
    pub clock_pwm: u32,
    pub clock_ay8910: u32,
    pub ay8910_chip_type: u8,
    pub ay8910_flags: u8,
    pub ym2203_ay8910_flags: u8,
    pub ym2608_ay8910_flags: u8,
    pub volume_modifier: u8,
    pub reserved01: u8,
    pub loop_base: u8,
    pub loop_modifier: u8,
    pub clock_gb_dmg: u32,
    pub clock_nes_apu: u32,
}

/// GD3 tag, https://vgmrips.net/wiki/GD3_Specification
#[derive(serde::Deserialize, serde::Serialize, Default, Debug)]
pub struct Gd3 {
    pub track_name: String,
    pub track_name_j: String,
    pub game_name: String,
    pub game_name_j: String,
    pub system_name: String,
    pub system_name_j: String,
    pub track_author: String,
    pub track_author_j: String,
    pub date: String,
    pub converted: String,
}

fn parse_vgm_header(i: &[u8]) -> IResult<&[u8], VgmHeader> {
    let full = i;
    let (i, _) = tag("Vgm ")(i)?;
    let (i, eof_offset) = le_u32(i)?;
    let (i, version) = le_u32(i)?;
    let (i, clock_sn76489) = le_u32(i)?;
    let (i, clock_ym2413) = le_u32(i)?;
    let (i, offset_gd3) = le_u32(i)?;
    let (i, total_samples) = le_u32(i)?;
    let (i, offset_loop) = le_u32(i)?;
    let (i, loop_samples) = le_u32(i)?;
    let (i, rate) = le_u32(i)?;
    let (i, sn76489_fb) = le_u16(i)?;
    let (i, sn76489_w) = le_u8(i)?;
    let (i, sn76489_f) = le_u8(i)?;
    let (i, clock_ym2612) = le_u32(i)?;
    let (i, clock_ym2151) = le_u32(i)?;
    let (i, vgm_data_offset) = le_u32(i)?;
    let (i, sega_pcm_clock) = le_u32(i)?;
    let (_, spcm_interface) = le_u32(i)?;

    let mut header = VgmHeader {
        eof_offset,
        version,
        clock_sn76489,
        clock_ym2413,
        offset_gd3,
        total_samples,
        offset_loop,
        loop_samples,
        rate,
        sn76489_fb,
        sn76489_w,
        sn76489_f,
        clock_ym2612,
        clock_ym2151,
        vgm_data_offset,
        sega_pcm_clock,
        spcm_interface,
        ..VgmHeader::default()
    };

    // Extended chip clocks only exist from v1.51 on and only when the
    // file actually carries the longer header.
    if header.version >= 0x151 && full.len() >= 0x80 {
        let i = &full[0x40..];
        let (i, clock_rf5c68) = le_u32(i)?;
        let (i, clock_ym2203) = le_u32(i)?;
        let (i, clock_ym2608) = le_u32(i)?;
        let (i, clock_ym2610_b) = le_u32(i)?;
        let (i, clock_ym3812) = le_u32(i)?;
        let (i, clock_ym3526) = le_u32(i)?;
        let (i, clock_y8950) = le_u32(i)?;
        let (i, clock_ymf262) = le_u32(i)?;
        let (i, clock_ymf278_b) = le_u32(i)?;
        let (i, clock_ymf271) = le_u32(i)?;
        let (i, clock_ymz280b) = le_u32(i)?;
        let (i, clock_rf5c164) = le_u32(i)?;
        let (i, clock_pwm) = le_u32(i)?;
        let (i, clock_ay8910) = le_u32(i)?;
        let (i, ay8910_chip_type) = le_u8(i)?;
        let (i, ay8910_flags) = le_u8(i)?;
        let (i, ym2203_ay8910_flags) = le_u8(i)?;
        let (i, ym2608_ay8910_flags) = le_u8(i)?;
        let (i, volume_modifier) = le_u8(i)?;
        let (i, reserved01) = le_u8(i)?;
        let (i, loop_base) = le_u8(i)?;
        let (_, loop_modifier) = le_u8(i)?;
        header = VgmHeader {
            clock_rf5c68,
            clock_ym2203,
            clock_ym2608,
            clock_ym2610_b,
            clock_ym3812,
            clock_ym3526,
            clock_y8950,
            clock_ymf262,
            clock_ymf278_b,
            clock_ymf271,
            clock_ymz280b,
            clock_rf5c164,
            clock_pwm,
            clock_ay8910,
            ay8910_chip_type,
            ay8910_flags,
            ym2203_ay8910_flags,
            ym2608_ay8910_flags,
            volume_modifier,
            reserved01,
            loop_base,
            loop_modifier,
            ..header
        };
    }
    if header.version >= 0x161 && full.len() >= 0x88 {
        let i = &full[0x80..];
        let (i, clock_gb_dmg) = le_u32(i)?;
        let (_, clock_nes_apu) = le_u32(i)?;
        header = VgmHeader {
            clock_gb_dmg,
            clock_nes_apu,
            ..header
        };
    }

    Ok((full, header))
}

fn parse_utf16_until_null(i: &[u8]) -> IResult<&[u8], String> {
    let mut string: Vec<u16> = Vec::new();
    let (mut i, mut bytes) = take(2usize)(i)?;
    while bytes != b"\0\0" {
        string.push((bytes[1] as u16) << 8 | bytes[0] as u16);
        let next = take(2usize)(i)?;
        i = next.0;
        bytes = next.1;
    }
    Ok((i, String::from_utf16(&string).unwrap_or_default()))
}

fn parse_vgm_gd3(i: &[u8]) -> IResult<&[u8], Gd3> {
    let (i, _) = tag("Gd3 ")(i)?;
    let (i, _) = take(4usize)(i)?; // version
    let (i, _) = take(4usize)(i)?; // length

    let (i, track_name) = parse_utf16_until_null(i)?;
    let (i, track_name_j) = parse_utf16_until_null(i)?;
    let (i, game_name) = parse_utf16_until_null(i)?;
    let (i, game_name_j) = parse_utf16_until_null(i)?;
    let (i, system_name) = parse_utf16_until_null(i)?;
    let (i, system_name_j) = parse_utf16_until_null(i)?;
    let (i, track_author) = parse_utf16_until_null(i)?;
    let (i, track_author_j) = parse_utf16_until_null(i)?;
    let (i, date) = parse_utf16_until_null(i)?;
    let (i, converted) = parse_utf16_until_null(i)?;

    Ok((
        i,
        Gd3 {
            track_name,
            track_name_j,
            game_name,
            game_name_j,
            system_name,
            system_name_j,
            track_author,
            track_author_j,
            date,
            converted,
        },
    ))
}

/// Parses the VGM header and, when present, the trailing GD3 tag. A
/// missing or corrupt GD3 degrades to empty fields.
pub(crate) fn parse_vgm_meta(vgm_data: &[u8]) -> Result<(VgmHeader, Gd3), &'static str> {
    let header = match parse_vgm_header(vgm_data) {
        Ok((_, header)) => header,
        Err(_) => return Err("vgm header parse error"),
    };
    let gd3_pos = 0x14usize + header.offset_gd3 as usize;
    let gd3 = if header.offset_gd3 != 0 && gd3_pos < vgm_data.len() {
        match parse_vgm_gd3(&vgm_data[gd3_pos..]) {
            Ok((_, gd3)) => gd3,
            Err(_) => Gd3::default(),
        }
    } else {
        Gd3::default()
    };

    Ok((header, gd3))
}

impl Jsonlize for VgmHeader {}
impl Jsonlize for Gd3 {}
