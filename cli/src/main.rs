// license:BSD-3-Clause
use std::fs;
use std::process;

use clap::{Arg, ArgAction, Command};
use libvgmnsf::driver::{MusicPlayer, DEFAULT_MAX_DURATION_MS};

const DECODE_CHUNK_SIZE: usize = 4096;

fn main() {
    env_logger::init();

    let matches = Command::new("vgm2wav")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Converts VGM and NSF music files to WAV")
        .arg(
            Arg::new("input")
                .help("Input .vgm/.vgz/.nsf file path")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .help("Output .wav file path")
                .required(true),
        )
        .arg(
            Arg::new("track")
                .help("Track index (NSF only)")
                .value_parser(clap::value_parser!(usize))
                .default_value("0"),
        )
        .arg(
            Arg::new("rate")
                .help("Output sampling rate")
                .short('r')
                .long("rate")
                .value_parser(clap::value_parser!(u32))
                .default_value("44100"),
        )
        .arg(
            Arg::new("volume")
                .help("Volume in percent")
                .short('v')
                .long("volume")
                .value_parser(clap::value_parser!(u16))
                .default_value("100"),
        )
        .arg(
            Arg::new("duration")
                .help("Duration cap in milliseconds")
                .short('d')
                .long("duration")
                .value_parser(clap::value_parser!(u32))
                .default_value("90000"),
        )
        .arg(
            Arg::new("no-fade")
                .help("Disable the end-of-track fade")
                .long("no-fade")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let input = matches.get_one::<String>("input").unwrap();
    let output = matches.get_one::<String>("output").unwrap();
    let track = *matches.get_one::<usize>("track").unwrap();
    let rate = *matches.get_one::<u32>("rate").unwrap();
    let volume = *matches.get_one::<u16>("volume").unwrap();
    let duration = *matches
        .get_one::<u32>("duration")
        .unwrap_or(&DEFAULT_MAX_DURATION_MS);
    let fade = !matches.get_flag("no-fade");

    let data = match fs::read(input) {
        Ok(data) => data,
        Err(error) => {
            eprintln!("There was a problem opening the file: {:?}", error);
            process::exit(1);
        }
    };

    let mut player = match MusicPlayer::open(&data) {
        Ok(player) => player,
        Err(error) => {
            eprintln!("Failed to parse music data {}: {}", input, error);
            process::exit(1);
        }
    };

    if track >= player.track_count() {
        eprintln!(
            "Source sound file has only {} track(s)",
            player.track_count()
        );
        process::exit(1);
    }

    player.set_volume(volume);
    player.set_sample_frequency(rate);
    player.set_max_duration_ms(duration);
    player.set_fade(fade);
    player.set_track(track);

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = match hound::WavWriter::create(output, spec) {
        Ok(writer) => writer,
        Err(error) => {
            eprintln!("Failed to open file {}: {}", output, error);
            process::exit(1);
        }
    };

    let mut buffer = vec![0u8; DECODE_CHUNK_SIZE];
    loop {
        let decoded = match player.decode_pcm(&mut buffer) {
            Ok(decoded) => decoded,
            Err(error) => {
                eprintln!("Decode error: {}", error);
                process::exit(1);
            }
        };
        if decoded == 0 {
            break;
        }
        for frame in buffer[..decoded].chunks_exact(2) {
            // Convert unsigned PCM16 to signed PCM16
            let unsigned = u16::from_le_bytes([frame[0], frame[1]]);
            let signed = (unsigned as i32 - 0x8000) as i16;
            if let Err(error) = writer.write_sample(signed) {
                eprintln!("Failed to write sample: {}", error);
                process::exit(1);
            }
        }
    }

    if let Err(error) = writer.finalize() {
        eprintln!("Failed to finalize WAV file: {}", error);
        process::exit(1);
    }
    log::info!("done");
}
