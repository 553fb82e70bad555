use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;

use spectroprint::audio::sine_wave;

#[derive(Parser)]
#[command(name = "tone-gen")]
#[command(about = "Write a sine test tone as a 16-bit WAV file")]
struct Args {
    /// Output WAV file
    #[arg(short, long, default_value = "tone.wav")]
    output: PathBuf,

    /// Tone frequency in Hz
    #[arg(short, long, default_value = "440")]
    frequency: f64,

    /// Length in seconds
    #[arg(short, long, default_value = "4")]
    duration: f64,

    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Identical copies of the tone per frame
    #[arg(long, default_value = "1")]
    channels: u16,

    /// Peak amplitude, 0..1
    #[arg(long, default_value = "0.8")]
    amplitude: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let len = (args.duration * args.sample_rate as f64).round() as usize;
    let amplitude = args.amplitude.clamp(0.0, 1.0);
    info!(
        "Generating {:.1} Hz for {:.2}s at {} Hz ({} channel(s))",
        args.frequency, args.duration, args.sample_rate, args.channels
    );

    let spec = WavSpec {
        channels: args.channels.max(1),
        sample_rate: args.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&args.output, spec)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    for sample in sine_wave(len, args.sample_rate, args.frequency, amplitude) {
        let value = (sample * i16::MAX as f64).round() as i16;
        for _ in 0..spec.channels {
            writer.write_sample(value)?;
        }
    }
    writer.finalize()?;

    info!("Wrote {} samples to {}", len, args.output.display());
    Ok(())
}
