use anyhow::{Context, Result};
use clap::Args;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use vag::VagReader;

#[derive(Args)]
pub struct ToWavArgs {
    /// Input VAG file
    pub input: PathBuf,
    /// Output WAV file (default: input path with .wav extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Print stream info before converting
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct ToVagArgs {
    /// Input WAV file
    pub input: PathBuf,
    /// Output VAG file (default: input path with .vag extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Print stream info before converting
    #[arg(short, long)]
    pub verbose: bool,
    /// Write an interleaved VAGi stream instead of non-interleaved VAGp
    #[arg(short, long)]
    pub interleaved: bool,
    /// Tag every chunk's last frame with the streaming loop flags
    #[arg(short, long)]
    pub loop_flags: bool,
    /// Interleave chunk size in bytes (required with --interleaved, multiple of 2048)
    #[arg(short = 'c', long)]
    pub chunk_size: Option<u32>,
}

pub fn to_wav(args: ToWavArgs) -> Result<()> {
    let input = BufReader::new(File::open(&args.input).context("opening input VAG")?);
    let mut reader = VagReader::new(input, false).context("parsing VAG header")?;

    if args.verbose {
        println!("sample rate: {}", reader.sample_rate());
        println!("channels: {}", reader.channel_count());
        println!(
            "total samples per channel: {}",
            reader.total_samples_per_channel()
        );
        println!("duration: {:.3}s", reader.duration_seconds());
        println!("interleaved: {}", reader.interleaved());
        println!("chunk size: {}", reader.chunk_size());
    }

    let out_path = args.output.unwrap_or_else(|| args.input.with_extension("wav"));
    let spec = hound::WavSpec {
        channels: reader.channel_count(),
        sample_rate: reader.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&out_path, spec).context("creating output WAV")?;

    let mut buf = [0i16; 4096];
    loop {
        let n = reader.read_i16(&mut buf)?;
        if n == 0 {
            break;
        }
        for &sample in &buf[..n] {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize().context("finalizing output WAV")?;

    println!("wrote {:?}", out_path);
    Ok(())
}

pub fn to_vag(args: ToVagArgs) -> Result<()> {
    let wav_reader = hound::WavReader::open(&args.input).context("opening input WAV")?;
    let spec = wav_reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        anyhow::bail!("input WAV must be 16-bit integer PCM");
    }

    let samples: Vec<i16> = wav_reader
        .into_samples::<i16>()
        .collect::<std::result::Result<_, _>>()
        .context("reading WAV samples")?;

    let chunk_size = if args.interleaved {
        args.chunk_size
            .context("--chunk-size is required with --interleaved")?
    } else {
        0
    };

    if args.verbose {
        println!("sample rate: {}", spec.sample_rate);
        println!("channels: {}", spec.channels);
        println!("interleaved: {}", args.interleaved);
        if args.interleaved {
            println!("chunk size: {chunk_size}");
        }
        println!("loop flags: {}", args.loop_flags);
    }

    let out_path = args.output.unwrap_or_else(|| args.input.with_extension("vag"));
    let output = BufWriter::new(File::create(&out_path).context("creating output VAG")?);
    let mut writer = vag::VagWriter::new(
        args.interleaved,
        args.loop_flags,
        spec.sample_rate,
        spec.channels,
        chunk_size,
        output,
        false,
    )
    .context("configuring VAG writer")?;

    writer.append_i16(&samples)?;
    writer.finalize().context("finalizing VAG stream")?;

    println!("wrote {:?}", out_path);
    Ok(())
}
