use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::vag;

#[derive(Parser)]
#[command(name = "vag")]
#[command(about = "Convert between PSX VAG ADPCM streams and WAV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a VAG stream to WAV
    ToWav(vag::ToWavArgs),
    /// Encode a WAV file to a VAG stream
    ToVag(vag::ToVagArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::ToWav(args) => vag::to_wav(args),
        Commands::ToVag(args) => vag::to_vag(args),
    }
}
