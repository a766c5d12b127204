use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use cadenza::config::{self, Config};
use cadenza::convert::{ConversionJob, Converter, EncodeOptions, TargetCodec};
use cadenza::events::types::AppEvent;
use cadenza::library::scan;
use cadenza::player::Player;
use cadenza::player::sink::cpal_opener;

#[derive(Parser)]
#[command(name = "cadenza", about = "Play, convert and list audio files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play files back to back on the default output device
    Play { files: Vec<PathBuf> },
    /// Convert a file to another format
    Convert {
        input: PathBuf,
        /// Target codec: mp3, ogg, flac or wav
        #[arg(short, long, default_value = "mp3")]
        format: String,
        /// Bit rate in kbps for lossy targets
        #[arg(short, long)]
        bitrate: Option<u32>,
        /// Output path; defaults to the input with the target extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List audio files in a directory
    Scan { dir: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = config::load_or_create_config()?;
    let cli = Cli::parse();
    let (event_tx, event_rx) = mpsc::channel::<AppEvent>();

    match cli.command {
        Command::Play { files } => run_play(files, event_tx, event_rx),
        Command::Convert {
            input,
            format,
            bitrate,
            output,
        } => run_convert(&config, input, &format, bitrate, output, event_tx, event_rx),
        Command::Scan { dir } => run_scan(&config, dir, event_tx, event_rx),
    }
}

fn run_play(
    files: Vec<PathBuf>,
    event_tx: mpsc::Sender<AppEvent>,
    event_rx: mpsc::Receiver<AppEvent>,
) -> Result<()> {
    if files.is_empty() {
        bail!("nothing to play");
    }

    let mut player = Player::spawn(cpal_opener(), event_tx);
    let total = files.len();
    for file in files {
        player.enqueue(file);
    }

    let mut done = 0;
    while done < total {
        match event_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(AppEvent::PlaybackStarted {
                path,
                duration_secs,
            }) => {
                println!("playing {} ({duration_secs:.1}s)", path.display());
            }
            Ok(AppEvent::PositionChanged(secs)) => {
                print!("\r  {secs:7.1}s");
                use std::io::Write;
                let _ = std::io::stdout().flush();
            }
            Ok(AppEvent::PlaybackFinished) => {
                println!();
                done += 1;
            }
            Ok(AppEvent::PlaybackError { path, message }) => {
                println!();
                eprintln!("error playing {}: {message}", path.display());
                done += 1;
            }
            Ok(_) => {}
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    player.stop();
    Ok(())
}

fn run_convert(
    config: &Config,
    input: PathBuf,
    format: &str,
    bitrate: Option<u32>,
    output: Option<PathBuf>,
    event_tx: mpsc::Sender<AppEvent>,
    event_rx: mpsc::Receiver<AppEvent>,
) -> Result<()> {
    let codec: TargetCodec = format.parse().context("invalid target format")?;
    let output = output.unwrap_or_else(|| input.with_extension(codec.extension()));
    let options = EncodeOptions {
        bitrate_kbps: if codec.is_lossless() {
            None
        } else {
            Some(bitrate.unwrap_or(config.default_bitrate_kbps))
        },
    };

    let converter = Converter::new(event_tx);
    let handle = converter.start(ConversionJob {
        input,
        output,
        codec,
        options,
    })?;

    loop {
        match event_rx.recv_timeout(Duration::from_secs(60)) {
            Ok(AppEvent::ConversionProgress(percent)) => {
                print!("\r  {percent:3}%");
                use std::io::Write;
                let _ = std::io::stdout().flush();
            }
            Ok(AppEvent::ConversionFinished { output, error }) => {
                println!();
                match error {
                    None => println!("wrote {}", output.display()),
                    Some(message) => bail!("conversion failed: {message}"),
                }
                break;
            }
            Ok(_) => {}
            Err(e) => bail!("conversion stalled: {e}"),
        }
    }

    let _ = handle.join();
    Ok(())
}

fn run_scan(
    config: &Config,
    dir: PathBuf,
    event_tx: mpsc::Sender<AppEvent>,
    event_rx: mpsc::Receiver<AppEvent>,
) -> Result<()> {
    let handle = scan::spawn(dir, config.audio_extensions.clone(), event_tx);

    loop {
        match event_rx.recv_timeout(Duration::from_secs(30)) {
            Ok(AppEvent::ScanChunk(chunk)) => {
                for entry in chunk {
                    println!("{:>12}  {}", entry.size, entry.name);
                }
            }
            Ok(AppEvent::ScanFinished(total)) => {
                println!("{total} audio files");
                break;
            }
            Ok(AppEvent::ScanError(message)) => bail!("scan failed: {message}"),
            Ok(_) => {}
            Err(e) => bail!("scan stalled: {e}"),
        }
    }

    let _ = handle.join();
    Ok(())
}
