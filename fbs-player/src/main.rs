//! FBS player entry point.
//!
//! ```text
//! fbs-player <recording>                  Play to the end
//! fbs-player <recording> --seek 5000      Seek, then play
//! fbs-player <recording> --dump out.ppm   Save the final framebuffer
//! fbs-player --gen-config                 Dump default config and exit
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fbs_core::Session;

use fbs_player::config::{LoggingConfig, PlayerConfig};
use fbs_player::{dump, player};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "fbs-player", about = "Play, seek and snapshot FBS screen recordings")]
struct Cli {
    /// Recording to open.
    #[arg(required_unless_present = "gen_config")]
    recording: Option<PathBuf>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "fbs-player.toml")]
    config: PathBuf,

    /// Seek to this timestamp (ms) before playing.
    #[arg(long)]
    seek: Option<u32>,

    /// Stop after this many frames (0 = play to the end).
    #[arg(long)]
    frames: Option<u64>,

    /// Write the final framebuffer as a binary PPM.
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        println!("{}", PlayerConfig::default_toml()?);
        return Ok(());
    }

    let (mut config, source) = PlayerConfig::load(&cli.config);
    if let Some(ms) = cli.seek {
        config.playback.seek_ms = Some(ms);
    }
    if let Some(n) = cli.frames {
        config.playback.max_frames = n;
    }
    if let Some(path) = cli.dump {
        config.playback.dump = Some(path.display().to_string());
    }

    init_tracing(&config.logging)?;
    info!("fbs-player v{}", env!("CARGO_PKG_VERSION"));
    source.log(&cli.config);

    let Some(recording) = cli.recording else {
        return Err("no recording given".into());
    };

    let mut session = Session::open_path(&recording, config.decoder.clone())?;
    let stream = session.info();
    info!(
        "{}: {}x{}, {} ms",
        recording.display(),
        stream.width,
        stream.height,
        stream.duration_ms
    );

    if let Some(ms) = config.playback.seek_ms {
        player::seek(&mut session, ms)?;
    }
    let summary = player::play(&mut session, config.playback.max_frames)?;
    info!(
        "{} damaged, {} skipped messages, {} clipped runs",
        summary.damaged, summary.skipped_messages, summary.clipped_runs
    );

    if let Some(path) = &config.playback.dump {
        dump::save_ppm(Path::new(path), session.framebuffer())?;
        info!("framebuffer written to {path}");
    }

    session.close();
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = File::create(&logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}
