use std::future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;

use visionr_audio::config::{AppConfig, SharedConfig};
use visionr_audio::engine::backend::{AudioBackend, SoftwareBackend};
use visionr_audio::engine::clock::FrameTicker;
use visionr_audio::engine::core::SoundEngine;
use visionr_audio::feed::{batch_channel, ConnectionStatus, DataFeed, NetworkFeed, SimulatedFeed};
use visionr_audio::http::{self, DebugSources};
use visionr_audio::projection::{Projector, ScreenPoint, Viewport};
use visionr_audio::render::{render_simulation, write_wav};
use visionr_audio::session::Session;
use visionr_audio::{SoundSnapshot, TagSample};

const BATCH_QUEUE: usize = 64;
/// Frames ticked after `remove_all` so fades finish and emitters are released
const FADE_OUT_FRAMES: u32 = 12;

#[derive(Parser, Debug)]
#[command(
    name = "visionr",
    about = "Spatial audio for tracked fiducial tags"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/visionr_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace); falls back to VISIONR_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sonify the built-in orbiting objects
    Simulate {
        #[command(flatten)]
        live: LiveArgs,
    },
    /// Sonify tags streamed by a tracker over WebSocket
    Listen {
        /// Tracker URL (overrides network.url)
        #[arg(long)]
        url: Option<String>,
        #[command(flatten)]
        live: LiveArgs,
    },
    /// Render the simulation offline to a WAV file
    Render {
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
    },
}

#[derive(Args, Debug, Clone)]
struct LiveArgs {
    /// Run without an audio device (software mixer paced by wall time)
    #[arg(long)]
    headless: bool,
    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    seconds: Option<f64>,
    /// Serve the debug HTTP surface on this address
    #[arg(long)]
    debug_http: Option<SocketAddr>,
    /// Debug HTTP token (falls back to VISIONR_DEBUG_TOKEN)
    #[arg(long)]
    debug_token: Option<String>,
}

enum Source {
    Simulated,
    Network,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    visionr_audio::init_logging(cli.log_level.as_deref());

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Simulate { live } => run_live(&config, Source::Simulated, &live),
        Commands::Listen { url, live } => {
            if let Some(url) = url {
                config.network.url = url;
            }
            run_live(&config, Source::Network, &live)
        }
        Commands::Render { output, seconds } => run_render(&config, &output, seconds),
    }
}

fn run_render(config: &AppConfig, output: &Path, seconds: f64) -> Result<ExitCode> {
    if !seconds.is_finite() || seconds <= 0.0 {
        anyhow::bail!("--seconds must be a positive number (got {})", seconds);
    }

    let render = render_simulation(config, seconds);
    write_wav(
        output,
        &render.samples,
        render.report.sample_rate,
        render.report.channels,
    )
    .with_context(|| format!("writing {}", output.display()))?;

    println!("{}", serde_json::to_string_pretty(&render.report)?);
    Ok(ExitCode::from(0))
}

fn run_live(config: &AppConfig, source: Source, args: &LiveArgs) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    if args.headless {
        let output = config.output;
        let backend = SoftwareBackend::new(output.sample_rate, output.channels);
        let started = Instant::now();
        return runtime.block_on(drive(config, source, args, backend, move |backend: &mut SoftwareBackend| {
            backend.advance_to(started.elapsed().as_secs_f64());
        }));
    }

    open_device_and_drive(&runtime, config, source, args)
}

#[cfg(not(target_os = "android"))]
fn open_device_and_drive(
    runtime: &tokio::runtime::Runtime,
    config: &AppConfig,
    source: Source,
    args: &LiveArgs,
) -> Result<ExitCode> {
    use visionr_audio::engine::backend::CpalBackend;

    let (backend, output) =
        CpalBackend::open(&config.output).context("opening audio output (try --headless)")?;
    let code = runtime.block_on(drive(config, source, args, backend, |_| {}))?;
    if let Err(err) = output.pause() {
        log::warn!("[CLI] Failed to pause output: {}", err);
    }
    Ok(code)
}

#[cfg(target_os = "android")]
fn open_device_and_drive(
    _runtime: &tokio::runtime::Runtime,
    _config: &AppConfig,
    _source: Source,
    _args: &LiveArgs,
) -> Result<ExitCode> {
    anyhow::bail!("no audio device backend on this platform; use --headless")
}

async fn drive<B: AudioBackend>(
    config: &AppConfig,
    source: Source,
    args: &LiveArgs,
    backend: B,
    mut pump: impl FnMut(&mut B),
) -> Result<ExitCode> {
    let engine = SoundEngine::new(
        backend,
        SharedConfig::new(config.engine.clone()),
        config.panner,
    );
    let remove_missing = matches!(source, Source::Network);
    let mut session = Session::new(engine, remove_missing);

    let projector = Projector::new(Viewport::default());
    let points = projector.subscribe();
    session.add_observer(Box::new(projector));

    if let Some(addr) = args.debug_http {
        let sources = DebugSources {
            config: session.engine().config().clone(),
            events: session.engine().event_sender(),
            sounds: session.subscribe_snapshots(),
        };
        http::spawn_if_enabled(sources, addr, http::resolve_token(args.debug_token.clone()));
    }

    let (callback, mut batches) = batch_channel(BATCH_QUEUE);
    let mut feed: Box<dyn DataFeed> = match source {
        Source::Simulated => Box::new(SimulatedFeed::new(
            &config.simulation,
            config.output.frame_rate,
        )),
        Source::Network => {
            let feed = NetworkFeed::new(&config.network);
            tokio::spawn(log_status(feed.url().to_string(), feed.subscribe_status()));
            Box::new(feed)
        }
    };
    feed.on_data(callback);
    feed.start().context("starting tag feed")?;

    let mut ticker = FrameTicker::new(config.output.frame_rate);
    frame_loop(&mut session, &mut batches, &mut ticker, args.seconds, points, &mut pump).await?;

    feed.stop();
    let removed = session.engine_mut().remove_all();
    log::info!("[CLI] Shutting down, fading out {} sounds", removed);
    for _ in 0..FADE_OUT_FRAMES {
        ticker.tick().await;
        pump(session.engine_mut().backend_mut());
        session.frame();
    }

    let stats = session.engine().stats();
    println!("{}", serde_json::to_string(&stats)?);
    Ok(ExitCode::from(0))
}

async fn frame_loop<B: AudioBackend>(
    session: &mut Session<B>,
    batches: &mut mpsc::Receiver<Vec<TagSample>>,
    ticker: &mut FrameTicker,
    seconds: Option<f64>,
    points: watch::Receiver<Vec<ScreenPoint>>,
    pump: &mut impl FnMut(&mut B),
) -> Result<()> {
    let deadline = async {
        match seconds {
            Some(secs) if secs.is_finite() && secs > 0.0 => {
                tokio::time::sleep(Duration::from_secs_f64(secs)).await
            }
            _ => future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut status = tokio::time::interval(Duration::from_secs(1));
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                while let Ok(batch) = batches.try_recv() {
                    session.apply_batch(&batch);
                }
                pump(session.engine_mut().backend_mut());
                session.frame();
            }
            _ = status.tick() => {
                print_status(&session.engine().snapshot(), &points.borrow());
            }
            result = &mut ctrl_c => {
                result.context("waiting for Ctrl-C")?;
                log::info!("[CLI] Ctrl-C received");
                break;
            }
            _ = &mut deadline => break,
        }
    }
    Ok(())
}

async fn log_status(url: String, mut statuses: broadcast::Receiver<ConnectionStatus>) {
    loop {
        match statuses.recv().await {
            Ok(status) => tracing::info!("[CLI] {} -> {:?}", url, status),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_status(sounds: &[SoundSnapshot], points: &[ScreenPoint]) {
    if sounds.is_empty() {
        println!("no tags tracked");
        return;
    }
    for sound in sounds {
        let screen = points
            .iter()
            .find(|point| point.id == sound.id)
            .map(|point| format!("({:.0}, {:.0}) r={:.0}", point.x, point.y, point.radius))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:<18} {:>6.2} m {:>7.2} Hz  {}",
            sound.id,
            format!("{:?}", sound.state),
            sound.distance,
            sound.frequency,
            screen
        );
    }
}
