use anyhow::Context;
use rhythm_slicer::audio::{Backend, NullBackend, RodioBackend};
use rhythm_slicer::config;
use rhythm_slicer::metadata::{LoftyResolver, MetadataLoader};
use rhythm_slicer::model::Notice;
use rhythm_slicer::playlist::Playlist;
use rhythm_slicer::scheduler::UpdateScheduler;
use rhythm_slicer::session::Session;
use rhythm_slicer::transport::{TransportOptions, TransportStateMachine};
use rhythm_slicer::watchdog::{FileDiagnosticSink, HangWatchdog, Heartbeat, WatchdogConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct CliArgs {
    path: Option<PathBuf>,
    no_audio: bool,
    recursive: bool,
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1).collect())?;

    let log_path = match rhythm_slicer::logging::init_logging() {
        Ok(path) => Some(path),
        Err(err) => {
            rhythm_slicer::logging::init_stderr_logging();
            warn!("file logging unavailable: {err:#}");
            None
        }
    };

    let mut settings = config::load_settings_or_default();
    let open_path = args
        .path
        .clone()
        .or_else(|| settings.last_open_path.clone())
        .map_or_else(std::env::current_dir, Ok)
        .context("cannot determine the directory to open")?;
    let recursive = args.recursive || settings.open_recursive;
    let playlist = Playlist::from_input(&open_path, recursive);
    info!(path = %open_path.display(), tracks = playlist.len(), "starting");

    let mut startup_notices = Vec::new();
    let backend: Box<dyn Backend> = if args.no_audio {
        Box::new(NullBackend::new())
    } else {
        match RodioBackend::new() {
            Ok(backend) => Box::new(backend),
            Err(err) => {
                warn!(%err, "falling back to silent playback");
                startup_notices.push(Notice::error(format!("{err}; playing silently")));
                Box::new(NullBackend::new())
            }
        }
    };

    let heartbeat = Arc::new(Heartbeat::new());
    let dump_dir = log_path
        .as_deref()
        .and_then(|path| path.parent())
        .map(PathBuf::from)
        .or_else(|| config::log_dir().ok())
        .unwrap_or_else(std::env::temp_dir);
    let watchdog = HangWatchdog::spawn(
        Arc::clone(&heartbeat),
        WatchdogConfig {
            threshold: settings.hang_threshold(),
            poll: settings.watchdog_poll(),
        },
        Box::new(FileDiagnosticSink::in_dir(&dump_dir)),
    )
    .context("failed to start hang watchdog")?;

    let metadata = match MetadataLoader::spawn(Box::new(LoftyResolver)) {
        Ok(loader) => Some(loader),
        Err(err) => {
            warn!(%err, "metadata worker unavailable; showing file names");
            None
        }
    };

    let transport = TransportStateMachine::new(
        backend,
        playlist,
        TransportOptions::from(&settings),
        heartbeat,
    );
    let scheduler = UpdateScheduler::new(settings.tick_interval());
    let mut session = Session::new(transport, scheduler, metadata);
    session.set_open_recursive(recursive);
    session.push_notices(startup_notices);

    let run_result = rhythm_slicer::app::run(&mut session, (&settings).into());
    watchdog.stop();

    let transport = session.transport();
    settings.volume = transport.volume();
    settings.speed = transport.speed();
    settings.repeat_mode = transport.repeat();
    settings.shuffle = transport.is_shuffled();
    settings.last_open_path = Some(config::normalize_path(&open_path));
    let save_result = config::save_settings(&settings);
    if let Err(err) = &save_result {
        warn!("failed to save settings: {err:#}");
    }
    info!(skipped_periods = session.skipped_periods(), "exiting");

    run_result?;
    save_result?;
    Ok(())
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    for arg in args {
        match arg.as_str() {
            "--no-audio" => out.no_audio = true,
            "-r" | "--recursive" => out.recursive = true,
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => anyhow::bail!("unknown argument {flag}"),
            path => {
                if out.path.is_some() {
                    anyhow::bail!("only one PATH may be given");
                }
                out.path = Some(PathBuf::from(path));
            }
        }
    }
    Ok(out)
}

fn print_help() {
    println!("RhythmSlicer");
    println!("  rhythm-slicer [PATH] [--recursive] [--no-audio]");
    println!("  PATH            Folder, .m3u/.m3u8 or audio file (default: last opened, then .)");
    println!("  -r, --recursive Include subfolders when opening a folder");
    println!("  --no-audio      Run without an output device");
    println!();
    println!("  Logs: RHYTHM_SLICER_LOG sets the filter, e.g. RHYTHM_SLICER_LOG=debug");
}
