//! `fretwork` command-line tool
//!
//! Plays songs against logging pin sinks, converts JSON songs to the binary
//! format, inspects song files, and serves the framed control protocol on
//! stdin/stdout.

use anyhow::{bail, Context};
use fretwork::control::{spawn_command_task, spawn_playback_task, RigHandle, SharedResources};
use fretwork::hardware::LogPins;
use fretwork::scheduler::{PlaybackPhase, PlaybackScheduler};
use fretwork::song::{binary, open_song};
use fretwork::status::{StatusSink, WireStatusSink};
use fretwork::storage::FsStorage;
use fretwork::timing::{Clock, ManualClock, SystemClock};
use fretwork::{RigConfig, RigError};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scheduler tick spacing for the CLI tasks
const TICK_INTERVAL_MS: u64 = 1;

const USAGE: &str = "\
Usage:
  fretwork play <song> [--config <rig.toml>] [--fast]
  fretwork convert <in.json> <out.bin>
  fretwork inspect <song>
  fretwork serve <song-root> [--config <rig.toml>]
  fretwork list <song-root> [<dir>]

Flags:
  --config <file>   Rig description (defaults to the reference rig)
  --fast            Run on simulated time instead of the wall clock
  -h, --help        Show this help
";

#[derive(Debug, Default)]
struct CliArgs {
    command: Option<String>,
    positional: Vec<String>,
    config: Option<PathBuf>,
    fast: bool,
    show_help: bool,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = CliArgs::default();
        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => parsed.show_help = true,
                "--fast" => parsed.fast = true,
                "--config" => match iter.next() {
                    Some(value) => parsed.config = Some(PathBuf::from(value)),
                    None => bail!("--config requires a file argument"),
                },
                _ if arg.starts_with("--config=") => {
                    parsed.config = Some(PathBuf::from(&arg["--config=".len()..]));
                }
                _ if arg.starts_with('-') => bail!("unknown flag {}", arg),
                _ if parsed.command.is_none() => parsed.command = Some(arg),
                _ => parsed.positional.push(arg),
            }
        }
        Ok(parsed)
    }

    fn rig_config(&self) -> anyhow::Result<RigConfig> {
        match &self.config {
            Some(path) => RigConfig::load(path)
                .with_context(|| format!("loading rig config {}", path.display())),
            None => Ok(RigConfig::default()),
        }
    }

    fn arg(&self, index: usize, name: &str) -> anyhow::Result<&str> {
        self.positional
            .get(index)
            .map(String::as_str)
            .with_context(|| format!("missing <{}>\n\n{}", name, USAGE))
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse(env::args().skip(1))?;
    if args.show_help {
        print!("{}", USAGE);
        return Ok(());
    }

    match args.command.as_deref() {
        Some("play") => play(&args),
        Some("convert") => convert(args.arg(0, "in.json")?, args.arg(1, "out.bin")?),
        Some("inspect") => inspect(args.arg(0, "song")?),
        Some("serve") => serve(&args),
        Some("list") => list(args.arg(0, "song-root")?, args.positional.get(1)),
        Some(other) => bail!("unknown command {}\n\n{}", other, USAGE),
        None => {
            print!("{}", USAGE);
            Ok(())
        }
    }
}

/// Scheduler on logging pins that publishes periodic status to `status`
fn log_rig(
    config: &RigConfig,
    resources: &Arc<SharedResources>,
    clock: &Arc<dyn Clock>,
    status: Box<dyn StatusSink>,
) -> PlaybackScheduler<LogPins, LogPins> {
    PlaybackScheduler::new(config, LogPins, LogPins, Arc::clone(resources))
        .with_status_sink(status)
        .with_clock(Arc::clone(clock))
}

/// Split a host song path into a storage root and the rig path inside it
fn storage_for(song: &str) -> anyhow::Result<(FsStorage, String)> {
    let path = Path::new(song);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} is not a file path", song))?;
    let root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((FsStorage::new(root), format!("/{}", name)))
}

fn play(args: &CliArgs) -> anyhow::Result<()> {
    let song = args.arg(0, "song")?;
    let config = args.rig_config()?;
    let (storage, rig_path) = storage_for(song)?;

    let clock: Arc<dyn Clock> = if args.fast {
        Arc::new(ManualClock::new())
    } else {
        Arc::new(SystemClock::new())
    };

    let resources = Arc::new(SharedResources::new(
        Box::new(storage),
        config.token_timeout(),
    ));
    let handle = RigHandle::new(Arc::clone(&resources));
    let stdout_status = Box::new(WireStatusSink::new(std::io::stdout()));
    let scheduler = log_rig(&config, &resources, &clock, stdout_status);

    handle.play(&rig_path)?;
    let task = spawn_playback_task(scheduler, Arc::clone(&clock), TICK_INTERVAL_MS)?;

    // wait until the scheduler has picked the song up and let go of it again
    let mut started = false;
    loop {
        match handle.phase() {
            Ok(PlaybackPhase::Playing) | Ok(PlaybackPhase::Loading) => started = true,
            Ok(PlaybackPhase::Finished) => break,
            Ok(PlaybackPhase::Stopped) if started => break,
            Ok(_) | Err(RigError::Busy(_)) => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(error) = load_error(&handle)? {
            task.shutdown()?;
            bail!("playback of {} failed: {}", song, error);
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    task.shutdown()?;
    log::info!("done ({} ms of song time)", clock.now_ms());
    Ok(())
}

/// Reported load failure; a busy playback token just means "not yet"
fn load_error(handle: &RigHandle) -> anyhow::Result<Option<String>> {
    match handle.last_error() {
        Ok(error) => Ok(error),
        Err(RigError::Busy(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(feature = "json-songs")]
fn convert(input: &str, output: &str) -> anyhow::Result<()> {
    use fretwork::song::JsonSong;

    let data = std::fs::read(input).with_context(|| format!("reading {}", input))?;
    let song = JsonSong::from_slice(&data)?;
    let mut events = Vec::with_capacity(song.raw_events().len());
    for (index, result) in song.validated().into_iter().enumerate() {
        match result {
            Ok(event) => events.push(event),
            Err(e) => log::warn!("dropping event {}: {}", index, e),
        }
    }

    let total = fretwork::SongSource::total_duration_ms(&song);
    let bytes = binary::encode(total, &events)?;
    std::fs::write(output, &bytes).with_context(|| format!("writing {}", output))?;
    log::info!(
        "wrote {} ({} events, {} bytes, {} ms)",
        output,
        events.len(),
        bytes.len(),
        total
    );
    Ok(())
}

#[cfg(not(feature = "json-songs"))]
fn convert(_input: &str, _output: &str) -> anyhow::Result<()> {
    bail!("convert needs the json-songs feature")
}

fn inspect(song: &str) -> anyhow::Result<()> {
    let file = std::fs::File::open(song).with_context(|| format!("opening {}", song))?;
    let size = file.metadata()?.len();
    let mut source = open_song(Box::new(file), size, song)?;

    println!("format:   {}", source.format_name());
    println!("events:   {}", source.event_count());
    println!("duration: {} ms", source.total_duration_ms());
    for index in 0..source.event_count() {
        match source.event_at(index) {
            Ok(event) => println!("{:>6}  {}", index, event),
            Err(RigError::BadEvent(msg)) => println!("{:>6}  bad event: {}", index, msg),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn serve(args: &CliArgs) -> anyhow::Result<()> {
    let root = args.arg(0, "song-root")?;
    let config = args.rig_config()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let resources = Arc::new(SharedResources::new(
        Box::new(FsStorage::new(root)),
        config.token_timeout(),
    ));
    let stdout_status = Box::new(WireStatusSink::new(std::io::stdout()));
    let scheduler = log_rig(&config, &resources, &clock, stdout_status);

    let playback = spawn_playback_task(scheduler, clock, TICK_INTERVAL_MS)?;
    let commands = spawn_command_task(
        std::io::stdin(),
        RigHandle::new(resources),
        std::io::stdout(),
    )?;

    let handled = commands.shutdown()?;
    playback.shutdown()?;
    log::info!("input closed after {} requests", handled);
    Ok(())
}

fn list(root: &str, dir: Option<&String>) -> anyhow::Result<()> {
    let resources = SharedResources::new(
        Box::new(FsStorage::new(root)),
        RigConfig::default().token_timeout(),
    );
    let handle = RigHandle::new(Arc::new(resources));
    for name in handle.list_songs(dir.map_or("/", String::as_str))? {
        println!("{}", name);
    }
    Ok(())
}
