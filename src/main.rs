use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use aldakit::midi::{read_midi_file, sequence_to_score, write_midi_file, ImportOptions, PlaybackEvent};
use aldakit::transcribe::{forward_stream, quantize, record, Feel, RecordedNote, RecordingSession, Transcription};
use aldakit::{generate, Config, Score};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aldakit", about = "Render, inspect and transcribe Alda performances")]
struct Opt {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a score tree (YAML) to a Standard MIDI File
    Render {
        score: PathBuf,
        /// Output file (defaults to the score path with a .mid extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Summarize a MIDI file
    Inspect {
        file: PathBuf,
        /// Also print every timeline event
        #[arg(long)]
        events: bool,
    },
    /// Rebuild a score tree (YAML) from a MIDI file
    Import {
        file: PathBuf,
        /// Grid in beats note positions snap to
        #[arg(long, default_value_t = 0.25)]
        grid: f64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Quantize recorded notes (YAML list) into notation
    Quantize {
        notes: PathBuf,
        /// straight, swing, triplet or quintuplet (overrides the config)
        #[arg(long)]
        feel: Option<Feel>,
        #[arg(long)]
        grid: Option<f64>,
        #[arg(long)]
        tempo: Option<f64>,
        /// Print a playable score for this instrument instead of the notation
        #[arg(long)]
        instrument: Option<String>,
    },
    /// Record raw MIDI bytes (a device file such as /dev/snd/midiC1D0, or - for stdin)
    Record {
        input: PathBuf,
        /// How long to record
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        #[arg(long)]
        feel: Option<Feel>,
        #[arg(long)]
        tempo: Option<f64>,
        #[arg(long)]
        instrument: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::parse();
    let config = match &opt.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    match opt.command {
        Command::Render { score, output } => render(&score, output, &config),
        Command::Inspect { file, events } => inspect(&file, events),
        Command::Import { file, grid, output } => import(&file, grid, output),
        Command::Quantize {
            notes,
            feel,
            grid,
            tempo,
            instrument,
        } => transcribe(&notes, feel, grid, tempo, instrument, &config),
        Command::Record {
            input,
            seconds,
            feel,
            tempo,
            instrument,
        } => record_input(&input, seconds, feel, tempo, instrument, &config),
    }
}

fn read_score(path: &Path) -> Result<Score> {
    let source = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Score::from_yaml(&source).with_context(|| format!("parsing score {}", path.display()))
}

fn emit(text: &str, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn render(score_path: &Path, output: Option<PathBuf>, config: &Config) -> Result<()> {
    let score = read_score(score_path)?;
    let mut sequence = generate(&score);
    sequence.ticks_per_beat = config.ticks_per_beat;

    let output = output.unwrap_or_else(|| score_path.with_extension("mid"));
    write_midi_file(&sequence, &output).with_context(|| format!("writing {}", output.display()))?;

    info!(notes = sequence.notes.len(), path = %output.display(), "rendered");
    eprintln!(
        "Wrote {} notes ({:.2}s) to {}",
        sequence.notes.len(),
        sequence.duration(),
        output.display()
    );
    Ok(())
}

fn inspect(path: &Path, events: bool) -> Result<()> {
    let sequence = read_midi_file(path).with_context(|| format!("reading {}", path.display()))?;

    println!("File: {}", path.display());
    println!("Ticks per beat: {}", sequence.ticks_per_beat);
    println!("Duration: {:.3}s", sequence.duration());
    println!("Notes: {}", sequence.notes.len());

    println!("\nTempo changes:");
    for change in &sequence.tempo_changes {
        println!("  {:>9.3}s  {:.2} BPM", change.time, change.bpm);
    }

    println!("\nChannels:");
    for channel in sequence.channels() {
        let notes = sequence.notes.iter().filter(|n| n.channel == channel).count();
        let programs: Vec<String> = sequence
            .program_changes
            .iter()
            .filter(|p| p.channel == channel)
            .map(|p| p.program.to_string())
            .collect();
        println!("  {:>2}: {} notes, programs [{}]", channel, notes, programs.join(", "));
    }

    if events {
        println!("\nTimeline:");
        for timed in sequence.timeline() {
            let description = match timed.event {
                PlaybackEvent::NoteOn {
                    channel,
                    pitch,
                    velocity,
                } => format!("note-on   ch{channel} pitch {pitch} vel {velocity}"),
                PlaybackEvent::NoteOff { channel, pitch } => format!("note-off  ch{channel} pitch {pitch}"),
                PlaybackEvent::ProgramChange { channel, program } => format!("program   ch{channel} {program}"),
                PlaybackEvent::ControlChange {
                    channel,
                    control,
                    value,
                } => format!("control   ch{channel} cc{control} = {value}"),
                PlaybackEvent::Tempo { bpm } => format!("tempo     {bpm:.2} BPM"),
            };
            println!("  {:>9.3}s  {}", timed.time, description);
        }
    }
    Ok(())
}

fn import(path: &Path, grid: f64, output: Option<PathBuf>) -> Result<()> {
    anyhow::ensure!(grid.is_finite() && grid > 0.0, "grid must be a positive number of beats");

    let sequence = read_midi_file(path).with_context(|| format!("reading {}", path.display()))?;
    let options = ImportOptions {
        grid,
        ..ImportOptions::default()
    };
    let score = sequence_to_score(&sequence, &options);
    emit(&score.to_yaml()?, output)
}

fn transcribe(
    path: &Path,
    feel: Option<Feel>,
    grid: Option<f64>,
    tempo: Option<f64>,
    instrument: Option<String>,
    config: &Config,
) -> Result<()> {
    let source = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let notes: Vec<RecordedNote> =
        serde_yaml::from_str(&source).with_context(|| format!("parsing notes {}", path.display()))?;

    let mut options = config.transcription.options.clone();
    if let Some(feel) = feel {
        options.feel = feel;
    }
    if let Some(grid) = grid {
        anyhow::ensure!(grid.is_finite() && grid > 0.0, "grid must be a positive number of beats");
        options.grid = grid;
    }
    if let Some(tempo) = tempo {
        anyhow::ensure!(tempo.is_finite() && tempo > 0.0, "tempo must be positive");
        options.tempo = tempo;
    }

    print_transcription(quantize(&notes, &options), instrument)
}

fn print_transcription(transcription: Transcription, instrument: Option<String>) -> Result<()> {
    let yaml = match instrument {
        Some(instrument) => transcription.into_score(&instrument).to_yaml()?,
        None => serde_yaml::to_string(&transcription)?,
    };
    emit(&yaml, None)
}

fn record_input(
    input: &Path,
    seconds: f64,
    feel: Option<Feel>,
    tempo: Option<f64>,
    instrument: Option<String>,
    config: &Config,
) -> Result<()> {
    anyhow::ensure!(seconds.is_finite() && seconds > 0.0, "recording length must be positive");

    let reader: Box<dyn Read + Send> = if input == Path::new("-") {
        Box::new(std::io::stdin())
    } else {
        Box::new(fs::File::open(input).with_context(|| format!("opening {}", input.display()))?)
    };

    let mut options = config.transcription.options.clone();
    if let Some(feel) = feel {
        options.feel = feel;
    }
    if let Some(tempo) = tempo {
        anyhow::ensure!(tempo.is_finite() && tempo > 0.0, "tempo must be positive");
        options.tempo = tempo;
    }

    let mut session = RecordingSession::new(options);
    session.on_note(|pitch, velocity, is_note_on| {
        if is_note_on {
            info!(pitch, velocity, "note on");
        }
    });

    // the reader blocks on the device; it is left behind when recording ends
    let sender = session.sender();
    thread::spawn(move || {
        if let Err(e) = forward_stream(reader, &sender) {
            tracing::debug!(error = %e, "input reader stopped");
        }
    });

    eprintln!("Recording for {seconds:.1}s...");
    let transcription = record(
        &mut session,
        Duration::from_secs_f64(seconds),
        config.transcription.poll_interval,
    );
    info!(elements = transcription.elements.len(), "recording finished");
    print_transcription(transcription, instrument)
}
