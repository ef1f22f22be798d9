use ansi_term::Colour;
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::{load_song, set_shutdown_flag, FlowConfig, FlowSession, JsonLinesSink, ParseOptions};

#[derive(Parser)]
#[command(name = "e_flow")]
#[command(about = "Turn a MIDI file into falling, flowing note trajectories")]
#[command(version)]
#[command(author = "David Horner <david.horner@example.com>")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the tracks of a MIDI file
    Info {
        file: PathBuf,

        /// Keep only track 0 and this track
        #[arg(long)]
        track_to_display: Option<usize>,
    },

    /// Print the parsed song as JSON
    Dump {
        file: PathBuf,

        /// Keep only track 0 and this track
        #[arg(long)]
        track_to_display: Option<usize>,
    },

    /// Run the frame loop and write one JSON line per frame
    Simulate {
        file: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: FlowArgs,
    },
}

/// Overrides applied on top of the defaults or `--config`.
#[derive(Args, Debug, Default)]
pub struct FlowArgs {
    /// JSON file with a FlowConfig
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Video frame rate (frames/s)
    #[arg(long)]
    pub frame_rate: Option<f64>,

    #[arg(long)]
    pub frame_width: Option<u32>,

    #[arg(long)]
    pub frame_height: Option<u32>,

    /// 4k UHD (3840x2160)
    #[arg(long, conflicts_with = "sd")]
    pub uhd: bool,

    /// SD (640x480)
    #[arg(long)]
    pub sd: bool,

    /// Approximate time for a note to fall (s)
    #[arg(long = "window-timespan")]
    pub window_time_span: Option<f64>,

    /// Start video at this time (s)
    #[arg(long)]
    pub start_time: Option<f64>,

    /// Stop video at this time (s); default is the end of the song
    #[arg(long)]
    pub stop_time: Option<f64>,

    /// Keep going this many seconds after the song ends
    #[arg(long)]
    pub extra_time: Option<f64>,

    /// Half life for note visibility, from sounding time (s)
    #[arg(long = "note-visibility-halflife")]
    pub note_visibility_half_life: Option<f64>,

    /// Maximum note trail width
    #[arg(long)]
    pub max_note_width: Option<u32>,

    #[arg(long)]
    pub flow_shear_scale: Option<f64>,

    /// Height control points for the flow shear
    #[arg(long)]
    pub flow_shear_y_points: Option<usize>,

    #[arg(long)]
    pub random_seed: Option<u64>,

    #[arg(long)]
    pub wiggle_period: Option<f64>,

    #[arg(long = "note-wiggle-offset")]
    pub wiggle_offset: Option<f64>,

    #[arg(long = "note-wiggle-amplitude")]
    pub wiggle_amplitude: Option<f64>,

    #[arg(long)]
    pub wiggle_wavelength: Option<f64>,

    /// Downward note acceleration scale
    #[arg(long)]
    pub acceleration: Option<f64>,

    /// Display only this track (plus track 0)
    #[arg(long)]
    pub track_to_display: Option<usize>,

    /// Extend notes while the sustain pedal is down
    #[arg(long)]
    pub pedal_sustains_notes: bool,

    /// Dim the background with the sustain pedal
    #[arg(long)]
    pub pedal_modulates_background: bool,
}

impl FlowArgs {
    pub fn to_config(&self) -> crate::Result<FlowConfig> {
        let mut config = match &self.config {
            Some(path) => FlowConfig::load(path)?,
            None => FlowConfig::default(),
        };

        macro_rules! apply {
            ($($field:ident => $target:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    config.$target = value;
                })*
            };
        }
        apply!(
            frame_rate => frame_rate,
            frame_width => frame_width,
            frame_height => frame_height,
            window_time_span => window_time_span,
            start_time => start_time,
            note_visibility_half_life => note_visibility_half_life,
            max_note_width => max_note_width,
            flow_shear_scale => flow_shear_scale,
            flow_shear_y_points => shear_y_points,
            wiggle_period => wiggle_period,
            wiggle_offset => wiggle_offset,
            wiggle_amplitude => wiggle_amplitude,
            wiggle_wavelength => wiggle_wavelength,
            acceleration => note_acceleration,
        );
        if self.stop_time.is_some() {
            config.stop_time = self.stop_time;
        }
        if self.extra_time.is_some() {
            config.extra_time = self.extra_time;
        }
        if self.random_seed.is_some() {
            config.random_seed = self.random_seed;
        }
        if self.track_to_display.is_some() {
            config.track_to_display = self.track_to_display;
        }
        config.pedal_modifies_notelength |= self.pedal_sustains_notes;
        config.pedal_modifies_background |= self.pedal_modulates_background;

        if self.uhd {
            config = config.uhd();
        } else if self.sd {
            config = config.sd();
        }
        config.validate()?;
        Ok(config)
    }
}

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let label = match record.level() {
            Level::Error => Colour::Red.bold().paint("error"),
            Level::Warn => Colour::Yellow.bold().paint("warn"),
            Level::Info => Colour::Green.paint("info"),
            Level::Debug => Colour::Blue.paint("debug"),
            Level::Trace => Colour::Purple.paint("trace"),
        };
        eprintln!("{} {}", label, record.args());
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn print_info(file: &Path, track_to_display: Option<usize>) -> Result<(), Box<dyn Error>> {
    let song = load_song(file, &ParseOptions { track_to_display })?;

    println!("{}", Colour::Cyan.bold().paint(file.display().to_string()));
    println!(
        "format {}, {:?}, {} track(s), {} note(s), {}",
        song.format,
        song.timing,
        song.tracks.len(),
        song.voice_note_count(),
        crate::format_duration(song.max_time)
    );
    if song.voice_note_count() > 0 {
        println!("pitches {}..={} (span {})", song.min_note, song.max_note, song.note_span);
    }

    for (track, summary) in song.tracks.iter().zip(song.summaries()) {
        let mut flags = Vec::new();
        if track.is_tempo_track {
            flags.push(Colour::Yellow.paint("tempo").to_string());
        }
        if track.is_transport_track {
            flags.push(Colour::Red.paint("transport").to_string());
        }
        println!(
            "  {:>2}: {} [{}]",
            summary.index,
            summary.name.as_deref().unwrap_or("(unnamed)"),
            flags.join(", ")
        );
        println!(
            "      notes: {}, pedals: {}, tempo changes: {}, channels: {:?}",
            summary.note_count, summary.pedal_count, summary.tempo_changes, summary.channels
        );
        if summary.note_count > 0 {
            println!(
                "      pitch range {}..={}, first notes {:?}",
                summary.pitch_range.0, summary.pitch_range.1, summary.sample_notes
            );
        }
        if let (Some(program), Some(guess)) = (summary.program, summary.guess.as_deref()) {
            println!("      program {} ({})", program, guess);
        }
    }
    Ok(())
}

pub fn run_cli() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info {
            file,
            track_to_display,
        } => print_info(&file, track_to_display)?,
        Commands::Dump {
            file,
            track_to_display,
        } => {
            let song = load_song(&file, &ParseOptions { track_to_display })?;
            println!("{}", song.to_json()?);
        }
        Commands::Simulate {
            file,
            output,
            options,
        } => {
            let mut config = options.to_config()?;
            config.verbose |= cli.verbose > 0;

            ctrlc::set_handler(|| {
                set_shutdown_flag();
            })?;

            let song = load_song(
                &file,
                &ParseOptions {
                    track_to_display: config.track_to_display,
                },
            )?;
            let mut session = FlowSession::new(song, &config)?;

            let writer: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };
            let mut sink = JsonLinesSink::new(writer);
            let summary = session.run(&mut sink)?;

            if summary.interrupted {
                log::warn!(
                    "interrupted after {} frame(s) at {}",
                    summary.frames,
                    crate::format_duration(summary.video_time)
                );
            } else {
                log::info!("wrote {} frame(s)", summary.frames);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "e_flow",
            "simulate",
            "song.mid",
            "--frame-rate",
            "60",
            "--random-seed",
            "5",
            "--acceleration",
            "2.5",
            "--pedal-sustains-notes",
            "--sd",
        ]);
        let Commands::Simulate { options, .. } = cli.command else {
            panic!("expected simulate");
        };
        let config = options.to_config().unwrap();
        assert_eq!(config.frame_rate, 60.0);
        assert_eq!(config.random_seed, Some(5));
        assert_eq!(config.note_acceleration, 2.5);
        assert!(config.pedal_modifies_notelength);
        assert_eq!((config.frame_width, config.frame_height), (640, 480));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = FlowArgs {
            flow_shear_y_points: Some(1),
            ..FlowArgs::default()
        };
        assert!(args.to_config().is_err());
    }
}
