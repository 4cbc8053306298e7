use clap::Parser;
use std::path::PathBuf;

/// Records MIDI arriving over UDP into one MIDI file per sender
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Read settings from this file (TOML, YAML, JSON, ...)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to bind to, or the multicast group with --multicast
    #[arg(short = 'a', long)]
    pub address: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// The address is a multicast group to join
    #[arg(short, long)]
    pub multicast: bool,

    /// Seconds of silence after which a recording is closed
    #[arg(short, long, value_name = "SECONDS")]
    pub inactivity: Option<f64>,

    /// Tempo used to convert time into ticks
    #[arg(short, long)]
    pub bpm: Option<f64>,

    /// Ticks per quarter note
    #[arg(short = 'q', long)]
    pub ppqn: Option<u16>,

    /// Count time in whole ticks (ppqn) or fractional beats (beats)
    #[arg(long, value_parser = ["ppqn", "beats"])]
    pub resolution: Option<String>,

    /// Recordings with fewer events are not stored
    #[arg(short = 'n', long, value_name = "EVENTS")]
    pub min_events: Option<usize>,

    /// Store notes with durations (paired) or as separate on/off events
    #[arg(long, value_parser = ["paired", "independent"])]
    pub note_mode: Option<String>,

    /// Measure event times from the session start or from the previous message
    #[arg(long, value_parser = ["absolute", "delta"])]
    pub tick_reference: Option<String>,

    /// Pitch wheel values as signed or unsigned 14-bit numbers
    #[arg(long, value_parser = ["signed", "unsigned"])]
    pub pitch: Option<String>,

    /// Record every sender into the same file
    #[arg(long)]
    pub merge_senders: bool,

    /// Directory recordings are written to
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// First part of every recording's filename
    #[arg(long)]
    pub prefix: Option<String>,

    /// Copyright notice stored in every recording
    #[arg(long)]
    pub copyright: Option<String>,

    /// Run all sessions on the receiving thread instead of one thread each
    #[arg(long)]
    pub inline_sessions: bool,

    /// Log debug output to the terminal
    #[arg(short, long)]
    pub verbose: bool,
}
