// clock.rs

use serde::Deserialize;
use std::time::Duration;

/// Ticks per beat used when PPQN is not specified on the command line.
pub const DEFAULT_PPQN: u16 = 64;

/// How wall-clock time is quantized into musical time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Whole ticks at the given pulses per quarter note.
    Ppqn(u16),
    /// Fractional beats; whoever writes the file truncates as needed.
    BeatFraction,
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::Ppqn(DEFAULT_PPQN)
    }
}

/// Name of the resolution model as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionModel {
    Ppqn,
    Beats,
}

/// Converts elapsed wall-clock time into ticks at a fixed tempo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickClock {
    bpm: f64,
    resolution: Resolution,
}

impl TickClock {
    pub fn new(bpm: f64, resolution: Resolution) -> Self {
        TickClock { bpm, resolution }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Ticks elapsed over `delta`. Never negative; zero for a zero delta.
    pub fn ticks(&self, delta: Duration) -> f64 {
        let beats = delta.as_secs_f64() * self.bpm / 60.0;
        let ticks = match self.resolution {
            Resolution::Ppqn(ppqn) => (beats * f64::from(ppqn)).round(),
            Resolution::BeatFraction => beats,
        };
        ticks.max(0.0)
    }

    /// The smallest duration the clock represents: one tick, or one beat.
    pub fn unit(&self) -> f64 {
        1.0
    }
}
