// config.rs

use crate::cli::Args;
use crate::clock::{Resolution, ResolutionModel};
use crate::midi::PitchConvention;
use crate::session::{NoteMode, SessionConfig, TickReference};
use ::config::{Config as Layers, Environment, File};
use log::{debug, info};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 21928;
pub const DEFAULT_INACTIVITY_SECS: f64 = 60.0;
pub const DEFAULT_BPM: f64 = 960.0;
pub const DEFAULT_PPQN: u16 = crate::clock::DEFAULT_PPQN;

/// Environment variables with this prefix override the config file.
pub const ENV_PREFIX: &str = "NETMIDIREC";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] ::config::ConfigError),
    #[error("invalid listen address '{0}'")]
    Address(String),
    #[error("{0} is not a multicast group address")]
    NotMulticast(IpAddr),
    #[error("BPM must be a positive number, got {0}")]
    Bpm(f64),
    #[error("PPQN must be greater than zero")]
    Ppqn,
    #[error("inactivity timeout must be a positive number of seconds, got {0}")]
    Inactivity(f64),
}

/// Values after merging defaults, config file, environment and flags
#[derive(Debug, Deserialize)]
struct Settings {
    address: String,
    port: u16,
    multicast: bool,
    inactivity: f64,
    bpm: f64,
    ppqn: u16,
    resolution: ResolutionModel,
    min_events: usize,
    note_mode: NoteMode,
    tick_reference: TickReference,
    pitch: PitchConvention,
    split_by_sender: bool,
    output_dir: PathBuf,
    file_prefix: String,
    copyright: String,
    inline_sessions: bool,
}

/// Where to listen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindConfig {
    pub address: IpAddr,
    pub port: u16,
    pub multicast: bool,
}

impl BindConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub bind: BindConfig,
    pub session: SessionConfig,
    pub split_by_sender: bool,
    pub inline_sessions: bool,
    pub verbose: bool,
}

impl RecorderConfig {
    /// Builds the configuration from `args`, the file they name and the environment.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let settings = Self::layer(args)?;
        debug!("Merged settings: {:?}", settings);
        Self::from_settings(settings, args.verbose)
    }

    fn layer(args: &Args) -> Result<Settings, ::config::ConfigError> {
        let mut builder = Layers::builder()
            .set_default("address", DEFAULT_ADDRESS)?
            .set_default("port", i64::from(DEFAULT_PORT))?
            .set_default("multicast", false)?
            .set_default("inactivity", DEFAULT_INACTIVITY_SECS)?
            .set_default("bpm", DEFAULT_BPM)?
            .set_default("ppqn", i64::from(DEFAULT_PPQN))?
            .set_default("resolution", "ppqn")?
            .set_default("min_events", 0i64)?
            .set_default("note_mode", "paired")?
            .set_default("tick_reference", "absolute")?
            .set_default("pitch", "signed")?
            .set_default("split_by_sender", true)?
            .set_default("output_dir", ".")?
            .set_default("file_prefix", "recording")?
            .set_default("copyright", env!("CARGO_PKG_NAME"))?
            .set_default("inline_sessions", false)?;

        if let Some(path) = &args.config {
            info!("Reading settings from {}", path.display());
            builder = builder.add_source(File::from(path.as_path()));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .set_override_option("address", args.address.clone())?
            .set_override_option("port", args.port.map(i64::from))?
            .set_override_option("multicast", args.multicast.then_some(true))?
            .set_override_option("inactivity", args.inactivity)?
            .set_override_option("bpm", args.bpm)?
            .set_override_option("ppqn", args.ppqn.map(i64::from))?
            .set_override_option("resolution", args.resolution.clone())?
            .set_override_option("min_events", args.min_events.map(|n| n as i64))?
            .set_override_option("note_mode", args.note_mode.clone())?
            .set_override_option("tick_reference", args.tick_reference.clone())?
            .set_override_option("pitch", args.pitch.clone())?
            .set_override_option("split_by_sender", args.merge_senders.then_some(false))?
            .set_override_option(
                "output_dir",
                args.output_dir
                    .as_ref()
                    .map(|dir| dir.to_string_lossy().into_owned()),
            )?
            .set_override_option("file_prefix", args.prefix.clone())?
            .set_override_option("copyright", args.copyright.clone())?
            .set_override_option("inline_sessions", args.inline_sessions.then_some(true))?
            .build()?
            .try_deserialize()
    }

    fn from_settings(settings: Settings, verbose: bool) -> Result<Self, ConfigError> {
        let address: IpAddr = settings
            .address
            .parse()
            .map_err(|_| ConfigError::Address(settings.address.clone()))?;
        if settings.multicast && !address.is_multicast() {
            return Err(ConfigError::NotMulticast(address));
        }
        if !settings.bpm.is_finite() || settings.bpm <= 0.0 {
            return Err(ConfigError::Bpm(settings.bpm));
        }
        if settings.inactivity <= 0.0 {
            return Err(ConfigError::Inactivity(settings.inactivity));
        }
        let inactivity_timeout = Duration::try_from_secs_f64(settings.inactivity)
            .map_err(|_| ConfigError::Inactivity(settings.inactivity))?;

        let resolution = match settings.resolution {
            ResolutionModel::Ppqn if settings.ppqn == 0 => return Err(ConfigError::Ppqn),
            ResolutionModel::Ppqn => Resolution::Ppqn(settings.ppqn),
            ResolutionModel::Beats => Resolution::BeatFraction,
        };

        let session = SessionConfig {
            bpm: settings.bpm,
            resolution,
            inactivity_timeout,
            min_events: settings.min_events,
            note_mode: settings.note_mode,
            tick_reference: settings.tick_reference,
            pitch: settings.pitch,
            output_dir: settings.output_dir,
            file_prefix: settings.file_prefix,
            copyright: settings.copyright,
        };

        Ok(RecorderConfig {
            bind: BindConfig {
                address,
                port: settings.port,
                multicast: settings.multicast,
            },
            session,
            split_by_sender: settings.split_by_sender,
            inline_sessions: settings.inline_sessions,
            verbose,
        })
    }
}
