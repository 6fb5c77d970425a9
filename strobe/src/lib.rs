use std::{
    future::Future,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    time::Duration,
};

use log::{error, info};
use strobe_gpio::Gpio;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle, time};

pub mod beat;
pub mod channel;
pub mod media;
pub mod message;
mod tasks;

use tasks::{coordinator::Coordinator, input::CommandIngestor, tracker::BeatTracker};

pub use beat::{BeatChange, BeatCurve, BeatFileError};
pub use channel::{Line, OutputChannel};
pub use media::{MediaSession, PlayerConfig};
pub use message::{Command, TempoStep, TempoUpdate};

const TEMPO_QUEUE_DEPTH: usize = 1;
const COMMAND_QUEUE_DEPTH: usize = 8;

#[derive(Error, Debug)]
pub enum StrobeError {
    #[error("terminating")]
    Terminating,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unable to claim gpio {pin}: {error}")]
    Gpio { pin: u32, error: anyhow::Error },

    #[error("beat file {}: {}", .path.display(), .error)]
    BeatFile { path: PathBuf, error: BeatFileError },

    #[error("beat curve is empty")]
    EmptyCurve,

    #[error("failed to start player {program}: {error}")]
    PlayerSpawn { program: String, error: io::Error },

    #[error("player control pipe: {0}")]
    ControlPipe(io::Error),

    #[error("strobe line {pin} is gone")]
    ChannelClosed { pin: u32 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StrobeError>;

#[derive(Debug, Clone)]
pub struct Config {
    pub pins: Vec<u32>,
    pub track: PathBuf,
    pub player: PlayerConfig,
    pub gpio_root: PathBuf,
    pub startup_delay: Duration,
    pub tempo_step: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pins: vec![7, 8, 11],
            track: PathBuf::from("music/say.wav"),
            player: PlayerConfig::default(),
            gpio_root: PathBuf::from(strobe_gpio::SYSFS_ROOT),
            startup_delay: Duration::from_secs(1),
            tempo_step: 0.9,
        }
    }
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.pins.is_empty() {
            return Err(StrobeError::Config("no strobe pins".to_string()));
        }
        if !(self.tempo_step > 0.0 && self.tempo_step < 1.0) {
            return Err(StrobeError::Config(format!(
                "tempo step {} is not between 0 and 1",
                self.tempo_step
            )));
        }
        Ok(())
    }
}

pub struct Strobe {
    coordinator: Coordinator,
    tracker: JoinHandle<Option<MediaSession>>,
}

impl Strobe {
    pub async fn start(config: Config) -> Result<Strobe> {
        config.validate()?;

        let gpio = Gpio::new(&config.gpio_root);
        let mut channels = Vec::with_capacity(config.pins.len());
        for &pin in &config.pins {
            match OutputChannel::open(&gpio, pin).await {
                Ok(channel) => channels.push(channel),
                Err(e) => {
                    release(channels).await;
                    return Err(e);
                }
            }
        }

        let media = match MediaSession::start(&config.player, &config.track).await {
            Ok(media) => media,
            Err(e) => {
                release(channels).await;
                return Err(e);
            }
        };
        time::sleep(config.startup_delay).await;

        Strobe::launch(
            channels,
            media,
            config.tempo_step,
            BufReader::new(io::stdin()),
        )
    }

    pub fn launch<R>(
        channels: Vec<OutputChannel>,
        media: MediaSession,
        tempo_step: f64,
        input: R,
    ) -> Result<Strobe>
    where
        R: BufRead + Send + 'static,
    {
        let (tempo_tx, tempo_rx) = mpsc::channel(TEMPO_QUEUE_DEPTH);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (fatal_tx, fatal_rx) = mpsc::channel(1);

        let tracker = BeatTracker::new(media, tempo_tx);
        let tracker = tokio::spawn(async move {
            match tracker.run().await {
                Ok(media) => Some(media),
                Err(e) => {
                    error!(target: "strobe", "beat tracker error: {}", e);
                    let _ = fatal_tx.send(e).await;
                    None
                }
            }
        });

        CommandIngestor::new(input, command_tx).spawn()?;

        Ok(Strobe {
            coordinator: Coordinator::new(channels, tempo_step, tempo_rx, command_rx, fatal_rx),
            tracker,
        })
    }

    /// Flashes until `shutdown` resolves, then turns every line off and
    /// stops the player. Returns the fatal error that ended the run, if any.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Strobe {
            mut coordinator,
            tracker,
        } = self;

        let res = coordinator.run(shutdown).await;
        coordinator.close().await;

        match tracker.await {
            Ok(Some(media)) => media.stop().await,
            Ok(None) => (),
            Err(e) => error!(target: "strobe", "beat tracker task failed: {}", e),
        }
        info!(target: "strobe", "terminated");
        res
    }
}

// Claimed lines must be unexported before a startup error reaches main, or
// the next launch finds them busy.
async fn release(channels: Vec<OutputChannel>) {
    for channel in channels {
        channel.close().await;
    }
}
