use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use log::info;
use strobe::{Config, PlayerConfig, Strobe};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(about = "flash gpio strobes in time with a track")]
struct Opt {
    /// Gpio line to drive; repeat for more. Defaults to 7, 8 and 11.
    #[structopt(long = "pin", number_of_values = 1)]
    pins: Vec<u32>,

    /// Player program; it gets the track as its last argument.
    #[structopt(long)]
    player: Option<String>,

    /// Extra player argument; repeat for more.
    #[structopt(long = "player-arg", number_of_values = 1, allow_hyphen_values = true)]
    player_args: Vec<String>,

    #[structopt(long, parse(from_os_str), default_value = "/sys/class/gpio")]
    gpio_root: PathBuf,

    #[structopt(long, default_value = "1000")]
    startup_delay_ms: u64,

    /// Flash interval multiplier for one `>`.
    #[structopt(long, default_value = "0.9")]
    tempo_step: f64,

    /// Track to play; its beats are read from `<track>.beat`.
    #[structopt(parse(from_os_str), default_value = "music/say.wav")]
    track: PathBuf,
}

impl Opt {
    fn into_config(self) -> Config {
        let defaults = Config::default();
        let player = match self.player {
            Some(program) => PlayerConfig {
                program,
                args: self.player_args,
            },
            None if self.player_args.is_empty() => defaults.player,
            None => PlayerConfig {
                args: self.player_args,
                ..defaults.player
            },
        };

        Config {
            pins: if self.pins.is_empty() {
                defaults.pins
            } else {
                self.pins
            },
            track: self.track,
            player,
            gpio_root: self.gpio_root,
            startup_delay: Duration::from_millis(self.startup_delay_ms),
            tempo_step: self.tempo_step,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Opt::from_args().into_config();

    let strobe = Strobe::start(config).await?;
    println!("started; channel numbers toggle lines, > and < nudge the tempo");

    strobe
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    info!("terminating");

    Ok(())
}
