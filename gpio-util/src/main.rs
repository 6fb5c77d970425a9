use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use strobe_gpio::{Direction, Gpio};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(about = "gpio strobe line bench utility")]
struct Opt {
    /// sysfs gpio directory
    #[structopt(long, parse(from_os_str), default_value = "/sys/class/gpio")]
    root: PathBuf,

    #[structopt(subcommand)]
    cmd: Cmd,
}

#[derive(StructOpt)]
enum Cmd {
    /// Drive a line and leave it exported.
    Set {
        pin: u32,
        #[structopt(parse(try_from_str = parse_state))]
        state: bool,
    },
    /// Flash a line, then release it.
    Blink {
        pin: u32,
        #[structopt(long, default_value = "10")]
        count: u32,
        #[structopt(long, default_value = "250")]
        period_ms: u64,
    },
    /// Release a line left exported by `set`.
    Release { pin: u32 },
}

fn parse_state(s: &str) -> Result<bool> {
    match s {
        "on" | "1" | "high" => Ok(true),
        "off" | "0" | "low" => Ok(false),
        _ => Err(anyhow!("unknown state {}", s)),
    }
}

async fn blink(gpio: &Gpio, pin: u32, count: u32, period: Duration) -> Result<()> {
    let mut line = gpio.open(pin, Direction::Out).await?;
    for _ in 0..count {
        line.set_state(true).await?;
        tokio::time::sleep(period / 2).await;
        line.set_state(false).await?;
        tokio::time::sleep(period / 2).await;
    }
    line.close().await
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    let gpio = Gpio::new(opt.root);

    match opt.cmd {
        Cmd::Set { pin, state } => {
            let mut line = gpio.open(pin, Direction::Out).await?;
            line.set_state(state).await?;
            println!("gpio {} {}", pin, if state { "on" } else { "off" });
            Ok(())
        }
        Cmd::Blink {
            pin,
            count,
            period_ms,
        } => blink(&gpio, pin, count, Duration::from_millis(period_ms)).await,
        Cmd::Release { pin } => gpio.unexport(pin).await,
    }
}
