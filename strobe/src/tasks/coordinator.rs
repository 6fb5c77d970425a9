use std::{future::Future, time::Duration};

use log::{debug, info, warn};
use tokio::{
    sync::mpsc,
    time::{self, Instant, Interval, MissedTickBehavior},
};

use crate::{
    channel::OutputChannel,
    message::{Command, TempoStep, TempoUpdate},
    Result, StrobeError,
};

const MIN_TEMPO_SCALE: f64 = 0.25;
const MAX_TEMPO_SCALE: f64 = 4.0;

struct Output {
    channel: OutputChannel,
    enabled: bool,
}

struct FlashTimer {
    interval: Interval,
}

impl FlashTimer {
    fn start(period: Duration) -> FlashTimer {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        FlashTimer { interval }
    }

    fn period(&self) -> Duration {
        self.interval.period()
    }
}

async fn next_tick(timer: &mut Option<FlashTimer>) {
    match timer {
        Some(timer) => {
            timer.interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn recv_from<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

pub(crate) struct Coordinator {
    outputs: Vec<Output>,
    phase: bool,
    timer: Option<FlashTimer>,
    base_interval: Option<Duration>,
    tempo_scale: f64,
    tempo_step: f64,
    tempo_rx: Option<mpsc::Receiver<TempoUpdate>>,
    command_rx: Option<mpsc::Receiver<Command>>,
    fatal_rx: Option<mpsc::Receiver<StrobeError>>,
}

impl Coordinator {
    pub(crate) fn new(
        channels: Vec<OutputChannel>,
        tempo_step: f64,
        tempo_rx: mpsc::Receiver<TempoUpdate>,
        command_rx: mpsc::Receiver<Command>,
        fatal_rx: mpsc::Receiver<StrobeError>,
    ) -> Coordinator {
        Coordinator {
            outputs: channels
                .into_iter()
                .map(|channel| Output {
                    channel,
                    enabled: true,
                })
                .collect(),
            phase: true,
            timer: None,
            base_interval: None,
            tempo_scale: 1.0,
            tempo_step,
            tempo_rx: Some(tempo_rx),
            command_rx: Some(command_rx),
            fatal_rx: Some(fatal_rx),
        }
    }

    pub(crate) async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(target: "strobe", "shutting down");
                    return Ok(());
                }
                res = recv_from(&mut self.fatal_rx) => match res {
                    Some(e) => return Err(e),
                    None => self.fatal_rx = None,
                },
                _ = next_tick(&mut self.timer) => self.flash().await?,
                res = recv_from(&mut self.tempo_rx) => match res {
                    Some(update) => self.retime(update),
                    None => {
                        debug!(target: "strobe", "beat tracker finished");
                        self.tempo_rx = None;
                    }
                },
                res = recv_from(&mut self.command_rx) => match res {
                    Some(command) => self.command(command).await?,
                    None => {
                        info!(target: "strobe", "operator input closed");
                        self.command_rx = None;
                    }
                },
            }
        }
    }

    pub(crate) async fn close(mut self) {
        self.timer = None;
        for output in self.outputs {
            if let Err(e) = output.channel.send(false).await {
                warn!(target: "strobe", "{}", e);
            }
            output.channel.close().await;
        }
    }

    async fn flash(&mut self) -> Result<()> {
        for output in self.outputs.iter().filter(|o| o.enabled) {
            output.channel.send(self.phase).await?;
        }
        self.phase = !self.phase;
        Ok(())
    }

    fn retime(&mut self, update: TempoUpdate) {
        debug!(
            target: "strobe",
            "tempo update at {:?}: flash every {:?}",
            update.at, update.interval
        );
        self.base_interval = Some(update.interval);
        self.install_timer();
    }

    // The old timer is dropped before the new one exists, so a stale tick can
    // never be taken for one of the new timer's.
    fn install_timer(&mut self) {
        let base = match self.base_interval {
            Some(base) => base,
            None => return,
        };
        let period = base.mul_f64(self.tempo_scale);
        if period.is_zero() {
            debug!(target: "strobe", "ignoring zero-length flash interval");
            return;
        }
        if let Some(old) = self.timer.take() {
            debug!(target: "strobe", "replacing {:?} timer with {:?}", old.period(), period);
        }
        self.timer = Some(FlashTimer::start(period));
    }

    async fn command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Toggle(index) => match self.outputs.get_mut(index) {
                Some(output) => {
                    output.enabled = !output.enabled;
                    info!(
                        target: "strobe",
                        "line {} {}",
                        output.channel.pin(),
                        if output.enabled { "enabled" } else { "disabled" }
                    );
                    if !output.enabled {
                        output.channel.send(false).await?;
                    }
                }
                None => warn!(target: "strobe", "bad command: {}", index),
            },
            Command::Tempo(step) => self.step_tempo(step),
            Command::Invalid(n) => warn!(target: "strobe", "bad command: {}", n),
            Command::Quit => self.command_rx = None,
        }
        Ok(())
    }

    fn step_tempo(&mut self, step: TempoStep) {
        let scale = match step {
            TempoStep::Faster => self.tempo_scale * self.tempo_step,
            TempoStep::Slower => self.tempo_scale / self.tempo_step,
        };
        self.tempo_scale = scale.clamp(MIN_TEMPO_SCALE, MAX_TEMPO_SCALE);
        info!(target: "strobe", "tempo scale {:.3}", self.tempo_scale);
        self.install_timer();
    }
}
