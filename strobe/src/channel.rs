use std::future::Future;

use log::{debug, error, info};
use strobe_gpio::{Direction, Gpio, GpioLine};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{Result, StrobeError};

pub const QUEUE_DEPTH: usize = 5;

pub trait Line: Send + Sized + 'static {
    fn set_state(&mut self, on: bool) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn close(self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl Line for GpioLine {
    async fn set_state(&mut self, on: bool) -> anyhow::Result<()> {
        GpioLine::set_state(self, on).await
    }

    async fn close(self) -> anyhow::Result<()> {
        GpioLine::close(self).await
    }
}

pub struct OutputChannel {
    pin: u32,
    state_tx: mpsc::Sender<bool>,
    drain: JoinHandle<()>,
}

impl OutputChannel {
    pub async fn open(gpio: &Gpio, pin: u32) -> Result<OutputChannel> {
        let line = gpio
            .open(pin, Direction::Out)
            .await
            .map_err(|error| StrobeError::Gpio { pin, error })?;
        info!(target: "strobe", "opened strobe line {}", pin);
        Ok(OutputChannel::spawn(pin, line))
    }

    pub fn spawn<L: Line>(pin: u32, line: L) -> OutputChannel {
        let (state_tx, state_rx) = mpsc::channel(QUEUE_DEPTH);
        let drain = tokio::spawn(drain(pin, line, state_rx));
        OutputChannel {
            pin,
            state_tx,
            drain,
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    // Waits for room rather than dropping a state.
    pub async fn send(&self, on: bool) -> Result<()> {
        self.state_tx
            .send(on)
            .await
            .map_err(|_| StrobeError::ChannelClosed { pin: self.pin })
    }

    pub async fn close(self) {
        drop(self.state_tx);
        if let Err(e) = self.drain.await {
            error!(target: "strobe", "line {} drain task failed: {}", self.pin, e);
        }
    }
}

async fn drain<L: Line>(pin: u32, mut line: L, mut state_rx: mpsc::Receiver<bool>) {
    while let Some(on) = state_rx.recv().await {
        if let Err(e) = line.set_state(on).await {
            error!(target: "strobe", "line {} write failed: {}", pin, e);
        }
    }
    if let Err(e) = line.close().await {
        error!(target: "strobe", "line {} close failed: {}", pin, e);
    }
    debug!(target: "strobe", "line {} released", pin);
}

#[cfg(test)]
pub(crate) mod testing {
    use anyhow::anyhow;
    use tokio::sync::mpsc;

    use super::Line;

    #[derive(Clone, Copy, Debug, PartialEq)]
    pub(crate) enum Write {
        State(bool),
        Closed,
    }

    pub(crate) struct RecordingLine {
        writes: mpsc::UnboundedSender<Write>,
        fail_first: bool,
    }

    impl RecordingLine {
        pub(crate) fn new() -> (RecordingLine, mpsc::UnboundedReceiver<Write>) {
            let (writes, rx) = mpsc::unbounded_channel();
            (
                RecordingLine {
                    writes,
                    fail_first: false,
                },
                rx,
            )
        }

        pub(crate) fn failing_once() -> (RecordingLine, mpsc::UnboundedReceiver<Write>) {
            let (mut line, rx) = RecordingLine::new();
            line.fail_first = true;
            (line, rx)
        }
    }

    impl Line for RecordingLine {
        async fn set_state(&mut self, on: bool) -> anyhow::Result<()> {
            if self.fail_first {
                self.fail_first = false;
                return Err(anyhow!("stuck"));
            }
            let _ = self.writes.send(Write::State(on));
            Ok(())
        }

        async fn close(self) -> anyhow::Result<()> {
            let _ = self.writes.send(Write::Closed);
            Ok(())
        }
    }

    pub(crate) fn drained(rx: &mut mpsc::UnboundedReceiver<Write>) -> Vec<Write> {
        let mut writes = Vec::new();
        while let Ok(w) = rx.try_recv() {
            writes.push(w);
        }
        writes
    }
}
