use std::{
    io::BufRead,
    thread::{self, JoinHandle},
};

use log::{debug, error, info};
use tokio::sync::mpsc;

use crate::{message::Command, Result};

// Runs on its own thread: blocking stdin reads would otherwise hold up
// runtime shutdown.
pub(crate) struct CommandIngestor<R> {
    input: R,
    command_tx: mpsc::Sender<Command>,
}

impl<R: BufRead + Send + 'static> CommandIngestor<R> {
    pub(crate) fn new(input: R, command_tx: mpsc::Sender<Command>) -> CommandIngestor<R> {
        CommandIngestor { input, command_tx }
    }

    pub(crate) fn spawn(self) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("strobe-input".to_string())
            .spawn(move || {
                if let Err(e) = self.run() {
                    error!(target: "strobe", "input task error: {}", e);
                }
            })?;
        Ok(handle)
    }

    // Returns on `-1`, end of input, or once nobody is listening.
    pub(crate) fn run(mut self) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if self.input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            for token in line.split_whitespace() {
                match Command::parse(token) {
                    Some(Command::Quit) => {
                        info!(target: "strobe", "operator quit");
                        return Ok(());
                    }
                    Some(command) => {
                        debug!(target: "strobe", "got {:?}", command);
                        if self.command_tx.blocking_send(command).is_err() {
                            return Ok(());
                        }
                    }
                    None => debug!(target: "strobe", "ignoring {:?}", token),
                }
            }
        }
        info!(target: "strobe", "end of operator input");
        Ok(())
    }
}
