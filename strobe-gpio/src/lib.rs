use std::{
    io::{self, ErrorKind, SeekFrom},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context};
use log::debug;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncSeekExt, AsyncWriteExt},
    time,
};

pub use anyhow::Result;

pub const SYSFS_ROOT: &str = "/sys/class/gpio";

const EBUSY: i32 = 16;

// udev can take a few ms to hand a freshly exported line over to the gpio group.
const EXPORT_POLL: Duration = Duration::from_millis(10);
const EXPORT_ATTEMPTS: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Gpio {
    root: PathBuf,
}

impl Default for Gpio {
    fn default() -> Self {
        Gpio::new(SYSFS_ROOT)
    }
}

impl Gpio {
    pub fn new(root: impl Into<PathBuf>) -> Gpio {
        Gpio { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Exports `pin` and configures its direction. Fails if the line is
    /// already exported, does not exist, or we lack permission to drive it.
    pub async fn open(&self, pin: u32, direction: Direction) -> Result<GpioLine> {
        write_attr(&self.root.join("export"), &pin.to_string())
            .await
            .map_err(|e| match e.raw_os_error() {
                Some(EBUSY) => anyhow!("gpio {} is already in use", pin),
                _ => anyhow!("failed to export gpio {}: {}", pin, e),
            })?;

        let line_dir = self.root.join(format!("gpio{}", pin));
        let mut attempts = 0;
        loop {
            match write_attr(&line_dir.join("direction"), direction.as_str()).await {
                Ok(()) => break,
                Err(e)
                    if attempts < EXPORT_ATTEMPTS
                        && matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) =>
                {
                    attempts += 1;
                    time::sleep(EXPORT_POLL).await;
                }
                Err(e) => {
                    let _ = self.unexport(pin).await;
                    return Err(anyhow!("failed to set gpio {} direction: {}", pin, e));
                }
            }
        }

        let value = match OpenOptions::new()
            .read(true)
            .write(true)
            .open(line_dir.join("value"))
            .await
        {
            Ok(value) => value,
            Err(e) => {
                let _ = self.unexport(pin).await;
                return Err(anyhow!("failed to open gpio {} value: {}", pin, e));
            }
        };

        debug!(target: "strobe", "opened gpio {} as {:?}", pin, direction);
        Ok(GpioLine {
            pin,
            direction,
            value,
            gpio: self.clone(),
        })
    }

    pub async fn unexport(&self, pin: u32) -> Result<()> {
        write_attr(&self.root.join("unexport"), &pin.to_string())
            .await
            .with_context(|| format!("failed to unexport gpio {}", pin))
    }
}

pub struct GpioLine {
    pin: u32,
    direction: Direction,
    value: File,
    gpio: Gpio,
}

impl GpioLine {
    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub async fn set_state(&mut self, on: bool) -> Result<()> {
        if self.direction != Direction::Out {
            return Err(anyhow!("gpio {} is not an output", self.pin));
        }
        self.value.seek(SeekFrom::Start(0)).await?;
        self.value.write_all(if on { b"1" } else { b"0" }).await?;
        self.value.flush().await?;
        Ok(())
    }

    // The last written state is left to the kernel.
    pub async fn close(self) -> Result<()> {
        let GpioLine {
            pin, value, gpio, ..
        } = self;
        drop(value);
        gpio.unexport(pin).await?;
        debug!(target: "strobe", "closed gpio {}", pin);
        Ok(())
    }
}

async fn write_attr(path: &Path, value: &str) -> io::Result<()> {
    let mut f = OpenOptions::new().write(true).open(path).await?;
    f.write_all(value.as_bytes()).await?;
    f.flush().await
}
