use std::{io, path::Path, time::Duration};

use nom::{
    character::complete::multispace0, combinator::all_consuming, number::complete::double,
    sequence::delimited, IResult,
};
use thiserror::Error;
use tokio::fs;

use crate::{message::TempoUpdate, Result, StrobeError};

pub const SMOOTHING: f64 = 0.5;

// Slightly above four so the on/off/on/off pattern finishes inside the beat.
pub const FLASH_DIVISOR: f64 = 4.7;

#[derive(Error, Debug)]
pub enum BeatFileError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("no beats")]
    Empty,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeatChange {
    pub time: Duration,
    pub period: Duration,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BeatCurve {
    changes: Vec<BeatChange>,
}

fn timestamp(input: &str) -> IResult<&str, f64> {
    all_consuming(delimited(multispace0, double, multispace0))(input)
}

pub fn flash_interval(period: Duration) -> Duration {
    period.div_f64(FLASH_DIVISOR)
}

impl BeatCurve {
    pub fn new(changes: Vec<BeatChange>) -> BeatCurve {
        BeatCurve { changes }
    }

    pub async fn load(path: &Path) -> Result<BeatCurve> {
        let wrap = |error: BeatFileError| StrobeError::BeatFile {
            path: path.to_owned(),
            error,
        };
        let text = fs::read_to_string(path)
            .await
            .map_err(|e| wrap(e.into()))?;
        BeatCurve::parse(&text).map_err(wrap)
    }

    pub fn parse(text: &str) -> std::result::Result<BeatCurve, BeatFileError> {
        let mut last = 0.0f64;
        let mut changes = Vec::new();

        for (i, raw) in text.lines().enumerate() {
            let line = i + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let (_, secs) = timestamp(raw).map_err(|_| BeatFileError::Malformed {
                line,
                reason: format!("not a timestamp: {:?}", raw.trim()),
            })?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(BeatFileError::Malformed {
                    line,
                    reason: format!("timestamp {} out of range", secs),
                });
            }
            if secs < last {
                return Err(BeatFileError::Malformed {
                    line,
                    reason: format!("timestamp {} is before {}", secs, last),
                });
            }

            changes.push(BeatChange {
                time: Duration::from_secs_f64(secs),
                period: Duration::from_secs_f64(secs - last),
            });
            last = secs;
        }

        if changes.is_empty() {
            return Err(BeatFileError::Empty);
        }
        Ok(BeatCurve { changes })
    }

    pub fn changes(&self) -> &[BeatChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    // The first sample is smoothed against itself.
    pub fn tempo_updates(&self) -> impl Iterator<Item = TempoUpdate> + '_ {
        let mut last = self.changes.first().map(|c| c.period);
        self.changes.iter().map(move |change| {
            let prev = last.unwrap_or(change.period);
            let period = change.period.mul_f64(SMOOTHING) + prev.mul_f64(1.0 - SMOOTHING);
            last = Some(period);
            TempoUpdate {
                at: change.time,
                period,
                interval: flash_interval(period),
            }
        })
    }
}
