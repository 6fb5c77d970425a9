use log::{debug, info};
use tokio::{
    sync::mpsc,
    time::{self, Instant},
};

use crate::{media::MediaSession, message::TempoUpdate, Result, StrobeError};

pub(crate) struct BeatTracker {
    media: MediaSession,
    tempo_tx: mpsc::Sender<TempoUpdate>,
}

impl BeatTracker {
    pub(crate) fn new(media: MediaSession, tempo_tx: mpsc::Sender<TempoUpdate>) -> BeatTracker {
        BeatTracker { media, tempo_tx }
    }

    // Hands the session back so the player outlives the tracker.
    pub(crate) async fn run(mut self) -> Result<MediaSession> {
        match self.run_impl().await {
            Ok(()) | Err(StrobeError::Terminating) => Ok(self.media),
            Err(e) => Err(e),
        }
    }

    async fn run_impl(&mut self) -> Result<()> {
        if self.media.curve().is_empty() {
            return Err(StrobeError::EmptyCurve);
        }

        self.media.resume().await?;
        info!(target: "strobe", "playback started");
        let start = Instant::now();

        let updates: Vec<TempoUpdate> = self.media.curve().tempo_updates().collect();
        for update in updates {
            wait_until(&self.tempo_tx, start + update.at).await?;
            debug!(
                target: "strobe",
                "beat at {:?}: period {:?}, flash every {:?}",
                update.at, update.period, update.interval
            );
            self.tempo_tx
                .send(update)
                .await
                .map_err(|_| StrobeError::Terminating)?;
        }

        info!(target: "strobe", "out of beat changes");
        Ok(())
    }
}

async fn wait_until(tempo_tx: &mpsc::Sender<TempoUpdate>, when: Instant) -> Result<()> {
    tokio::select! {
        _ = time::sleep_until(when) => Ok(()),
        _ = tempo_tx.closed() => Err(StrobeError::Terminating),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::beat::BeatCurve;

    #[tokio::test(start_paused = true)]
    async fn test_replays_curve_on_time() {
        let (control, mut player) = tokio::io::duplex(64);
        let curve = BeatCurve::parse("0.0\n0.5\n1.1\n").unwrap();
        let (tempo_tx, mut tempo_rx) = mpsc::channel(1);
        let start = Instant::now();
        let tracker = tokio::spawn(
            BeatTracker::new(MediaSession::with_control(control, curve), tempo_tx).run(),
        );

        let mut updates = Vec::new();
        while let Some(update) = tempo_rx.recv().await {
            assert!(start.elapsed() >= update.at);
            assert!(start.elapsed() < update.at + Duration::from_millis(10));
            updates.push(update);
        }
        let media = tracker.await.unwrap().unwrap();

        let millis = |d: Duration| (d.as_secs_f64() * 1000.0).round() as u64;
        let at: Vec<_> = updates.iter().map(|u| millis(u.at)).collect();
        assert_eq!(at, vec![0, 500, 1100]);
        let periods: Vec<_> = updates.iter().map(|u| millis(u.period)).collect();
        assert_eq!(periods, vec![0, 250, 425]);

        media.stop().await;
        let mut sent = String::new();
        player.read_to_string(&mut sent).await.unwrap();
        assert_eq!(sent, "play\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_coordinator_leaves() {
        let (control, _player) = tokio::io::duplex(64);
        let curve = BeatCurve::parse("0.5\n60.0\n").unwrap();
        let (tempo_tx, mut tempo_rx) = mpsc::channel(1);
        let tracker = tokio::spawn(
            BeatTracker::new(MediaSession::with_control(control, curve), tempo_tx).run(),
        );

        assert!(tempo_rx.recv().await.is_some());
        drop(tempo_rx);
        assert!(tracker.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_empty_curve_is_fatal() {
        let (control, mut player) = tokio::io::duplex(64);
        let (tempo_tx, _tempo_rx) = mpsc::channel(1);
        let res = BeatTracker::new(
            MediaSession::with_control(control, BeatCurve::default()),
            tempo_tx,
        )
        .run()
        .await;
        assert!(matches!(res, Err(StrobeError::EmptyCurve)));

        let mut sent = String::new();
        player.read_to_string(&mut sent).await.unwrap();
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_control_pipe_failure_is_fatal() {
        let (control, player) = tokio::io::duplex(64);
        drop(player);
        let (tempo_tx, _tempo_rx) = mpsc::channel(1);
        let curve = BeatCurve::parse("0.5\n").unwrap();
        let res = BeatTracker::new(MediaSession::with_control(control, curve), tempo_tx)
            .run()
            .await;
        assert!(matches!(res, Err(StrobeError::ControlPipe(_))));
    }
}
