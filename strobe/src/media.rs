use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::Stdio,
};

use log::{info, warn};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    process::{Child, Command},
};

use crate::{beat::BeatCurve, Result, StrobeError};

// The track path is appended as the last argument.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            program: "vlc-wrapper".to_string(),
            args: vec!["-I".into(), "rc".into(), "--play-and-stop".into()],
        }
    }
}

pub fn beat_path(track: &Path) -> PathBuf {
    let mut path = OsString::from(track.as_os_str());
    path.push(".beat");
    PathBuf::from(path)
}

pub struct MediaSession {
    child: Option<Child>,
    control: Box<dyn AsyncWrite + Send + Unpin>,
    curve: BeatCurve,
}

impl MediaSession {
    pub async fn start(player: &PlayerConfig, track: &Path) -> Result<MediaSession> {
        let mut child = Command::new(&player.program)
            .args(&player.args)
            .arg(track)
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| StrobeError::PlayerSpawn {
                program: player.program.clone(),
                error,
            })?;
        let stdin = child.stdin.take().ok_or_else(|| {
            StrobeError::ControlPipe(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "player stdin was not captured",
            ))
        })?;

        let curve = BeatCurve::load(&beat_path(track)).await?;
        let mut session = MediaSession {
            child: Some(child),
            control: Box::new(stdin),
            curve,
        };
        session.pause().await?;
        info!(target: "strobe", "started {} for {}", player.program, track.display());
        Ok(session)
    }

    pub fn with_control<W>(control: W, curve: BeatCurve) -> MediaSession
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        MediaSession {
            child: None,
            control: Box::new(control),
            curve,
        }
    }

    pub fn curve(&self) -> &BeatCurve {
        &self.curve
    }

    pub async fn pause(&mut self) -> Result<()> {
        self.command("pause").await
    }

    pub async fn resume(&mut self) -> Result<()> {
        self.command("play").await
    }

    async fn command(&mut self, cmd: &str) -> Result<()> {
        self.control
            .write_all(format!("{}\n", cmd).as_bytes())
            .await
            .map_err(StrobeError::ControlPipe)?;
        self.control.flush().await.map_err(StrobeError::ControlPipe)
    }

    pub async fn stop(mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(target: "strobe", "failed to stop player: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[test]
    fn test_beat_path() {
        assert_eq!(
            beat_path(Path::new("music/say.wav")),
            PathBuf::from("music/say.wav.beat")
        );
    }

    #[tokio::test]
    async fn test_control_lines() {
        let (control, mut player) = tokio::io::duplex(64);
        let mut session = MediaSession::with_control(control, BeatCurve::default());
        session.pause().await.unwrap();
        session.resume().await.unwrap();
        session.stop().await;

        let mut sent = String::new();
        player.read_to_string(&mut sent).await.unwrap();
        assert_eq!(sent, "pause\nplay\n");
    }

    #[tokio::test]
    async fn test_closed_pipe_is_fatal() {
        let (control, player) = tokio::io::duplex(64);
        drop(player);
        let mut session = MediaSession::with_control(control, BeatCurve::default());
        assert!(matches!(
            session.resume().await,
            Err(StrobeError::ControlPipe(_))
        ));
    }

    #[tokio::test]
    async fn test_start_player() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("song.wav");
        std::fs::write(beat_path(&track), "0.5\n1.0\n").unwrap();

        let player = PlayerConfig {
            program: "sh".to_string(),
            args: vec!["-c".into(), "cat > /dev/null".into(), "player".into()],
        };
        let mut session = MediaSession::start(&player, &track).await.unwrap();
        assert_eq!(session.curve().changes().len(), 2);
        session.resume().await.unwrap();
        session.stop().await;
    }

    #[tokio::test]
    async fn test_start_failures() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("song.wav");

        let missing_player = PlayerConfig {
            program: "/nonexistent/player".to_string(),
            args: Vec::new(),
        };
        assert!(matches!(
            MediaSession::start(&missing_player, &track).await,
            Err(StrobeError::PlayerSpawn { .. })
        ));

        let player = PlayerConfig {
            program: "sh".to_string(),
            args: vec!["-c".into(), "cat > /dev/null".into(), "player".into()],
        };
        assert!(matches!(
            MediaSession::start(&player, &track).await,
            Err(StrobeError::BeatFile { .. })
        ));
    }
}
