use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::config::PlayerConfig;
use crate::extract::MediaRef;

const REFERER: &str = "https://www.reddit.com/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";

// The audio track goes to the same process so it mutes and loops with the video.
pub fn player_args(media: &MediaRef, cfg: &PlayerConfig) -> Vec<String> {
    let mut args = Vec::new();
    args.push(media.video_url.clone());
    if let Some(audio) = &media.audio_url {
        args.push(format!("--audio-file={}", audio));
    }
    args.push(format!("--mute={}", if cfg.muted { "yes" } else { "no" }));
    if cfg.auto_next {
        args.push("--loop-file=no".to_string());
    } else {
        args.push("--loop-file=inf".to_string());
    }
    if cfg.fullscreen {
        args.push("--fullscreen".to_string());
    }
    args.push("--force-window=yes".to_string());
    args.push("--keep-open=no".to_string());
    args.push("--really-quiet".to_string());
    args.push("--ytdl=no".to_string());

    let title = media.post.title().trim();
    if !title.is_empty() {
        args.push(format!("--force-media-title={}", title));
    }

    args.push(format!("--http-header-fields=User-Agent: {}", USER_AGENT));
    args.push(format!("--http-header-fields=Referer: {}", REFERER));
    args
}

pub struct PlaybackSession {
    kill_tx: Sender<()>,
    status_rx: Receiver<Result<ExitStatus>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PlaybackSession {
    fn finalize(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn try_status(&mut self) -> Option<Result<ExitStatus>> {
        match self.status_rx.try_recv() {
            Ok(res) => {
                self.finalize();
                Some(res)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finalize();
                Some(Err(anyhow!("player session closed unexpectedly")))
            }
        }
    }

    pub fn stop(mut self) -> Option<Result<ExitStatus>> {
        let _ = self.kill_tx.send(());
        let res = self.status_rx.recv().ok();
        self.finalize();
        res
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.kill_tx.send(());
            let _ = self.status_rx.recv().ok();
            self.finalize();
        }
    }
}

pub fn spawn_player(media: &MediaRef, cfg: &PlayerConfig) -> Result<PlaybackSession> {
    if cfg.command.trim().is_empty() {
        return Err(anyhow!("player command missing"));
    }

    let (kill_tx, kill_rx) = bounded::<()>(1);
    let (status_tx, status_rx) = bounded::<Result<ExitStatus>>(1);

    let program = cfg.command.clone();
    let args = player_args(media, cfg);
    let video_url = media.video_url.clone();
    debug!(player = %program, ?args, "launching player");

    let mut child = Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("launch {} to play {}", program, video_url))?;

    let handle = thread::spawn(move || {
        let result = loop {
            if kill_rx.try_recv().is_ok() {
                let _ = child.kill();
                break child.wait().context("wait for player after stop request");
            }
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(code = ?status.code(), "player exited");
                    break Ok(status);
                }
                Ok(None) => thread::sleep(Duration::from_millis(30)),
                Err(err) => {
                    warn!(error = %err, "player poll failed");
                    break Err(anyhow!(err).context("poll player status"));
                }
            }
        };
        let _ = status_tx.send(result);
    });

    Ok(PlaybackSession {
        kill_tx,
        status_rx,
        handle: Some(handle),
    })
}
