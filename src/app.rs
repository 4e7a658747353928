use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{select, tick, unbounded, Receiver};
use tracing::{info, warn};

use crate::config::{self, Config, PlayerConfig};
use crate::feed::{FeedController, FeedInfo};
use crate::logging;
use crate::pager::{PageSource, RedditPageSource};
use crate::player::{self, PlaybackSession};
use crate::playlist::Direction;
use crate::reddit::{self, FilterParams, SortOption, TimeWindow};

const TICK: Duration = Duration::from_millis(100);

pub const HELP: &str = "\
Commands:
  n, next               Next video
  p, prev               Previous video
  r <subreddit>         Switch subreddit
  s <hot|new|top> [t]   Switch sort; t is today, week, month, year or all
  o, open               Play the current video (and follow along)
  x, stop               Stop playing
  m                     Toggle mute
  a                     Toggle auto-next
  i                     Show the current video
  h, help               Show this help
  q, quit               Quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Next,
    Previous,
    Subreddit(String),
    Sort(SortOption, TimeWindow),
    Open,
    Stop,
    ToggleMute,
    ToggleAutoNext,
    Info,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let command = match head.to_ascii_lowercase().as_str() {
        "n" | "next" => Command::Next,
        "p" | "prev" | "previous" => Command::Previous,
        "r" | "sub" | "subreddit" => {
            let name = words.next().map(reddit::normalize_source).unwrap_or_default();
            if name.is_empty() {
                bail!("usage: r <subreddit>");
            }
            if !reddit::is_valid_source(&name) {
                bail!("invalid subreddit name '{}'", name);
            }
            Command::Subreddit(name)
        }
        "s" | "sort" => {
            let sort = words
                .next()
                .ok_or_else(|| anyhow!("usage: s <hot|new|top> [window]"))?
                .parse::<SortOption>()?;
            let window = match words.next() {
                Some(raw) => raw.parse::<TimeWindow>()?,
                None => TimeWindow::Unset,
            };
            Command::Sort(sort, window)
        }
        "o" | "open" | "play" => Command::Open,
        "x" | "stop" => Command::Stop,
        "m" | "mute" => Command::ToggleMute,
        "a" | "auto" => Command::ToggleAutoNext,
        "i" | "info" => Command::Info,
        "h" | "help" | "?" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{}', try 'help'", other),
    };
    Ok(Some(command))
}

pub fn run() -> Result<()> {
    logging::init()?;
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    let client = reddit::Client::new(reddit::ClientConfig {
        user_agent: cfg.feed.user_agent.clone(),
        base_url: Some(cfg.feed.base_url.clone()),
        http_client: None,
    })
    .context("create reddit client")?;
    let source: Arc<dyn PageSource> = Arc::new(RedditPageSource::new(Arc::new(client)));

    let mut reel = Reel::new(source, &cfg);
    reel.run(spawn_input_reader())
}

enum Event {
    Line(String),
    Closed,
    Tick,
}

struct Reel {
    feed: FeedController,
    player: PlayerConfig,
    playback: Option<PlaybackSession>,
    following: bool,
    launched: Option<(usize, String)>,
    last_status: Option<String>,
}

impl Reel {
    fn new(source: Arc<dyn PageSource>, cfg: &Config) -> Self {
        Self {
            feed: FeedController::new(
                source,
                cfg.feed.filter_params(),
                cfg.feed.controller_options(),
            ),
            player: cfg.player.clone(),
            playback: None,
            following: false,
            launched: None,
            last_status: None,
        }
    }

    fn run(&mut self, input: Receiver<String>) -> Result<()> {
        println!("Videoreel {} - {}", crate::VERSION, self.feed.params().label());
        println!("{HELP}");
        self.feed.ensure_lookahead();
        self.render();

        let ticker = tick(TICK);
        loop {
            let event = select! {
                recv(input) -> line => match line {
                    Ok(line) => Event::Line(line),
                    Err(_) => Event::Closed,
                },
                recv(ticker) -> _ => Event::Tick,
            };
            match event {
                Event::Closed => break,
                Event::Line(line) => match parse_command(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => self.apply(command),
                    Ok(None) => {}
                    Err(err) => println!("{err}"),
                },
                Event::Tick => {}
            }
            self.feed.poll();
            self.watch_playback();
            self.sync_player();
            self.render();
        }

        self.stop_playback();
        Ok(())
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Next => self.feed.advance(Direction::Forward),
            Command::Previous => self.feed.advance(Direction::Backward),
            Command::Subreddit(name) => {
                let params = self.feed.params();
                let next = FilterParams::new(name, params.order, params.time_window);
                self.switch(next);
            }
            Command::Sort(order, window) => {
                let next = FilterParams::new(self.feed.params().source.clone(), order, window);
                self.switch(next);
            }
            Command::Open => {
                self.following = true;
                self.launched = None;
            }
            Command::Stop => {
                self.following = false;
                self.stop_playback();
            }
            Command::ToggleMute => {
                self.player.muted = !self.player.muted;
                println!("Muted: {}", on_off(self.player.muted));
                self.launched = None;
            }
            Command::ToggleAutoNext => {
                self.player.auto_next = !self.player.auto_next;
                println!("Auto-next: {}", on_off(self.player.auto_next));
                self.launched = None;
            }
            Command::Info => self.last_status = None,
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }

    fn switch(&mut self, params: FilterParams) {
        if &params == self.feed.params() {
            return;
        }
        println!("Switching to {}", params.label());
        self.stop_playback();
        self.launched = None;
        self.feed.set_filter_params(params);
    }

    fn watch_playback(&mut self) {
        let Some(session) = self.playback.as_mut() else {
            return;
        };
        let Some(status) = session.try_status() else {
            return;
        };
        self.playback = None;
        match status {
            Ok(status) if !status.success() => warn!(code = ?status.code(), "player failed"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "player session ended"),
        }
        if self.following && self.player.auto_next {
            self.feed.advance(Direction::Forward);
        } else {
            self.following = false;
            self.launched = None;
        }
    }

    fn sync_player(&mut self) {
        if !self.following {
            return;
        }
        let Some(media) = self.feed.current() else {
            return;
        };
        let key = (self.feed.position(), media.video_url.clone());
        if self.launched.as_ref() == Some(&key) {
            return;
        }
        let media = media.clone();
        self.stop_playback();
        match player::spawn_player(&media, &self.player) {
            Ok(session) => {
                info!(url = %media.video_url, "playing");
                self.playback = Some(session);
                self.launched = Some(key);
            }
            Err(err) => {
                println!("Could not start the player: {err:#}");
                self.following = false;
            }
        }
    }

    fn stop_playback(&mut self) {
        if let Some(session) = self.playback.take() {
            let _ = session.stop();
        }
    }

    fn render(&mut self) {
        let info = self.feed.info();
        let status = match (&info, self.feed.last_error()) {
            (FeedInfo::Loading, Some(err)) => {
                format!("Could not load videos: {err}. Press n or p to retry.")
            }
            (FeedInfo::Loading, None) if self.feed.is_exhausted() => {
                format!("No more videos in {}.", self.feed.params().label())
            }
            _ => info.to_string(),
        };
        if self.last_status.as_deref() == Some(status.as_str()) {
            return;
        }
        println!("{status}");
        let _ = io::stdout().flush();
        self.last_status = Some(status);
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn spawn_input_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_navigation() {
        assert_eq!(parse_command("n").unwrap(), Some(Command::Next));
        assert_eq!(parse_command("  PREV ").unwrap(), Some(Command::Previous));
        assert_eq!(parse_command("").unwrap(), None);
        assert_eq!(parse_command("q").unwrap(), Some(Command::Quit));
    }

    #[test]
    fn parses_filter_changes() {
        assert_eq!(
            parse_command("r /r/gifs").unwrap(),
            Some(Command::Subreddit("gifs".into()))
        );
        assert_eq!(
            parse_command("s top week").unwrap(),
            Some(Command::Sort(SortOption::Top, TimeWindow::Week))
        );
        assert_eq!(
            parse_command("sort new").unwrap(),
            Some(Command::Sort(SortOption::New, TimeWindow::Unset))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("r").is_err());
        assert!(parse_command("r gifs?limit=1").is_err());
        assert!(parse_command("r ../../api").is_err());
        assert!(parse_command("s").is_err());
        assert!(parse_command("s top fortnight").is_err());
        assert!(parse_command("dance").is_err());
    }
}
