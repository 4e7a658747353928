use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::feed;
use crate::pager;
use crate::reddit::{self, FilterParams, SortOption, TimeWindow};

const DEFAULT_ENV_PREFIX: &str = "VIDEOREEL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_subreddit")]
    pub subreddit: String,
    #[serde(default)]
    pub sort: SortOption,
    #[serde(default)]
    pub time_window: TimeWindow,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_max_empty_pages")]
    pub max_empty_pages: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            subreddit: default_subreddit(),
            sort: SortOption::default(),
            time_window: TimeWindow::default(),
            timeout: default_timeout(),
            max_empty_pages: default_max_empty_pages(),
            user_agent: default_user_agent(),
        }
    }
}

impl FeedConfig {
    pub fn filter_params(&self) -> FilterParams {
        FilterParams::new(self.subreddit.clone(), self.sort, self.time_window)
    }

    pub fn controller_options(&self) -> feed::Options {
        feed::Options {
            timeout: self.timeout,
            max_empty_pages: self.max_empty_pages,
        }
    }
}

fn default_base_url() -> String {
    reddit::DEFAULT_BASE_URL.to_string()
}

fn default_subreddit() -> String {
    reddit::DEFAULT_SUBREDDIT.to_string()
}

fn default_timeout() -> Duration {
    pager::DEFAULT_TIMEOUT
}

fn default_max_empty_pages() -> usize {
    feed::DEFAULT_MAX_EMPTY_PAGES
}

fn default_user_agent() -> String {
    format!("videoreel/{}", crate::VERSION)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_player_command")]
    pub command: String,
    #[serde(default = "default_true")]
    pub muted: bool,
    #[serde(default = "default_true")]
    pub auto_next: bool,
    #[serde(default)]
    pub fullscreen: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: default_player_command(),
            muted: true,
            auto_next: true,
            fullscreen: false,
        }
    }
}

fn default_player_command() -> String {
    "mpv".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            cfg = read_config_file(path)?;
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            cfg = read_config_file(&default_path)?;
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "feed.base_url" => cfg.feed.base_url = value,
        "feed.subreddit" => cfg.feed.subreddit = value,
        "feed.user_agent" => cfg.feed.user_agent = value,
        "feed.sort" => {
            if let Ok(parsed) = value.parse::<SortOption>() {
                cfg.feed.sort = parsed;
            }
        }
        "feed.time_window" => {
            if let Ok(parsed) = value.parse::<TimeWindow>() {
                cfg.feed.time_window = parsed;
            }
        }
        "feed.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.timeout = duration;
            }
        }
        "feed.max_empty_pages" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.max_empty_pages = parsed;
            }
        }
        "player.command" => cfg.player.command = value,
        "player.muted" => cfg.player.muted = parse_flag(&value),
        "player.auto_next" => cfg.player.auto_next = parse_flag(&value),
        "player.fullscreen" => cfg.player.fullscreen = parse_flag(&value),
        _ => {}
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("videoreel").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated() -> LoadOptions {
        LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/videoreel.yaml")),
            env_prefix: Some("VIDEOREEL_TEST_NONE".into()),
        }
    }

    #[test]
    fn defaults_match_the_classic_feed() {
        let cfg = load(isolated()).unwrap();
        assert_eq!(cfg.feed.subreddit, "oddlysatisfying");
        assert_eq!(cfg.feed.sort, SortOption::Hot);
        assert_eq!(cfg.feed.time_window, TimeWindow::Unset);
        assert_eq!(cfg.feed.timeout, Duration::from_secs(5));
        assert!(cfg.player.muted);
        assert!(cfg.player.auto_next);
    }

    #[test]
    fn reads_yaml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "feed:\n  subreddit: r/gifs\n  sort: top\n  time_window: week\n  timeout: 2s\nplayer:\n  muted: false\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("VIDEOREEL_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.feed.timeout, Duration::from_secs(2));
        assert!(!cfg.player.muted);
        assert!(cfg.player.auto_next);
        assert_eq!(
            cfg.feed.filter_params(),
            FilterParams::new("gifs", SortOption::Top, TimeWindow::Week)
        );
    }

    #[test]
    fn rejects_malformed_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "feed: [unterminated").unwrap();
        let err = load(LoadOptions {
            config_file: Some(path),
            env_prefix: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn env_overrides() {
        env::set_var("VIDEOREEL_ENVTEST_FEED__SUBREDDIT", "aww");
        env::set_var("VIDEOREEL_ENVTEST_FEED__SORT", "new");
        env::set_var("VIDEOREEL_ENVTEST_PLAYER__AUTO_NEXT", "off");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/videoreel.yaml")),
            env_prefix: Some("VIDEOREEL_ENVTEST".into()),
        })
        .unwrap();
        assert_eq!(cfg.feed.subreddit, "aww");
        assert_eq!(cfg.feed.sort, SortOption::New);
        assert!(!cfg.player.auto_next);
        env::remove_var("VIDEOREEL_ENVTEST_FEED__SUBREDDIT");
        env::remove_var("VIDEOREEL_ENVTEST_FEED__SORT");
        env::remove_var("VIDEOREEL_ENVTEST_PLAYER__AUTO_NEXT");
    }
}
