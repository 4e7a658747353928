use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::pager::FetchError;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com/";
pub const DEFAULT_SUBREDDIT: &str = "oddlysatisfying";
pub const PERMALINK_ORIGIN: &str = "https://www.reddit.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOption {
    #[default]
    Hot,
    New,
    Top,
}

impl SortOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOption::Hot => "hot",
            SortOption::New => "new",
            SortOption::Top => "top",
        }
    }
}

impl FromStr for SortOption {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hot" | "recent" => Ok(SortOption::Hot),
            "new" => Ok(SortOption::New),
            "top" => Ok(SortOption::Top),
            other => bail!("unknown sort '{}', expected hot, new or top", other),
        }
    }
}

impl fmt::Display for SortOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(alias = "day")]
    Today,
    Week,
    Month,
    Year,
    All,
}

impl TimeWindow {
    pub fn as_param(&self) -> Option<&'static str> {
        match self {
            TimeWindow::Unset => None,
            TimeWindow::Today => Some("day"),
            TimeWindow::Week => Some("week"),
            TimeWindow::Month => Some("month"),
            TimeWindow::Year => Some("year"),
            TimeWindow::All => Some("all"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeWindow::Unset => "",
            TimeWindow::Today => "Today",
            TimeWindow::Week => "This Week",
            TimeWindow::Month => "This Month",
            TimeWindow::Year => "This Year",
            TimeWindow::All => "Of All Time",
        }
    }
}

impl FromStr for TimeWindow {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(TimeWindow::Unset),
            "today" | "day" => Ok(TimeWindow::Today),
            "week" => Ok(TimeWindow::Week),
            "month" => Ok(TimeWindow::Month),
            "year" => Ok(TimeWindow::Year),
            "all" => Ok(TimeWindow::All),
            other => bail!(
                "unknown time window '{}', expected today, week, month, year or all",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterParams {
    pub source: String,
    #[serde(default)]
    pub order: SortOption,
    #[serde(default)]
    pub time_window: TimeWindow,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            source: DEFAULT_SUBREDDIT.to_string(),
            order: SortOption::Hot,
            time_window: TimeWindow::Unset,
        }
    }
}

impl FilterParams {
    pub fn new(source: impl Into<String>, order: SortOption, time_window: TimeWindow) -> Self {
        Self {
            source: normalize_source(&source.into()),
            order,
            time_window,
        }
    }

    pub fn effective_time_window(&self) -> TimeWindow {
        if self.order == SortOption::Top {
            self.time_window
        } else {
            TimeWindow::Unset
        }
    }

    pub fn label(&self) -> String {
        match self.effective_time_window() {
            TimeWindow::Unset => format!("r/{} ({})", self.source, self.order),
            window => format!("r/{} ({}, {})", self.source, self.order, window.label()),
        }
    }
}

// Two params naming the same upstream listing are equal, so a window picked
// for hot or new does not reset the feed.
impl PartialEq for FilterParams {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.order == other.order
            && self.effective_time_window() == other.effective_time_window()
    }
}

impl Eq for FilterParams {}

pub fn normalize_source(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('/')
        .trim_start_matches("r/")
        .trim_matches('/')
        .to_string()
}

pub fn is_valid_source(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '+')
}

pub fn listing_url(base: &Url, params: &FilterParams, cursor: &str) -> Result<Url> {
    let source = normalize_source(&params.source);
    if source.is_empty() {
        bail!("reddit: subreddit name is required");
    }
    if !is_valid_source(&source) {
        bail!("reddit: invalid subreddit name '{}'", source);
    }
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("reddit: base url {} cannot hold a path", base))?
        .pop_if_empty()
        .push("r")
        .push(&source)
        .push(&format!("{}.json", params.order.as_str()));
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("after", cursor);
        if let Some(window) = params.effective_time_window().as_param() {
            pairs.append_pair("t", window);
        }
    }
    Ok(url)
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("reddit client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut base_url = Url::parse(&base)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn subreddit_listing(
        &self,
        params: &FilterParams,
        cursor: &str,
        timeout: Duration,
    ) -> Result<Listing<Post>, FetchError> {
        let url = listing_url(&self.base_url, params, cursor)
            .map_err(|err| FetchError::Request(err.to_string()))?;
        debug!(%url, "requesting listing page");

        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .map_err(FetchError::from_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(FetchError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let envelope: ListingEnvelope<Value> = resp.json().map_err(FetchError::from_transport)?;
        Ok(envelope.data.into_posts())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default = "Vec::new")]
    pub children: Vec<Thing<T>>,
}

impl Listing<Value> {
    pub fn into_posts(self) -> Listing<Post> {
        let children = self
            .children
            .into_iter()
            .filter_map(|thing| match serde_json::from_value::<Post>(thing.data) {
                Ok(post) => Some(Thing {
                    kind: thing.kind,
                    data: post,
                }),
                Err(err) => {
                    warn!(error = %err, "dropping listing child that is not a post");
                    None
                }
            })
            .collect();
        Listing {
            after: self.after,
            before: self.before,
            children,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing<T> {
    #[serde(default)]
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ListingEnvelope<T> {
    #[serde(default)]
    pub kind: String,
    pub data: Listing<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Post {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub media: Option<PostMedia>,
    #[serde(default)]
    pub secure_media: Option<PostMedia>,
    #[serde(default)]
    pub preview: Option<Preview>,
}

impl Post {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn permalink_url(&self) -> Option<String> {
        let permalink = self.permalink.as_deref()?.trim();
        if permalink.is_empty() {
            return None;
        }
        Some(format!("{}{}", PERMALINK_ORIGIN, permalink))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PostMedia {
    #[serde(default)]
    pub reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Preview {
    #[serde(default)]
    pub reddit_video_preview: Option<RedditVideo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RedditVideo {
    #[serde(default)]
    pub fallback_url: Option<String>,
}
