use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::extract::{self, MediaRef};
use crate::pager::{self, FetchError, FetchHandle, PageRequest, PageResponse, PageSource};
use crate::playlist::{Direction, Playlist};
use crate::reddit::FilterParams;

pub const DEFAULT_MAX_EMPTY_PAGES: usize = 5;

#[derive(Debug, Clone)]
pub struct Options {
    pub timeout: Duration,
    pub max_empty_pages: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: pager::DEFAULT_TIMEOUT,
            max_empty_pages: DEFAULT_MAX_EMPTY_PAGES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Fetching,
    Resetting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub pages: usize,
    pub unplayable: usize,
    pub violations: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedInfo {
    Loading,
    Playing {
        number: usize,
        total: usize,
        title: String,
        permalink: Option<String>,
    },
}

impl fmt::Display for FeedInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedInfo::Loading => f.write_str("Fetching the next set of videos..."),
            FeedInfo::Playing {
                number,
                total,
                title,
                permalink,
            } => {
                write!(f, "Video {}/{}: {}", number, total, title)?;
                if let Some(link) = permalink {
                    write!(f, " <{}>", link)?;
                }
                Ok(())
            }
        }
    }
}

pub struct FeedController {
    source: Arc<dyn PageSource>,
    options: Options,
    params: FilterParams,
    playlist: Playlist,
    state: FeedState,
    in_flight: Option<FetchHandle>,
    next_generation: u64,
    response_tx: Sender<PageResponse>,
    response_rx: Receiver<PageResponse>,
    empty_pages: usize,
    exhausted: bool,
    last_error: Option<FetchError>,
    stats: FeedStats,
}

impl FeedController {
    pub fn new(source: Arc<dyn PageSource>, params: FilterParams, options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            source,
            options,
            params,
            playlist: Playlist::new(),
            state: FeedState::Idle,
            in_flight: None,
            next_generation: 1,
            response_tx,
            response_rx,
            empty_pages: 0,
            exhausted: false,
            last_error: None,
            stats: FeedStats::default(),
        }
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn current(&self) -> Option<&MediaRef> {
        self.playlist.current()
    }

    pub fn position(&self) -> usize {
        self.playlist.position()
    }

    pub fn len(&self) -> usize {
        self.playlist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlist.is_empty()
    }

    pub fn can_go_back(&self) -> bool {
        self.playlist.position() > 0
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    pub fn info(&self) -> FeedInfo {
        match self.playlist.current() {
            Some(media) => FeedInfo::Playing {
                number: self.playlist.position() + 1,
                total: self.playlist.len(),
                title: media.post.title().to_string(),
                permalink: media.post.permalink_url(),
            },
            None => FeedInfo::Loading,
        }
    }

    pub fn advance(&mut self, direction: Direction) {
        self.playlist.advance(direction);
        self.empty_pages = 0;
        self.ensure_lookahead();
    }

    pub fn set_filter_params(&mut self, params: FilterParams) {
        if params == self.params {
            return;
        }
        self.state = FeedState::Resetting;
        info!(from = %self.params.label(), to = %params.label(), "filter changed, resetting feed");
        if let Some(pending) = self.in_flight.take() {
            pending.cancel();
            debug!(generation = pending.generation(), "cancelled outstanding fetch");
        }
        self.playlist.reset();
        self.params = params;
        self.empty_pages = 0;
        self.exhausted = false;
        self.last_error = None;
        self.state = FeedState::Idle;
        self.ensure_lookahead();
    }

    pub fn ensure_lookahead(&mut self) -> bool {
        if !self.playlist.needs_more() || self.in_flight.is_some() || self.exhausted {
            return false;
        }
        if self.empty_pages >= self.options.max_empty_pages.max(1) {
            return false;
        }
        self.start_fetch();
        true
    }

    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(response) = self.response_rx.try_recv() {
            changed |= self.handle_response(response);
        }
        changed
    }

    pub fn wait(&mut self, timeout: Duration) -> bool {
        if self.in_flight.is_none() {
            return self.poll();
        }
        match self.response_rx.recv_timeout(timeout) {
            Ok(response) => {
                let applied = self.handle_response(response);
                self.poll() || applied
            }
            Err(_) => false,
        }
    }

    fn start_fetch(&mut self) {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);

        let request = PageRequest {
            params: self.params.clone(),
            cursor: self.playlist.paging_cursor().to_string(),
            timeout: self.options.timeout,
        };
        debug!(
            generation,
            feed = %self.params.label(),
            cursor = %request.cursor,
            "fetching next page"
        );
        let handle = pager::spawn_fetch(
            self.source.clone(),
            request,
            generation,
            self.response_tx.clone(),
        );
        self.in_flight = Some(handle);
        self.state = FeedState::Fetching;
    }

    fn handle_response(&mut self, response: PageResponse) -> bool {
        let Some(pending) = &self.in_flight else {
            debug!(generation = response.generation, "ignoring settlement with nothing in flight");
            return false;
        };
        // A cancelled fetch can still deliver after a reset; only the
        // generation we are waiting on may touch the playlist.
        if pending.is_cancelled() || pending.generation() != response.generation {
            debug!(
                generation = response.generation,
                expected = pending.generation(),
                "ignoring stale settlement"
            );
            return false;
        }
        self.in_flight = None;
        self.state = FeedState::Idle;

        match response.result {
            Ok(page) => {
                let extracted = extract::extract_all(&page.posts);
                let added = extracted.items.len();
                self.stats.pages += 1;
                self.stats.unplayable += extracted.unplayable;
                self.stats.violations += extracted.violations;
                self.last_error = None;

                let cursor = match page.next_cursor {
                    Some(cursor) => cursor,
                    None => {
                        info!(feed = %self.params.label(), "reached the end of the listing");
                        self.exhausted = true;
                        self.playlist.paging_cursor().to_string()
                    }
                };
                debug!(
                    posts = page.posts.len(),
                    added,
                    cursor = %cursor,
                    "page loaded"
                );
                self.playlist.append(extracted.items, cursor);

                if added == 0 {
                    self.empty_pages += 1;
                    if self.empty_pages >= self.options.max_empty_pages.max(1) {
                        warn!(
                            pages = self.empty_pages,
                            feed = %self.params.label(),
                            "no playable posts in consecutive pages, waiting for navigation"
                        );
                    }
                } else {
                    self.empty_pages = 0;
                }
                self.ensure_lookahead();
            }
            Err(err) => {
                warn!(error = %err, feed = %self.params.label(), "failed to load page");
                self.stats.failures += 1;
                self.last_error = Some(err);
            }
        }
        true
    }
}
