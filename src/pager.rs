use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::debug;

use crate::reddit::{self, FilterParams, Post};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream returned status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("could not decode listing: {0}")]
    Decode(String),
    #[error("could not build request: {0}")]
    Request(String),
}

impl FetchError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub params: FilterParams,
    pub cursor: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub posts: Vec<Post>,
    pub next_cursor: Option<String>,
}

pub trait PageSource: Send + Sync {
    fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError>;
}

pub struct RedditPageSource {
    client: Arc<reddit::Client>,
}

impl RedditPageSource {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl PageSource for RedditPageSource {
    fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
        let listing =
            self.client
                .subreddit_listing(&request.params, &request.cursor, request.timeout)?;
        Ok(Page {
            posts: listing.children.into_iter().map(|thing| thing.data).collect(),
            next_cursor: listing.after,
        })
    }
}

#[derive(Debug)]
pub struct PageResponse {
    pub generation: u64,
    pub result: Result<Page, FetchError>,
}

// Cancelling only asks the worker to drop its result. Receivers still have
// to check the generation.
#[derive(Debug)]
pub struct FetchHandle {
    generation: u64,
    cancel_flag: Arc<AtomicBool>,
}

impl FetchHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }
}

pub fn spawn_fetch(
    source: Arc<dyn PageSource>,
    request: PageRequest,
    generation: u64,
    tx: Sender<PageResponse>,
) -> FetchHandle {
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let handle = FetchHandle {
        generation,
        cancel_flag: cancel_flag.clone(),
    };

    thread::spawn(move || {
        if cancel_flag.load(Ordering::SeqCst) {
            return;
        }
        let result = source.fetch_page(&request);
        if cancel_flag.load(Ordering::SeqCst) {
            debug!(generation, "dropping result of cancelled fetch");
            return;
        }
        let _ = tx.send(PageResponse {
            generation,
            result,
        });
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};

    struct Gated {
        gate: crossbeam_channel::Receiver<()>,
    }

    impl PageSource for Gated {
        fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
            let _ = self.gate.recv();
            Ok(Page {
                posts: vec![Post {
                    id: request.cursor.clone(),
                    ..Post::default()
                }],
                next_cursor: Some("t3_next".into()),
            })
        }
    }

    fn request(cursor: &str) -> PageRequest {
        PageRequest {
            params: FilterParams::default(),
            cursor: cursor.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[test]
    fn delivers_page_tagged_with_generation() {
        let (gate_tx, gate_rx) = bounded(1);
        let (tx, rx) = unbounded();
        let handle = spawn_fetch(Arc::new(Gated { gate: gate_rx }), request("t3_a"), 7, tx);
        assert_eq!(handle.generation(), 7);
        gate_tx.send(()).unwrap();

        let response = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(response.generation, 7);
        let page = response.result.unwrap();
        assert_eq!(page.posts[0].id, "t3_a");
        assert_eq!(page.next_cursor.as_deref(), Some("t3_next"));
    }

    #[test]
    fn cancelled_fetch_never_settles() {
        let (gate_tx, gate_rx) = bounded(1);
        let (tx, rx) = unbounded();
        let handle = spawn_fetch(Arc::new(Gated { gate: gate_rx }), request(""), 1, tx);
        handle.cancel();
        assert!(handle.is_cancelled());
        let _ = gate_tx.send(());

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }
}
