use refdex::datasets::{FeedFetcher, FeedStream};
use refdex::FetchError;
use std::collections::HashMap;
use std::io::{self, BufReader, Cursor, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

// ============================================================================
// Mock FeedFetcher
// ============================================================================

enum Feed {
    Body(String),
    /// Serves the first `after` bytes, then fails the read
    FailMidStream { body: String, after: usize },
}

/// Serves in-memory feed bodies keyed by location
pub struct MockFeedFetcher {
    feeds: Mutex<HashMap<String, Feed>>,
    gates: Mutex<HashMap<String, (Sender<()>, Receiver<()>)>>,
    call_count: AtomicU64,
}

/// Test side of a gated feed
pub struct FeedGate {
    pub started: Receiver<()>,
    pub release: Sender<()>,
}

impl MockFeedFetcher {
    pub fn new() -> Self {
        Self {
            feeds: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            call_count: AtomicU64::new(0),
        }
    }

    pub fn with_feed(self, location: &str, body: &str) -> Self {
        self.set_feed(location, body);
        self
    }

    pub fn set_feed(&self, location: &str, body: &str) {
        self.feeds
            .lock()
            .unwrap()
            .insert(location.to_string(), Feed::Body(body.to_string()));
    }

    pub fn fail_mid_stream(&self, location: &str, body: &str, after: usize) {
        self.feeds.lock().unwrap().insert(
            location.to_string(),
            Feed::FailMidStream {
                body: body.to_string(),
                after,
            },
        );
    }

    pub fn remove_feed(&self, location: &str) {
        self.feeds.lock().unwrap().remove(location);
    }

    /// The next fetch of `location` blocks on its first read until released
    pub fn gate(&self, location: &str) -> FeedGate {
        let (started_tx, started_rx) = channel();
        let (release_tx, release_rx) = channel();
        self.gates
            .lock()
            .unwrap()
            .insert(location.to_string(), (started_tx, release_rx));
        FeedGate {
            started: started_rx,
            release: release_tx,
        }
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl FeedFetcher for MockFeedFetcher {
    fn fetch(&self, location: &str) -> Result<FeedStream, FetchError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        let reader: Box<dyn Read> = match self.feeds.lock().unwrap().get(location) {
            Some(Feed::Body(body)) => Box::new(Cursor::new(body.clone().into_bytes())),
            Some(Feed::FailMidStream { body, after }) => Box::new(FailingReader {
                inner: Cursor::new(body.clone().into_bytes()),
                remaining: *after,
            }),
            None => {
                return Err(FetchError::Status {
                    url: location.to_string(),
                    status: 404,
                })
            }
        };

        match self.gates.lock().unwrap().remove(location) {
            Some((started, release)) => Ok(Box::new(BufReader::new(GatedReader {
                inner: reader,
                gate: Some((started, release)),
            }))),
            None => Ok(Box::new(BufReader::new(reader))),
        }
    }
}

struct FailingReader {
    inner: Cursor<Vec<u8>>,
    remaining: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ));
        }
        let limit = buf.len().min(self.remaining);
        let read = self.inner.read(&mut buf[..limit])?;
        self.remaining -= read;
        Ok(read)
    }
}

struct GatedReader {
    inner: Box<dyn Read>,
    gate: Option<(Sender<()>, Receiver<()>)>,
}

impl Read for GatedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some((started, release)) = self.gate.take() {
            let _ = started.send(());
            let _ = release.recv();
        }
        self.inner.read(buf)
    }
}
