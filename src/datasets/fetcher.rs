//! Feed retrieval
//!
//! A single attempt per refresh cycle: no retries, no backoff. The returned
//! stream is read line by line by the parsers, and a read failure partway
//! through fails the whole cycle.
//!
//! Remote feeds (`http://`, `https://`) go through `ureq` and are downloaded
//! into an anonymous temporary file before parsing starts. The fetch timeout
//! bounds the download only, never the time spent writing parsed rows to
//! storage. Anything else is treated as a local path and opened with `oneio`,
//! which also transparently decompresses `.gz` and `.bz2` files.

use crate::error::FetchError;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default per-fetch timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Lazily consumed feed body
pub type FeedStream = Box<dyn BufRead>;

/// Retrieves a raw text feed
pub trait FeedFetcher: Send + Sync {
    fn fetch(&self, location: &str) -> Result<FeedStream, FetchError>;
}

/// Fetcher for HTTP(S) URLs and local files
#[derive(Clone)]
pub struct HttpFeedFetcher {
    agent: ureq::Agent,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }

    fn fetch_remote(&self, url: &str) -> Result<FeedStream, FetchError> {
        let response = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::StatusCode(status) => FetchError::Status {
                url: url.to_string(),
                status,
            },
            other => FetchError::Transport {
                url: url.to_string(),
                message: other.to_string(),
            },
        })?;

        let started = Instant::now();
        let download = |source| FetchError::Download {
            url: url.to_string(),
            source,
        };
        let mut spool = tempfile::tempfile().map_err(download)?;
        let mut body = response.into_body().into_reader();
        let size = std::io::copy(&mut body, &mut spool).map_err(download)?;
        spool.seek(SeekFrom::Start(0)).map_err(download)?;

        debug!(
            "Downloaded {} bytes from {} in {:?}",
            size,
            url,
            started.elapsed()
        );
        Ok(Box::new(BufReader::new(spool)))
    }

    fn fetch_local(&self, path: &str) -> Result<FeedStream, FetchError> {
        let reader = oneio::get_reader(path).map_err(|e| FetchError::Transport {
            url: path.to_string(),
            message: e.to_string(),
        })?;
        Ok(Box::new(BufReader::new(reader)))
    }
}

impl Default for HttpFeedFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl FeedFetcher for HttpFeedFetcher {
    fn fetch(&self, location: &str) -> Result<FeedStream, FetchError> {
        debug!("Fetching feed {}", location);
        if is_remote(location) {
            self.fetch_remote(location)
        } else {
            self.fetch_local(location)
        }
    }
}

fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Read the next line from a feed, mapping I/O failures to `FetchError`
///
/// Returns `Ok(None)` at end of stream. Bytes that are not valid UTF-8 are
/// replaced rather than failing the read, since registry feeds occasionally
/// carry Latin-1 company names.
pub(crate) fn next_line(
    reader: &mut dyn BufRead,
    buf: &mut Vec<u8>,
    line_no: usize,
) -> Result<Option<String>, FetchError> {
    buf.clear();
    let read = reader
        .read_until(b'\n', buf)
        .map_err(|source| FetchError::Read {
            line: line_no,
            source,
        })?;
    if read == 0 {
        return Ok(None);
    }
    let text = String::from_utf8_lossy(buf);
    Ok(Some(text.trim_end_matches(['\n', '\r']).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://thyme.apnic.net/current/data-raw-table"));
        assert!(is_remote("HTTP://example.com/feed"));
        assert!(!is_remote("/tmp/data-raw-table"));
        assert!(!is_remote("feeds/oui.txt.gz"));
    }

    #[test]
    fn test_fetch_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "1.1.1.0/24\t13335").unwrap();
        writeln!(file, "8.8.8.0/24\t15169").unwrap();

        let fetcher = HttpFeedFetcher::default();
        let stream = fetcher.fetch(path.to_str().unwrap()).unwrap();
        let lines: Vec<String> = stream.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["1.1.1.0/24\t13335", "8.8.8.0/24\t15169"]);
    }

    #[test]
    fn test_fetch_unreachable_host() {
        let fetcher = HttpFeedFetcher::new(Duration::from_secs(2));
        let result = fetcher.fetch("http://127.0.0.1:1/data-raw-table");
        assert!(matches!(result, Err(FetchError::Transport { .. })));
    }

    #[test]
    fn test_fetch_missing_file() {
        let fetcher = HttpFeedFetcher::default();
        let result = fetcher.fetch("/nonexistent/refdex/feed.txt");
        assert!(matches!(result, Err(FetchError::Transport { .. })));
    }

    #[test]
    fn test_next_line_strips_line_endings() {
        let data = b"first\r\nsecond\nthird";
        let mut reader: &[u8] = data;
        let mut buf = Vec::new();
        assert_eq!(
            next_line(&mut reader, &mut buf, 1).unwrap(),
            Some("first".to_string())
        );
        assert_eq!(
            next_line(&mut reader, &mut buf, 2).unwrap(),
            Some("second".to_string())
        );
        assert_eq!(
            next_line(&mut reader, &mut buf, 3).unwrap(),
            Some("third".to_string())
        );
        assert_eq!(next_line(&mut reader, &mut buf, 4).unwrap(), None);
    }
}
