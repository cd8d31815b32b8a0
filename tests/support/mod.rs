//! In-memory connector and transport shared by the integration tests

use async_trait::async_trait;
use comic_downloader::connector::{Connector, ConnectorError, ConnectorResult};
use comic_downloader::downloader::DownloadConfig;
use comic_downloader::fetcher::retry_formatter::RetryErrorType;
use comic_downloader::fetcher::{FetchedPage, PageRequest, Session, Transport};
use comic_downloader::registry::ConnectorRegistry;
use comic_downloader::{Chapter, Series};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const SITE: &str = "mock.test";
pub const SERIES_URL: &str = "https://mock.test/series/demo";
pub const SERIES_TITLE: &str = "Demo Series";

/// Smallest payload that sniffs as a JPEG
pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

pub fn chapter_url(chapter: usize) -> String {
    format!("{SERIES_URL}/chapter-{chapter}")
}

pub fn page_url(chapter: usize, page: usize) -> String {
    format!("https://img.{SITE}/c{chapter}/p{page}.jpg")
}

/// How the transport answers one URL
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Fail with a transient error this many times, then succeed
    TransientThenOk(u32),
    /// Always fail with this error
    Fail(ConnectorError),
    /// Answer with this HTTP status this many times, then succeed
    StatusThenOk(u16, u32),
    /// Answer with an HTML page
    Html,
}

/// Scripted page transport
#[derive(Default)]
pub struct MockTransport {
    behaviors: Mutex<HashMap<String, Behavior>>,
    delays: Mutex<HashMap<String, Duration>>,
    default_delay: Mutex<Duration>,
    calls: Mutex<HashMap<String, u32>>,
    issued: Mutex<Vec<(String, Instant)>>,
    user_agents: Mutex<Vec<Option<String>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_behavior(&self, url: impl Into<String>, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(url.into(), behavior);
    }

    pub fn set_delay(&self, url: impl Into<String>, delay: Duration) {
        self.delays.lock().unwrap().insert(url.into(), delay);
    }

    pub fn set_default_delay(&self, delay: Duration) {
        *self.default_delay.lock().unwrap() = delay;
    }

    /// Number of fetches of `url`
    pub fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// Total number of fetches
    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    /// `User-Agent` header of every fetch, in issue order
    pub fn user_agents(&self) -> Vec<Option<String>> {
        self.user_agents.lock().unwrap().clone()
    }

    /// Fetch start times in issue order
    pub fn issue_times(&self) -> Vec<Instant> {
        self.issued.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: &PageRequest) -> ConnectorResult<FetchedPage> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(request.url.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.issued
            .lock()
            .unwrap()
            .push((request.url.clone(), Instant::now()));
        self.user_agents
            .lock()
            .unwrap()
            .push(request.header("User-Agent").map(str::to_string));

        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(&request.url)
            .copied()
            .unwrap_or(*self.default_delay.lock().unwrap());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let behavior = self.behaviors.lock().unwrap().get(&request.url).cloned();
        match behavior {
            Some(Behavior::TransientThenOk(n)) if attempt <= n => Err(
                ConnectorError::TransientNetwork(format!("connection reset by {}", request.url)),
            ),
            Some(Behavior::StatusThenOk(code, n)) if attempt <= n => {
                let status = StatusCode::from_u16(code).unwrap();
                Err(RetryErrorType::from_status(status)
                    .into_connector_error(&request.url, format!("HTTP {code}")))
            }
            Some(Behavior::Fail(error)) => Err(error),
            Some(Behavior::Html) => Ok(FetchedPage::new(
                b"<!DOCTYPE html><html>captcha</html>".to_vec(),
                Some("text/html".into()),
            )),
            _ => Ok(FetchedPage::new(JPEG.to_vec(), Some("image/jpeg".into()))),
        }
    }
}

/// Connector serving a generated series from memory
pub struct MockConnector {
    pages_per_chapter: Vec<usize>,
    eager: bool,
    literal: bool,
    list_failures: Mutex<HashMap<usize, ConnectorError>>,
    describe_calls: AtomicU32,
    list_calls: AtomicU32,
}

impl MockConnector {
    /// Series with `pages_per_chapter[i]` pages in chapter `i + 1`, listed lazily
    pub fn new(pages_per_chapter: Vec<usize>) -> Self {
        Self {
            pages_per_chapter,
            eager: false,
            literal: false,
            list_failures: Mutex::new(HashMap::new()),
            describe_calls: AtomicU32::new(0),
            list_calls: AtomicU32::new(0),
        }
    }

    /// Attach page lists to the chapters at describe time
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// Build the series as a struct literal carrying the site's own chapter
    /// numbers instead of going through `Series::new`
    pub fn literal(mut self) -> Self {
        self.literal = true;
        self
    }

    pub fn fail_listing(self, chapter: usize, error: ConnectorError) -> Self {
        self.list_failures.lock().unwrap().insert(chapter, error);
        self
    }

    pub fn describe_calls(&self) -> u32 {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn pages(&self, chapter: usize) -> Vec<String> {
        let count = self.pages_per_chapter[chapter - 1];
        (1..=count).map(|page| page_url(chapter, page)).collect()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &str {
        "Mock"
    }

    fn domains(&self) -> Vec<String> {
        vec![SITE.to_string()]
    }

    async fn describe(&self, _url: &str, _session: &Session) -> ConnectorResult<Series> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        let chapters: Vec<Chapter> = (1..=self.pages_per_chapter.len())
            .map(|i| {
                let mut chapter =
                    Chapter::new(format!("c{i}"), format!("Chapter {i}"), chapter_url(i));
                if self.literal {
                    chapter.index = 100 + i * 7;
                }
                if self.eager {
                    chapter.with_pages(self.pages(i))
                } else {
                    chapter
                }
            })
            .collect();
        if self.literal {
            return Ok(Series {
                id: "demo".to_string(),
                title: SERIES_TITLE.to_string(),
                url: SERIES_URL.to_string(),
                chapters,
            });
        }
        Ok(Series::new("demo", SERIES_TITLE, SERIES_URL, chapters))
    }

    async fn list_pages(&self, chapter: &Chapter, _session: &Session) -> ConnectorResult<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.list_failures.lock().unwrap().get(&chapter.index) {
            return Err(error.clone());
        }
        Ok(self.pages(chapter.index))
    }
}

pub fn registry(connector: Arc<MockConnector>) -> Arc<ConnectorRegistry> {
    Arc::new(
        ConnectorRegistry::builder()
            .register(connector)
            .expect("mock connector registers")
            .build(),
    )
}

/// Fast configuration writing under `root`
pub fn config(root: &Path) -> DownloadConfig {
    DownloadConfig::default()
        .with_output_root(root)
        .with_request_delay(Duration::ZERO)
        .with_backoff(Duration::from_millis(5), Duration::from_millis(20))
        .with_cancel_grace(Duration::from_secs(5))
}

/// Files under `dir`, sorted, relative to it
pub fn files_under(dir: &Path) -> Vec<String> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(base, &path, out);
            } else if let Ok(relative) = path.strip_prefix(base) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}

/// Page files only, without the manifest and its lock
pub fn page_files(dir: &Path) -> Vec<String> {
    files_under(dir)
        .into_iter()
        .filter(|f| !f.rsplit('/').next().unwrap_or(f).starts_with('.'))
        .collect()
}
