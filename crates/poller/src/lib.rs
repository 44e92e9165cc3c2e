use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tabsync_core::{Document, FragmentSource, PollError, replace_rows};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

pub mod config;

pub use config::PollConfig;

/// Everything one poll cycle needs, cheaply cloneable into spawned fetches.
#[derive(Clone)]
struct PollTask {
    page: Arc<Mutex<Document>>,
    source: Arc<dyn FragmentSource>,
    table_id: String,
    polls: Arc<AtomicU64>,
    last_merge: Arc<StdMutex<Option<Instant>>>,
}

impl PollTask {
    /// One fetch-and-merge cycle. The counter advances whether the cycle
    /// merged or was skipped; it is diagnostic only.
    async fn poll_once(&self) -> Result<usize, PollError> {
        let outcome = self.cycle().await;
        self.polls.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    async fn cycle(&self) -> Result<usize, PollError> {
        let fragment = self.source.fetch_fragment().await?;

        let mut page = self.page.lock().await;
        let table = page
            .element_by_id_mut(&self.table_id)
            .ok_or_else(|| PollError::TargetMissing(self.table_id.clone()))?;
        let appended = replace_rows(table, &fragment)?;
        drop(page);

        if let Ok(mut last) = self.last_merge.lock() {
            *last = Some(Instant::now());
        }
        debug!(table_id = %self.table_id, rows = appended, "table rows replaced");
        Ok(appended)
    }
}

/// Keeps one page table in sync with a fragment source on a fixed interval.
///
/// The timer fires on wall-clock schedule independent of request completion:
/// each tick pushes a fetch into an in-flight set and merges land in the
/// order responses complete, so a slow response never delays the next tick.
/// Failed cycles are skipped without retry; sustained failure shows up only
/// through [`TablePoller::is_stale`] and the log.
pub struct TablePoller {
    task: PollTask,
    config: PollConfig,
    handle: Option<JoinHandle<()>>,
}

impl TablePoller {
    /// Binds a poller to the table with `table_id` in `page`. Returns `None`
    /// when the page holds no such element, in which case polling never
    /// starts (the host page simply has no table to update).
    pub async fn attach(
        page: Arc<Mutex<Document>>,
        source: Arc<dyn FragmentSource>,
        table_id: impl Into<String>,
        config: PollConfig,
    ) -> Option<Self> {
        let table_id = table_id.into();
        if page.lock().await.element_by_id(&table_id).is_none() {
            debug!(%table_id, "target table not in page, poller not created");
            return None;
        }
        Some(Self {
            task: PollTask {
                page,
                source,
                table_id,
                polls: Arc::new(AtomicU64::new(0)),
                last_merge: Arc::new(StdMutex::new(None)),
            },
            config,
            handle: None,
        })
    }

    /// Starts polling. Any previously started loop is torn down first, so
    /// calling this twice leaves exactly one active timer. The first tick
    /// fires one full interval after start.
    pub fn start(&mut self) {
        self.stop();
        let task = self.task.clone();
        let interval = self.config.interval;
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut inflight = FuturesUnordered::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let task = task.clone();
                        inflight.push(async move { task.poll_once().await });
                    }
                    Some(outcome) = inflight.next() => {
                        if let Err(err) = outcome {
                            warn!(error = %err, "poll cycle skipped");
                        }
                    }
                }
            }
        }));
    }

    /// Stops future ticks. Idempotent; safe to call when nothing is running.
    /// In-flight fetches are dropped with the loop task; only a merge that
    /// has already taken the page lock completes (it contains no await).
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Completed cycles so far, successful or skipped. Diagnostic only.
    pub fn polls(&self) -> u64 {
        self.task.polls.load(Ordering::Relaxed)
    }

    /// True when no merge has landed within the configured staleness window,
    /// or ever. Failures stay non-fatal and unretried; this is the one
    /// signal that the table may be showing old data.
    pub fn is_stale(&self) -> bool {
        match self.task.last_merge.lock() {
            Ok(last) => last.is_none_or(|t| t.elapsed() > self.config.stale_after),
            Err(_) => true,
        }
    }

    /// Runs a single cycle outside the timer, e.g. for a manual refresh.
    pub async fn poll_once(&self) -> Result<usize, PollError> {
        self.task.poll_once().await
    }
}

impl Drop for TablePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use async_trait::async_trait;
    use tabsync_core::Element;

    struct MockSource {
        fetches: AtomicU64,
        fail: AtomicBool,
    }

    impl MockSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicU64::new(0),
                fail: AtomicBool::new(false),
            })
        }

        fn fetches(&self) -> u64 {
            self.fetches.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl FragmentSource for MockSource {
        async fn fetch_fragment(&self) -> Result<Element, PollError> {
            let n = self.fetches.fetch_add(1, Ordering::Relaxed) + 1;
            if self.fail.load(Ordering::Relaxed) {
                return Err(PollError::fetch("connection refused"));
            }
            Ok(Element::new("table")
                .with_child(Element::new("tr").with_child(Element::new("th").with_text("Study")))
                .with_child(
                    Element::new("tr")
                        .with_child(Element::new("td").with_text(format!("study-{n}"))),
                ))
        }
    }

    fn page_with_table(id: &str) -> Arc<Mutex<Document>> {
        Arc::new(Mutex::new(Document::new(
            Element::new("body").with_child(
                Element::new("table")
                    .with_attr("id", id)
                    .with_child(Element::new("tr").with_child(Element::new("th").with_text("Study"))),
            ),
        )))
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn tick(interval: Duration) {
        time::advance(interval).await;
        settle().await;
    }

    #[tokio::test]
    async fn attach_requires_the_target_table() {
        let page = page_with_table("SentStudiesTable");
        let poller = TablePoller::attach(
            Arc::clone(&page),
            MockSource::new(),
            "MissingTable",
            PollConfig::default(),
        )
        .await;
        assert!(poller.is_none());
    }

    #[tokio::test]
    async fn poll_once_merges_into_the_page() {
        let page = page_with_table("SentStudiesTable");
        let source = MockSource::new();
        let poller = TablePoller::attach(
            Arc::clone(&page),
            Arc::clone(&source) as Arc<dyn FragmentSource>,
            "SentStudiesTable",
            PollConfig::default(),
        )
        .await
        .unwrap();

        assert!(poller.is_stale());
        let appended = poller.poll_once().await.unwrap();

        assert_eq!(appended, 1);
        assert_eq!(poller.polls(), 1);
        assert!(!poller.is_stale());
        let page = page.lock().await;
        let table = page.element_by_id("SentStudiesTable").unwrap();
        let rows = table.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text(), "Study");
        assert_eq!(rows[1].text(), "study-1");
    }

    #[tokio::test(start_paused = true)]
    async fn timer_drives_cycles_on_the_interval() {
        let page = page_with_table("SentStudiesTable");
        let source = MockSource::new();
        let config = PollConfig::default();
        let interval = config.interval;
        let mut poller = TablePoller::attach(
            Arc::clone(&page),
            Arc::clone(&source) as Arc<dyn FragmentSource>,
            "SentStudiesTable",
            config,
        )
        .await
        .unwrap();

        poller.start();
        assert!(poller.is_polling());
        settle().await;
        assert_eq!(source.fetches(), 0);

        tick(interval).await;
        assert_eq!(source.fetches(), 1);
        tick(interval).await;
        assert_eq!(source.fetches(), 2);

        let page = page.lock().await;
        let rows = page.element_by_id("SentStudiesTable").unwrap().rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].text(), "study-2");
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_leaves_one_timer() {
        let page = page_with_table("SentStudiesTable");
        let source = MockSource::new();
        let config = PollConfig::default();
        let interval = config.interval;
        let mut poller = TablePoller::attach(
            Arc::clone(&page),
            Arc::clone(&source) as Arc<dyn FragmentSource>,
            "SentStudiesTable",
            config,
        )
        .await
        .unwrap();

        poller.start();
        settle().await;
        poller.start();
        settle().await;

        for _ in 0..3 {
            tick(interval).await;
        }
        assert_eq!(source.fetches(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_updates_and_is_idempotent() {
        let page = page_with_table("SentStudiesTable");
        let source = MockSource::new();
        let config = PollConfig::default();
        let interval = config.interval;
        let mut poller = TablePoller::attach(
            Arc::clone(&page),
            Arc::clone(&source) as Arc<dyn FragmentSource>,
            "SentStudiesTable",
            config,
        )
        .await
        .unwrap();

        poller.stop(); // nothing running yet
        poller.start();
        settle().await;
        tick(interval).await;
        assert_eq!(source.fetches(), 1);

        poller.stop();
        poller.stop();
        assert!(!poller.is_polling());

        let frozen = page.lock().await.clone();
        for _ in 0..5 {
            tick(interval).await;
        }
        assert_eq!(source.fetches(), 1);
        assert_eq!(*page.lock().await, frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycles_are_skipped_and_reported_as_stale() {
        let page = page_with_table("SentStudiesTable");
        let source = MockSource::new();
        source.fail.store(true, Ordering::Relaxed);
        let config = PollConfig::default();
        let interval = config.interval;
        let mut poller = TablePoller::attach(
            Arc::clone(&page),
            Arc::clone(&source) as Arc<dyn FragmentSource>,
            "SentStudiesTable",
            config,
        )
        .await
        .unwrap();

        let frozen = page.lock().await.clone();
        poller.start();
        settle().await;
        tick(interval).await;
        tick(interval).await;

        assert_eq!(poller.polls(), 2);
        assert!(poller.is_stale());
        assert_eq!(*page.lock().await, frozen);

        // Recovery on the next good response, no backoff in between.
        source.fail.store(false, Ordering::Relaxed);
        tick(interval).await;
        assert!(!poller.is_stale());
        let page = page.lock().await;
        assert_eq!(page.element_by_id("SentStudiesTable").unwrap().rows().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn table_removed_mid_flight_skips_the_cycle() {
        let page = page_with_table("SentStudiesTable");
        let source = MockSource::new();
        let poller = TablePoller::attach(
            Arc::clone(&page),
            Arc::clone(&source) as Arc<dyn FragmentSource>,
            "SentStudiesTable",
            PollConfig::default(),
        )
        .await
        .unwrap();

        page.lock().await.root.children.clear();
        let err = poller.poll_once().await.unwrap_err();
        assert_eq!(err, PollError::TargetMissing("SentStudiesTable".to_string()));
        assert_eq!(poller.polls(), 1);
    }
}
