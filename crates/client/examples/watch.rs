use std::sync::Arc;

use tabsync_client::HttpFragmentSource;
use tabsync_core::{Document, Element, FragmentSource};
use tabsync_poller::{PollConfig, TablePoller};
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,tabsync_client=debug,tabsync_poller=debug")
            }),
        )
        .init();

    // The host page: a status table seeded with its header row only.
    let page = Arc::new(Mutex::new(Document::new(
        Element::new("body").with_child(
            Element::new("table")
                .with_attr("id", "SentStudiesTable")
                .with_child(
                    Element::new("tr")
                        .with_child(Element::new("th").with_text("Study"))
                        .with_child(Element::new("th").with_text("Status")),
                ),
        ),
    )));

    let source: Arc<dyn FragmentSource> = Arc::new(HttpFragmentSource::new(
        "http://localhost:8080/sender",
        "SentStudiesTable",
    ));

    let config = PollConfig::default().with_interval(4000);
    let Some(mut poller) =
        TablePoller::attach(Arc::clone(&page), source, "SentStudiesTable", config).await
    else {
        eprintln!("page has no SentStudiesTable, nothing to poll");
        return;
    };

    poller.start();

    for _ in 0..10 {
        sleep(Duration::from_secs(5)).await;
        let page = page.lock().await;
        let table = page.element_by_id("SentStudiesTable").unwrap();
        println!(
            "polls={} stale={} rows={}",
            poller.polls(),
            poller.is_stale(),
            table.rows().len().saturating_sub(1)
        );
        println!("{}", table);
    }

    poller.stop();
}
