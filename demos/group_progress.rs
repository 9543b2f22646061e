use jobq::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// A page to fetch; `flaky` pages time out once before succeeding.
#[derive(Debug, Clone)]
struct Page {
    url: String,
    flaky: bool,
}

struct Fetcher;

#[async_trait]
impl Processor<Page> for Fetcher {
    type Output = usize;

    async fn process(&self, page: &mut Page) -> JobqResult<usize> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if page.url.ends_with("/404") {
            return Err(JobqError::task_failed(format!("{} not found", page.url)));
        }
        if page.flaky {
            page.flaky = false;
            return Err(JobqError::retry_with(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "request timed out",
            )));
        }
        Ok(page.url.len())
    }
}

#[tokio::main]
async fn main() -> JobqResult<()> {
    let config = JobqConfig::development();
    config.logging.init()?;

    let queue = Arc::new(JobQueue::with_config(
        JobqConfig {
            workers: WorkerConfig::with_workers(4),
            queue: QueueConfig::default().with_capacity(16).with_max_retries(3),
            ..config
        },
        Fetcher,
    )?);
    queue.start().await?;

    let consumer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            let mut failures = 0;
            while let Some(outcome) = queue.next().await {
                if let Err(e) = outcome {
                    println!("🔨 failed: {}", e);
                    failures += 1;
                }
            }
            failures
        })
    };

    let docs = queue.group();
    for i in 0..8 {
        docs.add(Page {
            url: format!("https://example.com/docs/{}", i),
            flaky: i % 3 == 0,
        })
        .await?;
    }
    for i in 0..12 {
        let url = if i == 5 {
            "https://example.com/404".to_string()
        } else {
            format!("https://example.com/blog/{}", i)
        };
        queue.add(Page { url, flaky: false }).await?;
    }

    let reporter = {
        let queue = Arc::clone(&queue);
        let docs = docs.clone();
        tokio::spawn(async move {
            while queue.progress() < 1.0 {
                println!(
                    "🔨 queue {:>5.1}% | docs {:>5.1}% | {:.1} tasks/s",
                    queue.progress() * 100.0,
                    docs.progress() * 100.0,
                    queue.speed()
                );
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
    };

    docs.wait().await;
    docs.close().await;
    let mut bytes = 0;
    while let Some(outcome) = docs.next().await {
        bytes += outcome?;
    }
    println!("🔨 docs done: {} url bytes", bytes);

    queue.wait_for_completion().await;
    let _ = reporter.await;
    println!("🔨 stats: {:?}", queue.stats());

    queue.stop().await?;
    let failures = consumer.await.unwrap_or_default();
    println!("🔨 finished with {} failures", failures);
    Ok(())
}
