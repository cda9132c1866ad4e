//! Worker pool and crawl scheduling
//!
//! A fixed pool of cooperative workers drains the priority queue: throttle,
//! pre-request middleware, fetch (bounded by the download semaphore),
//! post-response middleware, callback dispatch, then feeding produced
//! requests and items back into the crawl state.
//!
//! The crawl ends when the queue has been empty with no worker inside a
//! callback for a stable quiescence interval, or when the global deadline
//! fires. Deadline expiry is a soft cancel: workers are aborted at their
//! next suspension point and partial results stand.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::crawler::coordinator::CrawlContext;
use crate::crawler::middleware::{PostAction, PreAction};
use crate::crawler::request::Request;
use crate::crawler::response::Response;

/// The queue must stay empty with no in-flight work for this long before
/// the crawl is considered complete.
const QUIESCENCE_INTERVAL: Duration = Duration::from_millis(10);

/// Poll interval while workers are busy.
const SUPERVISOR_POLL: Duration = Duration::from_millis(5);

/// How long an idle worker parks before re-checking the queue; paired with
/// the queue notifier so wakeups are usually immediate.
const IDLE_PARK: Duration = Duration::from_millis(20);

/// Robots crawl-delay directives above this are treated as hostile.
const MAX_CRAWL_DELAY: Duration = Duration::from_secs(30);

/// Runs the worker pool until quiescence or the deadline.
pub(crate) async fn run_crawl(ctx: Arc<CrawlContext>, deadline: Instant) {
    let worker_count = ctx.config.concurrency.max(1);
    let workers: Vec<_> = (0..worker_count)
        .map(|id| {
            let ctx = ctx.clone();
            tokio::spawn(worker_loop(ctx, id, deadline))
        })
        .collect();

    let quiesce = async {
        loop {
            if ctx.queue.is_empty() && ctx.in_flight.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(QUIESCENCE_INTERVAL).await;
                if ctx.queue.is_empty() && ctx.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
            } else {
                tokio::time::sleep(SUPERVISOR_POLL).await;
            }
        }
    };

    let remaining = deadline.saturating_duration_since(Instant::now());
    if tokio::time::timeout(remaining, quiesce).await.is_err() {
        tracing::debug!("global deadline reached, cancelling remaining work");
        ctx.queue.clear();
    }

    for worker in &workers {
        worker.abort();
    }
    for worker in workers {
        let _ = worker.await;
    }

    tracing::debug!(
        urls_seen = ctx.dupefilter.seen_count(),
        "crawl finished"
    );
}

async fn worker_loop(ctx: Arc<CrawlContext>, id: usize, deadline: Instant) {
    loop {
        if Instant::now() >= deadline {
            tracing::trace!(worker = id, "deadline reached, worker stopping");
            break;
        }

        // Claim in-flight status before popping so the supervisor never
        // observes an empty queue while a request is in hand.
        ctx.in_flight.fetch_add(1, Ordering::SeqCst);
        let Some(request) = ctx.queue.try_pop() else {
            ctx.in_flight.fetch_sub(1, Ordering::SeqCst);
            tokio::select! {
                _ = ctx.queue.notified() => {}
                _ = tokio::time::sleep(IDLE_PARK) => {}
            }
            continue;
        };

        handle_request(&ctx, request, deadline).await;
        ctx.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn handle_request(ctx: &Arc<CrawlContext>, mut request: Request, deadline: Instant) {
    // Retry backoff assigned by the retry middleware.
    if !request.delay.is_zero() {
        tokio::time::sleep(request.delay).await;
    }

    // Per-host politeness: the larger of the configured delay and the
    // host's robots crawl-delay.
    let host = request.host().to_string();
    let robots_delay = ctx
        .robots
        .crawl_delay(&host)
        .unwrap_or(Duration::ZERO)
        .min(MAX_CRAWL_DELAY);
    let delay = ctx.config.delay.max(robots_delay);
    let wait = ctx.throttle.acquire(&host, delay);
    if !wait.is_zero() {
        tracing::trace!(host = %host, ?wait, "throttled");
        tokio::time::sleep(wait).await;
    }

    let Some(middleware) = ctx.middleware.get() else {
        return;
    };

    match middleware.before_request(&mut request).await {
        PreAction::Drop(reason) => {
            tracing::debug!(url = %request.url, reason, "request dropped");
        }
        PreAction::ShortCircuit(response) => {
            process_response(ctx, request, *response, deadline).await;
        }
        PreAction::Continue => {
            let Some(downloader) = ctx.downloader.get() else {
                return;
            };

            let response = {
                let _permit = match ctx.fetch_semaphore.acquire().await {
                    Ok(permit) => permit,
                    // The semaphore is never closed; bail if it somehow is.
                    Err(_) => return,
                };
                downloader.fetch(&request).await
            };
            tracing::debug!(
                url = %request.url,
                status = response.status,
                elapsed_ms = response.elapsed.as_millis() as u64,
                "fetched"
            );
            process_response(ctx, request, response, deadline).await;
        }
    }
}

async fn process_response(
    ctx: &Arc<CrawlContext>,
    request: Request,
    mut response: Response,
    deadline: Instant,
) {
    let Some(middleware) = ctx.middleware.get() else {
        return;
    };
    let action = middleware.after_response(&request, &mut response).await;

    // The final URL may differ from the request URL after redirects; mark
    // it so the redirect target is not fetched again.
    ctx.dupefilter.mark_fetched(&response.url, request.method);
    ctx.record_root_outcome(&request, &response);

    if let PostAction::Retry { backoff } = action {
        // A retry that cannot finish before the deadline is pointless.
        if Instant::now() + backoff < deadline {
            let mut retry = request;
            retry.retries += 1;
            retry.delay = backoff;
            ctx.enqueue_retry(retry);
        } else {
            tracing::debug!(url = %request.url, "retry skipped, deadline too close");
        }
        return;
    }

    for output in ctx.dispatch(&request, &response) {
        ctx.handle_output(output);
    }
}
