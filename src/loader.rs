//! Paginated Retry Loader
//!
//! Drives one logical listing call through its continuation-token pages.
//! Pages are requested strictly one after another; a failed page is retried
//! as a whole with exponential backoff until the retry budget runs out.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

/// Default number of extra attempts per page
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default sleep before the first retry
pub const DEFAULT_SLEEP_BETWEEN_RETRIES: Duration = Duration::from_millis(200);
/// Default growth of the sleep between consecutive retries
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// One page of a listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token; `None` or empty means this was the last page
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<String>) -> Self {
        Self { items, next }
    }

    /// A final page with no records, used for not-applicable listings
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next: None,
        }
    }

    /// The token to request next, if any
    fn cursor(&self) -> Option<&str> {
        self.next.as_deref().filter(|token| !token.is_empty())
    }
}

/// Retry policy for one listing
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderOptions {
    pub max_retries: u32,
    pub sleep_between_retries: Duration,
    backoff_factor: f64,
    /// Upper bound for any single sleep between retries
    pub max_backoff: Option<Duration>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            sleep_between_retries: DEFAULT_SLEEP_BETWEEN_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_backoff: None,
        }
    }
}

impl LoaderOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_sleep_between_retries(mut self, sleep: Duration) -> Self {
        self.sleep_between_retries = sleep;
        self
    }

    /// Factors below 1.0 would shrink the delay; they are clamped to 1.0
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = if factor.is_nan() || factor < 1.0 {
            1.0
        } else {
            factor
        };
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Option<Duration>) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }
}

/// Delay before retry number `attempt` (counted from 0):
/// `sleep_between_retries * backoff_factor ^ attempt`, capped at `max_backoff`.
pub fn backoff(attempt: u32, options: &LoaderOptions) -> Duration {
    let base = options.sleep_between_retries.as_nanos() as f64;
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let nanos = (base * options.backoff_factor.powi(exponent)).round();

    // Float to int casts saturate, which also covers an infinite product
    let delay = Duration::from_nanos(nanos as u64);

    match options.max_backoff {
        Some(cap) => delay.min(cap),
        None => delay,
    }
}

/// Runs listings under one retry policy and one cancellation token
#[derive(Debug, Clone)]
pub struct Loader {
    pub options: LoaderOptions,
    pub cancel: CancellationToken,
}

impl Loader {
    pub fn new(options: LoaderOptions, cancel: CancellationToken) -> Self {
        Self { options, cancel }
    }

    /// Fetch every page of `label`, returning the records in page order.
    ///
    /// `fetch_page` receives the cursor for the page to load, `None` for the
    /// first one. It must be safe to call again with the same cursor.
    pub async fn fetch_all<T, F, Fut>(&self, label: &str, mut fetch_page: F) -> anyhow::Result<Vec<T>>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = anyhow::Result<Page<T>>>,
    {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut batch = 0u32;

        loop {
            batch += 1;
            let page = self.fetch_page_with_retry(label, batch, cursor.as_deref(), &mut fetch_page).await?;

            tracing::trace!(
                "Fetched {} {} in batch {}",
                page.items.len(),
                label,
                batch
            );

            let next = page.cursor().map(str::to_string);
            items.extend(page.items);

            match next {
                Some(token) => cursor = Some(token),
                None => break,
            }
        }

        Ok(items)
    }

    async fn fetch_page_with_retry<T, F, Fut>(
        &self,
        label: &str,
        batch: u32,
        cursor: Option<&str>,
        fetch_page: &mut F,
    ) -> anyhow::Result<Page<T>>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = anyhow::Result<Page<T>>>,
    {
        let mut attempt = 0u32;

        loop {
            // TODO: only retry throttling, 5xx and transport errors once the
            // client exposes a classification for them
            let err = match fetch_page(cursor.map(str::to_string)).await {
                Ok(page) => return Ok(page),
                Err(err) => err,
            };

            if attempt >= self.options.max_retries || self.cancel.is_cancelled() {
                return Err(FetchError::Batch {
                    label: label.to_string(),
                    batch,
                    attempts: attempt + 1,
                    source: err,
                }
                .into());
            }

            let delay = backoff(attempt, &self.options);
            tracing::warn!(
                "Fetching {} in batch {} failed (attempt {}), retrying in {:?}: {:#}",
                label,
                batch,
                attempt + 1,
                delay,
                err
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(FetchError::Batch {
                        label: label.to_string(),
                        batch,
                        attempts: attempt + 1,
                        source: err,
                    }
                    .into());
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_loader(max_retries: u32) -> Loader {
        Loader::new(
            LoaderOptions::default()
                .with_max_retries(max_retries)
                .with_sleep_between_retries(Duration::from_millis(1)),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_fetch_all_follows_cursors_until_exhausted() {
        let loader = fast_loader(0);
        let calls = Arc::new(AtomicU32::new(0));
        let cursors = ["a", "b", "c", ""];

        let counter = Arc::clone(&calls);
        let items = loader
            .fetch_all("things", move |cursor| {
                let call = counter.fetch_add(1, Ordering::SeqCst) as usize;
                let expected = match call {
                    0 => None,
                    n => Some(cursors[n - 1].to_string()),
                };
                async move {
                    assert_eq!(cursor, expected);
                    Ok(Page::new(
                        vec![call * 10, call * 10 + 1],
                        Some(cursors[call].to_string()),
                    ))
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(items, vec![0, 1, 10, 11, 20, 21, 30, 31]);
    }

    #[tokio::test]
    async fn test_missing_cursor_ends_listing() {
        let loader = fast_loader(0);
        let items = loader
            .fetch_all("single", |_| async { Ok(Page::new(vec!["only"], None)) })
            .await
            .unwrap();
        assert_eq!(items, vec!["only"]);
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        let loader = fast_loader(5);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let items = loader
            .fetch_all("flaky", move |_| {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(anyhow!("transient failure {attempt}"))
                    } else {
                        Ok(Page::new(vec![attempt], None))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(items, vec![2]);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_reports_batch_and_attempts() {
        let loader = fast_loader(2);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let err = loader
            .fetch_all::<u32, _, _>("broken", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow!("always down")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err.downcast_ref::<FetchError>() {
            Some(FetchError::Batch {
                label,
                batch,
                attempts,
                source,
            }) => {
                assert_eq!(label, "broken");
                assert_eq!(*batch, 1);
                assert_eq!(*attempts, 3);
                assert_eq!(source.to_string(), "always down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_on_later_page_reports_that_batch() {
        let loader = fast_loader(0);
        let err = loader
            .fetch_all::<u32, _, _>("paged", |cursor| async move {
                match cursor {
                    None => Ok(Page::new(vec![1], Some("next".to_string()))),
                    Some(_) => Err(anyhow!("second page broke")),
                }
            })
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "fetching paged in batch 2 failed after 1 attempts"
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_retrying() {
        let cancel = CancellationToken::new();
        let loader = Loader::new(
            LoaderOptions::default()
                .with_max_retries(100)
                .with_sleep_between_retries(Duration::from_secs(60)),
            cancel.clone(),
        );
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let handle = tokio::spawn(async move {
            loader
                .fetch_all::<u32, _, _>("slow", move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(anyhow!("down")) }
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let options = LoaderOptions::default()
            .with_sleep_between_retries(Duration::from_millis(100))
            .with_backoff_factor(2.0);

        assert_eq!(backoff(0, &options), Duration::from_millis(100));
        assert_eq!(backoff(1, &options), Duration::from_millis(200));
        assert_eq!(backoff(2, &options), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_respects_cap() {
        let options = LoaderOptions::default()
            .with_sleep_between_retries(Duration::from_millis(100))
            .with_max_backoff(Some(Duration::from_millis(250)));

        assert_eq!(backoff(1, &options), Duration::from_millis(200));
        assert_eq!(backoff(2, &options), Duration::from_millis(250));
        assert_eq!(backoff(60, &options), Duration::from_millis(250));
    }

    #[test]
    fn test_backoff_saturates() {
        let options = LoaderOptions::default().with_sleep_between_retries(Duration::from_secs(1));
        assert_eq!(backoff(u32::MAX, &options), Duration::from_nanos(u64::MAX));
    }

    #[test]
    fn test_factor_below_one_is_clamped() {
        assert_eq!(LoaderOptions::default().with_backoff_factor(0.5).backoff_factor(), 1.0);
        assert_eq!(LoaderOptions::default().with_backoff_factor(f64::NAN).backoff_factor(), 1.0);
        assert_eq!(LoaderOptions::default().with_backoff_factor(3.0).backoff_factor(), 3.0);
    }

    #[test]
    fn test_defaults() {
        let options = LoaderOptions::default();
        assert_eq!(options.max_retries, 5);
        assert_eq!(options.sleep_between_retries, Duration::from_millis(200));
        assert_eq!(options.backoff_factor(), 2.0);
        assert!(options.max_backoff.is_none());
    }

    proptest! {
        #[test]
        fn prop_factor_one_is_constant(attempt in 0u32..1000, base_ms in 0u64..10_000) {
            let options = LoaderOptions::default()
                .with_sleep_between_retries(Duration::from_millis(base_ms))
                .with_backoff_factor(1.0);
            prop_assert_eq!(backoff(attempt, &options), Duration::from_millis(base_ms));
        }

        #[test]
        fn prop_backoff_never_shrinks(attempt in 0u32..64, factor in 1.0f64..4.0) {
            let options = LoaderOptions::default().with_backoff_factor(factor);
            prop_assert!(backoff(attempt + 1, &options) >= backoff(attempt, &options));
        }
    }
}
