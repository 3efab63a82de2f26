//! The `import` subcommand: copies raw blocks from a JSON-RPC endpoint into a local store.

use crate::cli::ImportArgs;
use anyhow::{bail, Result};
use dacost_pipeline::{retry::RetryStep, RetryPolicy};
use dacost_providers::{AlloyBlockSource, BlockSourceError, LocalBlockStore};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters of an import run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImportSummary {
    /// Blocks written to the store.
    pub imported: u64,
    /// Blocks that could not be fetched or decoded.
    pub failed: u64,
}

/// Copies blocks `from..=to` into the store, one block at a time.
pub(crate) async fn import(args: &ImportArgs, cancel: CancellationToken) -> Result<ImportSummary> {
    if args.from > args.to {
        bail!("--from {} is above --to {}", args.from, args.to);
    }
    let source = AlloyBlockSource::new_http(args.source.clone());
    let store = LocalBlockStore::open(&args.store)?;
    let policy = args.retry.policy();
    info!(target: "import", "Importing blocks {} to {} into {}", args.from, args.to, args.store.display());

    let source = &source;
    copy_range(args.from..=args.to, &store, &policy, &cancel, move |number| {
        source.raw_block_by_number(number)
    })
    .await
}

/// Copies every block of `range` returned by `fetch` into `store`.
async fn copy_range<B, F, Fut>(
    range: std::ops::RangeInclusive<u64>,
    store: &LocalBlockStore,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    fetch: F,
) -> Result<ImportSummary>
where
    F: Fn(u64) -> Fut,
    B: AsRef<[u8]>,
    Fut: Future<Output = Result<B, BlockSourceError>>,
{
    let mut summary = ImportSummary::default();
    for number in range {
        if cancel.is_cancelled() {
            warn!(target: "import", "Cancelled before block {number}");
            break;
        }
        let Some(raw) = fetch_with_retry(number, policy, cancel, &fetch).await else {
            summary.failed += 1;
            continue;
        };
        match store.insert_raw(raw.as_ref()) {
            Ok(block) if block.number == number => {
                debug!(target: "import", "Imported block {number}");
                summary.imported += 1;
            }
            Ok(block) => {
                warn!(target: "import", "Requested block {number}, stored block {}", block.number);
                summary.imported += 1;
            }
            Err(BlockSourceError::Decode(_, err)) => {
                warn!(target: "import", "Skipping undecodable block {number}: {err}");
                summary.failed += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
    info!(
        target: "import",
        "Imported {} blocks, {} failed",
        summary.imported,
        summary.failed
    );
    Ok(summary)
}

async fn fetch_with_retry<T, F, Fut>(
    number: u64,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    fetch: &F,
) -> Option<T>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<T, BlockSourceError>>,
{
    let mut backoff = policy.backoff(cancel.clone());
    loop {
        let err = match fetch(number).await {
            Ok(value) => return Some(value),
            Err(err) => err,
        };
        debug!(target: "import", "Attempt {} for block {number} failed: {err}", backoff.attempt());
        match backoff.wait().await {
            RetryStep::Retry => {}
            RetryStep::Exhausted => {
                warn!(
                    target: "import",
                    "Giving up on block {number} after {} attempts: {err}",
                    backoff.attempt()
                );
                return None;
            }
            RetryStep::Cancelled => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RetryArgs;
    use dacost_providers::test_utils::raw_empty_block;
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    const FAST_RETRY: RetryPolicy = RetryPolicy::new(2, Duration::from_millis(1));

    #[tokio::test]
    async fn test_copy_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlockStore::open(dir.path()).unwrap();
        let cancel = CancellationToken::new();

        let summary = copy_range(5..=9, &store, &FAST_RETRY, &cancel, |number| async move {
            Ok::<_, BlockSourceError>(raw_empty_block(number))
        })
        .await
        .unwrap();

        assert_eq!(summary, ImportSummary { imported: 5, failed: 0 });
        assert_eq!(store.head().unwrap(), Some(9));
    }

    #[tokio::test]
    async fn test_failed_blocks_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlockStore::open(dir.path()).unwrap();
        let cancel = CancellationToken::new();

        let summary = copy_range(1..=4, &store, &FAST_RETRY, &cancel, |number| async move {
            match number {
                2 => Err(BlockSourceError::Transport("connection reset".to_string())),
                3 => Ok(vec![0xde, 0xad]),
                n => Ok(raw_empty_block(n)),
            }
        })
        .await
        .unwrap();

        assert_eq!(summary, ImportSummary { imported: 2, failed: 2 });
        assert_eq!(store.head().unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlockStore::open(dir.path()).unwrap();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let summary = copy_range(7..=7, &store, &FAST_RETRY, &cancel, |number| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    return Err(BlockSourceError::Transport("timeout".to_string()));
                }
                Ok(raw_empty_block(number))
            }
        })
        .await
        .unwrap();

        assert_eq!(summary, ImportSummary { imported: 1, failed: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_import_stops() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlockStore::open(dir.path()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = copy_range(1..=4, &store, &FAST_RETRY, &cancel, |number| async move {
            Ok::<_, BlockSourceError>(raw_empty_block(number))
        })
        .await
        .unwrap();
        assert_eq!(summary, ImportSummary::default());
        assert_eq!(store.head().unwrap(), None);
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let args = ImportArgs {
            source: "http://127.0.0.1:1".parse().unwrap(),
            store: dir.path().to_path_buf(),
            from: 10,
            to: 5,
            retry: RetryArgs { max_attempts: 1, base_delay_ms: 1 },
        };
        assert!(import(&args, CancellationToken::new()).await.is_err());
    }
}
