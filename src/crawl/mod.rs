//! Crawl orchestration.
//!
//! Provides:
//! - Comment pagination with save-as-you-go
//! - Per-post processing (detail, media, comments)
//! - Keyword, link and user schedulers
//! - The `Harvester` driver sequencing the modes

pub mod app;
pub mod comments;
pub mod keyword;
pub mod links;
pub mod post;
pub mod user;

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::join_all;
use futures::FutureExt;

pub use app::{Harvester, RunReport};
pub use comments::{CommentPaginator, PageCursor};
pub use keyword::KeywordScheduler;
pub use links::LinkScheduler;
pub use post::PostProcessor;
pub use user::UserScheduler;

/// Run sibling tasks concurrently and sum their counts.
///
/// A task that panics is logged and contributes nothing.
pub async fn join_tolerant<I, F>(label: &str, tasks: I) -> usize
where
    I: IntoIterator<Item = F>,
    F: Future<Output = usize>,
{
    let results = join_all(
        tasks
            .into_iter()
            .map(|task| AssertUnwindSafe(task).catch_unwind()),
    )
    .await;

    results
        .into_iter()
        .map(|result| match result {
            Ok(count) => count,
            Err(_) => {
                tracing::warn!("{} task failed and was skipped", label);
                0
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_tolerant_skips_panics() {
        let tasks: Vec<std::pin::Pin<Box<dyn Future<Output = usize>>>> = vec![
            Box::pin(async { 2 }),
            Box::pin(async { panic!("boom") }),
            Box::pin(async { 3 }),
        ];
        assert_eq!(join_tolerant("test", tasks).await, 5);
    }
}
