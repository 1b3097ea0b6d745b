use futures::stream::{self, StreamExt};
use futures::Future;

/// Run a batch of async operations with at most `limit` in flight at once.
///
/// Results come back index-aligned to the input order regardless of
/// completion order (`buffered` yields in submission order). A failing
/// operation does not cancel its siblings; each slot carries its own output
/// and propagation is the caller's concern.
pub async fn run_bounded<T, F>(tasks: Vec<F>, limit: usize) -> Vec<T>
where
    F: Future<Output = T>,
{
    stream::iter(tasks).buffered(limit.max(1)).collect().await
}
