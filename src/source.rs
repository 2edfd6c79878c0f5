use futures::stream::{self, Stream};

use crate::store::{BucketTarget, ObjectKey, ObjectStore, PageCursor, StoreError};

enum ListState {
    Start,
    Next(PageCursor),
    Done,
}

/// List every key under `target.prefix` as a lazy stream of pages.
///
/// A page is only fetched when the previous one has been consumed. The stream
/// ends after the last page, or right after yielding the first error. It keeps
/// no state outside itself, so restarting a failed listing means calling this
/// again.
pub fn list_keys<'a, S>(store: &'a S, target: &'a BucketTarget) -> impl Stream<Item = Result<Vec<ObjectKey>, StoreError>> + Send + 'a
where
    S: ObjectStore + ?Sized,
{
    stream::try_unfold(ListState::Start, move |state| async move {
        let cursor = match state {
            ListState::Done => return Ok(None),
            ListState::Start => None,
            ListState::Next(cursor) => Some(cursor),
        };
        let page = store.list_page(target, cursor.as_ref()).await?;
        let next = match page.next {
            Some(next) => ListState::Next(next),
            None => ListState::Done,
        };
        Ok(Some((page.keys, next)))
    })
}
