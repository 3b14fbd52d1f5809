//! Forward-only paging over one search query.
//!
//! A [`PagedSource`] is bound to a single query for its whole life. Replacing
//! the query means cancelling the source and building a new one.

use futures::Stream;
use futures::stream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::gallery::{GalleryItem, filter_valid};
use crate::serp::{ImageSearch, SearchError};

/// One batch of results plus the keys of its neighbours.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
  pub items: Vec<GalleryItem>,
  /// Always `None`: pages only append forward.
  pub prev_key: Option<u32>,
  /// `None` once a page comes back empty.
  pub next_key: Option<u32>,
}

#[derive(Debug)]
pub enum LoadResult {
  Page(Page),
  Error(SearchError),
}

impl LoadResult {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, LoadResult::Error(e) if e.is_cancelled())
  }
}

/// Snapshot of what a consumer has loaded, used to pick a restart key.
#[derive(Debug, Clone, Copy)]
pub struct PagingState<'a> {
  pub pages: &'a [Page],
  /// Index of the item the consumer was looking at, across all pages.
  pub anchor_position: Option<usize>,
}

impl PagingState<'_> {
  /// The page holding `position`, or the last page if it lies past the end.
  pub fn closest_page_to_position(&self, position: usize) -> Option<&Page> {
    let last = self.pages.len().checked_sub(1)?;
    let mut offset = position;
    let mut idx = 0;
    while idx < last && offset >= self.pages[idx].items.len() {
      offset -= self.pages[idx].items.len();
      idx += 1;
    }
    self.pages.get(idx)
  }
}

pub struct PagedSource<S> {
  query: String,
  search: Arc<S>,
  cancel: CancellationToken,
}

impl<S: ImageSearch> PagedSource<S> {
  pub fn new(query: impl Into<String>, search: Arc<S>) -> Self {
    Self { query: query.into(), search, cancel: CancellationToken::new() }
  }

  pub fn query(&self) -> &str {
    &self.query
  }

  /// Load the page at `key`; `None` is the first page.
  ///
  /// Errors are returned as-is; loading the same key again is the retry.
  pub async fn load(&self, key: Option<u32>) -> LoadResult {
    let page = key.unwrap_or(0);
    match self.search.fetch_page(&self.query, page, &self.cancel).await {
      Ok(raw) => {
        let items = filter_valid(raw);
        // An empty page ends paging even if the provider only sent invalid items.
        let next_key = if items.is_empty() { None } else { Some(page + 1) };
        debug!(query = %self.query, page, count = items.len(), ?next_key, "paging: page loaded");
        LoadResult::Page(Page { items, prev_key: None, next_key })
      }
      Err(e) => LoadResult::Error(e),
    }
  }

  /// Key to restart from so the anchored item stays in view.
  pub fn refresh_key(state: &PagingState<'_>) -> Option<u32> {
    let anchor = state.anchor_position?;
    let page = state.closest_page_to_position(anchor)?;
    page.prev_key.map(|k| k + 1).or_else(|| page.next_key.and_then(|k| k.checked_sub(1)))
  }

  /// Cancel any outstanding and future load on this source. Idempotent.
  pub fn cancel(&self) {
    if !self.cancel.is_cancelled() {
      info!(query = %self.query, "paging: cancelling source");
    }
    self.cancel.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Pages from the first onward. Ends after the last page or the first error.
  pub fn pages(&self) -> impl Stream<Item = LoadResult> + '_ {
    stream::unfold(Some(None), move |next: Option<Option<u32>>| async move {
      let key = next?;
      let result = self.load(key).await;
      let following = match &result {
        LoadResult::Page(page) => page.next_key.map(Some),
        LoadResult::Error(_) => None,
      };
      Some((result, following))
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gallery::tests::item;
  use crate::testing::{Scripted, ScriptedSearch};
  use futures::StreamExt;
  use std::time::Duration;

  fn invalid(original: &str) -> GalleryItem {
    let mut it = item(original);
    it.original.clear();
    it
  }

  fn page(result: LoadResult) -> Page {
    match result {
      LoadResult::Page(p) => p,
      LoadResult::Error(e) => panic!("expected page, got {e}"),
    }
  }

  #[tokio::test]
  async fn first_page_filters_and_advances() {
    let search = Arc::new(ScriptedSearch::new());
    search.script("cats", 0, Scripted::Items(vec![item("a"), invalid("b"), item("c")]));
    let source = PagedSource::new("cats", search.clone());

    let first = page(source.load(None).await);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.prev_key, None);
    assert_eq!(first.next_key, Some(1));
    assert_eq!(search.calls(), [("cats".to_string(), 0)]);
  }

  #[tokio::test]
  async fn empty_page_ends_paging() {
    let search = Arc::new(ScriptedSearch::new());
    let source = PagedSource::new("cats", search);
    let p = page(source.load(Some(3)).await);
    assert!(p.items.is_empty());
    assert_eq!(p.next_key, None);
  }

  #[tokio::test]
  async fn page_of_only_invalid_items_ends_paging() {
    let search = Arc::new(ScriptedSearch::new());
    search.script("cats", 1, Scripted::Items(vec![invalid("x"), invalid("y")]));
    let source = PagedSource::new("cats", search);
    let p = page(source.load(Some(1)).await);
    assert!(p.items.is_empty());
    assert_eq!(p.next_key, None);
  }

  #[tokio::test]
  async fn error_then_retry_same_key_succeeds() {
    let search = Arc::new(ScriptedSearch::new());
    search.script("cats", 2, Scripted::Fail);
    search.script("cats", 2, Scripted::Items(vec![item("z")]));
    let source = PagedSource::new("cats", search.clone());

    assert!(matches!(source.load(Some(2)).await, LoadResult::Error(SearchError::Status { .. })));
    let retried = page(source.load(Some(2)).await);
    assert_eq!(retried.items.len(), 1);
    assert_eq!(retried.next_key, Some(3));
    assert_eq!(search.calls().len(), 2);
  }

  #[tokio::test]
  async fn cancel_resolves_outstanding_load() {
    let search = Arc::new(ScriptedSearch::new());
    search.script("cats", 0, Scripted::Hang);
    let source = Arc::new(PagedSource::new("cats", search));

    let pending = tokio::spawn({
      let source = source.clone();
      async move { source.load(None).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    source.cancel();
    source.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), pending).await.unwrap().unwrap();
    assert!(result.is_cancelled());
    assert!(source.is_cancelled());
  }

  #[tokio::test]
  async fn stream_walks_pages_until_empty() {
    let search = Arc::new(ScriptedSearch::new());
    search.script("cats", 0, Scripted::Items(vec![item("a"), item("b")]));
    search.script("cats", 1, Scripted::Items(vec![item("c")]));
    let source = PagedSource::new("cats", search.clone());

    let pages: Vec<Page> = source.pages().map(page).collect().await;
    let sizes: Vec<usize> = pages.iter().map(|p| p.items.len()).collect();
    assert_eq!(sizes, [2, 1, 0]);
    assert_eq!(pages.last().unwrap().next_key, None);
    assert_eq!(search.calls().len(), 3);
  }

  #[tokio::test]
  async fn stream_stops_on_error() {
    let search = Arc::new(ScriptedSearch::new());
    search.script("cats", 0, Scripted::Items(vec![item("a")]));
    search.script("cats", 1, Scripted::Fail);
    let source = PagedSource::new("cats", search.clone());

    let results: Vec<LoadResult> = source.pages().collect().await;
    assert_eq!(results.len(), 2);
    assert!(matches!(results[1], LoadResult::Error(_)));
    assert_eq!(search.calls().len(), 2);
  }

  fn loaded(key: u32, n: usize) -> Page {
    Page { items: (0..n).map(|i| item(&format!("{key}-{i}"))).collect(), prev_key: None, next_key: Some(key + 1) }
  }

  #[test]
  fn refresh_key_follows_anchor() {
    let pages = [loaded(0, 3), loaded(1, 3), loaded(2, 2)];

    let at = |anchor| PagedSource::<ScriptedSearch>::refresh_key(&PagingState { pages: &pages, anchor_position: anchor });
    assert_eq!(at(None), None);
    assert_eq!(at(Some(0)), Some(0));
    assert_eq!(at(Some(4)), Some(1));
    assert_eq!(at(Some(7)), Some(2));
    // Past the end clamps to the last page.
    assert_eq!(at(Some(100)), Some(2));
  }

  #[test]
  fn refresh_key_without_pages_is_none() {
    let state = PagingState { pages: &[], anchor_position: Some(3) };
    assert_eq!(PagedSource::<ScriptedSearch>::refresh_key(&state), None);
  }
}
