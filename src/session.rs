use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::feed::{Feed, GalleryStatus};
use crate::gallery::GalleryItem;
use crate::paging::{LoadResult, PagedSource};
use crate::serp::{ImageSearch, SearchError};

/// What a call to [`SearchSession::load_more`] did.
#[derive(Debug)]
pub enum LoadOutcome {
  /// Blank query, nothing requested.
  Idle,
  /// The last page was already loaded.
  Exhausted,
  Loaded { added: usize, next_key: Option<u32> },
  /// Calling `load_more` again retries the same page.
  Failed(SearchError),
  /// The query changed mid-load and the response was dropped.
  Superseded,
}

/// Follows the current query and owns the paged source for it.
///
/// Each distinct query gets a fresh source and feed; the previous source is
/// cancelled first, so at most one page load is ever in flight.
pub struct SearchSession<S> {
  search: Arc<S>,
  queries: watch::Receiver<String>,
  query: String,
  synced: bool,
  source: Option<Arc<PagedSource<S>>>,
  feed: Feed,
}

impl<S: ImageSearch> SearchSession<S> {
  pub fn new(search: Arc<S>, queries: watch::Receiver<String>) -> Self {
    let mut session =
      Self { search, queries, query: String::new(), synced: false, source: None, feed: Feed::new(false) };
    session.sync();
    session
  }

  pub fn query(&self) -> &str {
    &self.query
  }

  pub fn feed(&self) -> &Feed {
    &self.feed
  }

  pub fn status(&self) -> &GalleryStatus {
    self.feed.status()
  }

  pub fn items(&self) -> impl Iterator<Item = &GalleryItem> {
    self.feed.items()
  }

  /// Pick up the latest query. Returns true if the source was replaced.
  pub fn sync(&mut self) -> bool {
    let latest = self.queries.borrow_and_update().clone();
    if self.synced && latest == self.query {
      return false;
    }
    self.synced = true;
    self.replace(latest, None);
    true
  }

  fn replace(&mut self, query: String, start_key: Option<u32>) {
    if let Some(old) = self.source.take() {
      old.cancel();
    }
    let active = !query.trim().is_empty();
    self.source = active.then(|| Arc::new(PagedSource::new(query.clone(), self.search.clone())));
    self.feed = match start_key {
      Some(key) if active => Feed::starting_at(key),
      _ => Feed::new(active),
    };
    info!(query = %query, active, ?start_key, "session: started");
    self.query = query;
  }

  /// Restart the current query, resuming at the page holding `anchor_position`.
  pub fn refresh(&mut self, anchor_position: Option<usize>) {
    let key = PagedSource::<S>::refresh_key(&self.feed.paging_state(anchor_position));
    debug!(query = %self.query, ?anchor_position, ?key, "session: refreshing");
    self.replace(self.query.clone(), key);
  }

  /// Cancel whatever is in flight without changing the query. Loads keep
  /// resolving as superseded until the query changes or [`Self::refresh`] runs.
  pub fn cancel(&self) {
    if let Some(source) = &self.source {
      source.cancel();
    }
  }

  /// Load the next page of the current query.
  pub async fn load_more(&mut self) -> LoadOutcome {
    self.sync();
    let Some(source) = self.source.clone() else {
      return LoadOutcome::Idle;
    };
    let Some(key) = self.feed.next_request() else {
      return LoadOutcome::Exhausted;
    };
    self.feed.begin();

    let result = tokio::select! {
      biased;
      Ok(()) = self.queries.changed() => None,
      result = source.load(key) => Some(result),
    };

    match result {
      None => {
        // The query may have bounced back to the same value, so always rebuild.
        source.cancel();
        self.synced = false;
        self.sync();
        LoadOutcome::Superseded
      }
      Some(result) if result.is_cancelled() => LoadOutcome::Superseded,
      Some(LoadResult::Page(page)) => {
        let next_key = page.next_key;
        let added = self.feed.push(page);
        LoadOutcome::Loaded { added, next_key }
      }
      Some(LoadResult::Error(e)) => {
        self.feed.fail(&e);
        LoadOutcome::Failed(e)
      }
    }
  }
}
