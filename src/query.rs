use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{Prefs, PrefsStore};

/// The single current search query, persisted across runs.
///
/// Subscribers see the latest value straight away and every later change.
/// A blank query means no active search.
pub struct QueryState {
  store: PrefsStore,
  tx: watch::Sender<String>,
}

impl QueryState {
  /// Start from the stored query, or empty if none was saved.
  pub fn open(store: PrefsStore) -> Self {
    let initial = store.load().search_query.unwrap_or_default();
    info!(query = %initial, path = %store.path().display(), "query: restored from prefs");
    let (tx, _) = watch::channel(initial);
    Self { store, tx }
  }

  pub fn current(&self) -> String {
    self.tx.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<String> {
    let mut rx = self.tx.subscribe();
    rx.mark_changed();
    rx
  }

  /// Persist `query` and publish it. Observers are only woken when it differs
  /// from the current value.
  pub fn set_query(&self, query: &str) {
    let prefs = Prefs { search_query: Some(query.to_string()) };
    if let Err(e) = self.store.save(&prefs) {
      warn!(err = %format!("{:#}", e), "query: failed to persist");
    }
    let changed = self.tx.send_if_modified(|current| {
      if current == query {
        return false;
      }
      *current = query.to_string();
      true
    });
    if changed {
      info!(query = %query, "query: changed");
    }
  }
}
