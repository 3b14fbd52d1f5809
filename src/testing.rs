//! Scripted [`ImageSearch`] backend for unit tests.

use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::gallery::GalleryItem;
use crate::serp::{ImageSearch, SearchError};

pub enum Scripted {
  /// Raw items, returned unfiltered.
  Items(Vec<GalleryItem>),
  /// A 502 from the provider.
  Fail,
  /// Never answers; resolves only when cancelled.
  Hang,
}

/// Answers `(query, page)` requests from a per-key queue of scripted replies.
/// Unscripted requests get an empty page.
#[derive(Default)]
pub struct ScriptedSearch {
  script: Mutex<HashMap<(String, u32), VecDeque<Scripted>>>,
  calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedSearch {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn script(&self, query: &str, page: u32, reply: Scripted) {
    self
      .script
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .entry((query.to_string(), page))
      .or_default()
      .push_back(reply);
  }

  /// Every request seen so far, in order.
  pub fn calls(&self) -> Vec<(String, u32)> {
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

impl ImageSearch for ScriptedSearch {
  async fn fetch_page(
    &self,
    query: &str,
    page: u32,
    cancel: &CancellationToken,
  ) -> Result<Vec<GalleryItem>, SearchError> {
    if cancel.is_cancelled() {
      return Err(SearchError::Cancelled);
    }
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).push((query.to_string(), page));
    let reply = self
      .script
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get_mut(&(query.to_string(), page))
      .and_then(VecDeque::pop_front);

    match reply {
      Some(Scripted::Items(items)) => Ok(items),
      Some(Scripted::Fail) => Err(SearchError::Status { status: StatusCode::BAD_GATEWAY, body: "upstream".to_string() }),
      Some(Scripted::Hang) => {
        cancel.cancelled().await;
        Err(SearchError::Cancelled)
      }
      None => Ok(Vec::new()),
    }
  }
}
