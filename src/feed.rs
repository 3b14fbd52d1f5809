use crate::gallery::GalleryItem;
use crate::paging::{Page, PagingState};
use crate::serp::SearchError;

/// What the gallery should be showing, derived from the first-page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GalleryStatus {
  /// No active search.
  Start,
  /// First page in flight.
  Loading,
  /// First page finished with nothing to show.
  NoImages,
  /// First page failed. Later page failures don't replace a non-empty list.
  Failed(String),
  Showing(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
  Start,
  At(u32),
  End,
}

/// Pages accumulated for one query, with positions assigned across pages.
#[derive(Debug)]
pub struct Feed {
  pages: Vec<Page>,
  len: usize,
  cursor: Cursor,
  status: GalleryStatus,
  last_error: Option<String>,
}

impl Feed {
  pub fn new(active: bool) -> Self {
    Self {
      pages: Vec::new(),
      len: 0,
      cursor: Cursor::Start,
      status: if active { GalleryStatus::Loading } else { GalleryStatus::Start },
      last_error: None,
    }
  }

  /// Resume from `key` instead of the first page.
  pub fn starting_at(key: u32) -> Self {
    Self { cursor: Cursor::At(key), ..Self::new(true) }
  }

  /// Key for the next load: `Some(None)` is the first page, `None` means done.
  pub fn next_request(&self) -> Option<Option<u32>> {
    match self.cursor {
      Cursor::Start => Some(None),
      Cursor::At(k) => Some(Some(k)),
      Cursor::End => None,
    }
  }

  fn is_refresh(&self) -> bool {
    self.pages.is_empty()
  }

  pub fn begin(&mut self) {
    if self.is_refresh() {
      self.status = GalleryStatus::Loading;
    }
  }

  /// Append a loaded page, numbering its items after everything before it.
  /// Returns how many items were added.
  pub fn push(&mut self, mut page: Page) -> usize {
    for (offset, item) in page.items.iter_mut().enumerate() {
      item.position = self.len + offset;
    }
    let added = page.items.len();
    self.len += added;
    self.cursor = match page.next_key {
      Some(k) => Cursor::At(k),
      None => Cursor::End,
    };
    self.pages.push(page);
    self.last_error = None;
    self.status = if self.len == 0 { GalleryStatus::NoImages } else { GalleryStatus::Showing(self.len) };
    added
  }

  /// Record a failed load; the cursor stays put so the next load retries it.
  pub fn fail(&mut self, error: &SearchError) {
    let message = error.to_string();
    if self.len == 0 {
      self.status = GalleryStatus::Failed(message.clone());
    }
    self.last_error = Some(message);
  }

  pub fn status(&self) -> &GalleryStatus {
    &self.status
  }

  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  pub fn is_exhausted(&self) -> bool {
    self.cursor == Cursor::End
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn items(&self) -> impl Iterator<Item = &GalleryItem> {
    self.pages.iter().flat_map(|p| p.items.iter())
  }

  pub fn paging_state(&self, anchor_position: Option<usize>) -> PagingState<'_> {
    PagingState { pages: &self.pages, anchor_position }
  }
}
