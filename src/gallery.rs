use serde::{Deserialize, Serialize};

/// One image search result.
///
/// Every field defaults when absent from the provider response, so a sparse
/// entry deserializes fine and is then dropped by [`filter_valid`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryItem {
  pub title: String,
  /// Domain of the page hosting the image.
  pub source: String,
  /// URL of the hosting page.
  pub link: String,
  pub thumbnail: String,
  pub original: String,
  pub original_width: u32,
  pub original_height: u32,
  /// Index within the whole result sequence. Assigned by the consumer as pages
  /// accumulate, so whatever the provider sent is overwritten.
  pub position: usize,
}

impl GalleryItem {
  /// Whether the item can be shown: both URLs present and a positive size.
  pub fn is_valid(&self) -> bool {
    !self.thumbnail.trim().is_empty()
      && !self.original.trim().is_empty()
      && self.original_width > 0
      && self.original_height > 0
  }

  /// Stable key for dedup and diffing.
  pub fn key(&self) -> &str {
    &self.original
  }
}

/// Provider response body. A missing `images_results` means no items.
#[derive(Debug, Default, Deserialize)]
pub struct ImageResponse {
  #[serde(default, rename = "images_results")]
  pub gallery_items: Vec<RawItem>,
}

/// A result entry as it appears on the wire.
///
/// Width and height arrive as numbers but some entries carry strings, nulls or
/// negatives. Those are not parse errors: anything that isn't a positive
/// integer becomes 0 and fails validity.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawItem {
  title: Option<String>,
  source: Option<String>,
  link: Option<String>,
  thumbnail: Option<String>,
  original: Option<String>,
  original_width: Option<serde_json::Value>,
  original_height: Option<serde_json::Value>,
}

fn dimension(value: Option<&serde_json::Value>) -> u32 {
  value.and_then(serde_json::Value::as_u64).and_then(|v| u32::try_from(v).ok()).unwrap_or(0)
}

impl From<RawItem> for GalleryItem {
  fn from(raw: RawItem) -> Self {
    Self {
      original_width: dimension(raw.original_width.as_ref()),
      original_height: dimension(raw.original_height.as_ref()),
      title: raw.title.unwrap_or_default(),
      source: raw.source.unwrap_or_default(),
      link: raw.link.unwrap_or_default(),
      thumbnail: raw.thumbnail.unwrap_or_default(),
      original: raw.original.unwrap_or_default(),
      position: 0,
    }
  }
}

impl ImageResponse {
  /// Convert the wire entries and drop the invalid ones.
  pub fn into_items(self) -> Vec<GalleryItem> {
    filter_valid(self.gallery_items.into_iter().map(GalleryItem::from))
  }
}

/// Keep only items satisfying [`GalleryItem::is_valid`], preserving order.
pub fn filter_valid(items: impl IntoIterator<Item = GalleryItem>) -> Vec<GalleryItem> {
  items.into_iter().filter(GalleryItem::is_valid).collect()
}
