//! Eager traversal: the whole item set of a collection up front.

use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::model::{load_page, Collection};
use crate::error::FetchError;
use crate::http::Client;

/// Bounds on an eager traversal.
#[derive(Debug, Clone, Default)]
pub struct FetchAllOptions {
  /// Stop after this many pages even if `next` remains
  pub max_pages: Option<usize>,
}

/// Fetch the collection at `iri` and follow `next` until it runs out.
///
/// Items are the collection's own inline items followed by every page's, in
/// arrival order. Traversal also stops at a page after the first whose item
/// list is present but empty, and at a `next` link already visited. A page
/// with no item field is passed through.
pub async fn fetch_all(
  client: &Client,
  iri: &str,
  cancel: &CancellationToken,
) -> Result<Collection, FetchError> {
  fetch_all_with(client, iri, &FetchAllOptions::default(), cancel).await
}

pub async fn fetch_all_with(
  client: &Client,
  iri: &str,
  options: &FetchAllOptions,
  cancel: &CancellationToken,
) -> Result<Collection, FetchError> {
  let document = client.get_document(iri, cancel).await?;
  let mut collection = Collection::from_document(iri, document)?;

  let mut link = collection.first.clone();
  let mut visited = HashSet::new();
  let mut pages = 0usize;

  while let Some(current) = link.take() {
    if let Some(page_iri) = current.iri() {
      if !visited.insert(page_iri.to_string()) {
        warn!(iri, page = page_iri, "page already visited, stopping");
        break;
      }
    }
    if options.max_pages.is_some_and(|max| pages >= max) {
      info!(iri, pages, "page limit reached");
      break;
    }

    let page = load_page(client, &current, cancel).await?;
    pages += 1;
    let tail = pages > 1 && page.has_empty_items();
    debug!(page = ?current.iri(), items = page.len(), "page loaded");

    if let Some(items) = page.items {
      collection.ordered_items.extend(items);
    }
    if tail {
      break;
    }
    link = page.next;
  }

  info!(iri, pages, items = collection.ordered_items.len(), "collection fetched");
  Ok(collection)
}
