//! Interactive paging over one collection.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::model::{load_page, Collection, Item, Link};
use super::state::TraversalState;
use crate::error::FetchError;
use crate::http::Client;

/// Which navigation link to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  First,
  Prev,
  Next,
  Last,
}

impl Direction {
  pub fn as_str(&self) -> &'static str {
    match self {
      Direction::First => "first",
      Direction::Prev => "prev",
      Direction::Next => "next",
      Direction::Last => "last",
    }
  }

  fn link(self, collection: &Collection) -> Option<&Link> {
    match self {
      Direction::First => collection.first.as_ref(),
      Direction::Prev => collection.prev.as_ref(),
      Direction::Next => collection.next.as_ref(),
      Direction::Last => collection.last.as_ref(),
    }
  }
}

/// Which navigation controls to offer, by field presence alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
  pub first: bool,
  pub prev: bool,
  pub next: bool,
  pub last: bool,
}

/// A collection being paged through by one consumer.
///
/// Page fetches are sequential by construction: every operation takes
/// `&mut self` and the next link is only known once the previous page landed.
pub struct CollectionView {
  client: Client,
  cancel: CancellationToken,
  state: TraversalState,
  iri: Option<String>,
  collection: Option<Collection>,
  last_error: Option<FetchError>,
}

impl CollectionView {
  pub fn new(client: Client) -> Self {
    Self {
      client,
      cancel: CancellationToken::new(),
      state: TraversalState::Idle,
      iri: None,
      collection: None,
      last_error: None,
    }
  }

  /// Tie this view's fetches to an outside token, e.g. a parent's child token.
  pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }

  /// Fetch the collection at `iri` and load its first page, if it has one.
  ///
  /// A root that cannot be fetched, or is empty, moves the view to
  /// `Failed`. A first page that cannot be fetched leaves it `Ready` with no
  /// items and returns the error.
  pub async fn resolve(&mut self, iri: &str) -> Result<(), FetchError> {
    self.iri = Some(iri.to_string());
    self.collection = None;
    self.last_error = None;
    self.state = TraversalState::Loading;

    let fetched = self
      .client
      .get_document(iri, &self.cancel)
      .await
      .and_then(|document| Collection::from_document(iri, document));

    match fetched {
      Ok(collection) => {
        info!(iri, total_items = ?collection.total_items, "collection resolved");
        self.open(collection).await
      }
      Err(e) => Err(self.fail(e)),
    }
  }

  /// Start from an already fetched collection, skipping the root fetch.
  pub async fn open(&mut self, collection: Collection) -> Result<(), FetchError> {
    self.iri = Some(collection.id.clone());
    let has_first = collection.first.is_some();
    self.collection = Some(collection);
    self.state = TraversalState::Ready;

    if has_first {
      self.navigate(Direction::First).await?;
    }
    Ok(())
  }

  /// Replace the current items with the page behind `direction`.
  ///
  /// Returns `Ok(false)` without fetching when the link is absent.
  pub async fn navigate(&mut self, direction: Direction) -> Result<bool, FetchError> {
    let link = match self.collection.as_ref().and_then(|c| direction.link(c)) {
      Some(link) => link.clone(),
      None => return Ok(false),
    };
    if let Some(collection) = self.collection.as_mut() {
      collection.ordered_items.clear();
    }

    debug!(direction = direction.as_str(), link = ?link.iri(), "navigating");
    self.load(&link, false).await?;
    Ok(true)
  }

  /// Append the page behind `next` to the current items, keeping `prev`.
  ///
  /// Returns `Ok(false)` when there is nothing more to load.
  pub async fn consume_next(&mut self) -> Result<bool, FetchError> {
    let link = match self.collection.as_ref().and_then(|c| c.next.clone()) {
      Some(link) => link,
      None => return Ok(false),
    };

    debug!(link = ?link.iri(), "loading more");
    self.load(&link, true).await?;
    Ok(true)
  }

  /// Resolve the collection's own IRI again, dropping everything loaded so far.
  pub async fn refresh(&mut self) -> Result<(), FetchError> {
    let iri = self
      .collection
      .as_ref()
      .map(|c| c.id.clone())
      .or_else(|| self.iri.clone())
      .ok_or_else(|| FetchError::RequestSetup("nothing to refresh".to_string()))?;
    self.resolve(&iri).await
  }

  async fn load(&mut self, link: &Link, incremental: bool) -> Result<(), FetchError> {
    self.state = TraversalState::Loading;
    let page = match load_page(&self.client, link, &self.cancel).await {
      Ok(page) => page,
      Err(e) => {
        self.state = TraversalState::Ready;
        self.last_error = Some(e.clone());
        return Err(e);
      }
    };

    if let Some(collection) = self.collection.as_mut() {
      collection.absorb(page, incremental);
    }
    self.state = TraversalState::Ready;
    Ok(())
  }

  fn fail(&mut self, e: FetchError) -> FetchError {
    self.state = match e {
      FetchError::Cancelled => TraversalState::Idle,
      _ => TraversalState::Failed(e.kind()),
    };
    self.last_error = Some(e.clone());
    e
  }

  /// Stop every fetch this view is waiting on. The view stays cancelled.
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn state(&self) -> TraversalState {
    self.state
  }

  pub fn collection(&self) -> Option<&Collection> {
    self.collection.as_ref()
  }

  pub fn items(&self) -> &[Item] {
    self
      .collection
      .as_ref()
      .map(|c| c.ordered_items.as_slice())
      .unwrap_or(&[])
  }

  pub fn last_error(&self) -> Option<&FetchError> {
    self.last_error.as_ref()
  }

  /// Whether an incremental consumer can ask for more.
  pub fn has_more(&self) -> bool {
    self.state.is_ready() && self.collection.as_ref().is_some_and(|c| c.next.is_some())
  }

  pub fn is_paged(&self) -> bool {
    self.collection.as_ref().is_some_and(Collection::is_paged)
  }

  pub fn controls(&self) -> Controls {
    match &self.collection {
      Some(c) => Controls {
        first: c.first.is_some(),
        prev: c.prev.is_some(),
        next: c.next.is_some(),
        last: c.last.is_some(),
      },
      None => Controls::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::error::FailureKind;
  use crate::http::testing::ScriptedTransport;
  use serde_json::json;
  use std::sync::Arc;

  const ROOT: &str = "https://a.example/outbox";
  const P1: &str = "https://a.example/outbox?page=1";
  const P2: &str = "https://a.example/outbox?page=2";

  fn client(transport: ScriptedTransport) -> (Client, Arc<ScriptedTransport>) {
    let config = Config {
      origin: "https://a.example".into(),
      ..Config::default()
    };
    let transport = Arc::new(transport);
    (Client::plain(&config, transport.clone()).unwrap(), transport)
  }

  fn paged() -> ScriptedTransport {
    ScriptedTransport::new()
      .json(
        ROOT,
        json!({"id": ROOT, "type": "OrderedCollection", "totalItems": 5, "first": P1}),
      )
      .json(
        P1,
        json!({"id": P1, "orderedItems": ["a", "b", "c"], "next": P2, "first": P1}),
      )
      .json(
        P2,
        json!({"id": P2, "orderedItems": ["d", "e"], "prev": P1, "first": P1}),
      )
  }

  fn ids(view: &CollectionView) -> Vec<&str> {
    view.items().iter().filter_map(Item::id).collect()
  }

  #[tokio::test]
  async fn test_resolve_loads_first_page() {
    let (client, transport) = client(paged());
    let mut view = CollectionView::new(client);

    view.resolve(ROOT).await.unwrap();

    assert_eq!(view.state(), TraversalState::Ready);
    assert_eq!(ids(&view), vec!["a", "b", "c"]);
    assert!(view.has_more());
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_navigation_replaces_items() {
    let (client, _) = client(paged());
    let mut view = CollectionView::new(client);
    view.resolve(ROOT).await.unwrap();

    assert!(view.navigate(Direction::Next).await.unwrap());

    assert_eq!(ids(&view), vec!["d", "e"]);
    assert_eq!(view.collection().unwrap().prev, Some(Link::Reference(P1.into())));
    assert!(!view.has_more());
  }

  #[tokio::test]
  async fn test_consume_next_appends_and_keeps_prev() {
    let (client, _) = client(paged());
    let mut view = CollectionView::new(client);
    view.resolve(ROOT).await.unwrap();

    assert!(view.consume_next().await.unwrap());

    assert_eq!(ids(&view), vec!["a", "b", "c", "d", "e"]);
    assert_eq!(view.collection().unwrap().prev, None);
    assert!(!view.consume_next().await.unwrap());
  }

  #[tokio::test]
  async fn test_empty_page_ends_incremental_loading() {
    let (client, transport) = client(
      ScriptedTransport::new()
        .json(ROOT, json!({"id": ROOT, "first": P1}))
        .json(P1, json!({"orderedItems": ["a"], "next": P2}))
        .json(P2, json!({})),
    );
    let mut view = CollectionView::new(client);
    view.resolve(ROOT).await.unwrap();

    assert!(view.consume_next().await.unwrap());

    assert_eq!(ids(&view), vec!["a"]);
    assert_eq!(view.collection().unwrap().next, None);
    assert!(!view.has_more());
    assert!(!view.consume_next().await.unwrap());
    assert_eq!(transport.calls(), 3);
  }

  #[tokio::test]
  async fn test_missing_link_does_not_fetch() {
    let (client, transport) = client(paged());
    let mut view = CollectionView::new(client);
    view.resolve(ROOT).await.unwrap();

    assert!(!view.navigate(Direction::Last).await.unwrap());
    assert_eq!(ids(&view), vec!["a", "b", "c"]);
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_unpaged_collection_keeps_inline_items() {
    let (client, _) = client(
      ScriptedTransport::new().json(ROOT, json!({"id": ROOT, "orderedItems": ["x", "y"]})),
    );
    let mut view = CollectionView::new(client);
    view.resolve(ROOT).await.unwrap();

    assert_eq!(view.state(), TraversalState::Ready);
    assert_eq!(ids(&view), vec!["x", "y"]);
    assert!(!view.is_paged());
    assert_eq!(view.controls(), Controls::default());
  }

  #[tokio::test]
  async fn test_root_failures() {
    let (client, _) = client(
      ScriptedTransport::new()
        .status("https://a.example/private", 401)
        .json("https://a.example/blank", json!({})),
    );
    let mut view = CollectionView::new(client);

    assert!(view.resolve("https://a.example/private").await.is_err());
    assert_eq!(view.state(), TraversalState::Failed(FailureKind::Unauthorized));

    assert!(view.resolve("https://a.example/blank").await.is_err());
    assert_eq!(view.state(), TraversalState::Failed(FailureKind::NotFound));

    assert!(view.resolve("https://a.example/missing").await.is_err());
    assert_eq!(view.state().failure(), Some(FailureKind::NotFound));
    assert!(view.collection().is_none());
  }

  #[tokio::test]
  async fn test_page_failure_keeps_collection_ready() {
    let (client, _) = client(
      ScriptedTransport::new()
        .json(ROOT, json!({"id": ROOT, "first": P1}))
        .status(P1, 500),
    );
    let mut view = CollectionView::new(client);

    assert_eq!(view.resolve(ROOT).await, Err(FetchError::Status { status: 500 }));
    assert_eq!(view.state(), TraversalState::Ready);
    assert!(view.items().is_empty());
    assert_eq!(view.last_error(), Some(&FetchError::Status { status: 500 }));
  }

  #[tokio::test]
  async fn test_controls_follow_field_presence() {
    let (client, _) = client(
      ScriptedTransport::new()
        .json(ROOT, json!({"id": ROOT, "first": P1, "last": P2}))
        .json(P1, json!({"orderedItems": ["a"]})),
    );
    let mut view = CollectionView::new(client);
    view.resolve(ROOT).await.unwrap();

    assert_eq!(
      view.controls(),
      Controls {
        first: true,
        prev: false,
        next: false,
        last: true
      }
    );
  }

  #[tokio::test]
  async fn test_refresh_discards_loaded_state() {
    let (client, transport) = client(paged());
    let mut view = CollectionView::new(client);
    view.resolve(ROOT).await.unwrap();
    view.consume_next().await.unwrap();

    view.refresh().await.unwrap();

    assert_eq!(ids(&view), vec!["a", "b", "c"]);
    assert_eq!(transport.calls(), 5);
  }

  #[tokio::test]
  async fn test_open_seeded_collection() {
    let (client, transport) = client(paged());
    let mut view = CollectionView::new(client);
    let seeded = Collection {
      id: ROOT.into(),
      ordered_items: vec![Item::Reference("stale".into())],
      first: Some(Link::Inline(json!({"id": P1, "type": "OrderedCollectionPage"}))),
      ..Collection::default()
    };

    view.open(seeded).await.unwrap();

    assert_eq!(ids(&view), vec!["a", "b", "c"]);
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_cancelled_view_returns_to_idle() {
    let (client, _) = client(paged());
    let mut view = CollectionView::new(client);
    view.cancel();

    assert_eq!(view.resolve(ROOT).await, Err(FetchError::Cancelled));
    assert_eq!(view.state(), TraversalState::Idle);
  }
}
