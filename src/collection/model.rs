//! Collection, page and item shapes as they appear on the wire.
//!
//! Navigation links and items are either a bare IRI or an inline object;
//! both are kept as [`Link`]/[`Item`] variants and resolved in one place,
//! [`load_page`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::http::Client;

/// A navigation link: `first`, `last`, `next` or `prev`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Link {
  Reference(String),
  Inline(Value),
}

impl Link {
  /// The IRI this link points at, if it has one.
  pub fn iri(&self) -> Option<&str> {
    match self {
      Link::Reference(iri) => Some(iri),
      Link::Inline(value) => value.get("id").and_then(Value::as_str),
    }
  }
}

/// One entry of `orderedItems`. Never dereferenced here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Item {
  Reference(String),
  Inline(Value),
}

impl Item {
  pub fn id(&self) -> Option<&str> {
    match self {
      Item::Reference(iri) => Some(iri),
      Item::Inline(value) => value.get("id").and_then(Value::as_str),
    }
  }
}

/// Every field a collection or page may carry. `orderedItems` wins over
/// `items` when both are present.
///
/// `type` and `totalItems` are read loosely: `type` may be a list and
/// `totalItems` may arrive as a string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
  id: Option<String>,
  #[serde(rename = "type")]
  kind: Option<Value>,
  total_items: Option<Value>,
  ordered_items: Option<Vec<Item>>,
  items: Option<Vec<Item>>,
  first: Option<Link>,
  last: Option<Link>,
  next: Option<Link>,
  prev: Option<Link>,
}

impl RawDocument {
  fn parse(iri: &str, document: Value) -> Result<Self, FetchError> {
    serde_json::from_value(document).map_err(|e| FetchError::NotFound {
      reason: format!("{} is not a collection: {}", iri, e),
    })
  }

  fn take_items(&mut self) -> Option<Vec<Item>> {
    self.ordered_items.take().or_else(|| self.items.take())
  }

  /// The first type name, whether `type` is a string or a list.
  fn kind(&self) -> Option<String> {
    match self.kind.as_ref()? {
      Value::String(kind) => Some(kind.clone()),
      Value::Array(kinds) => kinds.iter().find_map(Value::as_str).map(String::from),
      _ => None,
    }
  }

  fn total_items(&self) -> Option<u64> {
    match self.total_items.as_ref()? {
      Value::Number(n) => n.as_u64(),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    }
  }
}

fn is_empty_document(document: &Value) -> bool {
  match document {
    Value::Object(fields) => fields.is_empty(),
    _ => true,
  }
}

/// A paginated collection, mutated in place as pages arrive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
  pub id: String,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub total_items: Option<u64>,
  pub ordered_items: Vec<Item>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub first: Option<Link>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last: Option<Link>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub next: Option<Link>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub prev: Option<Link>,
}

impl Collection {
  /// Build a collection from its fetched document. An empty or non-object
  /// document is NotFound. A missing `id` falls back to `iri`.
  pub fn from_document(iri: &str, document: Value) -> Result<Self, FetchError> {
    if is_empty_document(&document) {
      return Err(FetchError::empty_document(iri));
    }
    let mut raw = RawDocument::parse(iri, document)?;
    Ok(Self {
      ordered_items: raw.take_items().unwrap_or_default(),
      kind: raw.kind(),
      total_items: raw.total_items(),
      id: raw.id.unwrap_or_else(|| iri.to_string()),
      first: raw.first,
      last: raw.last,
      next: raw.next,
      prev: raw.prev,
    })
  }

  /// True when the collection carries any navigation link.
  pub fn is_paged(&self) -> bool {
    self.first.is_some() || self.prev.is_some() || self.next.is_some() || self.last.is_some()
  }

  /// Fold a fetched page into the collection.
  ///
  /// Items are appended; `first`/`last` are replaced only when the page has
  /// them; `next` always follows the page. `prev` follows the page only when
  /// `keep_prev` is false.
  pub fn absorb(&mut self, page: Page, keep_prev: bool) {
    if let Some(items) = page.items {
      self.ordered_items.extend(items);
    }
    if page.first.is_some() {
      self.first = page.first;
    }
    if page.last.is_some() {
      self.last = page.last;
    }
    self.next = page.next;
    if !keep_prev {
      self.prev = page.prev;
    }
  }
}

/// One fetched fragment of a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
  pub id: Option<String>,
  /// `None` when the page has neither item field.
  pub items: Option<Vec<Item>>,
  pub first: Option<Link>,
  pub last: Option<Link>,
  pub next: Option<Link>,
  pub prev: Option<Link>,
}

impl Page {
  /// Build a page from its fetched document. An empty or non-object page has
  /// no items and no links, which ends paging.
  pub fn from_document(iri: &str, document: Value) -> Result<Self, FetchError> {
    if is_empty_document(&document) {
      return Ok(Self::default());
    }
    let mut raw = RawDocument::parse(iri, document)?;
    Ok(Self {
      items: raw.take_items(),
      id: raw.id,
      first: raw.first,
      last: raw.last,
      next: raw.next,
      prev: raw.prev,
    })
  }

  pub fn len(&self) -> usize {
    self.items.as_ref().map_or(0, Vec::len)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// True only when the page carries an item list and that list is empty.
  /// A page with no item field at all is not a tail.
  pub fn has_empty_items(&self) -> bool {
    self.items.as_ref().is_some_and(Vec::is_empty)
  }
}

/// Fetch the page behind `link`.
///
/// A link with an IRI (bare, or inline with an `id`) is always fetched; an
/// inline page without an `id` is used as it is.
pub async fn load_page(client: &Client, link: &Link, cancel: &CancellationToken) -> Result<Page, FetchError> {
  match link.iri() {
    Some(iri) => {
      let document = client.get_document(iri, cancel).await?;
      Page::from_document(iri, document)
    }
    None => Page::from_document("inline page", link_value(link)),
  }
}

fn link_value(link: &Link) -> Value {
  match link {
    Link::Reference(iri) => Value::String(iri.clone()),
    Link::Inline(value) => value.clone(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_links_and_items_keep_their_shape() {
    let collection = Collection::from_document(
      "https://a.example/outbox",
      json!({
        "id": "https://a.example/outbox",
        "type": "OrderedCollection",
        "totalItems": 3,
        "orderedItems": ["https://a.example/1", {"id": "https://a.example/2", "type": "Note"}],
        "first": {"id": "https://a.example/outbox?page=1", "type": "OrderedCollectionPage"},
        "last": "https://a.example/outbox?page=9"
      }),
    )
    .unwrap();

    assert_eq!(collection.total_items, Some(3));
    assert_eq!(collection.ordered_items[0], Item::Reference("https://a.example/1".into()));
    assert_eq!(collection.ordered_items[1].id(), Some("https://a.example/2"));
    assert!(matches!(collection.first, Some(Link::Inline(_))));
    assert_eq!(
      collection.first.as_ref().and_then(Link::iri),
      Some("https://a.example/outbox?page=1")
    );
    assert_eq!(
      collection.last,
      Some(Link::Reference("https://a.example/outbox?page=9".into()))
    );
    assert!(collection.next.is_none());
  }

  #[test]
  fn test_empty_documents_are_not_found() {
    for document in [json!({}), json!(null), json!("text"), json!([1, 2])] {
      assert!(matches!(
        Collection::from_document("https://a.example/c", document),
        Err(FetchError::NotFound { .. })
      ));
    }
  }

  #[test]
  fn test_type_list_and_string_total_are_accepted() {
    let collection = Collection::from_document(
      "https://a.example/outbox",
      json!({
        "id": "https://a.example/outbox",
        "type": ["OrderedCollection", "https://schema.example/Feed"],
        "totalItems": "3",
        "orderedItems": ["x"]
      }),
    )
    .unwrap();
    assert_eq!(collection.kind.as_deref(), Some("OrderedCollection"));
    assert_eq!(collection.total_items, Some(3));
    assert_eq!(collection.ordered_items, vec![Item::Reference("x".into())]);

    let collection = Collection::from_document(
      "https://a.example/outbox",
      json!({"type": {"odd": true}, "totalItems": "many", "orderedItems": []}),
    )
    .unwrap();
    assert_eq!(collection.kind, None);
    assert_eq!(collection.total_items, None);
  }

  #[test]
  fn test_empty_page_has_no_links() {
    for document in [json!({}), json!(null), json!("text")] {
      let page = Page::from_document("https://a.example/c?page=9", document).unwrap();
      assert_eq!(page, Page::default());
      assert!(!page.has_empty_items());
    }
    let page = Page::from_document("https://a.example/c?page=9", json!({"orderedItems": []})).unwrap();
    assert!(page.has_empty_items());
  }

  #[test]
  fn test_page_prefers_ordered_items() {
    let page = Page::from_document(
      "https://a.example/c?page=1",
      json!({"orderedItems": ["a"], "items": ["b", "c"]}),
    )
    .unwrap();
    assert_eq!(page.items, Some(vec![Item::Reference("a".into())]));

    let page = Page::from_document("https://a.example/c?page=1", json!({"items": ["b"]})).unwrap();
    assert_eq!(page.len(), 1);

    let page = Page::from_document("https://a.example/c?page=1", json!({"type": "Page"})).unwrap();
    assert!(page.items.is_none());
    assert!(page.is_empty());
  }

  #[test]
  fn test_absorb_link_rules() {
    let mut collection = Collection {
      id: "c".into(),
      first: Some(Link::Reference("p1".into())),
      last: Some(Link::Reference("p9".into())),
      next: Some(Link::Reference("p2".into())),
      prev: Some(Link::Reference("p0".into())),
      ..Collection::default()
    };

    // A page without next clears it; without first/last keeps them.
    collection.absorb(
      Page {
        items: Some(vec![Item::Reference("x".into())]),
        prev: Some(Link::Reference("p1".into())),
        ..Page::default()
      },
      true,
    );
    assert_eq!(collection.next, None);
    assert_eq!(collection.first, Some(Link::Reference("p1".into())));
    assert_eq!(collection.prev, Some(Link::Reference("p0".into())));

    collection.absorb(
      Page {
        prev: Some(Link::Reference("p8".into())),
        ..Page::default()
      },
      false,
    );
    assert_eq!(collection.prev, Some(Link::Reference("p8".into())));
    assert_eq!(collection.ordered_items.len(), 1);
  }

  #[test]
  fn test_serializes_in_wire_shape() {
    let collection = Collection {
      id: "https://a.example/c".into(),
      total_items: Some(1),
      ordered_items: vec![Item::Reference("https://a.example/1".into())],
      ..Collection::default()
    };
    assert_eq!(
      serde_json::to_value(&collection).unwrap(),
      json!({
        "id": "https://a.example/c",
        "totalItems": 1,
        "orderedItems": ["https://a.example/1"]
      })
    );
  }
}
