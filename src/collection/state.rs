use crate::error::FailureKind;

/// Where a collection traversal stands.
///
/// `Ready` re-enters `Loading` on refresh or navigation. `Failed` is terminal
/// until the next [`refresh`](super::CollectionView::refresh).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalState {
  /// Nothing has been requested yet
  #[default]
  Idle,
  /// A root or page fetch is outstanding
  Loading,
  /// The collection is loaded and may be paged
  Ready,
  /// The root could not be resolved
  Failed(FailureKind),
}

impl TraversalState {
  pub fn is_loading(&self) -> bool {
    matches!(self, TraversalState::Loading)
  }

  pub fn is_ready(&self) -> bool {
    matches!(self, TraversalState::Ready)
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, TraversalState::Failed(_))
  }

  pub fn failure(&self) -> Option<FailureKind> {
    match self {
      TraversalState::Failed(kind) => Some(*kind),
      _ => None,
    }
  }
}
