//! Collection traversal: interactive paging and eager fetching.
//!
//! Manual navigation is non-cumulative (each page replaces the items);
//! incremental consumption appends. Neither dereferences items.

mod eager;
mod model;
mod state;
mod view;

pub use eager::{fetch_all, fetch_all_with, FetchAllOptions};
pub use model::{load_page, Collection, Item, Link, Page};
pub use state::TraversalState;
pub use view::{CollectionView, Controls, Direction};
