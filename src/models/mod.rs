//! Domain types shared by the store, the cache and the HTTP layer.
//!
//! - `commit`: Commit and its invariants, CommitsList
//! - `filters`: FilterKey, Filters, FilterValues
//! - `search`: SearchRequest, cursor and date parsing, CommitsPage

pub mod commit;
pub mod filters;
pub mod search;

pub use commit::*;
pub use filters::*;
pub use search::*;
