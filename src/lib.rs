//! Federated search core for a 3D-printable model storefront.
//!
//! One [`QueryRequest`] fans out to the local catalog and an external
//! provider concurrently, and the merged, ranked page comes back through a
//! watch channel: a partial page as soon as local data lands, the complete
//! page once the external fetch resolves. Submitting a new request
//! supersedes the previous one; a superseded generation never reaches
//! subscribers.
//!
//! ```no_run
//! use modelfind::{FederatedSearch, QueryRequest, SearchConfig};
//!
//! # tokio_test::block_on(async {
//! let search = FederatedSearch::from_config(SearchConfig::from_env()).unwrap();
//! let page = search
//!     .search_once(QueryRequest::with_query("dragon statue"))
//!     .await
//!     .unwrap();
//! println!("{} of ~{} results", page.items.len(), page.estimated_total);
//! # });
//! ```

pub mod compat;
pub mod config;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod refdata;
pub mod scoring;
pub mod sources;
pub mod types;

pub use config::SearchConfig;
pub use error::{SearchError, SearchResult};
pub use orchestrator::{FederatedSearch, SearchUpdate};
pub use types::{CanonicalItem, ItemSource, QueryRequest, ResultPage, SortBy, TagRef};
