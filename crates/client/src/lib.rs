//! SBX Cloud client SDK.
//!
//! Builds queries against platform models and retrieves their results:
//! single pages with [`FindSession::find`], every page at once with
//! [`FindSession::load_all`], and deletes with [`FindSession::delete`].
//! Related entities the server returns in `fetched_results` can be mapped
//! back into the primary records with a [`FetchSpec`].

pub mod client;
pub mod config;
pub mod error;
pub mod loader;
pub mod mapper;
pub mod outcome;
pub mod page;
pub mod query;
pub mod session;
pub mod transport;

pub use client::{DELETE_PATH, FIND_PATH, SbxClient};
pub use config::ClientConfig;
pub use error::{Result, SdkError};
pub use loader::{AccumulatedResult, LoadAllSettings, PaginatedLoader};
pub use mapper::{FetchPath, FetchSpec, map_fetches_result};
pub use outcome::{FALLBACK_ERROR, Outcome, ServerFailure};
pub use page::{FetchedResults, PageFetcher, PageResult, Record};
pub use query::{CompiledQuery, QueryBuilder, Sort};
pub use session::FindSession;
pub use transport::{HttpTransport, Transport};
