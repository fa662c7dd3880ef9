//! querypipe: Pluggable Operation Pipeline
//!
//! Executes GraphQL-style operations through an ordered chain of plugins. Each plugin may
//! publish a result, terminate the chain, or let later plugins run in the background after
//! the caller already has its answer. The default chain is cache, dedup, fetch.
//!
//! ```no_run
//! use querypipe::{Client, ClientOptions, OperationRequest};
//!
//! # async fn demo() -> Result<(), querypipe::ClientError> {
//! let client = Client::new(ClientOptions::new("https://api.example.com/graphql"))?;
//! let result = client
//!     .execute_query(OperationRequest::new("{ posts { id title } }"), None)
//!     .await?;
//! println!("{:?}", result.data);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod key;
pub mod logging;
pub mod plugin;
pub mod plugins;
pub mod transport;
pub mod types;

pub use client::{Client, ClientOptions, QueryContext};
pub use config::{ConfigLoader, QuerypipeConfig};
pub use document::{QueryDocument, QuerySource};
pub use error::{ClientError, CombinedError, GraphQLError, NetworkError, TransportError};
pub use key::{query_key, OperationKey};
pub use plugin::{plugin_fn, Plugin, PluginContext};
pub use transport::{FetchOptions, HttpTransport, Transport, TransportRequest, TransportResponse};
pub use types::{
    CachePolicy, Operation, OperationKind, OperationRequest, OperationResult, Outcome,
    StandardResult, SubscriptionStream, Variables,
};
