//! Synchronous client for the TensorDock GPU marketplace API.
//!
//! # Overview
//! One method per remote endpoint: deploy, start, stop, modify and delete
//! virtual machines, browse hostnodes, check authorizations and balance, and
//! validate spot-instance bids. Every request carries the organization's
//! API key and token.
//!
//! # Design
//! - `MarketplaceClient` builds `HttpRequest` values and parses
//!   `HttpResponse` values without touching the network (host-does-IO).
//! - `TensorDock` executes those requests through a `Transport`
//!   (`UreqTransport` by default) and returns `Result<Value, ApiError>`.
//! - `ApiResultExt::into_json` turns any result into plain JSON, with
//!   failures rendered as `{"error": "<message>"}`.
//! - Credentials and settings are immutable values passed at construction;
//!   there is no global state.
//!
//! ```no_run
//! use tensordock_core::{ApiResultExt, Credentials, TensorDock};
//!
//! let api = TensorDock::new(Credentials::new("API_KEY", "API_TOKEN"));
//! let reply = api.test_authorization().into_json();
//! println!("{reply}");
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod transport;
pub mod types;

pub use api::TensorDock;
pub use client::MarketplaceClient;
pub use config::{ClientConfig, Credentials, DEFAULT_BASE_URL};
pub use endpoint::Endpoint;
pub use error::{ApiError, ApiResultExt};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{Transport, UreqTransport};
pub use types::{DeployMachine, DeploymentType, HostnodeFilter, ModifyServer, NewSpotPrice};
