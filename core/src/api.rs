//! One method per marketplace endpoint.
//!
//! `TensorDock` pairs a `MarketplaceClient` with a `Transport`: every method
//! builds the request, sends it once, and parses the reply. Failures come
//! back as `Err(ApiError)`; use `ApiResultExt::into_json` to get the
//! `{"error": ...}` object instead. Nothing is retried.

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::client::MarketplaceClient;
use crate::config::{ClientConfig, Credentials};
use crate::error::ApiError;
use crate::http::HttpRequest;
use crate::transport::{Transport, UreqTransport};
use crate::types::{DeployMachine, HostnodeFilter, ModifyServer, NewSpotPrice};

/// Marketplace API client.
///
/// Holds only immutable configuration, so a single instance can be shared
/// across threads.
pub struct TensorDock<T: Transport = UreqTransport> {
    client: MarketplaceClient,
    transport: T,
    debug: bool,
}

impl TensorDock<UreqTransport> {
    /// Client for the production API with default settings.
    pub fn new(credentials: Credentials) -> Self {
        Self::with_config(credentials, ClientConfig::default())
    }

    pub fn with_config(credentials: Credentials, config: ClientConfig) -> Self {
        let transport = UreqTransport::new(config.timeout);
        Self::with_transport(credentials, config, transport)
    }

    /// Credentials and settings from `TENSORDOCK_*` environment variables.
    ///
    /// # Errors
    /// Returns `ApiError::Config` if credentials are missing or a setting
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ApiError> {
        let credentials = Credentials::from_env()?;
        let config = ClientConfig::from_env()?;
        Ok(Self::with_config(credentials, config))
    }
}

impl<T: Transport> TensorDock<T> {
    pub fn with_transport(credentials: Credentials, config: ClientConfig, transport: T) -> Self {
        Self {
            client: MarketplaceClient::new(&config.base_url, credentials),
            transport,
            debug: config.debug,
        }
    }

    /// The underlying request builder.
    pub fn client(&self) -> &MarketplaceClient {
        &self.client
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Send a built request and parse the reply.
    ///
    /// In debug mode the outcome is also pretty-printed to stdout.
    pub fn send(&self, request: HttpRequest) -> Result<Value, ApiError> {
        debug!(method = %request.method, url = %request.url, "sending request");

        let result = self
            .transport
            .execute(&request)
            .and_then(|response| self.client.parse_response(response));

        if let Err(err) = &result {
            warn!(method = %request.method, url = %request.url, error = %err, "request failed");
        }
        if self.debug {
            pretty_print(&result);
        }
        result
    }

    pub fn start_server(&self, server: &str) -> Result<Value, ApiError> {
        self.send(self.client.build_start_server(server))
    }

    /// Stop a VM. With `disassociate_resources` the GPU is released and only
    /// storage keeps being billed.
    pub fn stop_server(
        &self,
        server: &str,
        disassociate_resources: bool,
    ) -> Result<Value, ApiError> {
        self.send(self.client.build_stop_server(server, disassociate_resources))
    }

    /// `stop_server` with the GPU released, the marketplace default.
    pub fn stop_server_releasing(&self, server: &str) -> Result<Value, ApiError> {
        self.stop_server(server, true)
    }

    pub fn modify_server(&self, input: &ModifyServer) -> Result<Value, ApiError> {
        self.send(self.client.build_modify_server(input))
    }

    pub fn delete_server(&self, server: &str) -> Result<Value, ApiError> {
        self.send(self.client.build_delete_server(server))
    }

    pub fn list_virtual_machines(&self) -> Result<Value, ApiError> {
        self.send(self.client.build_list_virtual_machines())
    }

    pub fn get_vm_details(&self, server: &str) -> Result<Value, ApiError> {
        self.send(self.client.build_get_vm_details(server))
    }

    pub fn deploy_machine(&self, input: &DeployMachine) -> Result<Value, ApiError> {
        self.send(self.client.build_deploy_machine(input))
    }

    pub fn list_available_hostnodes(&self, filter: &HostnodeFilter) -> Result<Value, ApiError> {
        self.send(self.client.build_list_available_hostnodes(filter))
    }

    pub fn get_specific_hostnode(&self, id: &str) -> Result<Value, ApiError> {
        self.send(self.client.build_get_specific_hostnode(id))
    }

    pub fn list_authorizations(&self) -> Result<Value, ApiError> {
        self.send(self.client.build_list_authorizations())
    }

    /// `{"success": true}` when the key/token pair is valid.
    pub fn test_authorization(&self) -> Result<Value, ApiError> {
        self.send(self.client.build_test_authorization())
    }

    pub fn retrieve_balance(&self) -> Result<Value, ApiError> {
        self.send(self.client.build_retrieve_balance())
    }

    /// Whether a spot deployment with these resources would succeed at `price`.
    pub fn validate_new_spot_price(&self, input: &NewSpotPrice) -> Result<Value, ApiError> {
        self.send(self.client.build_validate_new_spot_price(input))
    }

    /// Whether an existing VM would keep (or start) running at `price`.
    pub fn validate_existing_spot_price(
        &self,
        server: &str,
        price: f64,
    ) -> Result<Value, ApiError> {
        self.send(self.client.build_validate_existing_spot_price(server, price))
    }
}

impl<T: Transport> std::fmt::Debug for TensorDock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorDock")
            .field("client", &self.client)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

fn pretty_print(result: &Result<Value, ApiError>) {
    let rendered = match result {
        Ok(value) => serde_json::to_string_pretty(value),
        Err(err) => serde_json::to_string_pretty(&err.to_json()),
    };
    match rendered {
        Ok(text) => println!("{text}"),
        Err(e) => error!(error = %e, "could not format response"),
    }
}
