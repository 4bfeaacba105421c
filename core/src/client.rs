//! Stateless request builder and response parser for the marketplace API.
//!
//! # Design
//! `MarketplaceClient` holds the API root and the credential pair and carries
//! no mutable state between calls. Each endpoint has a `build_*` method that
//! produces an `HttpRequest`; every response goes through `parse_response`.
//! The caller (usually `TensorDock`) executes the round-trip in between,
//! which keeps this half deterministic and free of I/O.

use serde_json::Value;

use crate::config::{normalize_base_url, Credentials};
use crate::endpoint::Endpoint;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    format_bool, format_price, DeployMachine, HostnodeFilter, ModifyServer, NewSpotPrice,
};

/// Builds signed `HttpRequest` values and parses `HttpResponse` values
/// without touching the network.
#[derive(Debug, Clone)]
pub struct MarketplaceClient {
    base_url: String,
    credentials: Credentials,
}

impl MarketplaceClient {
    pub fn new(base_url: &str, credentials: Credentials) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn build_start_server(&self, server: &str) -> HttpRequest {
        self.request(Endpoint::StartServer, vec![field("server", server)])
    }

    pub fn build_stop_server(&self, server: &str, disassociate_resources: bool) -> HttpRequest {
        self.request(
            Endpoint::StopServer,
            vec![
                field("server", server),
                field("disassociate_resources", format_bool(disassociate_resources)),
            ],
        )
    }

    pub fn build_modify_server(&self, input: &ModifyServer) -> HttpRequest {
        self.request(Endpoint::ModifyServer, input.fields())
    }

    pub fn build_delete_server(&self, server: &str) -> HttpRequest {
        self.request(Endpoint::DeleteServer, vec![field("server", server)])
    }

    pub fn build_list_virtual_machines(&self) -> HttpRequest {
        self.request(Endpoint::ListVirtualMachines, Vec::new())
    }

    pub fn build_get_vm_details(&self, server: &str) -> HttpRequest {
        self.request(Endpoint::GetVmDetails, vec![field("server", server)])
    }

    pub fn build_deploy_machine(&self, input: &DeployMachine) -> HttpRequest {
        if input.external_ports.len() != input.internal_ports.len() {
            tracing::warn!(
                external = input.external_ports.len(),
                internal = input.internal_ports.len(),
                "port lists differ in length; sending as-is"
            );
        }
        self.request(Endpoint::DeployMachine, input.fields())
    }

    pub fn build_list_available_hostnodes(&self, filter: &HostnodeFilter) -> HttpRequest {
        self.request(Endpoint::ListHostnodes, filter.fields())
    }

    pub fn build_get_specific_hostnode(&self, id: &str) -> HttpRequest {
        self.request(Endpoint::GetHostnode(id.to_string()), Vec::new())
    }

    pub fn build_list_authorizations(&self) -> HttpRequest {
        self.request(Endpoint::ListAuthorizations, Vec::new())
    }

    pub fn build_test_authorization(&self) -> HttpRequest {
        self.request(Endpoint::TestAuthorization, Vec::new())
    }

    pub fn build_retrieve_balance(&self) -> HttpRequest {
        self.request(Endpoint::RetrieveBalance, Vec::new())
    }

    pub fn build_validate_new_spot_price(&self, input: &NewSpotPrice) -> HttpRequest {
        self.request(Endpoint::ValidateSpotPrice, input.fields())
    }

    pub fn build_validate_existing_spot_price(&self, server: &str, price: f64) -> HttpRequest {
        self.request(
            Endpoint::ValidateSpotPrice,
            vec![field("server", server), field("price", format_price(price))],
        )
    }

    /// Decode a 2xx body as JSON; map every other status to an `ApiError`.
    ///
    /// Decode failures name the response's content type when it has one.
    pub fn parse_response(&self, response: HttpResponse) -> Result<Value, ApiError> {
        check_status(&response)?;
        serde_json::from_str(&response.body).map_err(|e| {
            let message = match response.content_type() {
                Some(content_type) => format!("{e} (content-type: {content_type})"),
                None => e.to_string(),
            };
            ApiError::DeserializationError(message)
        })
    }

    /// Credentials first, then the endpoint's own fields. GET requests carry
    /// everything in the query string; POST requests in the form body.
    fn request(&self, endpoint: Endpoint, fields: Vec<(String, String)>) -> HttpRequest {
        let method = endpoint.method();
        let mut pairs = self.credentials.pairs();
        pairs.extend(fields);

        let (query, form) = match method {
            HttpMethod::Get => (pairs, Vec::new()),
            HttpMethod::Post => (Vec::new(), pairs),
        };

        HttpRequest {
            method,
            url: format!("{}{}", self.base_url, endpoint.path()),
            headers: vec![("Accept".to_string(), "application/json".to_string())],
            query,
            form,
        }
    }
}

fn field(name: &str, value: impl ToString) -> (String, String) {
    (name.to_string(), value.to_string())
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}
