//! The marketplace endpoint catalog.

use crate::http::HttpMethod;

/// Every remote operation the client knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    StartServer,
    StopServer,
    ModifyServer,
    DeleteServer,
    ListVirtualMachines,
    GetVmDetails,
    DeployMachine,
    ListHostnodes,
    GetHostnode(String),
    ListAuthorizations,
    TestAuthorization,
    RetrieveBalance,
    /// Both the new and existing spot validations post here; the payload
    /// shape tells the server which one is meant.
    ValidateSpotPrice,
}

impl Endpoint {
    pub fn method(&self) -> HttpMethod {
        match self {
            Endpoint::ListHostnodes | Endpoint::GetHostnode(_) => HttpMethod::Get,
            _ => HttpMethod::Post,
        }
    }

    /// Path relative to the API root, without a leading slash. Hostnode ids
    /// are percent-encoded as a single path segment.
    pub fn path(&self) -> String {
        match self {
            Endpoint::StartServer => "client/start/single".to_string(),
            Endpoint::StopServer => "client/stop/single".to_string(),
            Endpoint::ModifyServer => "client/modify/single".to_string(),
            Endpoint::DeleteServer => "client/delete/single".to_string(),
            Endpoint::ListVirtualMachines => "client/list".to_string(),
            Endpoint::GetVmDetails => "client/get/single".to_string(),
            Endpoint::DeployMachine => "client/deploy/single".to_string(),
            Endpoint::ListHostnodes => "client/deploy/hostnodes".to_string(),
            Endpoint::GetHostnode(id) => {
                format!("client/deploy/hostnodes/{}", urlencoding::encode(id))
            }
            Endpoint::ListAuthorizations => "auth/list".to_string(),
            Endpoint::TestAuthorization => "auth/test".to_string(),
            Endpoint::RetrieveBalance => "billing/balance".to_string(),
            Endpoint::ValidateSpotPrice => "client/spot/validate/new".to_string(),
        }
    }
}
