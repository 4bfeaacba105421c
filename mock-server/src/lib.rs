//! In-process simulation of the TensorDock marketplace API.
//!
//! Serves every endpoint under `/api/v0` with in-memory state: a fixed
//! hostnode inventory, the virtual machines deployed so far, and a log of
//! every request received. Responses follow the marketplace's shape:
//! `{"success": true, ...}` on success, `{"success": false, "error": ...}`
//! for rejected operations.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub use axum::http::StatusCode;

pub const API_ROOT: &str = "/api/v0";

/// Credentials accepted by default.
pub const TEST_API_KEY: &str = "test-key";
pub const TEST_API_TOKEN: &str = "test-token";

/// Hourly rate charged for an on-demand GPU in the simulation.
const ON_DEMAND_GPU_RATE: f64 = 0.5;

#[derive(Clone, Debug)]
pub struct MockConfig {
    pub api_key: String,
    pub api_token: String,
    /// When set, every endpoint answers with this status.
    pub fail_with: Option<StatusCode>,
    /// Lowest accepted spot bid per GPU-hour.
    pub spot_floor: f64,
    pub starting_balance: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            api_key: TEST_API_KEY.to_string(),
            api_token: TEST_API_TOKEN.to_string(),
            fail_with: None,
            spot_floor: 0.1,
            starting_balance: 100.0,
        }
    }
}

impl MockConfig {
    pub fn failing(status: StatusCode) -> Self {
        Self {
            fail_with: Some(status),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortForward {
    pub external: u16,
    pub internal: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: String,
    pub name: String,
    pub status: String,
    pub hostnode: String,
    pub gpu_model: String,
    pub gpu_count: u32,
    pub vcpus: u32,
    pub ram: u32,
    pub storage: u32,
    pub operating_system: String,
    pub deployment_type: String,
    pub port_forwards: Vec<PortForward>,
    pub gpu_released: bool,
    pub spot_price: Option<f64>,
}

impl VirtualMachine {
    fn hourly_rate(&self) -> f64 {
        let per_gpu = self.spot_price.unwrap_or(ON_DEMAND_GPU_RATE);
        per_gpu * f64::from(self.gpu_count)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hostnode {
    pub id: String,
    pub location: String,
    pub gpu_model: String,
    pub gpu_vram: u32,
    pub gpu_available: u32,
    pub vcpus_available: u32,
    pub ram_available: u32,
    pub storage_available: u32,
    pub ports: Vec<u16>,
    /// Only listed for authenticated callers.
    pub reserved: bool,
}

/// One request as the server saw it, credentials included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub fields: HashMap<String, String>,
}

pub struct AppState {
    config: MockConfig,
    hostnodes: Vec<Hostnode>,
    vms: RwLock<HashMap<String, VirtualMachine>>,
    log: RwLock<Vec<RecordedRequest>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            hostnodes: default_hostnodes(),
            vms: RwLock::new(HashMap::new()),
            log: RwLock::new(Vec::new()),
        }
    }

    /// Every request received so far, oldest first.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.log.read().await.clone()
    }

    pub async fn virtual_machine(&self, id: &str) -> Option<VirtualMachine> {
        self.vms.read().await.get(id).cloned()
    }

    fn credentials_match(&self, fields: &HashMap<String, String>) -> bool {
        fields.get("api_key") == Some(&self.config.api_key)
            && fields.get("api_token") == Some(&self.config.api_token)
    }

    /// Log the request, then apply the configured failure and, when
    /// `require_auth` is set, the credential check.
    async fn admit(
        &self,
        method: &str,
        path: &str,
        fields: &HashMap<String, String>,
        require_auth: bool,
    ) -> Result<(), Reply> {
        self.log.write().await.push(RecordedRequest {
            method: method.to_string(),
            path: path.to_string(),
            fields: fields.clone(),
        });
        tracing::debug!(method, path, "mock request");

        if let Some(status) = self.config.fail_with {
            return Err((status, Json(failure("simulated failure"))));
        }
        if require_auth && !self.credentials_match(fields) {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(failure("invalid api_key or api_token")),
            ));
        }
        Ok(())
    }
}

type Reply = (StatusCode, Json<Value>);
type ApiResult = Result<Json<Value>, Reply>;
type Fields = HashMap<String, String>;

pub fn app() -> Router {
    app_with(MockConfig::default())
}

pub fn app_with(config: MockConfig) -> Router {
    router(Arc::new(AppState::new(config)))
}

/// Router over caller-owned state, so tests can inspect it afterwards.
pub fn router(state: SharedState) -> Router {
    let api = Router::new()
        .route("/client/start/single", post(start_server))
        .route("/client/stop/single", post(stop_server))
        .route("/client/modify/single", post(modify_server))
        .route("/client/delete/single", post(delete_server))
        .route("/client/list", post(list_virtual_machines))
        .route("/client/get/single", post(get_vm_details))
        .route("/client/deploy/single", post(deploy_machine))
        .route("/client/deploy/hostnodes", get(list_hostnodes))
        .route("/client/deploy/hostnodes/{id}", get(get_hostnode))
        .route("/client/spot/validate/new", post(validate_spot_price))
        .route("/auth/list", post(list_authorizations))
        .route("/auth/test", post(test_authorization))
        .route("/billing/balance", post(retrieve_balance));
    Router::new().nest(API_ROOT, api).with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, state: SharedState) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state)).await
}

async fn test_authorization(
    State(state): State<SharedState>,
    Form(fields): Form<Fields>,
) -> ApiResult {
    state.admit("POST", "/auth/test", &fields, true).await?;
    Ok(Json(json!({ "success": true })))
}

async fn list_authorizations(
    State(state): State<SharedState>,
    Form(fields): Form<Fields>,
) -> ApiResult {
    state.admit("POST", "/auth/list", &fields, true).await?;
    let key = &state.config.api_key;
    Ok(Json(json!({
        "success": true,
        "authorizations": {
            key.as_str(): { "api_key": key, "organization": "mock-org", "enabled": true }
        }
    })))
}

async fn retrieve_balance(
    State(state): State<SharedState>,
    Form(fields): Form<Fields>,
) -> ApiResult {
    state.admit("POST", "/billing/balance", &fields, true).await?;
    let rate: f64 = state
        .vms
        .read()
        .await
        .values()
        .filter(|vm| vm.status == "running")
        .map(VirtualMachine::hourly_rate)
        .sum();
    Ok(Json(json!({
        "success": true,
        "balance": state.config.starting_balance,
        "hourly_spending_rate": rate,
    })))
}

async fn list_virtual_machines(
    State(state): State<SharedState>,
    Form(fields): Form<Fields>,
) -> ApiResult {
    state.admit("POST", "/client/list", &fields, true).await?;
    let vms = state.vms.read().await;
    let listed: serde_json::Map<String, Value> = vms
        .iter()
        .map(|(id, vm)| (id.clone(), json!(vm)))
        .collect();
    Ok(Json(json!({ "success": true, "virtualmachines": listed })))
}

async fn get_vm_details(
    State(state): State<SharedState>,
    Form(fields): Form<Fields>,
) -> ApiResult {
    state.admit("POST", "/client/get/single", &fields, true).await?;
    let server = require(&fields, "server")?;
    match state.vms.read().await.get(server) {
        Some(vm) => Ok(Json(json!({ "success": true, "virtualmachine": vm }))),
        None => Ok(Json(failure("no such server"))),
    }
}

async fn start_server(
    State(state): State<SharedState>,
    Form(fields): Form<Fields>,
) -> ApiResult {
    state.admit("POST", "/client/start/single", &fields, true).await?;
    let server = require(&fields, "server")?;
    let mut vms = state.vms.write().await;
    let Some(vm) = vms.get_mut(server) else {
        return Ok(Json(failure("no such server")));
    };
    if vm.status == "running" {
        return Ok(Json(failure("server is already running")));
    }
    vm.status = "running".to_string();
    vm.gpu_released = false;
    Ok(Json(json!({ "success": true })))
}

async fn stop_server(
    State(state): State<SharedState>,
    Form(fields): Form<Fields>,
) -> ApiResult {
    state.admit("POST", "/client/stop/single", &fields, true).await?;
    let server = require(&fields, "server")?;
    let release = match fields.get("disassociate_resources").map(String::as_str) {
        None | Some("true") => true,
        Some("false") => false,
        Some(other) => {
            return Err(bad_request(&format!(
                "disassociate_resources must be true or false, got {other}"
            )))
        }
    };
    let mut vms = state.vms.write().await;
    let Some(vm) = vms.get_mut(server) else {
        return Ok(Json(failure("no such server")));
    };
    vm.status = "stopped".to_string();
    vm.gpu_released = release;
    Ok(Json(json!({ "success": true })))
}

async fn modify_server(
    State(state): State<SharedState>,
    Form(fields): Form<Fields>,
) -> ApiResult {
    state.admit("POST", "/client/modify/single", &fields, true).await?;
    let server = require(&fields, "server_id")?;
    let gpu_model = require(&fields, "gpu_model")?.to_string();
    let gpu_count = require_u32(&fields, "gpu_count")?;
    let ram = require_u32(&fields, "ram")?;
    let vcpus = require_u32(&fields, "vcpus")?;
    let storage = require_u32(&fields, "storage")?;

    let mut vms = state.vms.write().await;
    let Some(vm) = vms.get_mut(server) else {
        return Ok(Json(failure("no such server")));
    };
    if vm.deployment_type != "network" {
        return Ok(Json(failure("only network storage servers can be modified")));
    }
    if vm.status != "stopped" {
        return Ok(Json(failure("server must be stopped before modifying")));
    }
    vm.gpu_model = gpu_model;
    vm.gpu_count = gpu_count;
    vm.ram = ram;
    vm.vcpus = vcpus;
    vm.storage = storage;
    Ok(Json(json!({ "success": true })))
}

async fn delete_server(
    State(state): State<SharedState>,
    Form(fields): Form<Fields>,
) -> ApiResult {
    state.admit("POST", "/client/delete/single", &fields, true).await?;
    let server = require(&fields, "server")?;
    match state.vms.write().await.remove(server) {
        Some(_) => Ok(Json(json!({ "success": true }))),
        None => Ok(Json(failure("no such server"))),
    }
}

async fn deploy_machine(
    State(state): State<SharedState>,
    Form(fields): Form<Fields>,
) -> ApiResult {
    state.admit("POST", "/client/deploy/single", &fields, true).await?;

    let name = require(&fields, "name")?.to_string();
    let hostnode_id = require(&fields, "hostnode")?;
    let gpu_model = require(&fields, "gpu_model")?.to_string();
    let gpu_count = require_u32(&fields, "gpu_count")?;
    let vcpus = require_u32(&fields, "vcpus")?;
    let ram = require_u32(&fields, "ram")?;
    let storage = require_u32(&fields, "storage")?;
    let operating_system = require(&fields, "operating_system")?.to_string();
    require(&fields, "password")?;
    let external = parse_port_list(require(&fields, "external_ports")?)
        .ok_or_else(|| bad_request("external_ports must look like {80, 443}"))?;
    let internal = parse_port_list(require(&fields, "internal_ports")?)
        .ok_or_else(|| bad_request("internal_ports must look like {80, 443}"))?;
    let deployment_type = fields
        .get("deployment_type")
        .cloned()
        .unwrap_or_else(|| "local".to_string());
    let spot_price = match fields.get("price") {
        Some(raw) => Some(
            raw.parse::<f64>()
                .map_err(|_| bad_request("price must be a number"))?,
        ),
        None => None,
    };

    if deployment_type != "local" && deployment_type != "network" {
        return Ok(Json(failure("deployment_type must be local or network")));
    }
    if deployment_type == "network" && !fields.contains_key("location") {
        return Ok(Json(failure("location is required for network deployments")));
    }
    if external.len() != internal.len() {
        return Ok(Json(failure("external and internal port lists differ in length")));
    }
    let Some(hostnode) = state.hostnodes.iter().find(|h| h.id == hostnode_id) else {
        return Ok(Json(failure("no such hostnode")));
    };
    if hostnode.gpu_model != gpu_model || hostnode.gpu_available < gpu_count {
        return Ok(Json(failure("not enough GPUs of that model on hostnode")));
    }
    if let Some(port) = external.iter().find(|&&p| !hostnode.ports.contains(&p)) {
        return Ok(Json(failure(&format!("port {port} is not available on hostnode"))));
    }
    if let Some(price) = spot_price {
        if price < state.config.spot_floor {
            return Ok(Json(failure("bid is below the current spot price")));
        }
    }

    let port_forwards: Vec<PortForward> = external
        .iter()
        .zip(&internal)
        .map(|(&external, &internal)| PortForward { external, internal })
        .collect();
    let vm = VirtualMachine {
        id: Uuid::new_v4().to_string(),
        name,
        status: "running".to_string(),
        hostnode: hostnode.id.clone(),
        gpu_model,
        gpu_count,
        vcpus,
        ram,
        storage,
        operating_system,
        deployment_type,
        port_forwards: port_forwards.clone(),
        gpu_released: false,
        spot_price,
    };
    let forwarded: serde_json::Map<String, Value> = port_forwards
        .iter()
        .map(|pf| (pf.internal.to_string(), json!(pf.external)))
        .collect();
    let reply = json!({
        "success": true,
        "server": vm.id,
        "ip": "203.0.113.10",
        "port_forwards": forwarded,
        "cost": { "total_price": vm.hourly_rate() },
    });
    state.vms.write().await.insert(vm.id.clone(), vm);
    Ok(Json(reply))
}

async fn list_hostnodes(
    State(state): State<SharedState>,
    Query(params): Query<Fields>,
) -> ApiResult {
    let authenticated = params.contains_key("api_key") || params.contains_key("api_token");
    state
        .admit("GET", "/client/deploy/hostnodes", &params, authenticated)
        .await?;

    let min = |name: &str| -> Result<u32, Reply> {
        match params.get(name) {
            Some(raw) => raw
                .parse()
                .map_err(|_| bad_request(&format!("{name} must be an integer"))),
            None => Ok(0),
        }
    };
    let min_vcpus = min("minvCPUs")?;
    let min_ram = min("minRAM")?;
    let min_storage = min("minStorage")?;
    let min_vram = min("minVRAM")?;
    let min_gpu_count = min("minGPUCount")?;
    let rtx = params.get("requiresRTX").map(String::as_str) == Some("true");
    let gtx = params.get("requiresGTX").map(String::as_str) == Some("true");

    let listed: serde_json::Map<String, Value> = state
        .hostnodes
        .iter()
        .filter(|h| authenticated || !h.reserved)
        .filter(|h| h.vcpus_available >= min_vcpus)
        .filter(|h| h.ram_available >= min_ram)
        .filter(|h| h.storage_available >= min_storage)
        .filter(|h| h.gpu_vram >= min_vram)
        .filter(|h| h.gpu_available >= min_gpu_count)
        .filter(|h| !rtx || h.gpu_model.contains("rtx"))
        .filter(|h| !gtx || h.gpu_model.contains("gtx"))
        .map(|h| (h.id.clone(), json!(h)))
        .collect();
    Ok(Json(json!({ "success": true, "hostnodes": listed })))
}

async fn get_hostnode(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<Fields>,
) -> ApiResult {
    let path = format!("/client/deploy/hostnodes/{id}");
    state.admit("GET", &path, &params, false).await?;
    match state.hostnodes.iter().find(|h| h.id == id) {
        Some(hostnode) => Ok(Json(json!({ "success": true, "hostnode": hostnode }))),
        None => Err((StatusCode::NOT_FOUND, Json(failure("no such hostnode")))),
    }
}

/// Both spot validations share this path; a `server` field means the
/// existing-VM form.
async fn validate_spot_price(
    State(state): State<SharedState>,
    Form(fields): Form<Fields>,
) -> ApiResult {
    state
        .admit("POST", "/client/spot/validate/new", &fields, true)
        .await?;
    let price: f64 = require(&fields, "price")?
        .parse()
        .map_err(|_| bad_request("price must be a number"))?;

    if let Some(server) = fields.get("server") {
        if state.vms.read().await.get(server).is_none() {
            return Ok(Json(failure("no such server")));
        }
    } else {
        let hostnode_id = require(&fields, "hostnode")?;
        let gpu_model = require(&fields, "gpu_model")?;
        let gpu_count = require_u32(&fields, "gpu_count")?;
        require_u32(&fields, "vcpus")?;
        require_u32(&fields, "ram")?;
        require_u32(&fields, "storage")?;
        let available = state
            .hostnodes
            .iter()
            .any(|h| {
                h.id == hostnode_id && h.gpu_model == gpu_model && h.gpu_available >= gpu_count
            });
        if !available {
            return Ok(Json(json!({ "success": false })));
        }
    }
    Ok(Json(json!({ "success": price >= state.config.spot_floor })))
}

fn failure(message: &str) -> Value {
    json!({ "success": false, "error": message })
}

fn bad_request(message: &str) -> Reply {
    (StatusCode::BAD_REQUEST, Json(failure(message)))
}

fn require<'a>(fields: &'a Fields, name: &str) -> Result<&'a str, Reply> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| bad_request(&format!("missing field {name}")))
}

fn require_u32(fields: &Fields, name: &str) -> Result<u32, Reply> {
    require(fields, name)?
        .parse()
        .map_err(|_| bad_request(&format!("{name} must be an integer")))
}

/// Parse `{80, 443}` into `[80, 443]`. `{}` is an empty list.
pub fn parse_port_list(raw: &str) -> Option<Vec<u16>> {
    let inner = raw.trim().strip_prefix('{')?.strip_suffix('}')?.trim();
    if inner.is_empty() {
        return Some(Vec::new());
    }
    inner.split(',').map(|p| p.trim().parse().ok()).collect()
}

fn default_hostnodes() -> Vec<Hostnode> {
    vec![
        Hostnode {
            id: "hn-3090-nyc".to_string(),
            location: "New York City, New York, United States".to_string(),
            gpu_model: "geforcertx3090-pcie-24gb".to_string(),
            gpu_vram: 24,
            gpu_available: 4,
            vcpus_available: 32,
            ram_available: 128,
            storage_available: 2000,
            ports: vec![20022, 20080, 28888],
            reserved: false,
        },
        Hostnode {
            id: "hn-a6000-chi".to_string(),
            location: "Chicago, Illinois, United States".to_string(),
            gpu_model: "rtxa6000-pcie-48gb".to_string(),
            gpu_vram: 48,
            gpu_available: 8,
            vcpus_available: 64,
            ram_available: 512,
            storage_available: 8000,
            ports: vec![30022, 30080, 30443],
            reserved: false,
        },
        Hostnode {
            id: "hn-1080-lv".to_string(),
            location: "Las Vegas, Nevada, United States".to_string(),
            gpu_model: "geforcegtx1080ti-pcie-11gb".to_string(),
            gpu_vram: 11,
            gpu_available: 2,
            vcpus_available: 8,
            ram_available: 32,
            storage_available: 500,
            ports: vec![40022],
            reserved: false,
        },
        Hostnode {
            id: "hn-a100-reserved".to_string(),
            location: "Chicago, Illinois, United States".to_string(),
            gpu_model: "a100-pcie-80gb".to_string(),
            gpu_vram: 80,
            gpu_available: 8,
            vcpus_available: 128,
            ram_available: 1024,
            storage_available: 16000,
            ports: vec![50022],
            reserved: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_list_parses_braced_form() {
        assert_eq!(parse_port_list("{80, 443}"), Some(vec![80, 443]));
        assert_eq!(parse_port_list("{22}"), Some(vec![22]));
        assert_eq!(parse_port_list("{}"), Some(Vec::new()));
    }

    #[test]
    fn port_list_rejects_other_shapes() {
        assert_eq!(parse_port_list("80, 443"), None);
        assert_eq!(parse_port_list("[80, 443]"), None);
        assert_eq!(parse_port_list("{80, http}"), None);
    }

    #[test]
    fn spot_vm_rate_uses_bid() {
        let vm = VirtualMachine {
            id: "vm".to_string(),
            name: "n".to_string(),
            status: "running".to_string(),
            hostnode: "hn".to_string(),
            gpu_model: "m".to_string(),
            gpu_count: 2,
            vcpus: 4,
            ram: 16,
            storage: 100,
            operating_system: "os".to_string(),
            deployment_type: "local".to_string(),
            port_forwards: Vec::new(),
            gpu_released: false,
            spot_price: Some(0.25),
        };
        assert_eq!(vm.hourly_rate(), 0.5);
        let on_demand = VirtualMachine {
            spot_price: None,
            ..vm
        };
        assert_eq!(on_demand.hourly_rate(), 1.0);
    }

    #[test]
    fn failing_config_keeps_default_credentials() {
        let config = MockConfig::failing(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(config.api_key, TEST_API_KEY);
        assert_eq!(config.fail_with, Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn reserved_hostnode_is_in_inventory() {
        assert!(default_hostnodes().iter().any(|h| h.reserved));
    }
}
