//! Typed arguments for the marketplace endpoints and their wire encoding.
//!
//! # Design
//! The API accepts every field as a string. Each argument type knows how to
//! flatten itself into ordered `(name, value)` pairs; the client then merges
//! credentials in. Optional fields that are `None` are left out of the pairs
//! entirely rather than sent as empty strings.
//!
//! The types also derive `Deserialize` so test vectors can describe inputs
//! as JSON.

use serde::{Deserialize, Serialize};

/// Where a VM's disk lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    /// Storage on the hostnode itself.
    #[default]
    Local,
    /// Network storage. Required for CPU-only servers and for `modify_server`.
    Network,
}

impl DeploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentType::Local => "local",
            DeploymentType::Network => "network",
        }
    }
}

/// Arguments for `deploy_machine`.
///
/// `external_ports[i]` forwards to `internal_ports[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployMachine {
    pub name: String,
    pub gpu_count: u32,
    pub gpu_model: String,
    pub vcpus: u32,
    pub ram: u32,
    pub external_ports: Vec<u16>,
    pub internal_ports: Vec<u16>,
    pub hostnode: String,
    pub storage: u32,
    pub operating_system: String,
    pub password: String,
    #[serde(default)]
    pub deployment_type: DeploymentType,
    /// Required for CPU-only deployments.
    #[serde(default)]
    pub cpu_model: Option<String>,
    /// Required for network deployments.
    #[serde(default)]
    pub location: Option<String>,
    /// Appended to the vendor's cloud-init script.
    #[serde(default)]
    pub cloudinit_script: Option<String>,
    /// Set to deploy a spot instance.
    #[serde(default)]
    pub price_type: Option<String>,
    /// Spot bid, per hour.
    #[serde(default)]
    pub price: Option<f64>,
}

impl DeployMachine {
    /// A local-storage deployment with no optional fields set.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        gpu_count: u32,
        gpu_model: impl Into<String>,
        vcpus: u32,
        ram: u32,
        external_ports: Vec<u16>,
        internal_ports: Vec<u16>,
        hostnode: impl Into<String>,
        storage: u32,
        operating_system: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            gpu_count,
            gpu_model: gpu_model.into(),
            vcpus,
            ram,
            external_ports,
            internal_ports,
            hostnode: hostnode.into(),
            storage,
            operating_system: operating_system.into(),
            password: password.into(),
            deployment_type: DeploymentType::Local,
            cpu_model: None,
            location: None,
            cloudinit_script: None,
            price_type: None,
            price: None,
        }
    }

    #[must_use]
    pub fn with_deployment_type(mut self, deployment_type: DeploymentType) -> Self {
        self.deployment_type = deployment_type;
        self
    }

    #[must_use]
    pub fn with_cpu_model(mut self, cpu_model: impl Into<String>) -> Self {
        self.cpu_model = Some(cpu_model.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_cloudinit_script(mut self, script: impl Into<String>) -> Self {
        self.cloudinit_script = Some(script.into());
        self
    }

    /// Bid for a spot instance at `price`.
    #[must_use]
    pub fn with_spot_price(mut self, price_type: impl Into<String>, price: f64) -> Self {
        self.price_type = Some(price_type.into());
        self.price = Some(price);
        self
    }

    pub(crate) fn fields(&self) -> Vec<(String, String)> {
        let mut fields = FieldList::default();
        fields.push("name", &self.name);
        fields.push("gpu_count", self.gpu_count);
        fields.push("gpu_model", &self.gpu_model);
        fields.push("vcpus", self.vcpus);
        fields.push("ram", self.ram);
        fields.push("external_ports", format_ports(&self.external_ports));
        fields.push("internal_ports", format_ports(&self.internal_ports));
        fields.push("hostnode", &self.hostnode);
        fields.push("storage", self.storage);
        fields.push("operating_system", &self.operating_system);
        fields.push("password", &self.password);
        fields.push("deployment_type", self.deployment_type.as_str());
        fields.push_opt("cpu_model", self.cpu_model.as_ref());
        fields.push_opt("location", self.location.as_ref());
        fields.push_opt("cloudinit_script", self.cloudinit_script.as_ref());
        fields.push_opt("price_type", self.price_type.as_ref());
        fields.push_opt("price", self.price.map(format_price));
        fields.into_inner()
    }
}

/// Arguments for `modify_server`. The VM must use network storage and be
/// stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyServer {
    pub server_id: String,
    pub gpu_model: String,
    pub gpu_count: u32,
    pub ram: u32,
    pub vcpus: u32,
    pub storage: u32,
}

impl ModifyServer {
    pub(crate) fn fields(&self) -> Vec<(String, String)> {
        let mut fields = FieldList::default();
        fields.push("server_id", &self.server_id);
        fields.push("gpu_model", &self.gpu_model);
        fields.push("gpu_count", self.gpu_count);
        fields.push("ram", self.ram);
        fields.push("vcpus", self.vcpus);
        fields.push("storage", self.storage);
        fields.into_inner()
    }
}

/// Optional filters for `list_available_hostnodes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostnodeFilter {
    pub min_vcpus: Option<u32>,
    pub min_ram: Option<u32>,
    pub min_storage: Option<u32>,
    pub min_vram: Option<u32>,
    pub min_gpu_count: Option<u32>,
    pub requires_rtx: Option<bool>,
    pub requires_gtx: Option<bool>,
}

impl HostnodeFilter {
    #[must_use]
    pub fn min_vcpus(mut self, n: u32) -> Self {
        self.min_vcpus = Some(n);
        self
    }

    #[must_use]
    pub fn min_ram(mut self, gb: u32) -> Self {
        self.min_ram = Some(gb);
        self
    }

    #[must_use]
    pub fn min_storage(mut self, gb: u32) -> Self {
        self.min_storage = Some(gb);
        self
    }

    #[must_use]
    pub fn min_vram(mut self, gb: u32) -> Self {
        self.min_vram = Some(gb);
        self
    }

    #[must_use]
    pub fn min_gpu_count(mut self, n: u32) -> Self {
        self.min_gpu_count = Some(n);
        self
    }

    #[must_use]
    pub fn requires_rtx(mut self, required: bool) -> Self {
        self.requires_rtx = Some(required);
        self
    }

    #[must_use]
    pub fn requires_gtx(mut self, required: bool) -> Self {
        self.requires_gtx = Some(required);
        self
    }

    pub(crate) fn fields(&self) -> Vec<(String, String)> {
        let mut fields = FieldList::default();
        fields.push_opt("minvCPUs", self.min_vcpus);
        fields.push_opt("minRAM", self.min_ram);
        fields.push_opt("minStorage", self.min_storage);
        fields.push_opt("minVRAM", self.min_vram);
        fields.push_opt("minGPUCount", self.min_gpu_count);
        fields.push_opt("requiresRTX", self.requires_rtx.map(format_bool));
        fields.push_opt("requiresGTX", self.requires_gtx.map(format_bool));
        fields.into_inner()
    }
}

/// Resources and bid for validating a spot instance that does not exist yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSpotPrice {
    pub gpu_count: u32,
    pub gpu_model: String,
    pub vcpus: u32,
    pub hostnode: String,
    pub ram: u32,
    pub storage: u32,
    pub price: f64,
}

impl NewSpotPrice {
    pub(crate) fn fields(&self) -> Vec<(String, String)> {
        let mut fields = FieldList::default();
        fields.push("gpu_count", self.gpu_count);
        fields.push("gpu_model", &self.gpu_model);
        fields.push("vcpus", self.vcpus);
        fields.push("hostnode", &self.hostnode);
        fields.push("ram", self.ram);
        fields.push("storage", self.storage);
        fields.push("price", format_price(self.price));
        fields.into_inner()
    }
}

/// `true` / `false`, lowercase.
pub fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Brace-delimited, comma-space separated: `[80, 443]` becomes `{80, 443}`.
pub fn format_ports(ports: &[u16]) -> String {
    let joined = ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{joined}}}")
}

/// Shortest round-trip decimal; integral prices keep one fractional digit.
pub fn format_price(price: f64) -> String {
    if price.is_finite() && price.fract() == 0.0 {
        format!("{price:.1}")
    } else {
        price.to_string()
    }
}

#[derive(Default)]
pub(crate) struct FieldList(Vec<(String, String)>);

impl FieldList {
    pub(crate) fn push(&mut self, name: &str, value: impl ToString) {
        self.0.push((name.to_string(), value.to_string()));
    }

    pub(crate) fn push_opt(&mut self, name: &str, value: Option<impl ToString>) {
        if let Some(value) = value {
            self.push(name, value);
        }
    }

    pub(crate) fn into_inner(self) -> Vec<(String, String)> {
        self.0
    }
}
