//! Model-input description types.
//!
//! These are the on-disk dictionaries read at start-up, YAML or JSON. They
//! describe pattern topology, per-function configuration, execution timing,
//! shared cfg groups, the function-to-host mapping, and the topology consumed
//! by the built-in network model.

use crate::types::CfgFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ─── Comp-pattern dictionary ──────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompPatternDict {
    #[serde(default)]
    pub patterns: BTreeMap<String, CompPatternDesc>,
}

/// One pattern template: functions, internal edges, external edges, services.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompPatternDesc {
    pub functions: Vec<FuncDesc>,
    #[serde(default)]
    pub edges: Vec<EdgeDesc>,
    #[serde(default)]
    pub ext_edges: Vec<XEdgeDesc>,
    /// Service name → where the serving function lives. Consulted by
    /// `srvReq` functions that do not pin an explicit server.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceDesc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FuncDesc {
    pub class: String,
    pub label: String,
}

/// Internal edge. A self-edge (`src_label == dst_label`) marks the function
/// as initiating and never becomes an outbound route.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeDesc {
    pub src_label: String,
    pub msg_type: String,
    pub dst_label: String,
    #[serde(default = "default_method")]
    pub method_code: String,
}

/// Cross-pattern edge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct XEdgeDesc {
    pub src_label: String,
    pub msg_type: String,
    pub dst_cp: String,
    pub dst_label: String,
    #[serde(default = "default_method")]
    pub method_code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceDesc {
    pub cp: String,
    pub label: String,
}

fn default_method() -> String {
    crate::types::DEFAULT_METHOD.to_string()
}

// ─── CP init-list dictionary ──────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CpInitDict {
    #[serde(default)]
    pub init: BTreeMap<String, CpInitList>,
}

/// Message catalog plus per-function serialized cfg for one pattern.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CpInitList {
    #[serde(default)]
    pub msgs: Vec<MsgDesc>,
    /// Function label → serialized cfg, decoded by the function's class.
    #[serde(default)]
    pub cfgs: BTreeMap<String, String>,
    #[serde(default)]
    pub format: CfgFormat,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MsgDesc {
    pub msg_type: String,
    pub pckt_len: u64,
    pub msg_len: u64,
}

// ─── Function exec list ───────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FuncExecDict {
    /// Timing-code → calibration samples.
    #[serde(default)]
    pub times: BTreeMap<String, Vec<FuncExecDesc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FuncExecDesc {
    #[serde(default)]
    pub param: String,
    pub cpu_model: String,
    pub pckt_len: u64,
    pub exec_time: f64,
}

// ─── Shared cfg groups ────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SharedCfgDict {
    #[serde(default)]
    pub groups: BTreeMap<String, SharedCfgGroup>,
}

/// One cfg string applied to every listed (pattern, label) of `class`.
/// A per-function cfg in the init list wins over the group's.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SharedCfgGroup {
    pub class: String,
    pub instances: Vec<CfgTarget>,
    pub cfg_str: String,
    #[serde(default)]
    pub format: CfgFormat,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CfgTarget {
    pub pattern: String,
    pub label: String,
}

// ─── Mapping dictionary ───────────────────────────────────────

/// Pattern → function label → `"host[,priority]"`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MappingDict {
    #[serde(default)]
    pub map: BTreeMap<String, BTreeMap<String, String>>,
}

// ─── Topology (consumed by the built-in network model) ────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TopoDesc {
    #[serde(default)]
    pub endpts: Vec<EndptDesc>,
    #[serde(default)]
    pub links: Vec<LinkDesc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndptDesc {
    pub name: String,
    pub cpu_model: String,
    /// Accelerator name → accelerator model (a key into the exec tables).
    #[serde(default)]
    pub accels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkDesc {
    pub src: String,
    pub dst: String,
    /// One-way latency in seconds.
    pub latency: f64,
    /// Bytes per second. Zero means latency-only.
    #[serde(default)]
    pub bandwidth: f64,
    /// Probability a carried message is dropped.
    #[serde(default)]
    pub pr_loss: f64,
}

// ─── Experiment parameters ────────────────────────────────────

/// Network-side defaults applied where the topology is silent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExpParamsDesc {
    #[serde(default = "default_latency")]
    pub default_latency: f64,
    #[serde(default)]
    pub default_bandwidth: f64,
    #[serde(default)]
    pub default_pr_loss: f64,
}

impl Default for ExpParamsDesc {
    fn default() -> Self {
        Self {
            default_latency: default_latency(),
            default_bandwidth: 0.0,
            default_pr_loss: 0.0,
        }
    }
}

fn default_latency() -> f64 {
    1e-4
}

// ─── Device exec list ─────────────────────────────────────────

/// Per-device-model forwarding delay, added by the network model for each
/// hop through that device.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DevExecDict {
    #[serde(default)]
    pub times: BTreeMap<String, f64>,
}
