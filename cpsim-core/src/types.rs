use serde::{Deserialize, Serialize};

// ─── Scalar aliases ───────────────────────────────────────────

/// Simulated time in seconds.
pub type SimTime = f64;

/// Computational-pattern instance identifier (dense, assigned at build).
pub type CpId = u64;

/// Execution-thread identifier, unique across the run.
pub type ExecId = u64;

/// Index of a function instance within its pattern instance.
pub type FuncIdx = usize;

/// Global object identifier used for trace records.
pub type ObjId = u64;

/// Message type used on initiation self-edges and generated init messages.
pub const INITIATE_MSG_TYPE: &str = "initiate";

/// Method code used when a class does not differentiate methods.
pub const DEFAULT_METHOD: &str = "default";

/// Method code bound to a service response returning to its requester.
pub const RETURN_METHOD: &str = "return";

// ─── Scheduling priority ──────────────────────────────────────

/// Per-function scheduling priority, parsed once from the mapping file's
/// `"host[,priority]"` form. Larger values win contention: among same-time
/// events and among tasks waiting at a host scheduler, higher-priority
/// functions run first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priority(pub u32);

impl Default for Priority {
    fn default() -> Self {
        Priority(1)
    }
}

impl Priority {
    /// Split a `"host[,priority]"` binding into its parts. A missing or
    /// malformed suffix falls back to the default priority.
    pub fn parse_binding(binding: &str) -> (String, Priority) {
        match binding.split_once(',') {
            Some((host, pri)) => {
                let pri = pri.trim().parse::<u32>().map(Priority).unwrap_or_default();
                (host.trim().to_string(), pri)
            }
            None => (binding.trim().to_string(), Priority::default()),
        }
    }
}

// ─── Addresses ────────────────────────────────────────────────

/// A (pattern instance, function label) address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MsgAddr {
    pub cp_id: CpId,
    pub label: String,
}

impl MsgAddr {
    pub fn new(cp_id: CpId, label: impl Into<String>) -> Self {
        Self {
            cp_id,
            label: label.into(),
        }
    }

    /// The empty address marks an unrouted or terminal message.
    pub fn empty() -> Self {
        Self {
            cp_id: 0,
            label: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_empty()
    }
}

impl std::fmt::Display for MsgAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.cp_id, self.label)
    }
}

// ─── Config encoding ──────────────────────────────────────────

/// Serialization format of a per-function cfg string in the init list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CfgFormat {
    #[default]
    Yaml,
    Json,
}
