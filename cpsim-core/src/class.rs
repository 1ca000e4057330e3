//! Function-class registry.
//!
//! A class is a behavior template: it decodes per-function cfg, constructs
//! per-instance state, and exposes a method-code table of (entry, exit)
//! handler pairs. Classes are stateless singletons; everything mutable lives
//! in the function instance, so handlers are plain function pointers.

use crate::engine::Runtime;
use crate::error::CoreError;
use crate::msg::CmpPtnMsg;
use crate::types::{CfgFormat, CpId, FuncIdx};
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Identifies one function instance to a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FuncRef {
    pub cp_id: CpId,
    pub func: FuncIdx,
}

/// What an entry handler did with its arrival. The terminal variants hand
/// the message back so the engine can settle the execution record — every
/// chain ends in exactly one completion, loss, or abandonment.
pub enum EntryOutcome {
    /// Work is in flight: an exit was scheduled, a task queued, or responses
    /// parked.
    Scheduled,
    /// Terminal consumption; the record closes with a completion sample.
    Consumed(CmpPtnMsg),
    /// The message was dropped; the record closes without a sample.
    Abandoned(CmpPtnMsg),
}

/// Entry handler: runs on message arrival for its method code. Schedules
/// either the class exit (after a service delay) or the generic exit, and
/// reports what became of the message.
pub type EntryFn = fn(&mut Runtime, FuncRef, &str, CmpPtnMsg) -> Result<EntryOutcome, CoreError>;

/// Exit handler: runs at service completion, transforms and advances the
/// message, and schedules the generic exit at zero delay.
pub type ExitFn = fn(&mut Runtime, FuncRef, &str, CmpPtnMsg) -> Result<(), CoreError>;

#[derive(Clone, Copy)]
pub struct MethodPair {
    pub entry: EntryFn,
    pub exit: ExitFn,
}

/// Method code → handler pair, copied into each function instance at build.
pub type MethodTable = HashMap<String, MethodPair>;

/// Exit slot for classes whose entry schedules the generic exit directly.
pub fn exit_unused(
    _rt: &mut Runtime,
    _f: FuncRef,
    _method: &str,
    _msg: CmpPtnMsg,
) -> Result<(), CoreError> {
    Ok(())
}

/// How an initiating function mints chains: the message template and how
/// many chains to mint. The class's entry handler owns the start-time
/// staggering, so every chain's clock starts at zero.
#[derive(Clone, Debug)]
pub struct InitPlan {
    pub template: CmpPtnMsg,
    pub batch: u64,
}

/// A registered function behavior.
pub trait FuncClass: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode a serialized cfg string into this class's cfg type.
    fn decode_cfg(&self, raw: &str, format: CfgFormat) -> Result<Box<dyn Any + Send>, String>;

    /// Construct fresh per-instance state for a decoded cfg.
    fn init_state(&self, cfg: &(dyn Any + Send)) -> Box<dyn Any + Send>;

    fn methods(&self) -> MethodTable;

    /// Pre-run validation; each returned string becomes a build diagnostic.
    fn validate_cfg(&self, _cfg: &(dyn Any + Send)) -> Vec<String> {
        Vec::new()
    }

    /// Present when instances of this class initiate chains.
    fn init_plan(&self, _cfg: &(dyn Any + Send)) -> Option<InitPlan> {
        None
    }

    /// Whether instances emit trace waypoints (classes may expose a cfg flag).
    fn trace_enabled(&self, _cfg: &(dyn Any + Send)) -> bool {
        true
    }
}

/// Shared cfg decoding used by every class implementation.
pub fn decode_cfg_as<T>(raw: &str, format: CfgFormat) -> Result<Box<dyn Any + Send>, String>
where
    T: DeserializeOwned + Send + 'static,
{
    let cfg: T = match format {
        CfgFormat::Yaml => serde_yaml::from_str(raw).map_err(|e| e.to_string())?,
        CfgFormat::Json => serde_json::from_str(raw).map_err(|e| e.to_string())?,
    };
    Ok(Box::new(cfg))
}

// ─── Registry ─────────────────────────────────────────────────

#[derive(Default)]
pub struct FuncClassRegistry {
    classes: HashMap<String, Arc<dyn FuncClass>>,
}

impl FuncClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in classes.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        crate::classes::register_builtins(&mut reg);
        reg
    }

    /// Register a class. Re-registering a name is a no-op; the first
    /// registration wins. Returns whether the entry was newly added.
    pub fn register(&mut self, class: Arc<dyn FuncClass>) -> bool {
        let name = class.name().to_string();
        if self.classes.contains_key(&name) {
            return false;
        }
        self.classes.insert(name, class);
        true
    }

    pub fn valid_func_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn FuncClass>, CoreError> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownClass(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}
