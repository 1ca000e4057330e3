//! `finish` — terminal consumer. The chain ends here: the execution record
//! closes with a completion sample and nothing further is scheduled.

use crate::class::{
    decode_cfg_as, exit_unused, EntryOutcome, FuncClass, FuncRef, MethodPair, MethodTable,
};
use crate::engine::Runtime;
use crate::error::CoreError;
use crate::msg::CmpPtnMsg;
use crate::types::{CfgFormat, DEFAULT_METHOD};
use serde::Deserialize;
use std::any::Any;
use tracing::debug;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FinishCfg {
    pub trace: bool,
}

impl Default for FinishCfg {
    fn default() -> Self {
        Self { trace: true }
    }
}

pub struct FinishClass;

impl FuncClass for FinishClass {
    fn name(&self) -> &'static str {
        "finish"
    }

    fn decode_cfg(&self, raw: &str, format: CfgFormat) -> Result<Box<dyn Any + Send>, String> {
        decode_cfg_as::<FinishCfg>(raw, format)
    }

    fn init_state(&self, _cfg: &(dyn Any + Send)) -> Box<dyn Any + Send> {
        Box::new(())
    }

    fn methods(&self) -> MethodTable {
        let mut table = MethodTable::new();
        table.insert(
            DEFAULT_METHOD.to_string(),
            MethodPair {
                entry: finish_enter,
                exit: exit_unused,
            },
        );
        table
    }

    fn trace_enabled(&self, cfg: &(dyn Any + Send)) -> bool {
        cfg.downcast_ref::<FinishCfg>().map(|c| c.trace).unwrap_or(true)
    }
}

fn finish_enter(
    _rt: &mut Runtime,
    _fref: FuncRef,
    _method: &str,
    msg: CmpPtnMsg,
) -> Result<EntryOutcome, CoreError> {
    debug!(
        exec_id = msg.exec_id,
        msg_type = %msg.msg_type,
        "chain reached its finish function"
    );
    Ok(EntryOutcome::Consumed(msg))
}
