//! `transfer` — cross-pattern hand-off.
//!
//! A carried cross-pattern header wins; otherwise the instance's configured
//! target is used. Either way the message leaves at zero delay, addressed
//! directly rather than through an out-edge.

use crate::class::{
    decode_cfg_as, exit_unused, EntryOutcome, FuncClass, FuncRef, MethodPair, MethodTable,
};
use crate::engine::Runtime;
use crate::error::CoreError;
use crate::msg::CmpPtnMsg;
use crate::types::{CfgFormat, MsgAddr, DEFAULT_METHOD};
use serde::Deserialize;
use std::any::Any;
use tracing::warn;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TransferCfg {
    /// Fallback destination pattern (by name) when the message carries none.
    pub x_cp: Option<String>,
    pub x_label: Option<String>,
    pub x_msg_type: Option<String>,
}

pub struct TransferClass;

impl FuncClass for TransferClass {
    fn name(&self) -> &'static str {
        "transfer"
    }

    fn decode_cfg(&self, raw: &str, format: CfgFormat) -> Result<Box<dyn Any + Send>, String> {
        decode_cfg_as::<TransferCfg>(raw, format)
    }

    fn init_state(&self, _cfg: &(dyn Any + Send)) -> Box<dyn Any + Send> {
        Box::new(())
    }

    fn methods(&self) -> MethodTable {
        let mut table = MethodTable::new();
        table.insert(
            DEFAULT_METHOD.to_string(),
            MethodPair {
                entry: transfer_enter,
                exit: exit_unused,
            },
        );
        table
    }

    fn validate_cfg(&self, cfg: &(dyn Any + Send)) -> Vec<String> {
        let Some(cfg) = cfg.downcast_ref::<TransferCfg>() else {
            return vec!["cfg is not a transfer cfg".to_string()];
        };
        let set = [&cfg.x_cp, &cfg.x_label, &cfg.x_msg_type]
            .iter()
            .filter(|o| o.is_some())
            .count();
        if set != 0 && set != 3 {
            return vec!["x_cp, x_label and x_msg_type must be set together".to_string()];
        }
        Vec::new()
    }
}

fn transfer_enter(
    rt: &mut Runtime,
    fref: FuncRef,
    _method: &str,
    mut msg: CmpPtnMsg,
) -> Result<EntryOutcome, CoreError> {
    if let Some(x) = msg.xfer.take() {
        msg.next = MsgAddr::new(x.cp_id, x.label);
        msg.msg_type = x.msg_type;
    } else {
        let cfg = rt.func(fref)?.cfg_as::<TransferCfg>()?.clone();
        match (cfg.x_cp, cfg.x_label, cfg.x_msg_type) {
            (Some(cp_name), Some(label), Some(msg_type)) => {
                let cp_id = rt
                    .cp_id_by_name(&cp_name)
                    .ok_or(CoreError::UnknownPattern(cp_name))?;
                msg.next = MsgAddr::new(cp_id, label);
                msg.msg_type = msg_type;
            }
            _ => {
                warn!(
                    exec_id = msg.exec_id,
                    "transfer has neither a carried header nor a configured target; dropping"
                );
                return Ok(EntryOutcome::Abandoned(msg));
            }
        }
    }
    let exec_id = msg.exec_id;
    rt.func_mut(fref)?.park(msg);
    rt.schedule_exit_func(fref, exec_id, 0.0)?;
    Ok(EntryOutcome::Scheduled)
}
