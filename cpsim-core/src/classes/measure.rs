//! `measure` — bracketed measurement probes.
//!
//! A start probe tags the message and opens a span; the matching end probe
//! closes it and classifies the elapsed time into the configured groups.
//! Probes are pass-through: the message continues along the single out-edge.

use crate::class::{
    decode_cfg_as, exit_unused, EntryOutcome, FuncClass, FuncRef, MethodPair, MethodTable,
};
use crate::engine::Runtime;
use crate::error::CoreError;
use crate::msg::{CmpPtnMsg, MsrTag};
use crate::tracking::MsrGroups;
use crate::types::{CfgFormat, MsgAddr, DEFAULT_METHOD};
use serde::Deserialize;
use std::any::Any;
use tracing::warn;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MeasureCfg {
    pub msr_name: String,
    /// `start` or `end` (capitalized forms accepted).
    pub msr_op: String,
    /// Group tags: `Latency`, `Bndwdth`, `PrLoss`, `Aggregate`.
    pub groups: Vec<String>,
}

pub struct MeasureClass;

impl FuncClass for MeasureClass {
    fn name(&self) -> &'static str {
        "measure"
    }

    fn decode_cfg(&self, raw: &str, format: CfgFormat) -> Result<Box<dyn Any + Send>, String> {
        decode_cfg_as::<MeasureCfg>(raw, format)
    }

    fn init_state(&self, _cfg: &(dyn Any + Send)) -> Box<dyn Any + Send> {
        Box::new(())
    }

    fn methods(&self) -> MethodTable {
        let mut table = MethodTable::new();
        table.insert(
            DEFAULT_METHOD.to_string(),
            MethodPair {
                entry: measure_enter,
                exit: exit_unused,
            },
        );
        table
    }

    fn validate_cfg(&self, cfg: &(dyn Any + Send)) -> Vec<String> {
        let Some(cfg) = cfg.downcast_ref::<MeasureCfg>() else {
            return vec!["cfg is not a measure cfg".to_string()];
        };
        let mut problems = Vec::new();
        if cfg.msr_name.is_empty() {
            problems.push("msr_name is required".to_string());
        }
        if !matches!(cfg.msr_op.as_str(), "start" | "Start" | "end" | "End") {
            problems.push(format!("msr_op '{}' is neither start nor end", cfg.msr_op));
        }
        problems
    }
}

fn measure_enter(
    rt: &mut Runtime,
    fref: FuncRef,
    _method: &str,
    mut msg: CmpPtnMsg,
) -> Result<EntryOutcome, CoreError> {
    let now = rt.now();
    let (cfg, label, host, obj_id) = {
        let f = rt.func(fref)?;
        (
            f.cfg_as::<MeasureCfg>()?.clone(),
            f.label.clone(),
            f.host.clone(),
            f.id,
        )
    };
    let groups = MsrGroups::from_tags(&cfg.groups);

    match cfg.msr_op.as_str() {
        "start" | "Start" => {
            if msg.msr.is_none()
                && rt
                    .tracker
                    .msr_start(&cfg.msr_name, msg.exec_id, groups, fref.cp_id, &label, &host)
            {
                msg.msr = Some(MsrTag {
                    srt_id: obj_id,
                    start: now,
                });
            }
        }
        "end" | "End" => {
            if let Some(tag) = msg.msr {
                let closed = rt.tracker.msr_end(
                    &cfg.msr_name,
                    msg.exec_id,
                    &groups,
                    now - tag.start,
                    msg.msg_len,
                    &[],
                    fref.cp_id,
                    &label,
                    &host,
                );
                if closed {
                    msg.msr = None;
                }
            }
        }
        other => {
            warn!(msr_op = other, "measure probe with unknown op; passing through");
        }
    }

    // Exactly one out-edge, chosen implicitly; a probe with none is terminal.
    {
        let f = rt.func(fref)?;
        if f.out_edges.is_empty() {
            msg.next = MsgAddr::empty();
        } else {
            f.advance_msg(&mut msg, "")?;
        }
    }
    let exec_id = msg.exec_id;
    rt.func_mut(fref)?.park(msg);
    rt.schedule_exit_func(fref, exec_id, 0.0)?;
    Ok(EntryOutcome::Scheduled)
}
