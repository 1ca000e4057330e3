//! `start` — mints execution chains from a configured template.
//!
//! The runtime mints every chain at time zero; the entry handler advances
//! the fresh message along its out-edge and holds the departure until the
//! configured start time, so the offset counts toward tracked latency.

use crate::class::{
    decode_cfg_as, exit_unused, EntryOutcome, FuncClass, FuncRef, InitPlan, MethodPair,
    MethodTable,
};
use crate::engine::Runtime;
use crate::error::CoreError;
use crate::msg::CmpPtnMsg;
use crate::types::{CfgFormat, DEFAULT_METHOD, INITIATE_MSG_TYPE};
use rand::Rng;
use serde::Deserialize;
use std::any::Any;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StartCfg {
    /// Message type emitted toward the out-edge.
    pub msg_type: String,
    pub pckt_len: u64,
    pub msg_len: u64,
    /// When the first chain starts.
    pub start_time: f64,
    /// How many chains to mint.
    pub batch: u64,
    /// Spacing between minted chains.
    pub interarrival: f64,
    /// Draw each spacing from an exponential with mean `interarrival`
    /// (using the pattern's random stream) instead of a fixed gap.
    pub random_spacing: bool,
    pub trace: bool,
}

impl Default for StartCfg {
    fn default() -> Self {
        Self {
            msg_type: String::new(),
            pckt_len: 0,
            msg_len: 0,
            start_time: 0.0,
            batch: 1,
            interarrival: 0.0,
            random_spacing: false,
            trace: true,
        }
    }
}

/// Counts minted chains so each departure staggers by the interarrival.
/// Under random spacing, the running departure clock lives here too.
#[derive(Debug, Default)]
struct StartState {
    minted: u64,
    next_depart: Option<f64>,
}

pub struct StartClass;

impl FuncClass for StartClass {
    fn name(&self) -> &'static str {
        "start"
    }

    fn decode_cfg(&self, raw: &str, format: CfgFormat) -> Result<Box<dyn Any + Send>, String> {
        decode_cfg_as::<StartCfg>(raw, format)
    }

    fn init_state(&self, _cfg: &(dyn Any + Send)) -> Box<dyn Any + Send> {
        Box::new(StartState::default())
    }

    fn methods(&self) -> MethodTable {
        let mut table = MethodTable::new();
        table.insert(
            DEFAULT_METHOD.to_string(),
            MethodPair {
                entry: start_enter,
                exit: exit_unused,
            },
        );
        table
    }

    fn validate_cfg(&self, cfg: &(dyn Any + Send)) -> Vec<String> {
        let mut problems = Vec::new();
        let Some(cfg) = cfg.downcast_ref::<StartCfg>() else {
            return vec!["cfg is not a start cfg".to_string()];
        };
        if cfg.pckt_len == 0 {
            problems.push("pckt_len must be positive".to_string());
        }
        if cfg.msg_len == 0 {
            problems.push("msg_len must be positive".to_string());
        }
        if cfg.batch == 0 {
            problems.push("batch must be at least 1".to_string());
        }
        if cfg.batch > 1 && cfg.interarrival <= 0.0 {
            problems.push("batched starts need a positive interarrival".to_string());
        }
        problems
    }

    fn init_plan(&self, cfg: &(dyn Any + Send)) -> Option<InitPlan> {
        let cfg = cfg.downcast_ref::<StartCfg>()?;
        Some(InitPlan {
            template: CmpPtnMsg::template(INITIATE_MSG_TYPE, cfg.msg_len, cfg.pckt_len),
            batch: cfg.batch.max(1),
        })
    }

    fn trace_enabled(&self, cfg: &(dyn Any + Send)) -> bool {
        cfg.downcast_ref::<StartCfg>().map(|c| c.trace).unwrap_or(true)
    }
}

fn start_enter(
    rt: &mut Runtime,
    fref: FuncRef,
    _method: &str,
    mut msg: CmpPtnMsg,
) -> Result<EntryOutcome, CoreError> {
    let (start_time, interarrival, random_spacing) = {
        let f = rt.func(fref)?;
        let cfg = f.cfg_as::<StartCfg>()?;
        let out_type = cfg.msg_type.clone();
        f.advance_msg(&mut msg, &out_type)?;
        (cfg.start_time, cfg.interarrival, cfg.random_spacing)
    };
    let depart = if random_spacing {
        let gap = {
            let cpi = rt.cpi_mut(fref.cp_id)?;
            let u: f64 = cpi.rng.gen();
            -interarrival * (1.0 - u).ln()
        };
        let state = rt.func_mut(fref)?.state_as::<StartState>()?;
        let depart = state.next_depart.unwrap_or(start_time);
        state.next_depart = Some(depart + gap);
        depart
    } else {
        let state = rt.func_mut(fref)?.state_as::<StartState>()?;
        let k = state.minted;
        state.minted += 1;
        start_time + k as f64 * interarrival
    };
    let exec_id = msg.exec_id;
    rt.func_mut(fref)?.park(msg);
    let delay = (depart - rt.now()).max(0.0);
    rt.schedule_exit_func(fref, exec_id, delay)?;
    Ok(EntryOutcome::Scheduled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cfg_decodes_with_defaults() {
        let class = StartClass;
        let cfg = class
            .decode_cfg("msg_type: ping\npckt_len: 1000\nmsg_len: 1500", CfgFormat::Yaml)
            .unwrap();
        let plan = class.init_plan(cfg.as_ref()).unwrap();
        assert_eq!(plan.batch, 1);
        assert_eq!(plan.template.pckt_len, 1000);
        assert_eq!(plan.template.msg_type, INITIATE_MSG_TYPE);
        assert!(class.validate_cfg(cfg.as_ref()).is_empty());
    }

    #[test]
    fn zero_lengths_fail_validation() {
        let class = StartClass;
        let cfg = class.decode_cfg("{}", CfgFormat::Yaml).unwrap();
        let problems = class.validate_cfg(cfg.as_ref());
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn batch_without_spacing_fails_validation() {
        let class = StartClass;
        let cfg = class
            .decode_cfg(
                "msg_type: p\npckt_len: 10\nmsg_len: 10\nbatch: 5",
                CfgFormat::Yaml,
            )
            .unwrap();
        let problems = class.validate_cfg(cfg.as_ref());
        assert_eq!(problems, vec!["batched starts need a positive interarrival"]);
    }
}
