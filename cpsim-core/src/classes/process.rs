//! `processPckt` — compute-bound packet processing.
//!
//! Arrival looks up a timing code through `msg2msg`, prices it against the
//! host CPU (or a named accelerator), and submits the work to the matching
//! task scheduler. The scheduler's completion time drives the class exit,
//! which transforms the message type and advances it.

use crate::class::{decode_cfg_as, EntryOutcome, FuncClass, FuncRef, MethodPair, MethodTable};
use crate::engine::Runtime;
use crate::error::CoreError;
use crate::msg::CmpPtnMsg;
use crate::portal::{SubmitOutcome, Task};
use crate::types::{CfgFormat, DEFAULT_METHOD};
use serde::Deserialize;
use std::any::Any;
use std::collections::BTreeMap;

/// Inbound message type → (outbound type, timing code).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PcktMap {
    pub out: String,
    pub timing: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProcessPcktCfg {
    /// Fallback timing code for types missing from `msg2msg`.
    pub op: String,
    pub msg2msg: BTreeMap<String, PcktMap>,
    /// Route work through this accelerator instead of the host CPU.
    pub accel_name: Option<String>,
    pub trace: bool,
}

impl Default for ProcessPcktCfg {
    fn default() -> Self {
        Self {
            op: String::new(),
            msg2msg: BTreeMap::new(),
            accel_name: None,
            trace: true,
        }
    }
}

pub struct ProcessPcktClass;

impl FuncClass for ProcessPcktClass {
    fn name(&self) -> &'static str {
        "processPckt"
    }

    fn decode_cfg(&self, raw: &str, format: CfgFormat) -> Result<Box<dyn Any + Send>, String> {
        decode_cfg_as::<ProcessPcktCfg>(raw, format)
    }

    fn init_state(&self, _cfg: &(dyn Any + Send)) -> Box<dyn Any + Send> {
        Box::new(())
    }

    fn methods(&self) -> MethodTable {
        let mut table = MethodTable::new();
        table.insert(
            DEFAULT_METHOD.to_string(),
            MethodPair {
                entry: process_enter,
                exit: process_exit,
            },
        );
        table
    }

    fn validate_cfg(&self, cfg: &(dyn Any + Send)) -> Vec<String> {
        let Some(cfg) = cfg.downcast_ref::<ProcessPcktCfg>() else {
            return vec!["cfg is not a processPckt cfg".to_string()];
        };
        if cfg.msg2msg.is_empty() && cfg.op.is_empty() {
            return vec!["needs a msg2msg table or a fallback op".to_string()];
        }
        Vec::new()
    }

    fn trace_enabled(&self, cfg: &(dyn Any + Send)) -> bool {
        cfg.downcast_ref::<ProcessPcktCfg>()
            .map(|c| c.trace)
            .unwrap_or(true)
    }
}

fn process_enter(
    rt: &mut Runtime,
    fref: FuncRef,
    method: &str,
    msg: CmpPtnMsg,
) -> Result<EntryOutcome, CoreError> {
    let now = rt.now();
    let (host, priority, accel, timing_code) = {
        let f = rt.func(fref)?;
        let cfg = f.cfg_as::<ProcessPcktCfg>()?;
        let timing_code = cfg
            .msg2msg
            .get(&msg.msg_type)
            .map(|m| m.timing.clone())
            .unwrap_or_else(|| cfg.op.clone());
        (f.host.clone(), f.priority, cfg.accel_name.clone(), timing_code)
    };

    let service = match &accel {
        Some(name) => rt.exec_time_on_accel(&host, name, &timing_code, msg.pckt_len)?,
        None => rt.exec_time_on_host(&host, &timing_code, msg.pckt_len)?,
    };
    let task = Task {
        cp_id: fref.cp_id,
        func: fref.func,
        method: method.to_string(),
        msg,
    };
    let outcome = match &accel {
        Some(name) => rt
            .portal
            .submit_accel_task(&host, name, now, service, priority, task)
            .ok_or_else(|| CoreError::UnknownAccel {
                endpt: host.clone(),
                accel: name.clone(),
            })?,
        None => rt
            .portal
            .submit_task(&host, now, service, priority, task)
            .ok_or_else(|| CoreError::UnknownEndpt(host.clone()))?,
    };
    // A queued task starts when the scheduler's running task completes.
    if let SubmitOutcome::Started { completion } = outcome {
        rt.schedule_task_done(&host, accel.as_deref(), completion);
    }
    Ok(EntryOutcome::Scheduled)
}

fn process_exit(
    rt: &mut Runtime,
    fref: FuncRef,
    _method: &str,
    mut msg: CmpPtnMsg,
) -> Result<(), CoreError> {
    {
        let f = rt.func(fref)?;
        let cfg = f.cfg_as::<ProcessPcktCfg>()?;
        let out_type = cfg
            .msg2msg
            .get(&msg.msg_type)
            .map(|m| m.out.clone())
            .unwrap_or_default();
        f.advance_msg(&mut msg, &out_type)?;
    }
    let exec_id = msg.exec_id;
    rt.func_mut(fref)?.park(msg);
    rt.schedule_exit_func(fref, exec_id, 0.0)?;
    Ok(())
}
