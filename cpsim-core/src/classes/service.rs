//! `srvReq` / `srvRsp` — the request/response service pair.
//!
//! A request resolves its server (explicit cfg, the pattern's services map,
//! or the destination of its cached response edge), stamps a return address
//! with a `return-<op>` type, and sends. The responder prices the op, swaps
//! direction with the return address, and replies. Back at the requester the
//! `return` method restores the caller-visible message type and advances.

use crate::class::{
    decode_cfg_as, exit_unused, EntryOutcome, FuncClass, FuncRef, MethodPair, MethodTable,
};
use crate::engine::Runtime;
use crate::error::CoreError;
use crate::msg::{CmpPtnMsg, RtnAddr};
use crate::types::{CfgFormat, ExecId, MsgAddr, DEFAULT_METHOD, RETURN_METHOD};
use serde::Deserialize;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

// ─── srvReq ───────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SrvReqCfg {
    /// Pass messages through unchanged instead of calling the service.
    pub bypass: bool,
    /// Operation requested of the server; also names the services-map entry.
    pub srv_op: String,
    /// Explicit server, overriding the services map.
    pub srv_cp: Option<String>,
    pub srv_label: Option<String>,
    /// Post-processing delay applied to the returned response.
    pub rsp_delay: f64,
    /// Inbound type (as recorded at request time) → outbound type.
    pub msg2msg: BTreeMap<String, String>,
    pub trace: bool,
}

impl Default for SrvReqCfg {
    fn default() -> Self {
        Self {
            bypass: false,
            srv_op: String::new(),
            srv_cp: None,
            srv_label: None,
            rsp_delay: 0.0,
            msg2msg: BTreeMap::new(),
            trace: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct SrvReqState {
    /// Out-edge whose destination is the responder, cached on first use.
    pub rsp_edge_idx: Option<usize>,
    /// Message type seen at request time, restored on return.
    pub msg_type_in: HashMap<ExecId, String>,
}

pub struct SrvReqClass;

impl FuncClass for SrvReqClass {
    fn name(&self) -> &'static str {
        "srvReq"
    }

    fn decode_cfg(&self, raw: &str, format: CfgFormat) -> Result<Box<dyn Any + Send>, String> {
        decode_cfg_as::<SrvReqCfg>(raw, format)
    }

    fn init_state(&self, _cfg: &(dyn Any + Send)) -> Box<dyn Any + Send> {
        Box::new(SrvReqState::default())
    }

    fn methods(&self) -> MethodTable {
        let mut table = MethodTable::new();
        table.insert(
            DEFAULT_METHOD.to_string(),
            MethodPair {
                entry: srv_req_enter,
                exit: exit_unused,
            },
        );
        table.insert(
            RETURN_METHOD.to_string(),
            MethodPair {
                entry: srv_req_rtn_enter,
                exit: srv_req_rtn_exit,
            },
        );
        table
    }

    fn validate_cfg(&self, cfg: &(dyn Any + Send)) -> Vec<String> {
        let Some(cfg) = cfg.downcast_ref::<SrvReqCfg>() else {
            return vec!["cfg is not a srvReq cfg".to_string()];
        };
        let mut problems = Vec::new();
        if !cfg.bypass && cfg.srv_op.is_empty() {
            problems.push("srv_op is required unless bypassing".to_string());
        }
        if cfg.srv_cp.is_some() != cfg.srv_label.is_some() {
            problems.push("srv_cp and srv_label must be set together".to_string());
        }
        problems
    }

    fn trace_enabled(&self, cfg: &(dyn Any + Send)) -> bool {
        cfg.downcast_ref::<SrvReqCfg>().map(|c| c.trace).unwrap_or(true)
    }
}

fn srv_req_enter(
    rt: &mut Runtime,
    fref: FuncRef,
    _method: &str,
    mut msg: CmpPtnMsg,
) -> Result<EntryOutcome, CoreError> {
    let cfg = rt.func(fref)?.cfg_as::<SrvReqCfg>()?.clone();

    if cfg.bypass {
        let out = msg.msg_type.clone();
        rt.func(fref)?.advance_msg(&mut msg, &out)?;
        let exec_id = msg.exec_id;
        rt.func_mut(fref)?.park(msg);
        rt.schedule_exit_func(fref, exec_id, 0.0)?;
        return Ok(EntryOutcome::Scheduled);
    }

    // Resolve (or recall) the edge leading to the responder.
    let rsp_idx = match rt.func(fref)?.state_ref::<SrvReqState>()?.rsp_edge_idx {
        Some(idx) => idx,
        None => {
            let idx = {
                let f = rt.func(fref)?;
                f.out_edges
                    .iter()
                    .position(|e| {
                        rt.cpi(e.cp_id)
                            .map(|cpi| cpi.funcs[e.func].class_name == "srvRsp")
                            .unwrap_or(false)
                    })
                    .ok_or_else(|| CoreError::UnresolvedService {
                        label: f.label.clone(),
                        op: cfg.srv_op.clone(),
                    })?
            };
            rt.func_mut(fref)?.state_as::<SrvReqState>()?.rsp_edge_idx = Some(idx);
            idx
        }
    };

    let own_label = {
        let f = rt.func_mut(fref)?;
        f.state_as::<SrvReqState>()?
            .msg_type_in
            .insert(msg.exec_id, msg.msg_type.clone());
        f.label.clone()
    };

    // Base route along the cached response edge, then let an explicit server
    // or the services map override the destination.
    {
        let f = rt.func(fref)?;
        let edge = &f.out_edges[rsp_idx];
        msg.next = MsgAddr::new(edge.cp_id, edge.label.clone());
    }
    if let (Some(cp_name), Some(label)) = (&cfg.srv_cp, &cfg.srv_label) {
        let cp_id = rt
            .cp_id_by_name(cp_name)
            .ok_or_else(|| CoreError::UnknownPattern(cp_name.clone()))?;
        msg.next = MsgAddr::new(cp_id, label.clone());
    } else if let Some(addr) = rt.resolve_service(fref.cp_id, &cfg.srv_op) {
        msg.next = addr;
    }
    msg.msg_type = cfg.srv_op.clone();
    msg.rtn = Some(RtnAddr {
        addr: MsgAddr::new(fref.cp_id, own_label),
        msg_type: format!("return-{}", cfg.srv_op),
    });

    let exec_id = msg.exec_id;
    rt.func_mut(fref)?.park(msg);
    rt.schedule_exit_func(fref, exec_id, 0.0)?;
    Ok(EntryOutcome::Scheduled)
}

/// The response came back: apply the optional post-processing delay, then
/// let the `return` exit transform and advance.
fn srv_req_rtn_enter(
    rt: &mut Runtime,
    fref: FuncRef,
    method: &str,
    msg: CmpPtnMsg,
) -> Result<EntryOutcome, CoreError> {
    let delay = rt.func(fref)?.cfg_as::<SrvReqCfg>()?.rsp_delay;
    rt.schedule_class_exit(fref, method, msg, delay.max(0.0))?;
    Ok(EntryOutcome::Scheduled)
}

fn srv_req_rtn_exit(
    rt: &mut Runtime,
    fref: FuncRef,
    _method: &str,
    mut msg: CmpPtnMsg,
) -> Result<(), CoreError> {
    let in_type = rt
        .func_mut(fref)?
        .state_as::<SrvReqState>()?
        .msg_type_in
        .remove(&msg.exec_id);
    {
        let f = rt.func(fref)?;
        let out = in_type
            .as_ref()
            .and_then(|t| f.cfg_as::<SrvReqCfg>().ok()?.msg2msg.get(t).cloned())
            .unwrap_or_default();
        f.advance_msg(&mut msg, &out)?;
    }
    let exec_id = msg.exec_id;
    rt.func_mut(fref)?.park(msg);
    rt.schedule_exit_func(fref, exec_id, 0.0)?;
    Ok(())
}

// ─── srvRsp ───────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SrvRspCfg {
    /// Fallback timing code when `timing_code` has no entry.
    pub op: String,
    /// Message types starting with this prefix price as their own op.
    pub direct_prefix: String,
    /// Requested op → timing code.
    pub timing_code: BTreeMap<String, String>,
    pub trace: bool,
}

impl Default for SrvRspCfg {
    fn default() -> Self {
        Self {
            op: String::new(),
            direct_prefix: String::new(),
            timing_code: BTreeMap::new(),
            trace: true,
        }
    }
}

pub struct SrvRspClass;

impl FuncClass for SrvRspClass {
    fn name(&self) -> &'static str {
        "srvRsp"
    }

    fn decode_cfg(&self, raw: &str, format: CfgFormat) -> Result<Box<dyn Any + Send>, String> {
        decode_cfg_as::<SrvRspCfg>(raw, format)
    }

    fn init_state(&self, _cfg: &(dyn Any + Send)) -> Box<dyn Any + Send> {
        Box::new(())
    }

    fn methods(&self) -> MethodTable {
        let mut table = MethodTable::new();
        table.insert(
            DEFAULT_METHOD.to_string(),
            MethodPair {
                entry: srv_rsp_enter,
                exit: exit_unused,
            },
        );
        table
    }

    fn trace_enabled(&self, cfg: &(dyn Any + Send)) -> bool {
        cfg.downcast_ref::<SrvRspCfg>().map(|c| c.trace).unwrap_or(true)
    }
}

fn srv_rsp_enter(
    rt: &mut Runtime,
    fref: FuncRef,
    _method: &str,
    mut msg: CmpPtnMsg,
) -> Result<EntryOutcome, CoreError> {
    let (host, op) = {
        let f = rt.func(fref)?;
        let cfg = f.cfg_as::<SrvRspCfg>()?;
        let op = if !cfg.direct_prefix.is_empty() && msg.msg_type.starts_with(&cfg.direct_prefix) {
            msg.msg_type.clone()
        } else {
            cfg.timing_code
                .get(&msg.msg_type)
                .cloned()
                .unwrap_or_else(|| cfg.op.clone())
        };
        (f.host.clone(), op)
    };
    let delay = rt.exec_time_on_host(&host, &op, msg.pckt_len)?;

    let Some(rtn) = msg.rtn.take() else {
        warn!(
            exec_id = msg.exec_id,
            msg_type = %msg.msg_type,
            "service request carries no return address; dropping"
        );
        return Ok(EntryOutcome::Abandoned(msg));
    };
    msg.next = rtn.addr;
    msg.msg_type = rtn.msg_type;

    let exec_id = msg.exec_id;
    rt.func_mut(fref)?.park(msg);
    rt.schedule_exit_func(fref, exec_id, delay)?;
    Ok(EntryOutcome::Scheduled)
}
