//! Runtime function instance.
//!
//! Owns the decoded cfg and mutable state for one function of one pattern
//! instance, the dispatch tables built from the pattern's edges, and the
//! response buffer the generic exit drains.

use crate::class::{InitPlan, MethodTable};
use crate::error::CoreError;
use crate::msg::CmpPtnMsg;
use crate::types::{CpId, ExecId, FuncIdx, MsgAddr, ObjId, Priority};
use std::any::Any;
use std::collections::HashMap;
use tracing::warn;

/// Key for inbound dispatch: which edge did the message cross.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InEdgeKey {
    pub cp_id: CpId,
    pub label: String,
    pub msg_type: String,
}

/// One outbound route, fully resolved at build time.
#[derive(Clone, Debug, PartialEq)]
pub struct OutEdge {
    pub cp_id: CpId,
    pub func: FuncIdx,
    pub label: String,
    pub msg_type: String,
}

pub struct CmpPtnFuncInstance {
    /// Global object id, used in trace records.
    pub id: ObjId,
    /// Pattern instance this function belongs to.
    pub cp_id: CpId,
    pub label: String,
    pub class_name: String,
    /// Endpoint this function runs on.
    pub host: String,
    pub priority: Priority,
    pub active: bool,
    /// Whether this function emits trace waypoints.
    pub trace: bool,
    /// Arrivals seen so far.
    pub calls: u64,

    pub cfg: Box<dyn Any + Send>,
    pub state: Box<dyn Any + Send>,
    pub methods: MethodTable,

    pub is_initiating: bool,
    pub init_plan: Option<InitPlan>,

    pub in_edge_method_code: HashMap<InEdgeKey, String>,
    pub out_edges: Vec<OutEdge>,
    pub msg2idx: HashMap<String, usize>,
    pub msg_resp: HashMap<ExecId, Vec<CmpPtnMsg>>,
}

impl CmpPtnFuncInstance {
    /// Method code bound to the edge the message crossed, if any.
    pub fn method_code_for(&self, prev: &MsgAddr, msg_type: &str) -> Option<&str> {
        self.in_edge_method_code
            .get(&InEdgeKey {
                cp_id: prev.cp_id,
                label: prev.label.clone(),
                msg_type: msg_type.to_string(),
            })
            .map(|s| s.as_str())
    }

    /// Route `msg` along the out-edge selected by `msg_type_out`, rewriting
    /// its destination and type. With a single out-edge the edge wins over a
    /// disagreeing caller. Returns the chosen edge index.
    pub fn advance_msg(&self, msg: &mut CmpPtnMsg, msg_type_out: &str) -> Result<usize, CoreError> {
        let idx = if self.out_edges.len() == 1 {
            if !msg_type_out.is_empty() && self.out_edges[0].msg_type != msg_type_out {
                warn!(
                    label = %self.label,
                    requested = msg_type_out,
                    using = %self.out_edges[0].msg_type,
                    "single out-edge overrides requested message type"
                );
            }
            0
        } else {
            *self
                .msg2idx
                .get(msg_type_out)
                .ok_or_else(|| CoreError::UnknownOutType {
                    cp_id: self.cp_id,
                    label: self.label.clone(),
                    msg_type: msg_type_out.to_string(),
                })?
        };
        let edge = &self.out_edges[idx];
        msg.next = MsgAddr::new(edge.cp_id, edge.label.clone());
        msg.msg_type = edge.msg_type.clone();
        Ok(idx)
    }

    /// Park a routed message for the generic exit to pick up.
    pub fn park(&mut self, msg: CmpPtnMsg) {
        self.msg_resp.entry(msg.exec_id).or_default().push(msg);
    }

    /// Drain and remove the buffered responses for one execution.
    pub fn func_resp(&mut self, exec_id: ExecId) -> Vec<CmpPtnMsg> {
        self.msg_resp.remove(&exec_id).unwrap_or_default()
    }

    /// Typed view of the decoded cfg.
    pub fn cfg_as<T: 'static>(&self) -> Result<&T, CoreError> {
        self.cfg
            .downcast_ref::<T>()
            .ok_or_else(|| CoreError::CfgDecode {
                label: self.label.clone(),
                class: self.class_name.clone(),
                detail: "cfg type does not match class".to_string(),
            })
    }

    /// Typed read-only view of the per-instance state.
    pub fn state_ref<T: 'static>(&self) -> Result<&T, CoreError> {
        self.state
            .downcast_ref::<T>()
            .ok_or_else(|| CoreError::CfgDecode {
                label: self.label.clone(),
                class: self.class_name.clone(),
                detail: "state type does not match class".to_string(),
            })
    }

    /// Typed view of the mutable per-instance state.
    pub fn state_as<T: 'static>(&mut self) -> Result<&mut T, CoreError> {
        let label = self.label.clone();
        let class = self.class_name.clone();
        self.state
            .downcast_mut::<T>()
            .ok_or_else(|| CoreError::CfgDecode {
                label,
                class,
                detail: "state type does not match class".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_METHOD;

    fn bare_func(out_edges: Vec<OutEdge>) -> CmpPtnFuncInstance {
        let msg2idx = out_edges
            .iter()
            .enumerate()
            .map(|(i, e)| (e.msg_type.clone(), i))
            .collect();
        CmpPtnFuncInstance {
            id: 1,
            cp_id: 9,
            label: "f".to_string(),
            class_name: "processPckt".to_string(),
            host: "h1".to_string(),
            priority: Priority::default(),
            active: true,
            trace: false,
            calls: 0,
            cfg: Box::new(()),
            state: Box::new(()),
            methods: MethodTable::new(),
            is_initiating: false,
            init_plan: None,
            in_edge_method_code: HashMap::new(),
            out_edges,
            msg2idx,
            msg_resp: HashMap::new(),
        }
    }

    fn edge(label: &str, msg_type: &str) -> OutEdge {
        OutEdge {
            cp_id: 9,
            func: 0,
            label: label.to_string(),
            msg_type: msg_type.to_string(),
        }
    }

    #[test]
    fn multi_edge_routing_follows_msg2idx() {
        let f = bare_func(vec![edge("a", "t0"), edge("b", "t1")]);
        let mut m = CmpPtnMsg::template("x", 10, 10);
        let idx = f.advance_msg(&mut m, "t1").unwrap();
        assert_eq!(idx, 1);
        assert_eq!(m.next.label, "b");
        assert_eq!(m.msg_type, "t1");
    }

    #[test]
    fn unknown_out_type_is_fatal() {
        let f = bare_func(vec![edge("a", "t0"), edge("b", "t1")]);
        let mut m = CmpPtnMsg::template("x", 10, 10);
        assert!(matches!(
            f.advance_msg(&mut m, "t9"),
            Err(CoreError::UnknownOutType { .. })
        ));
    }

    #[test]
    fn single_edge_overrides_requested_type() {
        let f = bare_func(vec![edge("a", "t0")]);
        let mut m = CmpPtnMsg::template("x", 10, 10);
        let idx = f.advance_msg(&mut m, "t9").unwrap();
        assert_eq!(idx, 0);
        assert_eq!(m.msg_type, "t0");
    }

    #[test]
    fn responses_keep_exec_ids_apart() {
        let mut f = bare_func(vec![edge("a", "t0")]);
        let mut m1 = CmpPtnMsg::template("t0", 10, 10);
        m1.exec_id = 1;
        let mut m2 = CmpPtnMsg::template("t0", 10, 10);
        m2.exec_id = 2;
        f.park(m1);
        f.park(m2);

        let r1 = f.func_resp(1);
        assert_eq!(r1.len(), 1);
        assert_eq!(r1[0].exec_id, 1);
        // Entry removed; second drain is empty.
        assert!(f.func_resp(1).is_empty());
        assert_eq!(f.func_resp(2).len(), 1);
    }

    #[test]
    fn method_code_lookup_uses_full_key() {
        let mut f = bare_func(vec![]);
        f.in_edge_method_code.insert(
            InEdgeKey {
                cp_id: 3,
                label: "up".to_string(),
                msg_type: "ping".to_string(),
            },
            DEFAULT_METHOD.to_string(),
        );
        let hit = MsgAddr::new(3, "up");
        let miss = MsgAddr::new(4, "up");
        assert_eq!(f.method_code_for(&hit, "ping"), Some(DEFAULT_METHOD));
        assert_eq!(f.method_code_for(&miss, "ping"), None);
        assert_eq!(f.method_code_for(&hit, "pong"), None);
    }
}
