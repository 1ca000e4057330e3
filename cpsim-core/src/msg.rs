//! The in-flight message and its carried headers.
//!
//! A `CmpPtnMsg` travels a chain of function instances. Routing rewrites the
//! `next` address in place; the `prev` address is stamped by the sender just
//! before delivery so arrival dispatch can key on the edge it crossed.

use crate::types::{CpId, ExecId, MsgAddr, ObjId, SimTime};
use serde::{Deserialize, Serialize};

/// Return address carried by a service request, consumed by the response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RtnAddr {
    pub addr: MsgAddr,
    pub msg_type: String,
}

/// Cross-pattern destination hint consumed by a `transfer` function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct XferHint {
    pub cp_id: CpId,
    pub label: String,
    pub msg_type: String,
}

/// Open measurement span: which probe started it, and when.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MsrTag {
    pub srt_id: ObjId,
    pub start: SimTime,
}

/// Start and (once known) intended end of the chain. Loss reports and final
/// measurement classification read this rather than walking the chain back.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EndPtFuncs {
    pub srt: Option<MsgAddr>,
    pub end: Option<MsgAddr>,
}

/// A message in flight between function instances.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CmpPtnMsg {
    pub exec_id: ExecId,
    pub msg_type: String,
    /// Payload size in bytes, the quantity a network hop carries.
    pub msg_len: u64,
    /// Packet size in bytes; also the key into execution-time tables.
    pub pckt_len: u64,
    /// Rate hint for flows. Zero means the message moves as a packet.
    pub rate: f64,
    /// First-hop flag; set on initiation, cleared once the tracking timer starts.
    pub start: bool,
    /// Where the chain originated.
    pub srt: MsgAddr,
    /// Most recent hop, stamped by the sender.
    pub prev: MsgAddr,
    /// Next hop, written by routing before scheduling.
    pub next: MsgAddr,
    pub rtn: Option<RtnAddr>,
    pub xfer: Option<XferHint>,
    pub msr: Option<MsrTag>,
    pub end_pts: EndPtFuncs,
}

impl CmpPtnMsg {
    /// A template message, as held by an initiating function. The builder
    /// clones it, fills in the origin and exec id, and tags the first hop.
    pub fn template(msg_type: impl Into<String>, msg_len: u64, pckt_len: u64) -> Self {
        Self {
            exec_id: 0,
            msg_type: msg_type.into(),
            msg_len,
            pckt_len,
            rate: 0.0,
            start: false,
            srt: MsgAddr::empty(),
            prev: MsgAddr::empty(),
            next: MsgAddr::empty(),
            rtn: None,
            xfer: None,
            msr: None,
            end_pts: EndPtFuncs::default(),
        }
    }

    pub fn is_pckt(&self) -> bool {
        self.rate == 0.0
    }

    /// Compact single-line form for trace records.
    pub fn compact(&self) -> String {
        format!(
            "exec={} type={} len={} next={} prev={}",
            self.exec_id, self.msg_type, self.msg_len, self.next, self.prev
        )
    }
}
