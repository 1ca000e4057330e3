//! Every schedulable occurrence in a run.
//!
//! Handlers run to completion in timestamp order; the only suspension point
//! is scheduling another event. Class entry handlers park in-progress work by
//! scheduling `ClassExit` (service completion) which in turn schedules the
//! generic `ExitFunc` at zero delay.

use crate::msg::CmpPtnMsg;
use crate::types::{CpId, ExecId, FuncIdx};

#[derive(Debug)]
pub enum Event {
    /// A message arrives at a function instance. `None` asks an initiating
    /// function to mint a fresh chain from its template.
    EnterFunc {
        cp_id: CpId,
        func: FuncIdx,
        msg: Option<Box<CmpPtnMsg>>,
    },

    /// Service completion: run the class exit handler bound to `method`.
    ClassExit {
        cp_id: CpId,
        func: FuncIdx,
        method: String,
        msg: Box<CmpPtnMsg>,
    },

    /// Generic completion: drain the response buffer and route each message
    /// to its next hop (same host at zero delay, otherwise via the portal).
    ExitFunc {
        cp_id: CpId,
        func: FuncIdx,
        exec_id: ExecId,
    },

    /// The network delivered a message; re-enter at the destination.
    ReEnter {
        cp_id: CpId,
        func: FuncIdx,
        msg: Box<CmpPtnMsg>,
    },

    /// The network dropped a message bound for `cp_id`.
    LostMsg { cp_id: CpId, msg: Box<CmpPtnMsg> },

    /// A host (or accelerator) scheduler's running task reached its
    /// completion time: run its class exit and start the next waiting task.
    TaskDone { host: String, accel: Option<String> },

    /// One-shot registration of a background-load function with its host.
    BckgrndLd { cp_id: CpId, func: FuncIdx },
}

impl Event {
    /// Short tag for debug logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::EnterFunc { .. } => "enter",
            Event::ClassExit { .. } => "class-exit",
            Event::ExitFunc { .. } => "exit",
            Event::ReEnter { .. } => "re-enter",
            Event::LostMsg { .. } => "lost",
            Event::TaskDone { .. } => "task-done",
            Event::BckgrndLd { .. } => "bckgrnd",
        }
    }
}
