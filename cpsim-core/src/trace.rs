//! Append-only event trace.
//!
//! Inactive by default; every call is a no-op until `activate` runs, so hot
//! paths can trace unconditionally. Records accumulate in memory and are
//! serialized in one piece at end of run.

use crate::types::{ExecId, ObjId, SimTime};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Enter,
    Exit,
    Send,
    Arrive,
    Lost,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceRecord {
    pub time: SimTime,
    pub exec_id: ExecId,
    /// Global id of the function instance the event happened at.
    pub obj_id: ObjId,
    pub kind: TraceKind,
    pub is_pckt: bool,
    pub rate: f64,
    /// Compact message serialization.
    pub msg: String,
}

/// A name-table entry tying a global object id to its human name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NameRecord {
    pub id: ObjId,
    pub name: String,
    pub category: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TraceLog {
    pub names: Vec<NameRecord>,
    pub records: Vec<TraceRecord>,
}

#[derive(Debug, Default)]
pub struct TraceMgr {
    active: bool,
    log: TraceLog,
}

impl TraceMgr {
    pub fn new(active: bool) -> Self {
        Self {
            active,
            log: TraceLog::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_trace(
        &mut self,
        time: SimTime,
        exec_id: ExecId,
        obj_id: ObjId,
        kind: TraceKind,
        is_pckt: bool,
        rate: f64,
        msg: String,
    ) {
        if !self.active {
            return;
        }
        self.log.records.push(TraceRecord {
            time,
            exec_id,
            obj_id,
            kind,
            is_pckt,
            rate,
            msg,
        });
    }

    pub fn add_name(&mut self, id: ObjId, name: impl Into<String>, category: impl Into<String>) {
        if !self.active {
            return;
        }
        self.log.names.push(NameRecord {
            id,
            name: name.into(),
            category: category.into(),
        });
    }

    pub fn log(&self) -> &TraceLog {
        &self.log
    }

    pub fn into_log(self) -> TraceLog {
        self.log
    }
}
