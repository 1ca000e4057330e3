//! End-of-run output shaping.
//!
//! Turns tracker and trace state into the serializable files the CLI writes:
//! per-group statistic rows (CSV), measurement records (JSON/YAML), and the
//! tick-stamped trace.

use crate::trace::{NameRecord, TraceLog};
use crate::tracking::{ExecTracker, MsrRecord, MsrType};
use crate::types::{ExecId, ObjId, SimTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ─── Time units ───────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnits {
    #[default]
    Sec,
    Msec,
    Musec,
    Nsec,
}

impl TimeUnits {
    /// Seconds per tick.
    pub fn scale(self) -> f64 {
        match self {
            TimeUnits::Sec => 1.0,
            TimeUnits::Msec => 1e-3,
            TimeUnits::Musec => 1e-6,
            TimeUnits::Nsec => 1e-9,
        }
    }

    pub fn ticks(self, time: SimTime) -> u64 {
        (time / self.scale()).round() as u64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnits::Sec => "sec",
            TimeUnits::Msec => "msec",
            TimeUnits::Musec => "musec",
            TimeUnits::Nsec => "nsec",
        }
    }
}

impl FromStr for TimeUnits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sec" => Ok(TimeUnits::Sec),
            "msec" => Ok(TimeUnits::Msec),
            "musec" => Ok(TimeUnits::Musec),
            "nsec" => Ok(TimeUnits::Nsec),
            other => Err(format!("unknown time unit '{}'", other)),
        }
    }
}

// ─── Tracking summary ─────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
pub struct GroupRow {
    pub group: String,
    pub kind: MsrType,
    pub n: u64,
    pub min: f64,
    pub q1: f64,
    pub mean: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// One row per tracking group that collected at least one sample.
pub fn tracking_rows(tracker: &ExecTracker) -> Vec<GroupRow> {
    tracker
        .groups()
        .iter()
        .filter_map(|(name, group)| {
            group.finished.report().map(|r| GroupRow {
                group: name.clone(),
                kind: group.kind,
                n: r.n,
                min: r.min,
                q1: r.q1,
                mean: r.mean,
                median: r.median,
                q3: r.q3,
                max: r.max,
            })
        })
        .collect()
}

pub fn tracking_csv(rows: &[GroupRow]) -> String {
    let mut out = String::from("group,kind,n,min,q1,mean,median,q3,max\n");
    for r in rows {
        out.push_str(&format!(
            "{},{:?},{},{:.9},{:.9},{:.9},{:.9},{:.9},{:.9}\n",
            r.group, r.kind, r.n, r.min, r.q1, r.mean, r.median, r.q3, r.max
        ));
    }
    out
}

// ─── Measurement file ─────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
pub struct MeasureFile {
    pub experiment: String,
    pub model_digest: String,
    pub measurements: Vec<MsrRecord>,
}

pub fn measure_file(experiment: &str, digest: &str, tracker: &ExecTracker) -> MeasureFile {
    MeasureFile {
        experiment: experiment.to_string(),
        model_digest: digest.to_string(),
        measurements: tracker.records().to_vec(),
    }
}

// ─── Trace file ───────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
pub struct TickRecord {
    pub ticks: u64,
    pub time: SimTime,
    pub exec_id: ExecId,
    pub obj_id: ObjId,
    pub kind: String,
    pub is_pckt: bool,
    pub rate: f64,
    pub msg: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct TraceFile {
    pub experiment: String,
    pub model_digest: String,
    pub time_unit: String,
    pub names: Vec<NameRecord>,
    pub records: Vec<TickRecord>,
}

pub fn trace_file(experiment: &str, digest: &str, units: TimeUnits, log: &TraceLog) -> TraceFile {
    TraceFile {
        experiment: experiment.to_string(),
        model_digest: digest.to_string(),
        time_unit: units.as_str().to_string(),
        names: log.names.clone(),
        records: log
            .records
            .iter()
            .map(|r| TickRecord {
                ticks: units.ticks(r.time),
                time: r.time,
                exec_id: r.exec_id,
                obj_id: r.obj_id,
                kind: format!("{:?}", r.kind).to_lowercase(),
                is_pckt: r.is_pckt,
                rate: r.rate,
                msg: r.msg.clone(),
            })
            .collect(),
    }
}
