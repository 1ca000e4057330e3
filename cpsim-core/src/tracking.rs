//! Execution-thread tracking and measurement accounting.
//!
//! Every initiated chain gets exactly one start record; it ends with either a
//! completion sample or a loss. Bracketed measurement probes open spans that
//! classify observed values into named groups by type tag.

use crate::error::CoreError;
use crate::types::{CpId, ExecId, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

// ─── Sample aggregation ───────────────────────────────────────

/// Running aggregate of completed samples.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatSummary {
    pub n: u64,
    pub sum: f64,
    pub sum_sq: f64,
    pub min: f64,
    pub max: f64,
    pub samples: Vec<f64>,
}

impl StatSummary {
    pub fn add(&mut self, x: f64) {
        if self.n == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.n += 1;
        self.sum += x;
        self.sum_sq += x * x;
        self.samples.push(x);
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }

    /// min, q1, mean, median, q3, max over the recorded samples. Quartiles
    /// are medians of the lower/upper halves (median excluded from either
    /// half when n is odd), so each `n mod 4` case is deterministic.
    pub fn report(&self) -> Option<StatReport> {
        if self.n == 0 {
            return None;
        }
        let mut s = self.samples.clone();
        s.sort_by(|a, b| a.total_cmp(b));
        let n = s.len();
        let half = n / 2;
        let median = median_of(&s);
        let q1 = if half == 0 { s[0] } else { median_of(&s[..half]) };
        let q3 = if half == 0 {
            s[0]
        } else {
            median_of(&s[n - half..])
        };
        Some(StatReport {
            n: self.n,
            min: s[0],
            q1,
            mean: self.mean(),
            median,
            q3,
            max: s[n - 1],
        })
    }
}

fn median_of(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatReport {
    pub n: u64,
    pub min: f64,
    pub q1: f64,
    pub mean: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

// ─── Groups ───────────────────────────────────────────────────

/// What a measurement group's samples mean.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsrType {
    #[default]
    Latency,
    Bndwdth,
    PrLoss,
}

/// Group tags as configured on a `measure` function.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MsrGroups {
    pub types: Vec<MsrType>,
    pub aggregate: bool,
}

impl MsrGroups {
    /// Parse cfg tags; unknown tags are ignored, an empty set means Latency.
    pub fn from_tags(tags: &[String]) -> Self {
        let mut groups = MsrGroups::default();
        for tag in tags {
            match tag.as_str() {
                "Latency" => groups.types.push(MsrType::Latency),
                "Bndwdth" => groups.types.push(MsrType::Bndwdth),
                "PrLoss" => groups.types.push(MsrType::PrLoss),
                "Aggregate" => groups.aggregate = true,
                _ => {}
            }
        }
        if groups.types.is_empty() {
            groups.types.push(MsrType::Latency);
        }
        groups
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrackingGroup {
    pub kind: MsrType,
    pub finished: StatSummary,
}

// ─── Execution records ────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Waypoint {
    pub cp_id: CpId,
    pub label: String,
    pub time: SimTime,
}

/// In-progress chain: where it started and everywhere it has been.
#[derive(Clone, Debug)]
pub struct ActiveExec {
    pub group: String,
    pub cp_id: CpId,
    pub label: String,
    pub start: SimTime,
    pub waypoints: Vec<Waypoint>,
}

/// An open measurement span, keyed by (measure name, exec id).
#[derive(Clone, Debug)]
struct MsrSpan {
    groups: MsrGroups,
    src_cp: CpId,
    src_label: String,
    src_dev: String,
}

/// One completed measurement, destined for the measurement output file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MsrRecord {
    pub measure_name: String,
    pub src_dev: String,
    #[serde(rename = "SrcCP")]
    pub src_cp: CpId,
    pub src_label: String,
    pub dst_dev: String,
    #[serde(rename = "DstCP")]
    pub dst_cp: CpId,
    pub dst_label: String,
    pub latency: f64,
    pub waypoints: Vec<String>,
}

/// Maps sample-context integers to a bucket label appended to the group key.
pub type MsrClassifier = fn(&[i64]) -> String;

fn default_classifier(_: &[i64]) -> String {
    "default".to_string()
}

// ─── Tracker ──────────────────────────────────────────────────

pub struct ExecTracker {
    active: HashMap<ExecId, ActiveExec>,
    groups: BTreeMap<String, TrackingGroup>,
    spans: HashMap<(String, ExecId), MsrSpan>,
    records: Vec<MsrRecord>,
    classifier: MsrClassifier,
}

impl ExecTracker {
    pub fn new() -> Self {
        Self {
            active: HashMap::new(),
            groups: BTreeMap::new(),
            spans: HashMap::new(),
            records: Vec::new(),
            classifier: default_classifier,
        }
    }

    pub fn set_classifier(&mut self, classifier: MsrClassifier) {
        self.classifier = classifier;
    }

    pub fn is_active(&self, exec_id: ExecId) -> bool {
        self.active.contains_key(&exec_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Open the tracking record for a chain. A second start on the same exec
    /// id is a programmer error.
    pub fn start_rec_exec(
        &mut self,
        exec_id: ExecId,
        group: impl Into<String>,
        cp_id: CpId,
        label: impl Into<String>,
        now: SimTime,
    ) -> Result<(), CoreError> {
        if self.active.contains_key(&exec_id) {
            return Err(CoreError::DuplicateExec(exec_id));
        }
        let label = label.into();
        let rec = ActiveExec {
            group: group.into(),
            cp_id,
            label: label.clone(),
            start: now,
            waypoints: vec![Waypoint {
                cp_id,
                label,
                time: now,
            }],
        };
        self.active.insert(exec_id, rec);
        Ok(())
    }

    /// Note the chain's passage through a function.
    pub fn add_waypoint(&mut self, exec_id: ExecId, cp_id: CpId, label: &str, now: SimTime) {
        if let Some(rec) = self.active.get_mut(&exec_id) {
            rec.waypoints.push(Waypoint {
                cp_id,
                label: label.to_string(),
                time: now,
            });
        }
    }

    /// Close the chain with a completion sample. Returns the closed record.
    pub fn end_rec_exec(&mut self, exec_id: ExecId, now: SimTime) -> Option<ActiveExec> {
        let rec = self.active.remove(&exec_id)?;
        let group = self
            .groups
            .entry(rec.group.clone())
            .or_insert_with(|| TrackingGroup {
                kind: MsrType::Latency,
                finished: StatSummary::default(),
            });
        group.finished.add(now - rec.start);
        debug!(exec_id, group = %rec.group, latency = now - rec.start, "chain completed");
        Some(rec)
    }

    /// Close the chain without a sample after a logged drop. Open spans for
    /// this exec are discarded; nothing was measured.
    pub fn abandon_exec(&mut self, exec_id: ExecId) -> Option<ActiveExec> {
        self.spans.retain(|(_, e), _| *e != exec_id);
        self.active.remove(&exec_id)
    }

    /// Close the chain without a sample after the network dropped it. Open
    /// `PrLoss` spans for this exec count the loss.
    pub fn lost_exec(&mut self, exec_id: ExecId) -> Option<ActiveExec> {
        let lost_keys: Vec<(String, ExecId)> = self
            .spans
            .keys()
            .filter(|(_, e)| *e == exec_id)
            .cloned()
            .collect();
        for key in lost_keys {
            let Some(span) = self.spans.remove(&key) else {
                continue;
            };
            if span.groups.types.contains(&MsrType::PrLoss) {
                let group_key = self.msr_group_key(&key.0, exec_id, &span.groups, MsrType::PrLoss);
                self.group_mut(&group_key, MsrType::PrLoss).finished.add(1.0);
            }
        }
        self.active.remove(&exec_id)
    }

    // ─── Measurement spans ────────────────────────────────────

    /// Open a bracketed span. Re-opening an already-open span is a no-op
    /// (the message is already tagged and keeps its original start).
    pub fn msr_start(
        &mut self,
        name: &str,
        exec_id: ExecId,
        groups: MsrGroups,
        src_cp: CpId,
        src_label: &str,
        src_dev: &str,
    ) -> bool {
        let key = (name.to_string(), exec_id);
        if self.spans.contains_key(&key) {
            return false;
        }
        self.spans.insert(
            key,
            MsrSpan {
                groups,
                src_cp,
                src_label: src_label.to_string(),
                src_dev: src_dev.to_string(),
            },
        );
        true
    }

    /// Close a span, classifying `elapsed` into each configured group type,
    /// and emit a measurement record. Returns false when no span was open.
    #[allow(clippy::too_many_arguments)]
    pub fn msr_end(
        &mut self,
        name: &str,
        exec_id: ExecId,
        groups: &MsrGroups,
        elapsed: SimTime,
        msg_len: u64,
        ctx: &[i64],
        dst_cp: CpId,
        dst_label: &str,
        dst_dev: &str,
    ) -> bool {
        let key = (name.to_string(), exec_id);
        let Some(span) = self.spans.remove(&key) else {
            return false;
        };
        let bucket = (self.classifier)(ctx);
        for kind in &groups.types {
            let sample = match kind {
                MsrType::Latency => elapsed,
                MsrType::Bndwdth => {
                    if elapsed > 0.0 {
                        msg_len as f64 / elapsed
                    } else {
                        0.0
                    }
                }
                MsrType::PrLoss => 0.0,
            };
            let mut group_key = self.msr_group_key(name, exec_id, groups, *kind);
            if bucket != "default" {
                group_key = format!("{}/{}", group_key, bucket);
            }
            self.group_mut(&group_key, *kind).finished.add(sample);
        }
        let waypoints = self
            .active
            .get(&exec_id)
            .map(|rec| {
                rec.waypoints
                    .iter()
                    .map(|w| format!("{}:{}@{:.9}", w.cp_id, w.label, w.time))
                    .collect()
            })
            .unwrap_or_default();
        self.records.push(MsrRecord {
            measure_name: name.to_string(),
            src_dev: span.src_dev,
            src_cp: span.src_cp,
            src_label: span.src_label,
            dst_dev: dst_dev.to_string(),
            dst_cp,
            dst_label: dst_label.to_string(),
            latency: elapsed,
            waypoints,
        });
        true
    }

    fn msr_group_key(
        &self,
        name: &str,
        exec_id: ExecId,
        groups: &MsrGroups,
        kind: MsrType,
    ) -> String {
        let base = if groups.aggregate {
            name.to_string()
        } else {
            format!("{}:{}", name, exec_id)
        };
        match kind {
            MsrType::Latency => base,
            MsrType::Bndwdth => format!("{}#bndwdth", base),
            MsrType::PrLoss => format!("{}#prloss", base),
        }
    }

    fn group_mut(&mut self, key: &str, kind: MsrType) -> &mut TrackingGroup {
        self.groups
            .entry(key.to_string())
            .or_insert_with(|| TrackingGroup {
                kind,
                finished: StatSummary::default(),
            })
    }

    // ─── Reporting ────────────────────────────────────────────

    pub fn groups(&self) -> &BTreeMap<String, TrackingGroup> {
        &self.groups
    }

    pub fn records(&self) -> &[MsrRecord] {
        &self.records
    }
}

impl Default for ExecTracker {
    fn default() -> Self {
        Self::new()
    }
}
