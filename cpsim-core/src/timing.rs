//! Host-bound execution timing.
//!
//! A three-level table `op → CPU model → (pcktLen, secs)` built from the
//! function exec list. Lookups interpolate: exact packet-length match wins,
//! one calibration point scales linearly from the origin, two or more fit an
//! ordinary least-squares line.

use crate::error::CoreError;
use crate::model::desc::FuncExecDict;
use crate::types::SimTime;
use std::collections::HashMap;

/// Recognized spellings of the free operation.
fn is_no_op(op: &str) -> bool {
    op.eq_ignore_ascii_case("noop") || op.eq_ignore_ascii_case("nop") || op.eq_ignore_ascii_case("no-op")
}

#[derive(Debug, Default)]
pub struct FuncExecTable {
    // op → cpu model → calibration points, sorted by pckt_len.
    times: HashMap<String, HashMap<String, Vec<(f64, f64)>>>,
}

impl FuncExecTable {
    pub fn from_desc(desc: &FuncExecDict) -> Self {
        let mut times: HashMap<String, HashMap<String, Vec<(f64, f64)>>> = HashMap::new();
        for (op, samples) in &desc.times {
            let models = times.entry(op.clone()).or_default();
            for s in samples {
                models
                    .entry(s.cpu_model.clone())
                    .or_default()
                    .push((s.pckt_len as f64, s.exec_time));
            }
        }
        for models in times.values_mut() {
            for points in models.values_mut() {
                points.sort_by(|a, b| a.0.total_cmp(&b.0));
                points.dedup_by(|a, b| a.0 == b.0);
            }
        }
        Self { times }
    }

    pub fn has_op(&self, op: &str) -> bool {
        is_no_op(op) || self.times.contains_key(op)
    }

    /// Simulated cost of `op` on `cpu_model` for a packet of `pckt_len`
    /// bytes. Unknown op or model is a model error.
    pub fn exec_time(&self, op: &str, cpu_model: &str, pckt_len: u64) -> Result<SimTime, CoreError> {
        if is_no_op(op) {
            return Ok(0.0);
        }
        let points = self
            .times
            .get(op)
            .and_then(|models| models.get(cpu_model))
            .ok_or_else(|| CoreError::UnknownTiming {
                op: op.to_string(),
                model: cpu_model.to_string(),
            })?;

        let x = pckt_len as f64;
        if let Some(&(_, y)) = points.iter().find(|&&(px, _)| px == x) {
            return Ok(y);
        }
        match points.len() {
            0 => Err(CoreError::UnknownTiming {
                op: op.to_string(),
                model: cpu_model.to_string(),
            }),
            1 => {
                let (px, py) = points[0];
                Ok(py / px * x)
            }
            _ => {
                let (m, b) = least_squares(points);
                Ok(m * x + b)
            }
        }
    }
}

/// Ordinary least-squares fit over all calibration points.
fn least_squares(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|p| p.0).sum();
    let sum_y: f64 = points.iter().map(|p| p.1).sum();
    let sum_xx: f64 = points.iter().map(|p| p.0 * p.0).sum();
    let sum_xy: f64 = points.iter().map(|p| p.0 * p.1).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    if denom == 0.0 {
        // All x identical; fall back to the mean as a flat line.
        return (0.0, sum_y / n);
    }
    let m = (n * sum_xy - sum_x * sum_y) / denom;
    let b = (sum_y - m * sum_x) / n;
    (m, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::desc::FuncExecDesc;

    fn table(samples: Vec<(u64, f64)>) -> FuncExecTable {
        let mut desc = FuncExecDict::default();
        desc.times.insert(
            "encrypt".to_string(),
            samples
                .into_iter()
                .map(|(len, secs)| FuncExecDesc {
                    param: String::new(),
                    cpu_model: "x86".to_string(),
                    pckt_len: len,
                    exec_time: secs,
                })
                .collect(),
        );
        FuncExecTable::from_desc(&desc)
    }

    #[test]
    fn exact_match_returns_stored_value() {
        let t = table(vec![(1000, 1e-3), (2000, 2.5e-3)]);
        assert_eq!(t.exec_time("encrypt", "x86", 1000).unwrap(), 1e-3);
    }

    #[test]
    fn single_point_scales_from_origin() {
        let t = table(vec![(1000, 1e-3)]);
        let got = t.exec_time("encrypt", "x86", 500).unwrap();
        assert!((got - 5e-4).abs() < 1e-12);
    }

    #[test]
    fn two_points_fit_least_squares() {
        // Points on y = 1e-6 x + 1e-4 exactly, so the fit is exact.
        let t = table(vec![(1000, 1.1e-3), (3000, 3.1e-3)]);
        let got = t.exec_time("encrypt", "x86", 2000).unwrap();
        assert!((got - 2.1e-3).abs() < 1e-9, "got {}", got);
    }

    #[test]
    fn no_op_is_free_in_any_spelling() {
        let t = table(vec![(1000, 1e-3)]);
        for op in ["noop", "NOP", "nop", "no-op", "No-Op"] {
            assert_eq!(t.exec_time(op, "anything", 123).unwrap(), 0.0);
        }
    }

    #[test]
    fn unknown_model_is_fatal() {
        let t = table(vec![(1000, 1e-3)]);
        assert!(matches!(
            t.exec_time("encrypt", "riscv", 1000),
            Err(CoreError::UnknownTiming { .. })
        ));
        assert!(matches!(
            t.exec_time("decrypt", "x86", 1000),
            Err(CoreError::UnknownTiming { .. })
        ));
    }
}
