//! `bckgrndLd` — background load injection.
//!
//! Registered once at run start; folds a configured offered rate and service
//! time into its host's service model. Takes no part in message dispatch, so
//! its method table is empty and any arrival is dropped with a warning.

use crate::class::{decode_cfg_as, FuncClass, MethodTable};
use crate::types::CfgFormat;
use serde::Deserialize;
use std::any::Any;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BckgrndLdCfg {
    /// Offered operations per second.
    pub rate: f64,
    /// Seconds of service per operation.
    pub srv_time: f64,
}

pub struct BckgrndLdClass;

impl FuncClass for BckgrndLdClass {
    fn name(&self) -> &'static str {
        "bckgrndLd"
    }

    fn decode_cfg(&self, raw: &str, format: CfgFormat) -> Result<Box<dyn Any + Send>, String> {
        decode_cfg_as::<BckgrndLdCfg>(raw, format)
    }

    fn init_state(&self, _cfg: &(dyn Any + Send)) -> Box<dyn Any + Send> {
        Box::new(())
    }

    fn methods(&self) -> MethodTable {
        MethodTable::new()
    }

    fn validate_cfg(&self, cfg: &(dyn Any + Send)) -> Vec<String> {
        let Some(cfg) = cfg.downcast_ref::<BckgrndLdCfg>() else {
            return vec!["cfg is not a bckgrndLd cfg".to_string()];
        };
        let mut problems = Vec::new();
        if cfg.rate < 0.0 || cfg.srv_time < 0.0 {
            problems.push("rate and srv_time must be non-negative".to_string());
        }
        if cfg.rate * cfg.srv_time >= 1.0 {
            problems.push("offered background utilization saturates the host".to_string());
        }
        problems
    }
}
