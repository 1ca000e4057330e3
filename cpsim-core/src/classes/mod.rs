//! Built-in function classes.
//!
//! Eight behaviors cover the stock roles: chain generation and termination,
//! packet processing, request/response service, cross-pattern transfer,
//! measurement probes, and background load.

mod background;
mod finish;
mod measure;
mod process;
mod service;
mod start;
mod transfer;

pub use background::{BckgrndLdClass, BckgrndLdCfg};
pub use finish::{FinishCfg, FinishClass};
pub use measure::{MeasureCfg, MeasureClass};
pub use process::{PcktMap, ProcessPcktCfg, ProcessPcktClass};
pub use service::{SrvReqCfg, SrvReqClass, SrvReqState, SrvRspCfg, SrvRspClass};
pub use start::{StartCfg, StartClass};
pub use transfer::{TransferCfg, TransferClass};

use crate::class::FuncClassRegistry;
use std::sync::Arc;

/// Register every built-in class. Safe to call more than once.
pub fn register_builtins(reg: &mut FuncClassRegistry) {
    reg.register(Arc::new(StartClass));
    reg.register(Arc::new(FinishClass));
    reg.register(Arc::new(ProcessPcktClass));
    reg.register(Arc::new(SrvReqClass));
    reg.register(Arc::new(SrvRspClass));
    reg.register(Arc::new(TransferClass));
    reg.register(Arc::new(MeasureClass));
    reg.register(Arc::new(BckgrndLdClass));
}
