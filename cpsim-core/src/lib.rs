//! Discrete-event simulator core for computational-pattern models.
//!
//! Applications are described as *computational patterns*: directed graphs
//! of functions that exchange messages, mapped onto a simulated host and
//! network topology. The core owns the pattern/function model, a registry of
//! function behaviors, the event timeline, execution tracking with
//! measurement probes, and the boundary to a network collaborator.
//!
//! ```no_run
//! use cpsim_core::engine::{RunOptions, Runtime};
//! use cpsim_core::model::desc::*;
//! use cpsim_core::portal::SimpleNetwork;
//!
//! # fn main() -> anyhow::Result<()> {
//! let cp: CompPatternDict = serde_yaml::from_str(include_str!("../demo/cp.yaml"))?;
//! let init: CpInitDict = serde_yaml::from_str(include_str!("../demo/cpinit.yaml"))?;
//! let exec: FuncExecDict = serde_yaml::from_str(include_str!("../demo/funcexec.yaml"))?;
//! let map: MappingDict = serde_yaml::from_str(include_str!("../demo/map.yaml"))?;
//! let topo: TopoDesc = serde_yaml::from_str(include_str!("../demo/topo.yaml"))?;
//!
//! let portal = SimpleNetwork::new(&topo, &Default::default(), &Default::default(), 1);
//! let mut rt = Runtime::build(
//!     &cp, &init, &exec, &Default::default(), &map,
//!     Box::new(portal), RunOptions::default(),
//! )?;
//! rt.run()?;
//! # Ok(())
//! # }
//! ```

pub mod class;
pub mod classes;
pub mod engine;
pub mod error;
pub mod events;
pub mod func;
pub mod graph;
pub mod model;
pub mod msg;
pub mod pattern;
pub mod portal;
pub mod report;
pub mod sim;
pub mod timing;
pub mod trace;
pub mod tracking;
pub mod types;

pub use class::{FuncClass, FuncClassRegistry};
pub use engine::{RunOptions, Runtime};
pub use error::{BuildErrors, CoreError, VerifyError};
pub use msg::CmpPtnMsg;
pub use pattern::CmpPtnInstance;
pub use portal::{NetworkPortal, SimpleNetwork};
pub use types::{CpId, ExecId, SimTime};
