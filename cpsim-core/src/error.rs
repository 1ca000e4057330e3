//! Core error types.
//!
//! Model-build validation collects every problem it can find before failing;
//! `BuildErrors` carries the aggregate. Everything else is a single fatal
//! condition surfaced where it is detected.

use crate::types::{CpId, ExecId};
use thiserror::Error;

/// One model-build diagnostic, tied to the element that produced it.
#[derive(Debug, Clone)]
pub struct VerifyError {
    pub message: String,
    pub element: Option<String>,
}

impl VerifyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            element: None,
        }
    }

    pub fn on(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            element: Some(element.into()),
        }
    }
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.element {
            Some(el) => write!(f, "{}: {}", el, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// The full set of diagnostics from a failed model build.
#[derive(Debug, Clone)]
pub struct BuildErrors(pub Vec<VerifyError>);

impl std::fmt::Display for BuildErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("model build failed:\n{0}")]
    Build(BuildErrors),

    #[error("function class '{0}' is not registered")]
    UnknownClass(String),

    #[error("cfg for {label} ({class}) failed to decode: {detail}")]
    CfgDecode {
        label: String,
        class: String,
        detail: String,
    },

    #[error("no execution time recorded for op '{op}' on CPU model '{model}'")]
    UnknownTiming { op: String, model: String },

    #[error("no CPU model known for endpoint '{0}'")]
    UnknownEndpt(String),

    #[error("no accelerator '{accel}' on endpoint '{endpt}'")]
    UnknownAccel { endpt: String, accel: String },

    #[error("unexpected output message type '{msg_type}' at {cp_id}:{label}")]
    UnknownOutType {
        cp_id: CpId,
        label: String,
        msg_type: String,
    },

    #[error("pattern instance {0} does not exist")]
    UnknownCp(CpId),

    #[error("pattern '{0}' does not exist")]
    UnknownPattern(String),

    #[error("function '{label}' does not exist in pattern instance {cp_id}")]
    UnknownFunc { cp_id: CpId, label: String },

    #[error("execution record for exec id {0} already started")]
    DuplicateExec(ExecId),

    #[error("service target for op '{op}' at {label} could not be resolved")]
    UnresolvedService { label: String, op: String },

    #[error("failed to read model input {path}: {detail}")]
    InputRead { path: String, detail: String },

    #[error("failed to parse model input {path}: {detail}")]
    InputParse { path: String, detail: String },
}

impl From<BuildErrors> for CoreError {
    fn from(errs: BuildErrors) -> Self {
        CoreError::Build(errs)
    }
}
