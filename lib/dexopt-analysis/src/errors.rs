//! Analysis errors definition.

use crate::typing::errors::CheckError;
use dexopt_ir::errors::IrError;
use dexopt_ir::Addr;
use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Fatal analysis failures: malformed IR and broken internal
/// invariants. Per-method type errors are [`CheckError`]s, surfaced by
/// the checker without aborting the analysis of other methods.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("internal error: {0}")]
    Internal(String),

    #[error("ir error: {0}")]
    Ir(#[from] IrError),

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("the method has no implementation")]
    NoCode,

    #[error("branch target out of bounds: {0}")]
    BadBranchTarget(Addr),

    #[error("register out of bounds: v{0}")]
    OutOfBoundsRegister(u16),

    #[error("type check error: {0}")]
    Check(#[from] CheckError),
}
