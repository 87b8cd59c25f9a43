//! This crate provides the per-method analysis core of the `dexopt`
//! project: type inference over the Dalvik register machine, the type
//! checker validating every instruction against the platform verifier
//! rules, and the reference resolver that rebinds symbolic member
//! references using the inferred types.

pub mod api;
pub mod checker;
pub mod controlflow;
pub mod dataflow;
pub mod errors;
pub mod hierarchy;
pub mod repo;
pub mod resolver;
pub mod typing;

use crate::errors::AnalysisResult;

/// Runs forward type inference on one method and returns the
/// per-instruction abstract states.
///
/// # Errors
///
/// This function only generates fatal errors (method without code,
/// malformed control flow); per-method type errors are the
/// [`checker::TypeChecker`]'s concern.
pub fn forward_typecheck(
    method: &repo::Method,
    repo: &repo::Repo,
) -> AnalysisResult<typing::TypeStates> {
    typing::TypeStates::forward_compute(method, repo)
}
