//! Dataflow analysis framework.

use dexopt_ir::Addr;
use std::collections::BTreeMap;

mod forward;

pub use forward::{forward, AbstractForwardState};

/// Dataflow analysis result object.
///
/// Contains entry and exit abstract states for every instruction
/// reachable from the method entry, after reaching fixpoint. The
/// invariant callers rely on: `entries[addr]` is the state *before*
/// the instruction at `addr` executes.
#[derive(Debug, Clone)]
pub struct Dataflow<S> {
    pub entries: BTreeMap<Addr, S>,
    pub exits: BTreeMap<Addr, S>,
}
