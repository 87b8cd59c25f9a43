use crate::controlflow::{Branch, Cfg};
use crate::dataflow::Dataflow;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::repo::Method;
use dexopt_ir::instrs::Instr;
use dexopt_ir::Addr;
use petgraph::graph::NodeIndex;
use petgraph::visit::{DfsPostOrder, EdgeRef};
use petgraph::Direction;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// The abstract state that is carried along the control flow graph
/// during forward dataflow analysis.
pub trait AbstractForwardState<'a>: Eq + Sized {
    type Context<'c>;
    type Error;

    /// The state initialization function, deriving the method entry
    /// state from its signature.
    ///
    /// # Errors
    ///
    /// This method should return a `Self::Error` if the given method
    /// does not allow a proper state initialization.
    fn init(method: &Method, ctx: &Self::Context<'a>) -> Result<Self, Self::Error>;

    /// The state join operation function.
    ///
    /// # Errors
    ///
    /// This method should return a `Self::Error` if the given states
    /// cannot be joined properly with respect to the context.
    fn join(&mut self, other: &Self, ctx: &Self::Context<'a>) -> Result<(), Self::Error>;

    /// The control flow branch transfer function.
    ///
    /// # Errors
    ///
    /// This method should return a `Self::Error` if the given branch
    /// cannot be passed with the current state with respect to the
    /// context.
    fn transfer_branch(
        &mut self,
        branch: &Branch,
        ctx: &Self::Context<'a>,
    ) -> Result<(), Self::Error>;

    /// The instruction transfer function.
    ///
    /// # Errors
    ///
    /// This method should return a `Self::Error` if the given
    /// instruction cannot be passed with the current state with
    /// respect to the context.
    fn transfer_instr(&mut self, instr: &Instr, ctx: &Self::Context<'a>)
        -> Result<(), Self::Error>;
}

/// Performs a forward dataflow analysis over the method body.
///
/// The analysis parameters are given by the [`AbstractForwardState`]
/// trait methods passed as a type parameter. The worklist is seeded in
/// reverse postorder; block entries are the join of the computed
/// predecessor exits (predecessors not yet visited contribute nothing,
/// which is the bottom of the state lattice); successors of a block
/// whose exit state changed are revisited. Termination follows from
/// the finite height of the state lattice.
///
/// # Errors
///
/// This function may generate errors resulting of an underlying
/// abstract state error (at initialization, join or transfer
/// operation), or of a malformed method body (no code, bad branch
/// target).
pub fn forward<'a, S>(method: &Method, context: &S::Context<'a>) -> AnalysisResult<Dataflow<S>>
where
    S: AbstractForwardState<'a> + Clone + fmt::Display,
    S::Error: Into<AnalysisError>,
{
    let code = method.code().ok_or(AnalysisError::NoCode)?;
    let cfg = Cfg::build(&code.read().expect("code lock poisoned"))?;
    let cfgraph = &cfg.inner;

    let mut block_exits: BTreeMap<NodeIndex, S> = BTreeMap::new();
    let mut entries: BTreeMap<Addr, S> = BTreeMap::new();
    let mut exits: BTreeMap<Addr, S> = BTreeMap::new();

    // For forward dataflow, optimal order is reverse postorder.
    // The postorder here is reversed when we pop_back from the deque.
    let mut worklist: VecDeque<NodeIndex> = VecDeque::new();
    let mut postorder = DfsPostOrder::new(cfgraph, cfg.start_index());
    while let Some(id) = postorder.next(cfgraph) {
        worklist.push_back(id);
    }

    while let Some(id) = worklist.pop_back() {
        let block = &cfgraph[id];
        log::debug!("    ---- block@{}", block.start_addr());

        // retrieve list of already computed predecessors
        let preds: Vec<_> = cfgraph
            .edges_directed(id, Direction::Incoming)
            .filter(|edge| block_exits.contains_key(&edge.source()))
            .collect();

        // recompose new_state from exit states of predecessor blocks:
        // no computed predecessor means entry = initial state,
        // otherwise entry = join of predecessors exits
        let mut new_state = if preds.is_empty() {
            S::init(method, context).map_err(S::Error::into)?
        } else {
            let mut entry: S = block_exits
                .get(&preds[0].source())
                .expect("filtered on computed exits")
                .clone();
            entry
                .transfer_branch(preds[0].weight(), context)
                .map_err(S::Error::into)?;
            for edge in preds.iter().skip(1) {
                let mut previous = block_exits
                    .get(&edge.source())
                    .expect("filtered on computed exits")
                    .clone();
                previous
                    .transfer_branch(edge.weight(), context)
                    .map_err(S::Error::into)?;
                entry.join(&previous, context).map_err(S::Error::into)?;
            }
            entry
        };

        // the method entry block keeps its initial state even when it
        // is also a branch target
        if id == cfg.start_index() && !preds.is_empty() {
            let init = S::init(method, context).map_err(S::Error::into)?;
            new_state.join(&init, context).map_err(S::Error::into)?;
        }

        log::debug!("    -- ENTRY STATE:");
        for line in format!("{new_state}").split('\n') {
            log::debug!("      {line}");
        }

        // then apply the transfer function for each instruction of the
        // block while saving intermediate states
        for linstr in block.instructions() {
            entries.insert(linstr.addr(), new_state.clone());
            log::trace!("transfer_instr( {:?} )", linstr.instr());
            new_state
                .transfer_instr(linstr.instr(), context)
                .map_err(S::Error::into)?;
            exits.insert(linstr.addr(), new_state.clone());
        }
        log::debug!("    -- EXIT STATE:");
        for line in format!("{new_state}").split('\n') {
            log::debug!("      {line}");
        }

        // successors need treatment again when the exit state changed;
        // a first computation counts as a change so that back edges
        // into already-visited blocks are honored
        let changed = block_exits
            .get(&id)
            .map_or(true, |old_state| &new_state != old_state);
        if changed {
            cfgraph
                .edges_directed(id, Direction::Outgoing)
                .for_each(|edge| {
                    if !worklist.contains(&edge.target()) {
                        worklist.push_front(edge.target());
                    }
                });
        }

        block_exits.insert(id, new_state);
    }

    Ok(Dataflow { entries, exits })
}
