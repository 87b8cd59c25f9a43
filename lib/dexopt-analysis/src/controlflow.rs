//! Control flow graph representation.

use crate::errors::{AnalysisError, AnalysisResult};
use dexopt_ir::code::Code;
use dexopt_ir::instrs::{Instr, Instruction, LabeledInstr};
use dexopt_ir::registers::Reg;
use dexopt_ir::Addr;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug)]
pub struct Block {
    instrs: Vec<LabeledInstr>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for linstr in &self.instrs {
            writeln!(f, "{:5}: {}", linstr.addr(), linstr.instr().mnemonic())?;
        }
        Ok(())
    }
}

impl Block {
    fn new(instrs: Vec<LabeledInstr>) -> Self {
        Self { instrs }
    }

    #[inline]
    pub fn instructions(&self) -> impl Iterator<Item = &LabeledInstr> {
        self.instrs.iter()
    }

    #[must_use]
    pub fn start_addr(&self) -> Addr {
        self.instrs.first().expect("blocks are never empty").addr()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Comp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

#[derive(Debug, Clone, Copy)]
pub enum Operand {
    Register(Reg),
    Zero,
}

#[derive(Debug)]
pub enum Branch {
    IfTrue(Reg, Comp, Operand),
    IfFalse(Reg, Comp, Operand),
    Switch(i32),
    SwitchDefault,
    Jmp,
    Sequence,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::IfTrue(_, _, _) => write!(f, "<true>"),
            Self::IfFalse(_, _, _) => write!(f, "<false>"),
            Self::Switch(key) => write!(f, "<switch {key}>"),
            Self::SwitchDefault => write!(f, "<switch _>"),
            Self::Jmp => write!(f, "<jmp>"),
            Self::Sequence => write!(f, "<seq>"),
        }
    }
}

#[derive(Debug)]
pub struct Cfg {
    pub(crate) inner: DiGraph<Block, Branch>,
    node_ids: BTreeMap<Addr, NodeIndex>,
}

impl Cfg {
    pub(crate) fn start_index(&self) -> NodeIndex {
        *self
            .node_ids
            .get(&Addr::entry())
            .expect("a built cfg has an entry block")
    }

    pub fn iter_ordered_blocks(&self) -> impl Iterator<Item = &Block> {
        self.node_ids.values().map(move |id| &self.inner[*id])
    }

    /// Builds the graph of basic blocks of a method body.
    ///
    /// # Errors
    ///
    /// Empty bodies and out-of-bounds branch targets are fatal: the IR
    /// is malformed.
    pub fn build(code: &Code) -> AnalysisResult<Self> {
        if code.instructions_count() == 0 {
            return Err(AnalysisError::NoCode);
        }

        let mut cfgraph = DiGraph::new();
        let mut blocks_map = BTreeMap::new();

        let leaders = compute_block_leaders(code)?;
        for block in split_into_blocks(code, leaders) {
            blocks_map.insert(block.start_addr(), cfgraph.add_node(block));
        }

        let breakers: Vec<(Addr, LabeledInstr)> = cfgraph
            .node_indices()
            .map(|id| {
                let block = &cfgraph[id];
                (
                    block.start_addr(),
                    block.instrs.last().expect("blocks are never empty").clone(),
                )
            })
            .collect();
        for (leader_addr, linstr) in breakers {
            let src_id = blocks_map[&leader_addr];
            let branching = instruction_branching(&linstr)?;
            if branching.is_empty() && !instruction_does_return(&linstr) {
                if let Some(dst_id) = blocks_map.get(&linstr.next_addr()) {
                    cfgraph.add_edge(src_id, *dst_id, Branch::Sequence);
                }
            }
            for (branch, dst) in branching {
                let dst_id = blocks_map
                    .get(&dst)
                    .ok_or(AnalysisError::BadBranchTarget(dst))?;
                cfgraph.add_edge(src_id, *dst_id, branch);
            }
        }

        Ok(Self {
            inner: cfgraph,
            node_ids: blocks_map,
        })
    }
}

// Block leaders are block first instructions addresses:
//   - the target address of a branching instruction is a leader
//   - the address following a branching or returning instruction is a
//     leader
fn compute_block_leaders(code: &Code) -> AnalysisResult<BTreeSet<Addr>> {
    let mut leaders = BTreeSet::new();

    for linstr in code.iter_instructions() {
        let branching = instruction_branching(linstr)?;
        if !branching.is_empty() || instruction_does_return(linstr) {
            leaders.insert(linstr.next_addr());
        }
        for (_, dst) in branching {
            leaders.insert(dst);
        }
    }

    Ok(leaders)
}

fn split_into_blocks(code: &Code, mut leaders: BTreeSet<Addr>) -> Vec<Block> {
    let mut instrs = Vec::new();
    let mut blocks = Vec::new();

    // remove 0 so we don't split at the beginning and don't create an
    // empty block
    leaders.remove(&Addr::entry());

    for linstr in code.iter_instructions() {
        if leaders.contains(&linstr.addr()) && !instrs.is_empty() {
            blocks.push(Block::new(instrs));
            instrs = Vec::new();
        }
        instrs.push(linstr.clone());
    }
    if !instrs.is_empty() {
        blocks.push(Block::new(instrs));
    }

    blocks
}

fn instruction_branching(linstr: &LabeledInstr) -> AnalysisResult<Vec<(Branch, Addr)>> {
    match linstr.instr() {
        Instr::Goto(offset) => Ok(vec![(Branch::Jmp, linstr.addr().offset(*offset))]),

        Instr::PackedSwitch(_, first_key, targets) => {
            Ok(std::iter::once((Branch::SwitchDefault, linstr.next_addr()))
                .chain(targets.iter().enumerate().map(|(i, target)| {
                    (
                        Branch::Switch(first_key + i as i32),
                        linstr.addr().offset(*target),
                    )
                }))
                .collect())
        }

        Instr::IfEq(reg1, reg2, offset) => {
            if_instr_branching(linstr, *offset, *reg1, Comp::Eq, Operand::Register(*reg2))
        }
        Instr::IfNe(reg1, reg2, offset) => {
            if_instr_branching(linstr, *offset, *reg1, Comp::Ne, Operand::Register(*reg2))
        }
        Instr::IfLt(reg1, reg2, offset) => {
            if_instr_branching(linstr, *offset, *reg1, Comp::Lt, Operand::Register(*reg2))
        }
        Instr::IfGe(reg1, reg2, offset) => {
            if_instr_branching(linstr, *offset, *reg1, Comp::Ge, Operand::Register(*reg2))
        }
        Instr::IfGt(reg1, reg2, offset) => {
            if_instr_branching(linstr, *offset, *reg1, Comp::Gt, Operand::Register(*reg2))
        }
        Instr::IfLe(reg1, reg2, offset) => {
            if_instr_branching(linstr, *offset, *reg1, Comp::Le, Operand::Register(*reg2))
        }
        Instr::IfEqz(reg, offset) => {
            if_instr_branching(linstr, *offset, *reg, Comp::Eq, Operand::Zero)
        }
        Instr::IfNez(reg, offset) => {
            if_instr_branching(linstr, *offset, *reg, Comp::Ne, Operand::Zero)
        }
        Instr::IfLtz(reg, offset) => {
            if_instr_branching(linstr, *offset, *reg, Comp::Lt, Operand::Zero)
        }
        Instr::IfGez(reg, offset) => {
            if_instr_branching(linstr, *offset, *reg, Comp::Ge, Operand::Zero)
        }
        Instr::IfGtz(reg, offset) => {
            if_instr_branching(linstr, *offset, *reg, Comp::Gt, Operand::Zero)
        }
        Instr::IfLez(reg, offset) => {
            if_instr_branching(linstr, *offset, *reg, Comp::Le, Operand::Zero)
        }

        _ => Ok(vec![]),
    }
}

fn if_instr_branching(
    linstr: &LabeledInstr,
    offset: i32,
    op1: Reg,
    comp: Comp,
    op2: Operand,
) -> AnalysisResult<Vec<(Branch, Addr)>> {
    Ok(vec![
        (Branch::IfTrue(op1, comp, op2), linstr.addr().offset(offset)),
        (Branch::IfFalse(op1, comp, op2), linstr.next_addr()),
    ])
}

fn instruction_does_return(linstr: &LabeledInstr) -> bool {
    matches!(
        linstr.instr(),
        Instr::ReturnVoid
            | Instr::Return(_)
            | Instr::ReturnWide(_)
            | Instr::ReturnObject(_)
            | Instr::Throw(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexopt_ir::registers::Reg;

    fn reg(r: u16) -> Reg {
        Reg::from(r)
    }

    #[test]
    fn a_branch_splits_blocks_and_labels_edges() {
        let code = Code::new(
            1,
            vec![
                Instr::Const(reg(0), 0),
                Instr::IfEqz(reg(0), 2),
                Instr::Const(reg(0), 1),
                Instr::ReturnVoid,
            ],
        );
        let cfg = Cfg::build(&code).unwrap();
        let blocks: Vec<Addr> = cfg.iter_ordered_blocks().map(Block::start_addr).collect();
        assert_eq!(blocks, vec![Addr(0), Addr(2), Addr(3)]);
        assert_eq!(cfg.inner.edge_count(), 3);
    }

    #[test]
    fn empty_code_is_fatal() {
        let code = Code::new(0, vec![]);
        assert!(matches!(Cfg::build(&code), Err(AnalysisError::NoCode)));
    }

    #[test]
    fn branching_outside_the_body_is_fatal() {
        let code = Code::new(0, vec![Instr::Goto(7)]);
        assert!(matches!(
            Cfg::build(&code),
            Err(AnalysisError::BadBranchTarget(_))
        ));
    }
}
