//! Basic blocks and the per-routine instruction graph
//!
//! `IrFunction` owns the node arena, the operand table, and the block
//! list for one routine. Blocks are bounded by block-start/block-end
//! sentinel nodes; instructions form a doubly-linked list between them.
//! Rewritten-away instructions become tombstones but stay linked, so
//! node ids and iteration order remain stable across rewrites.
//!
//! Block successor/predecessor sets are derived from the branch targets
//! of the block's instructions and rebuilt whenever a mutation touches
//! them; there are no implicit fallthrough edges in lowered code.

use sable_bytecode::MethodId;

use super::instr::{InstructionNode, NodeId, Opcode, Sentinel};
use super::operand::{OperandId, OperandTable};

/// Identifier of a basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A basic block: sentinel-bounded instruction list plus explicit edges
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    /// Block-start sentinel node
    pub first: NodeId,
    /// Block-end sentinel node
    pub last: NodeId,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
}

/// The instruction graph of one routine
#[derive(Debug)]
pub struct IrFunction {
    /// Routine name used in diagnostics
    pub name: String,
    /// Metadata identity, when compiled from a real method
    pub method: Option<MethodId>,
    /// Native pointer size in bytes
    pub pointer_size: u32,
    nodes: Vec<InstructionNode>,
    blocks: Vec<BasicBlock>,
    head_blocks: Vec<BlockId>,
    /// Operand arena
    pub operands: OperandTable,
    /// Parameter operands in signature order
    pub params: Vec<OperandId>,
    /// Front-end-declared local variables (stack locals until promoted)
    pub locals: Vec<OperandId>,
}

impl IrFunction {
    pub fn new(name: impl Into<String>, pointer_size: u32) -> Self {
        IrFunction {
            name: name.into(),
            method: None,
            pointer_size,
            nodes: Vec::new(),
            blocks: Vec::new(),
            head_blocks: Vec::new(),
            operands: OperandTable::new(),
            params: Vec::new(),
            locals: Vec::new(),
        }
    }

    // ===== Nodes =====

    pub fn node(&self, id: NodeId) -> &InstructionNode {
        &self.nodes[id.0 as usize]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut InstructionNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Next node in the block list (block-end sentinel terminates)
    pub fn next_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next
    }

    pub fn prev_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev
    }

    /// The next non-sentinel node, or `None` at the end of the block
    pub fn next_instr(&self, id: NodeId) -> Option<NodeId> {
        let next = self.node(id).next?;
        if self.node(next).is_block_end() {
            None
        } else {
            Some(next)
        }
    }

    fn alloc_node(&mut self, block: BlockId) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(InstructionNode::new(block));
        id
    }

    // ===== Blocks =====

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    /// Create an empty block (two linked sentinels)
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let first = self.alloc_node(id);
        let last = self.alloc_node(id);
        {
            let f = self.node_mut(first);
            f.sentinel = Sentinel::BlockStart;
            f.next = Some(last);
        }
        {
            let l = self.node_mut(last);
            l.sentinel = Sentinel::BlockEnd;
            l.prev = Some(first);
        }
        self.blocks.push(BasicBlock {
            id,
            first,
            last,
            predecessors: Vec::new(),
            successors: Vec::new(),
        });
        id
    }

    /// Mark a block as a routine entry
    pub fn add_head_block(&mut self, block: BlockId) {
        if !self.head_blocks.contains(&block) {
            self.head_blocks.push(block);
        }
    }

    pub fn head_blocks(&self) -> &[BlockId] {
        &self.head_blocks
    }

    pub fn is_head_block(&self, block: BlockId) -> bool {
        self.head_blocks.contains(&block)
    }

    /// The first non-sentinel node of a block, if any
    pub fn block_first_instr(&self, block: BlockId) -> Option<NodeId> {
        self.next_instr(self.block(block).first)
    }

    /// Collect the non-sentinel nodes of a block
    pub fn block_instrs(&self, block: BlockId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.node(self.block(block).first).next;
        while let Some(id) = cur {
            let node = self.node(id);
            if node.is_block_end() {
                break;
            }
            out.push(id);
            cur = node.next;
        }
        out
    }

    // ===== Linking =====

    /// Insert a fresh empty node immediately before `at`
    pub(crate) fn insert_node_before(&mut self, at: NodeId) -> NodeId {
        debug_assert!(!self.node(at).is_block_start(), "cannot insert before start");
        let block = self.node(at).block;
        let new = self.alloc_node(block);
        let prev = self.node(at).prev.expect("non-start node has a prev");
        self.node_mut(new).prev = Some(prev);
        self.node_mut(new).next = Some(at);
        self.node_mut(prev).next = Some(new);
        self.node_mut(at).prev = Some(new);
        new
    }

    /// Insert a fresh empty node immediately after `at`
    pub(crate) fn insert_node_after(&mut self, at: NodeId) -> NodeId {
        debug_assert!(!self.node(at).is_block_end(), "cannot insert after end");
        let block = self.node(at).block;
        let new = self.alloc_node(block);
        let next = self.node(at).next.expect("non-end node has a next");
        self.node_mut(new).prev = Some(at);
        self.node_mut(new).next = Some(next);
        self.node_mut(at).next = Some(new);
        self.node_mut(next).prev = Some(new);
        new
    }

    /// Append a fresh empty node at the end of a block
    pub(crate) fn append_node(&mut self, block: BlockId) -> NodeId {
        let last = self.block(block).last;
        self.insert_node_before(last)
    }

    // ===== Slot mutation (def/use discipline lives here) =====

    pub(crate) fn set_operand_slot(&mut self, n: NodeId, index: usize, op: OperandId) {
        let old = self.nodes[n.0 as usize].operands[index];
        if old == op {
            return;
        }
        self.operands.forget_use(old, n);
        self.nodes[n.0 as usize].operands[index] = op;
        self.operands.record_use(op, n);
    }

    pub(crate) fn push_operand(&mut self, n: NodeId, op: OperandId) {
        self.nodes[n.0 as usize].operands.push(op);
        self.operands.record_use(op, n);
    }

    pub(crate) fn set_result_slot(&mut self, n: NodeId, index: usize, op: OperandId) {
        let old = self.nodes[n.0 as usize].results[index];
        if old == op {
            return;
        }
        self.operands.forget_def(old, n);
        self.nodes[n.0 as usize].results[index] = op;
        self.operands.record_def(op, n);
    }

    pub(crate) fn push_result(&mut self, n: NodeId, op: OperandId) {
        self.nodes[n.0 as usize].results.push(op);
        self.operands.record_def(op, n);
    }

    /// Remove the operand at `index`, shifting later slots down
    pub(crate) fn remove_operand_slot(&mut self, n: NodeId, index: usize) {
        let old = self.nodes[n.0 as usize].operands.remove(index);
        self.operands.forget_use(old, n);
    }

    /// Drop every operand, result, target, and tag from a node
    pub(crate) fn clear_slots(&mut self, n: NodeId) {
        let operands = std::mem::take(&mut self.nodes[n.0 as usize].operands);
        for op in operands {
            self.operands.forget_use(op, n);
        }
        let results = std::mem::take(&mut self.nodes[n.0 as usize].results);
        for op in results {
            self.operands.forget_def(op, n);
        }
        let node = &mut self.nodes[n.0 as usize];
        node.condition = None;
        node.size = super::types::OpSize::None;
        node.phi_blocks.clear();
        node.invoke_method = None;
        node.field = None;
        if !node.branch_targets.is_empty() {
            node.branch_targets.clear();
            let block = node.block;
            self.rebuild_block_edges(block);
        }
    }

    // ===== Branch targets and edges =====

    pub(crate) fn set_branch_targets(&mut self, n: NodeId, targets: Vec<BlockId>) {
        let block = self.nodes[n.0 as usize].block;
        self.nodes[n.0 as usize].branch_targets = targets;
        self.rebuild_block_edges(block);
    }

    pub(crate) fn add_branch_target(&mut self, n: NodeId, target: BlockId) {
        let block = self.nodes[n.0 as usize].block;
        self.nodes[n.0 as usize].branch_targets.push(target);
        self.rebuild_block_edges(block);
    }

    /// Recompute a block's successor set from its instructions and patch
    /// the predecessor sets of every affected block
    pub(crate) fn rebuild_block_edges(&mut self, block: BlockId) {
        let mut new_succs: Vec<BlockId> = Vec::new();
        let mut cur = Some(self.block(block).first);
        while let Some(id) = cur {
            let node = self.node(id);
            for &t in &node.branch_targets {
                if !new_succs.contains(&t) {
                    new_succs.push(t);
                }
            }
            if node.is_block_end() {
                break;
            }
            cur = node.next;
        }

        let old_succs = std::mem::take(&mut self.blocks[block.0 as usize].successors);
        for &removed in old_succs.iter().filter(|s| !new_succs.contains(s)) {
            let preds = &mut self.blocks[removed.0 as usize].predecessors;
            if let Some(pos) = preds.iter().position(|&p| p == block) {
                preds.swap_remove(pos);
            }
        }
        for &added in new_succs.iter().filter(|s| !old_succs.contains(s)) {
            let preds = &mut self.blocks[added.0 as usize].predecessors;
            if !preds.contains(&block) {
                preds.push(block);
            }
        }
        self.blocks[block.0 as usize].successors = new_succs;
    }

    /// Split a block after `at`: every following instruction moves into a
    /// fresh block, which is returned
    pub(crate) fn split_after(&mut self, at: NodeId) -> BlockId {
        let old_block = self.node(at).block;
        let old_last = self.block(old_block).last;
        let new_block = self.create_block();
        let new_first = self.block(new_block).first;
        let new_last = self.block(new_block).last;

        let first_moved = self.node(at).next.expect("non-end node has a next");
        if first_moved != old_last {
            let last_moved = self.node(old_last).prev.expect("end sentinel has a prev");

            // splice [first_moved .. last_moved] between the new sentinels
            self.node_mut(new_first).next = Some(first_moved);
            self.node_mut(first_moved).prev = Some(new_first);
            self.node_mut(new_last).prev = Some(last_moved);
            self.node_mut(last_moved).next = Some(new_last);

            let mut cur = Some(first_moved);
            while let Some(id) = cur {
                self.node_mut(id).block = new_block;
                if id == last_moved {
                    break;
                }
                cur = self.node(id).next;
            }
        }

        self.node_mut(at).next = Some(old_last);
        self.node_mut(old_last).prev = Some(at);

        self.rebuild_block_edges(old_block);
        self.rebuild_block_edges(new_block);
        new_block
    }

    /// Turn every instruction of a block into a tombstone and drop its
    /// outgoing edges
    pub(crate) fn empty_block(&mut self, block: BlockId) {
        for id in self.block_instrs(block) {
            self.clear_slots(id);
            self.node_mut(id).opcode = Opcode::Empty;
        }
        self.rebuild_block_edges(block);
    }

    // ===== Consistency checking (used heavily by tests) =====

    /// Verify that def/use bookkeeping mirrors the instruction slots and
    /// that block lists and edges are intact
    pub fn validate(&self) -> Result<(), String> {
        use rustc_hash::FxHashMap;

        let mut expected_uses: FxHashMap<OperandId, Vec<NodeId>> = FxHashMap::default();
        let mut expected_defs: FxHashMap<OperandId, Vec<NodeId>> = FxHashMap::default();

        for block in &self.blocks {
            let mut cur = Some(block.first);
            while let Some(id) = cur {
                let node = self.node(id);
                if node.block != block.id {
                    return Err(format!("{id} is linked into {} but owned by {}", block.id, node.block));
                }
                for &op in node.operands() {
                    expected_uses.entry(op).or_default().push(id);
                }
                for &op in node.results() {
                    expected_defs.entry(op).or_default().push(id);
                }
                if node.is_block_end() {
                    break;
                }
                cur = node.next;
                if cur.is_none() {
                    return Err(format!("block {} list broke before its end sentinel", block.id));
                }
            }
        }

        for op in self.operands.ids() {
            if !self.operands.is_tracked(op) {
                continue;
            }
            let data = self.operands.get(op);
            let mut have_uses = data.uses.clone();
            let mut want_uses = expected_uses.remove(&op).unwrap_or_default();
            have_uses.sort();
            want_uses.sort();
            if have_uses != want_uses {
                return Err(format!("use list of {op} is stale: {have_uses:?} vs {want_uses:?}"));
            }
            let mut have_defs = data.defs.clone();
            let mut want_defs = expected_defs.remove(&op).unwrap_or_default();
            have_defs.sort();
            want_defs.sort();
            if have_defs != want_defs {
                return Err(format!("def list of {op} is stale: {have_defs:?} vs {want_defs:?}"));
            }
        }

        for block in &self.blocks {
            for &succ in &block.successors {
                if !self.block(succ).predecessors.contains(&block.id) {
                    return Err(format!("{} -> {} edge lacks its back-reference", block.id, succ));
                }
            }
            for &pred in &block.predecessors {
                if !self.block(pred).successors.contains(&block.id) {
                    return Err(format!("{} pred {} lacks the forward edge", block.id, pred));
                }
            }
        }

        Ok(())
    }
}
