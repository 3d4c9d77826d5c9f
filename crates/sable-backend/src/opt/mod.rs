//! Work-list-driven IR optimization engine
//!
//! The engine makes one sweep over every non-empty instruction in block
//! order, running a fixed, ordered battery of local rewrite rules per
//! node and draining a work-list after each visit. Rewrites that change
//! an operand's def/use membership enqueue every other instruction
//! referencing that operand. An outer loop then alternates stack-local
//! promotion with work-list drains until neither makes progress.
//!
//! A change counter with an optional ceiling supports bisection: when the
//! ceiling is reached all rewriting stops immediately, leaving the graph
//! well-formed.

mod promote;
mod rules;


use crate::ir::{IrFunction, NodeId, OperandId};
use crate::metrics::OptStats;

/// Knobs for one optimizer run
#[derive(Debug, Clone)]
pub struct OptimizerOptions {
    /// Run the stack-local promotion pass between drains
    pub enable_promotion: bool,
    /// Stop all rewriting once this many changes were made
    pub max_changes: Option<u32>,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        OptimizerOptions {
            enable_promotion: true,
            max_changes: None,
        }
    }
}

/// Drive `func` to a local fixed point; returns the rewrite counters
pub fn run(func: &mut IrFunction, options: &OptimizerOptions) -> OptStats {
    let mut optimizer = Optimizer {
        func,
        worklist: Vec::new(),
        stats: OptStats::new(),
        change_count: 0,
        options: options.clone(),
    };
    optimizer.optimize();
    optimizer.stats
}

pub(crate) struct Optimizer<'a> {
    pub(crate) func: &'a mut IrFunction,
    /// Nodes whose operands were invalidated by a rewrite
    worklist: Vec<NodeId>,
    pub(crate) stats: OptStats,
    change_count: u32,
    options: OptimizerOptions,
}

impl Optimizer<'_> {
    fn optimize(&mut self) {
        if self.options.enable_promotion {
            self.promote_local_variables();
        }

        for block in self.func.block_ids().collect::<Vec<_>>() {
            let mut cursor = self.func.block_first_instr(block);
            while let Some(node) = cursor {
                let current = self.func.node(node);
                if !current.is_empty()
                    && (current.operand_count() != 0 || current.result_count() != 0)
                {
                    self.apply_rules(node);
                    if self.should_stop() {
                        return;
                    }
                    self.process_worklist();
                    if self.should_stop() {
                        return;
                    }
                }
                cursor = self.func.next_instr(node);
            }
        }

        loop {
            let mut change = false;

            if self.options.enable_promotion && self.promote_local_variables() {
                change = true;
            }
            if self.should_stop() {
                return;
            }
            if change {
                self.process_worklist();
            }
            if self.should_stop() || !change {
                return;
            }
        }
    }

    /// Run the full rule list against one node, in declared order, so a
    /// later rule observes what an earlier one rewrote this visit
    fn apply_rules(&mut self, node: NodeId) {
        let rules: [fn(&mut Self, NodeId); 29] = [
            Self::simple_constant_propagation,
            Self::simple_forward_copy_propagation,
            Self::dead_code_elimination,
            Self::constant_folding_integer_operations,
            Self::constant_move_to_right,
            Self::arithmetic_simplification_subtraction,
            Self::arithmetic_simplification_multiplication,
            Self::arithmetic_simplification_division,
            Self::arithmetic_simplification_addition_and_subtraction,
            Self::arithmetic_simplification_logical_operators,
            Self::arithmetic_simplification_shift_operators,
            Self::reduce_zero_extended_move,
            Self::constant_folding_addition_and_subtraction,
            Self::constant_folding_multiplication,
            Self::constant_folding_division,
            Self::constant_folding_integer_compare,
            Self::constant_folding_logical_or,
            Self::constant_folding_logical_and,
            Self::combine_integer_compare_branch,
            Self::fold_integer_compare,
            Self::remove_useless_integer_compare_branch,
            Self::fold_integer_compare_branch,
            Self::reduce_truncation_and_expansion,
            Self::simplify_extended_move_with_constant,
            Self::simplify_extended_move,
            Self::fold_load_store_offsets,
            Self::constant_folding_phi,
            Self::simplify_phi,
            Self::dead_code_elimination_phi,
        ];
        for rule in rules {
            if self.func.node(node).is_empty() || self.should_stop() {
                return;
            }
            rule(self, node);
        }
    }

    fn process_worklist(&mut self) {
        while let Some(node) = self.worklist.pop() {
            self.apply_rules(node);
            if self.should_stop() {
                return;
            }
        }
    }

    pub(crate) fn should_stop(&self) -> bool {
        match self.options.max_changes {
            Some(limit) => self.change_count > limit,
            None => false,
        }
    }

    pub(crate) fn bump(&mut self) {
        self.change_count += 1;
    }

    pub(crate) fn add_to_worklist(&mut self, node: NodeId) {
        if self.func.node(node).is_empty() {
            return;
        }
        // the work list stays small, so the scan is cheap
        if self.worklist.contains(&node) {
            return;
        }
        self.worklist.push(node);
    }

    /// Enqueue every instruction that reads or writes `operand`
    pub(crate) fn add_operand_usage_to_worklist(&mut self, operand: OperandId) {
        if !self.func.operands.is_virtual_register(operand) {
            return;
        }
        let data = self.func.operands.get(operand);
        let mut referencing: Vec<NodeId> = data.uses.clone();
        referencing.extend_from_slice(&data.defs);
        for node in referencing {
            self.add_to_worklist(node);
        }
    }

    /// Enqueue the users of every operand and result of `node`
    pub(crate) fn add_node_usages_to_worklist(&mut self, node: NodeId) {
        let slots: Vec<OperandId> = {
            let n = self.func.node(node);
            n.results().iter().chain(n.operands()).copied().collect()
        };
        for operand in slots {
            self.add_operand_usage_to_worklist(operand);
        }
    }
}
