//! Slot numbering and live ranges
//!
//! After the optimizer stabilizes, every surviving instruction gets a
//! monotonic slot index (step two, leaving odd gaps for instructions the
//! allocator may insert). A virtual register's live range is the
//! half-open slot interval spanning its ordered definition and use
//! slots.

use crate::ir::{IrFunction, OperandId};

/// Position of an instruction in the numbered graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(pub u32);

impl std::fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// The slots over which a virtual register's value is needed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRange {
    /// First slot of the interval
    pub start: SlotIndex,
    /// One past the last slot of the interval
    pub end: SlotIndex,
    /// Definition slots in ascending order
    pub def_slots: Vec<SlotIndex>,
    /// Use slots in ascending order
    pub use_slots: Vec<SlotIndex>,
}

impl LiveRange {
    pub fn new(
        start: SlotIndex,
        end: SlotIndex,
        def_slots: Vec<SlotIndex>,
        use_slots: Vec<SlotIndex>,
    ) -> Self {
        debug_assert!(start <= end);
        debug_assert!(def_slots.windows(2).all(|w| w[0] <= w[1]));
        debug_assert!(use_slots.windows(2).all(|w| w[0] <= w[1]));
        LiveRange {
            start,
            end,
            def_slots,
            use_slots,
        }
    }

    /// A range with no extent or no positions carries nothing to allocate
    pub fn is_empty(&self) -> bool {
        self.start == self.end || (self.def_slots.is_empty() && self.use_slots.is_empty())
    }

    /// Whether the interval covers `slot`
    pub fn covers(&self, slot: SlotIndex) -> bool {
        self.start <= slot && slot < self.end
    }

    /// Whether the allocator may split this range at `slot`
    ///
    /// Split mechanics belong to the allocator; the range only answers
    /// whether the position is strictly inside the interval.
    pub fn can_split_at(&self, slot: SlotIndex) -> bool {
        self.start < slot && slot < self.end
    }
}

/// A live virtual register paired with its range
#[derive(Debug, Clone)]
pub struct LiveInterval {
    pub register: OperandId,
    pub range: LiveRange,
}

/// Stamp every sentinel and surviving instruction with a slot index
///
/// Indices step by two so the allocator can insert spill code between
/// any two instructions without renumbering.
pub fn number_instructions(func: &mut IrFunction) {
    let mut slot = 0u32;
    for block in func.block_ids().collect::<Vec<_>>() {
        let first = func.block(block).first;
        let last = func.block(block).last;

        func.node_mut(first).slot = Some(slot);
        slot += 2;

        for node in func.block_instrs(block) {
            if func.node(node).is_empty() {
                continue;
            }
            func.node_mut(node).slot = Some(slot);
            slot += 2;
        }

        func.node_mut(last).slot = Some(slot);
        slot += 2;
    }
}

/// Build the interval for every virtual register still referenced by the
/// graph; requires `number_instructions` to have run
pub fn collect_live_ranges(func: &IrFunction) -> Vec<LiveInterval> {
    let mut intervals = Vec::new();

    for register in func.operands.ids() {
        if !func.operands.is_virtual_register(register) {
            continue;
        }
        let data = func.operands.get(register);
        if data.defs.is_empty() && data.uses.is_empty() {
            continue;
        }

        let mut def_slots: Vec<SlotIndex> = data
            .defs
            .iter()
            .filter_map(|&n| func.node(n).slot)
            .map(SlotIndex)
            .collect();
        let mut use_slots: Vec<SlotIndex> = data
            .uses
            .iter()
            .filter_map(|&n| func.node(n).slot)
            .map(SlotIndex)
            .collect();
        def_slots.sort();
        def_slots.dedup();
        use_slots.sort();
        use_slots.dedup();

        let all_min = def_slots.iter().chain(&use_slots).min().copied();
        let all_max = def_slots.iter().chain(&use_slots).max().copied();
        let (Some(start), Some(end)) = (all_min, all_max) else {
            continue;
        };

        intervals.push(LiveInterval {
            register,
            range: LiveRange::new(start, end, def_slots, use_slots),
        });
    }

    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Context, IrOp, IrType};

    fn nop_block_func(nops: usize) -> IrFunction {
        let mut func = IrFunction::new("live", 4);
        let block = func.create_block();
        func.add_head_block(block);
        for _ in 0..nops {
            let mut ctx = Context::append_to_block(&mut func, block);
            ctx.set_instruction(IrOp::Nop, None, &[]);
        }
        func
    }

    #[test]
    fn test_numbering_is_monotonic_step_two() {
        let mut func = nop_block_func(6);
        number_instructions(&mut func);

        let block = func.block_ids().next().unwrap();
        let first = func.node(func.block(block).first).slot.unwrap();
        let mut prev = first;
        for node in func.block_instrs(block) {
            let slot = func.node(node).slot.unwrap();
            assert_eq!(slot, prev + 2);
            prev = slot;
        }
        let last = func.node(func.block(block).last).slot.unwrap();
        assert_eq!(last, prev + 2);
    }

    #[test]
    fn test_tombstones_get_no_slot() {
        let mut func = nop_block_func(2);
        let block = func.block_ids().next().unwrap();
        let victim = func.block_instrs(block)[0];
        Context::on(&mut func, victim).empty();

        number_instructions(&mut func);
        assert!(func.node(victim).slot.is_none());
    }

    #[test]
    fn test_sentinel_range_with_no_positions_is_empty() {
        let mut func = nop_block_func(6);
        number_instructions(&mut func);
        let block = func.block_ids().next().unwrap();

        let range = LiveRange::new(
            SlotIndex(func.node(func.block(block).first).slot.unwrap()),
            SlotIndex(func.node(func.block(block).last).slot.unwrap()),
            Vec::new(),
            Vec::new(),
        );
        assert!(range.is_empty());
    }

    #[test]
    fn test_zero_extent_range_is_empty() {
        let range = LiveRange::new(
            SlotIndex(4),
            SlotIndex(4),
            vec![SlotIndex(4)],
            Vec::new(),
        );
        assert!(range.is_empty());
    }

    #[test]
    fn test_interval_covers_and_split_points() {
        let range = LiveRange::new(
            SlotIndex(2),
            SlotIndex(10),
            vec![SlotIndex(2)],
            vec![SlotIndex(6), SlotIndex(10)],
        );
        assert!(!range.is_empty());
        assert!(range.covers(SlotIndex(2)));
        assert!(range.covers(SlotIndex(9)));
        assert!(!range.covers(SlotIndex(10)), "the end slot is exclusive");
        assert!(range.can_split_at(SlotIndex(6)));
        assert!(!range.can_split_at(SlotIndex(2)));
        assert!(!range.can_split_at(SlotIndex(10)));
    }

    #[test]
    fn test_collect_ranges_orders_defs_and_uses() {
        let mut func = IrFunction::new("live2", 4);
        let block = func.create_block();
        func.add_head_block(block);

        let a = func.operands.virtual_register(IrType::I32);
        let b = func.operands.virtual_register(IrType::I32);
        let c = func.operands.const_int(IrType::I32, 1, 4);

        // a := 1; b := a + a; return b
        let mut ctx = Context::append_to_block(&mut func, block);
        ctx.set_instruction(IrOp::Move, Some(a), &[c]);
        ctx.append_instruction(IrOp::AddSigned, Some(b), &[a, a]);
        ctx.append_instruction(IrOp::Return, None, &[b]);

        number_instructions(&mut func);
        let intervals = collect_live_ranges(&func);

        let for_a = intervals.iter().find(|i| i.register == a).unwrap();
        assert_eq!(for_a.range.def_slots.len(), 1);
        // the two reads in one instruction collapse to one slot
        assert_eq!(for_a.range.use_slots.len(), 1);
        assert!(for_a.range.def_slots[0] < for_a.range.use_slots[0]);
        assert_eq!(for_a.range.start, for_a.range.def_slots[0]);
        assert!(!for_a.range.is_empty());

        let for_b = intervals.iter().find(|i| i.register == b).unwrap();
        assert!(for_b.range.def_slots[0] < for_b.range.use_slots[0]);
    }

    #[test]
    fn test_unreferenced_registers_are_not_reported() {
        let mut func = IrFunction::new("live3", 4);
        let block = func.create_block();
        func.add_head_block(block);
        let _orphan = func.operands.virtual_register(IrType::I32);
        number_instructions(&mut func);
        assert!(collect_live_ranges(&func).is_empty());
    }
}
