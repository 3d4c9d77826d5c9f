//! Register-allocation handoff
//!
//! The middle tier does not allocate registers. It hands the allocator a
//! slot-numbered instruction graph and one interval per live virtual
//! register; everything beyond that (splitting, spilling, assignment) is
//! the allocator's business.

pub mod live;

pub use live::{collect_live_ranges, number_instructions, LiveInterval, LiveRange, SlotIndex};
