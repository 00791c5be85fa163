// id.rs — Stable identifiers for decode units and tree nodes
//
// Allocated in declaration order, so sorting by id reproduces source order
// across every file of a mod.

/// Stable identifier for a top-level block in the load's block list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Identifier of a node in the resource tree. `ResourceId(0)` is the mod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

impl ResourceId {
    pub const ROOT: ResourceId = ResourceId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Allocator for block ids. Monotonically increasing in allocation order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_block: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }
}
