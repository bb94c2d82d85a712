pub mod object_alloc;
pub mod stmt_simplify;

pub use object_alloc::{CycleOracle, ObjectAllocConfig, ObjectAllocator, STACK_ALLOC_MAX_SIZE};
