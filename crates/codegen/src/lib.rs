pub mod bitset;
pub mod cfg_scc;
pub mod optim;

pub use cfg_scc::CfgSccAnalysis;
pub use optim::object_alloc::{CycleOracle, ObjectAllocConfig, ObjectAllocator};
