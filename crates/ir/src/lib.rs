pub mod body;
pub mod builder;
pub mod cfg;
pub mod local;
pub mod node;
pub mod oracle;
pub mod walk;
pub mod writer;

pub use body::{Block, BlockData, Body, Stmt, StmtData};
pub use builder::BodyBuilder;
pub use cfg::ControlFlowGraph;
pub use local::{Local, LocalData, LocalKind};
pub use node::{CallTarget, EffectFlags, Global, Node, NodeData};
pub use oracle::{Class, HelperFunc, HelperOracle, Method, TypeOracle};
