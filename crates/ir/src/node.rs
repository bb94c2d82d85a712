//! Tree operator nodes.
//!
//! A statement owns a tree of [`NodeData`] stored in the body's node arena.
//! The operator set is a closed tagged enum; analyses match on it
//! exhaustively instead of dispatching through traits.

use std::ops;

use cranelift_entity::entity_impl;
use smallvec::SmallVec;

use crate::{
    local::Local,
    oracle::{Class, HelperFunc, Method},
};

/// An opaque reference to a tree node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Node(pub u32);
entity_impl!(Node, "n");

/// An opaque reference to a global variable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Global(pub u32);
entity_impl!(Global, "g");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// A call to a runtime helper routine.
    Helper(HelperFunc),

    /// A direct call to a user method.
    Method(Method),

    /// A delegate `Invoke` call; the first argument is the receiver.
    DelegateInvoke(Method),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// A read of a local slot, or its definition when it is the destination
    /// of an `Assign`.
    LocalUse(Local),

    /// A reference to a global variable.
    GlobalUse(Global),

    IntConst(i64),

    /// The runtime type identity of a class, as a loadable constant.
    ClassConst(Class),

    Eq { lhs: Node, rhs: Node },
    Ne { lhs: Node, rhs: Node },
    Add { lhs: Node, rhs: Node },

    /// Load through an address.
    Indir { addr: Node },

    /// Address of a local, or of a field path rooted at one.
    AddrOf { location: Node },

    /// Field at a fixed byte offset from a base.
    Field { base: Node, offset: u32 },

    /// Array element selection.
    Index { base: Node, index: Node },

    Call {
        target: CallTarget,
        args: SmallVec<[Node; 4]>,
    },

    /// Object construction. Earlier canonicalization guarantees this appears
    /// only as the source of a statement-level assignment to a local.
    AllocObj { class: Class },

    Assign { dst: Node, src: Node },
}

impl NodeData {
    /// Invokes `f` on each operand in evaluation order.
    pub fn for_each_operand(&self, f: &mut impl FnMut(Node)) {
        match *self {
            Self::LocalUse(..)
            | Self::GlobalUse(..)
            | Self::IntConst(..)
            | Self::ClassConst(..)
            | Self::AllocObj { .. } => {}

            Self::Indir { addr } => f(addr),
            Self::AddrOf { location } => f(location),
            Self::Field { base, .. } => f(base),

            Self::Eq { lhs, rhs } | Self::Ne { lhs, rhs } | Self::Add { lhs, rhs } => {
                f(lhs);
                f(rhs);
            }

            Self::Index { base, index } => {
                f(base);
                f(index);
            }

            Self::Call { ref args, .. } => {
                for &arg in args {
                    f(arg);
                }
            }

            Self::Assign { dst, src } => {
                f(dst);
                f(src);
            }
        }
    }

    /// Effects this operator contributes on its own, operands excluded.
    pub fn base_effects(&self) -> EffectFlags {
        match self {
            Self::Assign { .. } => EffectFlags::ASG,
            Self::Call { .. } | Self::AllocObj { .. } => EffectFlags::CALL | EffectFlags::EXCEPT,
            Self::Indir { .. } | Self::Field { .. } | Self::Index { .. } => {
                EffectFlags::GLOB_REF | EffectFlags::EXCEPT
            }
            Self::GlobalUse(..) => EffectFlags::GLOB_REF,
            Self::LocalUse(..)
            | Self::IntConst(..)
            | Self::ClassConst(..)
            | Self::Eq { .. }
            | Self::Ne { .. }
            | Self::Add { .. }
            | Self::AddrOf { .. } => EffectFlags::EMPTY,
        }
    }
}

/// Summary of the observable effects of a tree, kept on each statement so
/// later passes can query ordering constraints without re-walking the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectFlags(u8);

impl EffectFlags {
    pub const EMPTY: Self = Self(0);

    /// The tree assigns to a location.
    pub const ASG: Self = Self(1);

    /// The tree contains a call.
    pub const CALL: Self = Self(1 << 1);

    /// The tree reads or writes memory other locals can alias.
    pub const GLOB_REF: Self = Self(1 << 2);

    /// The tree may raise an exception.
    pub const EXCEPT: Self = Self(1 << 3);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl ops::BitOr for EffectFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for EffectFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
