//! Local slots of a procedure frame.

use cranelift_entity::entity_impl;

use crate::oracle::Class;

/// An opaque reference to a local slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Local(pub u32);
entity_impl!(Local, "v");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    /// An object reference.
    Ref,

    /// A native-sized integer that may carry a pointer.
    IntPtr,

    /// A managed pointer into an object or a frame.
    Byref,

    /// A plain integer; never participates in pointer analysis.
    Int,

    /// Inline struct storage laid out per its class.
    Struct,
}

impl LocalKind {
    /// Locals of these kinds may point to other locals and so participate in
    /// the connectivity graph.
    pub fn is_pointer(self) -> bool {
        matches!(self, Self::Ref | Self::IntPtr | Self::Byref)
    }
}

#[derive(Debug, Clone)]
pub struct LocalData {
    pub kind: LocalKind,

    /// Set by the frontend when the address of this local is taken in a way
    /// the escape analysis cannot observe through its own rules.
    pub addr_exposed: bool,

    /// The class whose layout sizes this local. Present on struct locals.
    pub class: Option<Class>,
}

impl LocalData {
    pub fn new(kind: LocalKind) -> Self {
        Self {
            kind,
            addr_exposed: false,
            class: None,
        }
    }

    pub fn with_class(kind: LocalKind, class: Class) -> Self {
        Self {
            kind,
            addr_exposed: false,
            class: Some(class),
        }
    }

    pub fn is_pointer(&self) -> bool {
        self.kind.is_pointer()
    }
}
