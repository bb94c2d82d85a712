//! Collaborator interfaces towards the hosting runtime.
//!
//! The passes in the codegen crate are written against these traits so they
//! can run (and be tested) without a full runtime behind them. The `Simple*`
//! implementations are table-driven stand-ins a host or a test can populate.

use cranelift_entity::entity_impl;
use rustc_hash::{FxHashMap, FxHashSet};

/// An opaque handle to a runtime class.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Class(pub u32);
entity_impl!(Class, "class");

/// An opaque handle to a user method.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Method(pub u32);
entity_impl!(Method, "method");

/// An opaque handle to a runtime helper routine.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HelperFunc(pub u32);
entity_impl!(HelperFunc, "helper");

/// Class layout and allocation facts supplied by the runtime's type system.
pub trait TypeOracle {
    /// Exact layout size of a value-class instance.
    fn class_size(&self, class: Class) -> u32;

    /// Size of a heap instance of a reference class, header included.
    fn heap_class_size(&self, class: Class) -> u32;

    fn is_value_class(&self, class: Class) -> bool;

    /// Whether the class declares a finalizer the memory manager must run.
    fn has_finalizer(&self, class: Class) -> bool;

    /// Size of the object header preceding the first field.
    fn header_size(&self) -> u32;

    /// The runtime helper that heap-allocates instances of `class`.
    fn alloc_helper(&self, class: Class) -> HelperFunc;
}

/// Side-effect facts about runtime helpers.
pub trait HelperOracle {
    /// Returns `true` if the helper is guaranteed side-effect free.
    fn is_pure(&self, helper: HelperFunc) -> bool;
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub size: u32,
    pub is_value_class: bool,
    pub has_finalizer: bool,
    pub alloc_helper: HelperFunc,
}

/// A [`TypeOracle`] backed by an explicit class table.
#[derive(Debug, Default)]
pub struct SimpleTypeOracle {
    classes: FxHashMap<Class, ClassInfo>,
    header_size: u32,
}

impl SimpleTypeOracle {
    pub fn new(header_size: u32) -> Self {
        Self {
            classes: FxHashMap::default(),
            header_size,
        }
    }

    pub fn define(&mut self, class: Class, info: ClassInfo) {
        self.classes.insert(class, info);
    }

    fn info(&self, class: Class) -> &ClassInfo {
        &self.classes[&class]
    }
}

impl TypeOracle for SimpleTypeOracle {
    fn class_size(&self, class: Class) -> u32 {
        self.info(class).size
    }

    fn heap_class_size(&self, class: Class) -> u32 {
        self.info(class).size
    }

    fn is_value_class(&self, class: Class) -> bool {
        self.info(class).is_value_class
    }

    fn has_finalizer(&self, class: Class) -> bool {
        self.info(class).has_finalizer
    }

    fn header_size(&self) -> u32 {
        self.header_size
    }

    fn alloc_helper(&self, class: Class) -> HelperFunc {
        self.info(class).alloc_helper
    }
}

/// A [`HelperOracle`] backed by an explicit set of pure helpers.
#[derive(Debug, Default)]
pub struct SimpleHelperOracle {
    pure: FxHashSet<HelperFunc>,
}

impl SimpleHelperOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pure(&mut self, helper: HelperFunc) {
        self.pure.insert(helper);
    }
}

impl HelperOracle for SimpleHelperOracle {
    fn is_pure(&self, helper: HelperFunc) -> bool {
        self.pure.contains(&helper)
    }
}
