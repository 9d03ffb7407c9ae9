//! First-class identity types for module entities.
//!
//! Each id is a dense index into the owning collection of a `Module` (or of the
//! type arena for `HeapTypeId`), which keeps the different entity kinds from being
//! mixed up at call sites.

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis struct $name(u32);

        impl $name {
            pub fn new(index: u32) -> Self {
                Self(index)
            }

            pub fn index(self) -> u32 {
                self.0
            }

            /// Index as `usize`, for slicing the owning collection.
            #[inline]
            pub fn as_usize(self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_entity_id! {
    /// Identity for a nominal heap type (struct, array or signature) in the type arena
    pub struct HeapTypeId;
}

define_entity_id! {
    /// Identity for a function, imported or defined
    pub struct FunctionId;
}

define_entity_id! {
    /// Identity for a module-level global
    pub struct GlobalId;
}

define_entity_id! {
    /// Identity for an IR-level table (a linear array of references)
    pub struct TableId;
}

define_entity_id! {
    /// Identity for an element segment
    pub struct ElemSegmentId;
}
