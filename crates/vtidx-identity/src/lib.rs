// src/lib.rs
//
// Shared identities for the vtidx IR.
// Entity ids are plain u32 handles; the collections that own the entities live in vtidx-ir.

mod entities;

pub use entities::{ElemSegmentId, FunctionId, GlobalId, HeapTypeId, TableId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_their_index() {
        let id = HeapTypeId::new(7);
        assert_eq!(id.index(), 7);
        assert_eq!(id.as_usize(), 7);
    }

    #[test]
    fn distinct_kinds_with_same_index_compare_by_index() {
        let f = FunctionId::new(1);
        let g = GlobalId::new(1);
        assert_eq!(f.index(), g.index());
    }

    #[test]
    fn ids_order_by_index() {
        let mut ids = vec![TableId::new(3), TableId::new(1), TableId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![TableId::new(1), TableId::new(2), TableId::new(3)]);
    }
}
