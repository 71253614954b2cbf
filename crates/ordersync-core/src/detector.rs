//! Pure comparison of one order's authoritative status against its mirror.

use serde::{Deserialize, Serialize};

use crate::types::{MirrorStatus, OrderId, Status};

/// Outcome of comparing one order. Computed fresh on every call; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub order_id: OrderId,
    pub authoritative: Status,
    pub mirrored: MirrorStatus,
    pub is_consistent: bool,
}

/// Compare `authoritative` with `mirrored`. An absent mirror never matches.
pub fn detect(order_id: OrderId, authoritative: Status, mirrored: MirrorStatus) -> Discrepancy {
    let is_consistent = mirrored == MirrorStatus::Present(authoritative);
    Discrepancy {
        order_id,
        authoritative,
        mirrored,
        is_consistent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_statuses_are_consistent() {
        for s in Status::all() {
            let d = detect(1, *s, MirrorStatus::Present(*s));
            assert!(d.is_consistent, "{s} should match itself");
        }
    }

    #[test]
    fn absent_mirror_is_always_a_discrepancy() {
        for s in Status::all() {
            let d = detect(9, *s, MirrorStatus::Absent);
            assert!(!d.is_consistent);
            assert_eq!(d.mirrored, MirrorStatus::Absent);
        }
    }

    #[test]
    fn shipped_vs_pending_is_inconsistent() {
        let d = detect(42, Status::Shipped, MirrorStatus::Present(Status::Pending));
        assert!(!d.is_consistent);
        assert_eq!(d.order_id, 42);
        assert_eq!(d.authoritative, Status::Shipped);
    }

    #[test]
    fn serializes_with_absent_marker() {
        let d = detect(3, Status::Delivered, MirrorStatus::Absent);
        let json = serde_json::to_value(d).unwrap();
        assert_eq!(json["mirrored"], "ABSENT");
        assert_eq!(json["authoritative"], "DELIVERED");
        assert_eq!(json["is_consistent"], false);
    }
}
