use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::ReconcileError;

/// Externally assigned, positive order identifier.
pub type OrderId = u64;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Order status. Only equality is meaningful to reconciliation; transition
/// rules belong to the order service.
///
/// The `Ord` derive exists so statuses can key sorted maps in stats output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[serde(alias = "PENDIENTE")]
    Pending,
    #[serde(alias = "PROCESANDO", alias = "EN_PROCESO")]
    Processing,
    #[serde(alias = "ENVIADO")]
    Shipped,
    #[serde(alias = "ENTREGADO")]
    Delivered,
    #[serde(alias = "CANCELADO")]
    Cancelled,
}

impl Status {
    pub fn all() -> &'static [Status] {
        &[
            Status::Pending,
            Status::Processing,
            Status::Shipped,
            Status::Delivered,
            Status::Cancelled,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Processing => "PROCESSING",
            Status::Shipped => "SHIPPED",
            Status::Delivered => "DELIVERED",
            Status::Cancelled => "CANCELLED",
        }
    }

    /// Name used by the legacy tracking service REST contract.
    pub fn legacy_name(self) -> &'static str {
        match self {
            Status::Pending => "PENDIENTE",
            Status::Processing => "PROCESANDO",
            Status::Shipped => "ENVIADO",
            Status::Delivered => "ENTREGADO",
            Status::Cancelled => "CANCELADO",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = ReconcileError;

    /// Exact match only: `"shipped"` is not `SHIPPED`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" | "PENDIENTE" => Ok(Status::Pending),
            "PROCESSING" | "PROCESANDO" | "EN_PROCESO" => Ok(Status::Processing),
            "SHIPPED" | "ENVIADO" => Ok(Status::Shipped),
            "DELIVERED" | "ENTREGADO" => Ok(Status::Delivered),
            "CANCELLED" | "CANCELADO" => Ok(Status::Cancelled),
            _ => Err(ReconcileError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// MirrorStatus
// ---------------------------------------------------------------------------

/// What the tracking cache holds for an order: a status, or nothing at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorStatus {
    Present(Status),
    Absent,
}

impl MirrorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MirrorStatus::Present(s) => s.as_str(),
            MirrorStatus::Absent => "ABSENT",
        }
    }

    pub fn status(self) -> Option<Status> {
        match self {
            MirrorStatus::Present(s) => Some(s),
            MirrorStatus::Absent => None,
        }
    }
}

impl From<Option<Status>> for MirrorStatus {
    fn from(value: Option<Status>) -> Self {
        value.map_or(MirrorStatus::Absent, MirrorStatus::Present)
    }
}

impl fmt::Display for MirrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MirrorStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MirrorStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "ABSENT" {
            return Ok(MirrorStatus::Absent);
        }
        raw.parse::<Status>()
            .map(MirrorStatus::Present)
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// Authoritative order record. Reconciliation only ever reads `id` and
/// `status`; the rest is carried so seeded stores look like the real thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub customer_id: u64,
    #[serde(default)]
    pub address: String,
    pub status: Status,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(id: OrderId, status: Status) -> Self {
        let now = Utc::now();
        Self {
            id,
            product: String::new(),
            customer_id: 0,
            address: String::new(),
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_and_legacy_names() {
        assert_eq!("SHIPPED".parse::<Status>().unwrap(), Status::Shipped);
        assert_eq!("ENVIADO".parse::<Status>().unwrap(), Status::Shipped);
        assert_eq!("EN_PROCESO".parse::<Status>().unwrap(), Status::Processing);
        assert_eq!("PROCESANDO".parse::<Status>().unwrap(), Status::Processing);
    }

    #[test]
    fn parsing_is_case_sensitive() {
        assert!("shipped".parse::<Status>().is_err());
        assert!("Pending".parse::<Status>().is_err());
    }

    #[test]
    fn legacy_names_parse_back_to_the_same_status() {
        for s in Status::all() {
            assert_eq!(s.legacy_name().parse::<Status>().unwrap(), *s);
        }
    }

    #[test]
    fn status_deserializes_legacy_alias() {
        let s: Status = serde_json::from_str("\"ENTREGADO\"").unwrap();
        assert_eq!(s, Status::Delivered);
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"DELIVERED\"");
    }

    #[test]
    fn mirror_status_serializes_as_plain_string() {
        let absent = serde_json::to_string(&MirrorStatus::Absent).unwrap();
        assert_eq!(absent, "\"ABSENT\"");
        let present = serde_json::to_string(&MirrorStatus::Present(Status::Pending)).unwrap();
        assert_eq!(present, "\"PENDING\"");
        let back: MirrorStatus = serde_json::from_str("\"ABSENT\"").unwrap();
        assert_eq!(back, MirrorStatus::Absent);
    }

    #[test]
    fn order_yaml_fills_defaults() {
        let order: Order = serde_yaml::from_str("id: 3\nstatus: PENDING\n").unwrap();
        assert_eq!(order.id, 3);
        assert_eq!(order.status, Status::Pending);
        assert!(order.product.is_empty());
    }
}
