//! Field-mapping layer: raw marketplace JSON in, canonical records out.
//!
//! One module per marketplace, each declaring its field correspondences and
//! status-translation table explicitly; `map_order`/`map_product` dispatch on
//! `PlatformType`. Mapping is pure — no I/O, no mutation of the input payload,
//! and the same payload always yields the same canonical record (re-sync
//! relies on this for idempotence).

pub mod amazon;
pub mod canonical;
pub mod fields;
pub mod hepsiburada;
pub mod n11;
pub mod trendyol;

use serde_json::Value;
use thiserror::Error;

pub use canonical::{
    Address, CanonicalOrder, CanonicalProduct, Customer, OrderLine, OrderStatus, PlatformType,
};

/// Typed parse failure at the mapper boundary. Malformed payloads become one
/// of these instead of a silently partial canonical record; the enclosing
/// bulk operation records them per item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is malformed: {reason}")]
    Malformed {
        field: &'static str,
        reason: String,
    },
}

pub fn map_order(platform: PlatformType, raw: &Value) -> Result<CanonicalOrder, MappingError> {
    if !raw.is_object() {
        return Err(MappingError::NotAnObject);
    }
    match platform {
        PlatformType::Trendyol => trendyol::map_order(raw),
        PlatformType::N11 => n11::map_order(raw),
        PlatformType::Hepsiburada => hepsiburada::map_order(raw),
        PlatformType::Amazon => amazon::map_order(raw),
    }
}

pub fn map_product(platform: PlatformType, raw: &Value) -> Result<CanonicalProduct, MappingError> {
    if !raw.is_object() {
        return Err(MappingError::NotAnObject);
    }
    match platform {
        PlatformType::Trendyol => trendyol::map_product(raw),
        PlatformType::N11 => n11::map_product(raw),
        PlatformType::Hepsiburada => hepsiburada::map_product(raw),
        PlatformType::Amazon => amazon::map_product(raw),
    }
}

/// Case-insensitive lookup in a platform status table. Unknown values map to
/// `OrderStatus::Unknown` — a new status label rolled out by a marketplace
/// must never break the sync.
pub(crate) fn translate_status(
    table: &[(&str, OrderStatus)],
    raw: Option<&str>,
) -> OrderStatus {
    let Some(raw) = raw else {
        return OrderStatus::Unknown;
    };
    let needle = raw.trim();
    table
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(needle))
        .map(|(_, status)| *status)
        .unwrap_or(OrderStatus::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_object_payload_is_a_typed_error() {
        for platform in PlatformType::ALL {
            assert_eq!(
                map_order(platform, &json!([1, 2, 3])).unwrap_err(),
                MappingError::NotAnObject
            );
        }
    }

    #[test]
    fn unknown_status_never_errors() {
        let status = translate_status(
            n11::STATUSES,
            Some("SomeBrandNewStatusLabel"),
        );
        assert_eq!(status, OrderStatus::Unknown);
    }

    #[test]
    fn mapping_is_deterministic() {
        let payload = json!({
            "id": 42,
            "orderNumber": "X-1",
            "shipmentPackageStatus": "Shipped",
            "totalAmount": 10.5,
            "lines": [{"quantity": 1, "price": 10.5}]
        });
        let a = map_order(PlatformType::N11, &payload).unwrap();
        let b = map_order(PlatformType::N11, &payload).unwrap();
        assert_eq!(a, b);
    }
}
