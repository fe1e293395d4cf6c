//! Address-equality key for shipment consolidation.
//!
//! Consolidation groups same-day orders that ship to the same place. The key
//! is exact after normalization — no fuzzy tolerance, per the grouping
//! policy: a near-miss address is two shipments, not one.

use crate::mapping::Address;

/// Lowercased alphanumeric fold of one address component.
fn fold(part: Option<&str>) -> String {
    part.unwrap_or("")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Deterministic grouping key from recipient + address + city + district +
/// postal code. Phone and country are excluded: the former varies per order,
/// the latter is constant for domestic marketplaces.
pub fn consolidation_key(addr: &Address) -> String {
    [
        fold(addr.full_name.as_deref()),
        fold(addr.address.as_deref()),
        fold(addr.city.as_deref()),
        fold(addr.district.as_deref()),
        fold(addr.postal_code.as_deref()),
    ]
    .join("|")
}

/// An address with no usable components can never participate in grouping.
pub fn is_groupable(addr: &Address) -> bool {
    addr.full_name.is_some() && addr.address.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(name: &str, street: &str, city: &str) -> Address {
        Address {
            full_name: Some(name.into()),
            address: Some(street.into()),
            city: Some(city.into()),
            ..Address::default()
        }
    }

    #[test]
    fn formatting_differences_collapse() {
        let a = addr("Emre Altındağ", "Atatürk Mah. Çiçek Sok. No:3", "İstanbul");
        let b = addr("EMRE ALTINDAĞ", "Atatürk Mah. Çiçek Sok. No: 3", "istanbul");
        assert_eq!(consolidation_key(&a), consolidation_key(&b));
    }

    #[test]
    fn different_street_number_is_a_different_key() {
        let a = addr("Emre Altındağ", "Çiçek Sok. No:3", "İstanbul");
        let b = addr("Emre Altındağ", "Çiçek Sok. No:4", "İstanbul");
        assert_ne!(consolidation_key(&a), consolidation_key(&b));
    }

    #[test]
    fn empty_address_is_not_groupable() {
        assert!(!is_groupable(&Address::default()));
    }
}
