//! Shared payload-extraction helpers used by every platform mapping module.
//! Marketplace payloads are duck-typed JSON; these helpers centralize the
//! tolerant coercions (string-or-number ids, epoch-ms timestamps, comma
//! decimals) so the per-platform tables stay declarative.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use super::canonical::Address;

/// First non-empty string among the aliased keys. Numbers are stringified so
/// ids that arrive as JSON numbers (N11 does this) still match.
pub fn pick_str(obj: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match obj.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// First numeric value among the aliased keys; accepts numbers and numeric
/// strings, including Turkish "1.234,56" comma-decimal formatting.
pub fn pick_f64(obj: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(v) = obj.get(*key) {
            if let Some(n) = value_as_f64(v) {
                return Some(n);
            }
        }
    }
    None
}

pub fn pick_i64(obj: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        match obj.get(*key) {
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return Some(i);
                }
                if let Some(f) = n.as_f64() {
                    return Some(f as i64);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(i) = s.trim().parse::<i64>() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn value_as_f64(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    if let Some(n) = v.as_i64() {
        return Some(n as f64);
    }
    if let Some(s) = v.as_str() {
        let t = s.trim();
        if t.is_empty() {
            return None;
        }
        if let Ok(n) = t.parse::<f64>() {
            return Some(n);
        }
        // "1.234,56" -> "1234.56"
        let normalized = t.replace('.', "").replace(',', ".");
        return normalized.parse::<f64>().ok();
    }
    None
}

/// Epoch milliseconds (or an RFC3339 string) to a UTC timestamp. Marketplace
/// feeds disagree on which they send, sometimes within one payload.
pub fn pick_datetime(obj: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    for key in keys {
        match obj.get(*key) {
            Some(Value::Number(n)) => {
                if let Some(ms) = n.as_i64() {
                    if let Some(dt) = epoch_ms_to_datetime(ms) {
                        return Some(dt);
                    }
                }
            }
            Some(Value::String(s)) => {
                if let Ok(ms) = s.trim().parse::<i64>() {
                    if let Some(dt) = epoch_ms_to_datetime(ms) {
                        return Some(dt);
                    }
                }
                if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
                    return Some(dt.with_timezone(&Utc));
                }
            }
            _ => {}
        }
    }
    None
}

pub fn epoch_ms_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    // Values below ~2001 in ms-space are almost certainly seconds.
    let ms = if ms != 0 && ms.abs() < 1_000_000_000_000 {
        ms.saturating_mul(1000)
    } else {
        ms
    };
    Utc.timestamp_millis_opt(ms).single()
}

/// Copy a nested address object, keeping only whitelisted keys. Unknown keys
/// are dropped rather than carried into the canonical record.
pub fn map_address(obj: Option<&Value>) -> Address {
    let Some(obj) = obj else {
        return Address::default();
    };
    Address {
        full_name: pick_str(obj, &["fullName", "name", "firstName"]).map(|first| {
            let split_name = obj.get("fullName").is_none() && obj.get("name").is_none();
            match pick_str(obj, &["lastName"]) {
                Some(last) if split_name => format!("{first} {last}"),
                _ => first,
            }
        }),
        address: pick_str(obj, &["address", "address1", "fullAddress", "addressLine1"]),
        city: pick_str(obj, &["city", "cityName"]),
        district: pick_str(obj, &["district", "town", "county"]),
        neighborhood: pick_str(obj, &["neighborhood", "neighbourhood"]),
        postal_code: pick_str(obj, &["postalCode", "zipCode", "postCode"]),
        country: pick_str(obj, &["country", "countryCode"]),
        phone: pick_str(obj, &["phone", "phoneNumber", "gsm"]),
    }
}

/// Decimal amount to minor units (kuruş). Rounding absorbs the float noise
/// left by parsing two-decimal marketplace prices.
pub fn amount_to_minor(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub fn minor_to_amount(minor: i64) -> f64 {
    (minor as f64) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pick_str_falls_through_aliases() {
        let v = json!({"customerName": "Ali", "customerfullName": "Ali Veli"});
        assert_eq!(
            pick_str(&v, &["customerFullName", "customerfullName", "customerName"]),
            Some("Ali Veli".to_string())
        );
    }

    #[test]
    fn pick_str_stringifies_numeric_ids() {
        let v = json!({"id": 112964324974270i64});
        assert_eq!(pick_str(&v, &["id"]), Some("112964324974270".to_string()));
    }

    #[test]
    fn value_as_f64_accepts_comma_decimals() {
        assert_eq!(value_as_f64(&json!("1.234,56")), Some(1234.56));
        assert_eq!(value_as_f64(&json!("282.33")), Some(282.33));
        assert_eq!(value_as_f64(&json!(282.33)), Some(282.33));
    }

    #[test]
    fn epoch_seconds_are_promoted_to_millis() {
        let from_secs = epoch_ms_to_datetime(1_700_000_000).unwrap();
        let from_ms = epoch_ms_to_datetime(1_700_000_000_000).unwrap();
        assert_eq!(from_secs, from_ms);
    }

    #[test]
    fn address_whitelist_drops_unknown_keys() {
        let v = json!({
            "fullName": "Emre Altındağ",
            "city": "İstanbul",
            "__internal": "x",
            "gsm": "5551112233"
        });
        let addr = map_address(Some(&v));
        assert_eq!(addr.full_name.as_deref(), Some("Emre Altındağ"));
        assert_eq!(addr.phone.as_deref(), Some("5551112233"));
        assert!(addr.postal_code.is_none());
    }

    #[test]
    fn amount_minor_roundtrip() {
        assert_eq!(amount_to_minor(282.33), 28233);
        assert_eq!(minor_to_amount(28233), 282.33);
    }
}
