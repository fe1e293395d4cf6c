use strsim::jaro_winkler;

/// Minimum similarity score (Jaro-Winkler) required before a fuzzy title
/// match may link an order line to an existing product.
pub const MIN_TITLE_SIMILARITY: f64 = 0.90;

/// Strip everything but ASCII alphanumerics and uppercase the rest. Barcodes
/// and stock codes arrive with stray spaces, dashes and the occasional
/// leading-zero difference between platforms.
pub fn normalize_code(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// GTIN-style barcodes additionally drop leading zeros so EAN-13 vs
/// zero-padded GTIN-14 renditions of the same code compare equal. Codes with
/// letters are merchant SKUs and keep their exact shape.
pub fn normalize_barcode(raw: &str) -> String {
    let code = normalize_code(raw);
    if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) {
        let trimmed = code.trim_start_matches('0');
        if trimmed.is_empty() {
            return "0".to_string();
        }
        return trimmed.to_string();
    }
    code
}

/// Canonicalized product-title key used for fuzzy comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleKey {
    normalized: String,
    numeric_sig: Option<String>,
}

impl TitleKey {
    /// Build a normalized comparison key from a raw product title:
    /// lowercase, strip punctuation/whitespace, record the numeric signature
    /// so "Termos 750ml" never fuzzy-matches "Termos 500ml".
    pub fn new(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        let digits: String = normalized.chars().filter(|c| c.is_ascii_digit()).collect();
        let numeric_sig = if digits.is_empty() {
            None
        } else {
            Some(digits)
        };
        Self {
            normalized,
            numeric_sig,
        }
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Whether the numeric signatures are compatible (both empty or equal).
    pub fn numeric_compatible(&self, other: &Self) -> bool {
        match (&self.numeric_sig, &other.numeric_sig) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn similarity(&self, other: &Self) -> f64 {
        jaro_winkler(self.normalized(), other.normalized())
    }

    /// Combined gate used by the product reconciliation pass.
    pub fn matches(&self, other: &Self) -> bool {
        self.numeric_compatible(other) && self.similarity(other) >= MIN_TITLE_SIMILARITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barcode_normalization_ignores_padding_and_dashes() {
        assert_eq!(normalize_barcode("869-1234-567890 "), "8691234567890");
        assert_eq!(normalize_barcode("08691234567890"), "8691234567890");
        assert_eq!(normalize_barcode("0000"), "0");
    }

    #[test]
    fn sku_keeps_leading_zeros() {
        assert_eq!(normalize_code("trm-0750-slv"), "TRM0750SLV");
        assert_eq!(normalize_barcode("TRM-0750"), "TRM0750");
    }

    #[test]
    fn titles_with_same_size_match() {
        let a = TitleKey::new("Paslanmaz Çelik Termos 750ml");
        let b = TitleKey::new("Paslanmaz Çelik Termos 750 ml");
        assert!(a.matches(&b));
    }

    #[test]
    fn numeric_signature_blocks_different_sizes() {
        let a = TitleKey::new("Termos 750ml");
        let b = TitleKey::new("Termos 500ml");
        assert!(!a.numeric_compatible(&b));
        assert!(!a.matches(&b));
    }
}
