//! Product records produced by extraction

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Names are truncated to this many characters
pub const MAX_NAME_CHARS: usize = 120;

/// Names shorter than this are page noise, not products
pub const MIN_NAME_CHARS: usize = 3;

/// Stock status of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Availability {
    InStock,
    OutOfStock,
    /// Price and stock are hidden behind the supplier's login wall
    NeedsLogin,
}

/// One product as listed on a supplier results page
///
/// A price of `0.0` means unknown. Combined with [`Availability::NeedsLogin`]
/// it marks a login-gated item, which callers must keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub name: String,
    #[serde(default)]
    pub reference: String,
    pub supplier_label: String,
    #[serde(default)]
    pub price: f64,
    pub availability: Availability,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub image_url: String,
}

impl ProductRecord {
    pub fn new(
        name: &str,
        reference: impl Into<String>,
        supplier_label: impl Into<String>,
        price: f64,
        availability: Availability,
        source_url: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            name: truncate_name(&collapse_whitespace(name)),
            reference: reference.into(),
            supplier_label: supplier_label.into(),
            price: clamp_price(price),
            availability,
            source_url: source_url.into(),
            image_url: image_url.into(),
        }
    }

    /// Whether the price is unknown (hidden, login-gated or unparsable)
    pub fn has_known_price(&self) -> bool {
        self.price > 0.0
    }

    /// Re-apply record invariants to a value that arrived over the wire
    ///
    /// Returns `None` when the name is too short to be a product.
    pub fn sanitize(mut self) -> Option<Self> {
        self.name = truncate_name(&collapse_whitespace(&self.name));
        if self.name.chars().count() < MIN_NAME_CHARS {
            return None;
        }
        self.price = clamp_price(self.price);
        Some(self)
    }
}

fn clamp_price(price: f64) -> f64 {
    if price.is_finite() && price > 0.0 { price } else { 0.0 }
}

fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_NAME_CHARS).collect::<String>().trim_end().to_string()
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Dedup key: trimmed, whitespace-collapsed, lower-cased name
pub fn normalize_name(name: &str) -> String {
    collapse_whitespace(name).to_lowercase()
}

/// Drop records whose normalized name was already seen, keeping the first
pub fn dedup_by_name(records: Vec<ProductRecord>) -> Vec<ProductRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(normalize_name(&record.name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ProductRecord {
        ProductRecord::new(name, "", "SupplierA", 10.0, Availability::InStock, "", "")
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let records = vec![
            record("Ecran iPhone 11 Noir"),
            record("Batterie iPhone 11"),
            record("  ECRAN IPHONE 11 NOIR "),
        ];
        let deduped = dedup_by_name(records);
        let names: Vec<_> = deduped.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Ecran iPhone 11 Noir", "Batterie iPhone 11"]);
    }

    #[test]
    fn dedup_is_idempotent() {
        let records = vec![
            record("Vitre arrière"),
            record("vitre   ARRIÈRE"),
            record("Nappe de charge"),
            record("Nappe de charge"),
        ];
        let once = dedup_by_name(records);
        let twice = dedup_by_name(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn negative_and_nan_prices_clamp_to_zero() {
        let negative = ProductRecord::new("Écran", "", "A", -3.0, Availability::InStock, "", "");
        assert_eq!(negative.price, 0.0);
        let nan = ProductRecord::new("Écran", "", "A", f64::NAN, Availability::InStock, "", "");
        assert_eq!(nan.price, 0.0);
        assert!(!nan.has_known_price());
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "x".repeat(500);
        assert_eq!(record(&long).name.chars().count(), MAX_NAME_CHARS);
    }

    #[test]
    fn sanitize_rejects_short_names_and_keeps_login_gated_items() {
        assert!(record("ok").sanitize().is_none());

        let gated = ProductRecord::new(
            "Connecteur de charge",
            "",
            "SupplierB",
            0.0,
            Availability::NeedsLogin,
            "",
            "",
        );
        let kept = gated.clone().sanitize().unwrap();
        assert_eq!(kept, gated);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let value = serde_json::to_value(record("Batterie iPhone 11")).unwrap();
        assert_eq!(value["supplierLabel"], "SupplierA");
        assert_eq!(value["availability"], "in-stock");
        assert!(value.get("sourceUrl").is_some());
    }
}
