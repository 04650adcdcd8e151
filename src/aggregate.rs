//! Caller-side aggregation of per-supplier responses

use std::cmp::Ordering;

use crate::orchestrator::SearchResponse;
use crate::product::ProductRecord;

/// Concatenate products in response order and collect the diagnostics
///
/// Records are kept as they are, login-gated and zero-price ones included.
pub fn merge_responses(responses: Vec<SearchResponse>) -> (Vec<ProductRecord>, Vec<String>) {
    let mut products = Vec::new();
    let mut errors = Vec::new();
    for response in responses {
        products.extend(response.products);
        errors.extend(response.error);
    }
    (products, errors)
}

/// Known prices ascending, unknown prices after them; stable otherwise
pub fn sort_by_price(products: &mut [ProductRecord]) {
    products.sort_by(|a, b| match (a.has_known_price(), b.has_known_price()) {
        (true, true) => a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::Availability;

    fn record(name: &str, supplier: &str, price: f64, availability: Availability) -> ProductRecord {
        ProductRecord::new(name, "", supplier, price, availability, "", "")
    }

    #[test]
    fn merge_keeps_order_and_collects_errors() {
        let responses = vec![
            SearchResponse::found(vec![record("Ecran A", "SupplierA", 30.0, Availability::InStock)]),
            SearchResponse::failed("supplierB: extraction agent unreachable"),
            SearchResponse::found(vec![record("Ecran C", "SupplierA", 0.0, Availability::NeedsLogin)]),
        ];
        let (products, errors) = merge_responses(responses);
        assert_eq!(products.len(), 2);
        assert_eq!(products[1].availability, Availability::NeedsLogin);
        assert_eq!(errors, vec!["supplierB: extraction agent unreachable".to_string()]);
    }

    #[test]
    fn unknown_prices_sort_after_known_ones() {
        let mut products = vec![
            record("Login gated", "SupplierB", 0.0, Availability::NeedsLogin),
            record("Expensive", "SupplierA", 89.0, Availability::InStock),
            record("No price", "SupplierA", 0.0, Availability::InStock),
            record("Cheap", "SupplierB", 12.99, Availability::OutOfStock),
        ];
        sort_by_price(&mut products);
        let names: Vec<_> = products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Cheap", "Expensive", "Login gated", "No price"]);
    }
}
