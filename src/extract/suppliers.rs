//! Per-supplier selector cascades
//!
//! Strategies are ordered from the most specific, current markup to the most
//! generic. Supporting another storefront revision means appending a
//! strategy here, not touching the extraction logic.

use crate::supplier::SupplierId;

/// One way of recognising product cards on a results page
#[derive(Debug, Clone, Copy)]
pub struct CardStrategy {
    /// Short name reported in logs when this strategy wins
    pub label: &'static str,
    /// Selector matching one element per product card
    pub container: &'static str,
    /// Preferred name selectors, tried before the generic heading list
    pub name: &'static [&'static str],
    /// Preferred reference selectors, tried before the generic list
    pub reference: &'static [&'static str],
}

/// Extraction rules for one supplier
#[derive(Debug, Clone, Copy)]
pub struct SupplierRules {
    pub cascade: &'static [CardStrategy],
    /// Elements that replace the price with a login prompt
    pub login_markers: &'static [&'static str],
}

const SUPPLIER_A_CASCADE: &[CardStrategy] = &[
    CardStrategy {
        label: "product-miniature",
        container: "article.product-miniature",
        name: &[".product-title a", ".product-title"],
        reference: &[".product-reference", ".product-sku"],
    },
    CardStrategy {
        label: "js-product-miniature",
        container: ".js-product-miniature",
        name: &[".product-name", ".product-title"],
        reference: &[".product-reference"],
    },
    CardStrategy {
        label: "product-container",
        container: ".product_list .product-container, .product-container",
        name: &["a.product-name", "h5 a"],
        reference: &[".product-reference", ".reference"],
    },
    CardStrategy {
        label: "ajax-block",
        container: "li.ajax_block_product",
        name: &["h5", ".product-name"],
        reference: &[],
    },
];

const SUPPLIER_B_CASCADE: &[CardStrategy] = &[
    CardStrategy {
        label: "product-item",
        container: "li.product-item",
        name: &["a.product-item-link", ".product-item-name"],
        reference: &[".product-item-sku", ".sku"],
    },
    CardStrategy {
        label: "product-card",
        container: "div.product-card, [data-product-card]",
        name: &[".product-card__title", ".product-card__name"],
        reference: &[".product-card__sku"],
    },
    CardStrategy {
        label: "grid-item",
        container: ".products-grid .item, .products.list .item",
        name: &[".product-name a", ".product-name"],
        reference: &[".sku"],
    },
];

static SUPPLIER_A: SupplierRules = SupplierRules {
    cascade: SUPPLIER_A_CASCADE,
    login_markers: &[".product-login-price", "a.login-to-buy"],
};

static SUPPLIER_B: SupplierRules = SupplierRules {
    cascade: SUPPLIER_B_CASCADE,
    login_markers: &[".price-hidden-login", "[data-role='login-for-price']"],
};

pub fn rules_for(supplier: SupplierId) -> &'static SupplierRules {
    match supplier {
        SupplierId::SupplierA => &SUPPLIER_A,
        SupplierId::SupplierB => &SUPPLIER_B,
    }
}
