//! Tolerant per-field derivation for a single product card
//!
//! Every helper here degrades to a neutral value (empty string, price 0,
//! in-stock) instead of failing; only the name decides whether a card is a
//! product at all.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use url::Url;

use super::compile_selectors;
use crate::product::{Availability, collapse_whitespace};

// units may carry thousands groups: "1.234,56", "1 234,56", "1,234.56"
static PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3}(?:[ .,\x{a0}\x{202f}]\d{3})+|\d+)[,.](\d{2})(?:\D|$)")
        .expect("valid price regex")
});

static REFERENCE_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9][A-Za-z0-9._/-]{2,}").expect("valid reference regex"));

static NAME_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    compile_selectors(&[
        "h1",
        "h2",
        "h3",
        "h4",
        "[itemprop='name']",
        ".product-title",
        ".product-name",
        ".product-item-name",
        ".title",
    ])
});

static PRICE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    compile_selectors(&[
        "[itemprop='price']",
        ".price",
        ".product-price",
        ".price-box",
        "[class*='price']",
    ])
});

static REFERENCE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    compile_selectors(&[
        "[itemprop='sku']",
        ".reference",
        ".product-reference",
        ".sku",
        ".ref",
        "[class*='reference']",
    ])
});

static REFERENCE_ATTR_HOLDER: Lazy<Vec<Selector>> = Lazy::new(|| {
    compile_selectors(&["[data-sku], [data-reference], [data-product-reference], [data-ref]"])
});

static GENERIC_LOGIN_MARKERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    compile_selectors(&[
        ".login-to-see-price",
        ".price-login",
        ".login-required",
        "[data-login-required]",
    ])
});

static ANCHOR: Lazy<Vec<Selector>> = Lazy::new(|| compile_selectors(&["a[href]"]));
static IMAGE: Lazy<Vec<Selector>> = Lazy::new(|| compile_selectors(&["img"]));

/// Data attributes holding an explicit SKU, most specific first
const REFERENCE_ATTRS: [&str; 4] = ["data-sku", "data-reference", "data-product-reference", "data-ref"];

/// Image attributes; lazy-loading pages park the real source in a data attribute
const IMAGE_ATTRS: [&str; 4] = ["src", "data-src", "data-lazy-src", "data-original"];

/// Lower-cased phrases meaning "out of stock"
const OUT_OF_STOCK_PHRASES: [&str; 11] = [
    "rupture",
    "épuisé",
    "epuise",
    "indisponible",
    "out of stock",
    "sold out",
    "unavailable",
    "agotado",
    "esaurito",
    "nicht verfügbar",
    "ausverkauft",
];

/// Whitespace-collapsed text content of an element
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// First non-empty line of an element's text
pub fn first_line(element: ElementRef<'_>) -> Option<String> {
    element
        .text()
        .flat_map(str::lines)
        .map(collapse_whitespace)
        .find(|line| !line.is_empty())
}

fn first_match<'s>(
    card: ElementRef<'_>,
    selectors: impl IntoIterator<Item = &'s Selector>,
) -> Option<String> {
    selectors.into_iter().find_map(|selector| {
        card.select(selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// The card's own anchor, or its first descendant anchor with an href
pub fn primary_anchor(card: ElementRef<'_>) -> Option<ElementRef<'_>> {
    if card.value().name() == "a" && card.value().attr("href").is_some() {
        return Some(card);
    }
    ANCHOR.iter().find_map(|selector| card.select(selector).next())
}

/// Headings first, then the link title, then the first line of text
pub fn derive_name(card: ElementRef<'_>, preferred: &[Selector]) -> Option<String> {
    first_match(card, preferred.iter().chain(NAME_SELECTORS.iter()))
        .or_else(|| {
            primary_anchor(card)
                .and_then(|anchor| anchor.value().attr("title"))
                .map(collapse_whitespace)
                .filter(|title| !title.is_empty())
        })
        .or_else(|| first_line(card))
}

/// First `digits(,|.)dd` amount in `text`; 0 when there is none
pub fn parse_price(text: &str) -> f64 {
    PRICE_RE
        .captures(text)
        .and_then(|caps| {
            let units: String = caps[1].chars().filter(char::is_ascii_digit).collect();
            format!("{}.{}", units, &caps[2]).parse::<f64>().ok()
        })
        .unwrap_or(0.0)
}

/// Price-like elements first, then the whole card text
pub fn derive_price(card: ElementRef<'_>, card_text: &str) -> f64 {
    PRICE_SELECTORS
        .iter()
        .flat_map(|selector| card.select(selector))
        .map(element_text)
        .map(|text| parse_price(&text))
        .find(|price| *price > 0.0)
        .unwrap_or_else(|| parse_price(card_text))
}

/// First alphanumeric token that contains a digit, e.g. `ABC-123` in `Réf : ABC-123`
pub fn find_reference_token(text: &str) -> Option<String> {
    REFERENCE_TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', '-', '/', '_']).to_string())
        .find(|token| token.len() >= 3 && token.chars().any(|c| c.is_ascii_digit()))
}

fn reference_attr(element: ElementRef<'_>) -> Option<String> {
    REFERENCE_ATTRS
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Explicit data attribute, else a token from a reference-like element
pub fn derive_reference(card: ElementRef<'_>, preferred: &[Selector]) -> String {
    if let Some(reference) = reference_attr(card) {
        return reference;
    }

    let nested = REFERENCE_ATTR_HOLDER
        .iter()
        .flat_map(|selector| card.select(selector))
        .find_map(reference_attr);
    if let Some(reference) = nested {
        return reference;
    }

    preferred
        .iter()
        .chain(REFERENCE_SELECTORS.iter())
        .flat_map(|selector| card.select(selector))
        .map(element_text)
        .find_map(|text| find_reference_token(&text))
        .unwrap_or_default()
}

/// Case-insensitive lexicon match on the card text
pub fn is_out_of_stock(text: &str) -> bool {
    let lower = text.to_lowercase();
    OUT_OF_STOCK_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// A login prompt wins over any stock wording
pub fn derive_availability(
    card: ElementRef<'_>,
    card_text: &str,
    login_markers: &[Selector],
) -> Availability {
    let gated = login_markers
        .iter()
        .chain(GENERIC_LOGIN_MARKERS.iter())
        .any(|selector| card.select(selector).next().is_some());

    if gated {
        Availability::NeedsLogin
    } else if is_out_of_stock(card_text) {
        Availability::OutOfStock
    } else {
        Availability::InStock
    }
}

/// Absolute URL for `href`, or `None` for anchors that lead nowhere
pub fn resolve_url(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("data:")
        || href.starts_with("mailto:")
    {
        return None;
    }
    base.join(href).ok().map(String::from)
}

/// First image's direct or lazy-load source
pub fn derive_image(card: ElementRef<'_>, base: &Url) -> String {
    IMAGE
        .iter()
        .flat_map(|selector| card.select(selector))
        .next()
        .and_then(|img| {
            IMAGE_ATTRS
                .iter()
                .filter_map(|attr| img.value().attr(attr))
                .find_map(|src| resolve_url(src, base))
        })
        .unwrap_or_default()
}

/// Href of the card's primary anchor
pub fn derive_link(card: ElementRef<'_>, base: &Url) -> String {
    primary_anchor(card)
        .and_then(|anchor| anchor.value().attr("href"))
        .and_then(|href| resolve_url(href, base))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn card(html: &str) -> Html {
        Html::parse_fragment(html)
    }

    fn root(fragment: &Html) -> ElementRef<'_> {
        let selector = Selector::parse(".card").unwrap();
        fragment.select(&selector).next().expect("fixture has a .card")
    }

    #[test]
    fn price_with_comma_and_currency_suffix() {
        assert_eq!(parse_price("12,99 €"), 12.99);
    }

    #[test]
    fn price_with_dot_and_glued_currency() {
        assert_eq!(parse_price("12.99€"), 12.99);
    }

    #[test]
    fn price_with_leading_currency() {
        assert_eq!(parse_price("Prix : € 149,00 TTC"), 149.0);
    }

    #[test]
    fn price_with_thousands_separators() {
        assert_eq!(parse_price("1.234,56 €"), 1234.56);
        assert_eq!(parse_price("1 234,56 €"), 1234.56);
        assert_eq!(parse_price("1\u{a0}234,56 €"), 1234.56);
        assert_eq!(parse_price("$1,234.56"), 1234.56);
    }

    #[test]
    fn whole_thousands_without_cents_are_not_a_price() {
        assert_eq!(parse_price("1,234 €"), 0.0);
    }

    #[test]
    fn missing_price_is_zero() {
        assert_eq!(parse_price("Connectez-vous pour voir le prix"), 0.0);
        assert_eq!(parse_price("12 €"), 0.0);
        assert_eq!(parse_price(""), 0.0);
    }

    #[test]
    fn rupture_is_out_of_stock_in_any_case() {
        assert!(is_out_of_stock("En RUPTURE de stock"));
        assert!(is_out_of_stock("rupture"));
        assert!(is_out_of_stock("Rupture temporaire"));
        assert!(!is_out_of_stock("En stock"));
    }

    #[test]
    fn login_marker_overrides_stock_wording() {
        let html = card(
            r#"<div class="card"><span class="price-login">Connectez-vous</span><p>Rupture</p></div>"#,
        );
        let element = root(&html);
        let text = element_text(element);
        assert_eq!(derive_availability(element, &text, &[]), Availability::NeedsLogin);
    }

    #[test]
    fn out_of_stock_from_lexicon() {
        let html = card(r#"<div class="card"><p>Produit épuisé</p></div>"#);
        let element = root(&html);
        let text = element_text(element);
        assert_eq!(derive_availability(element, &text, &[]), Availability::OutOfStock);
    }

    #[test]
    fn reference_prefers_data_attribute() {
        let html = card(
            r#"<div class="card" data-sku="SKU-42"><span class="reference">Réf : ABC-123</span></div>"#,
        );
        assert_eq!(derive_reference(root(&html), &[]), "SKU-42");
    }

    #[test]
    fn reference_from_nested_data_attribute() {
        let html = card(r#"<div class="card"><div data-reference="XY99"></div></div>"#);
        assert_eq!(derive_reference(root(&html), &[]), "XY99");
    }

    #[test]
    fn reference_token_skips_label() {
        let html = card(r#"<div class="card"><span class="reference">Réf : ABC-123.</span></div>"#);
        assert_eq!(derive_reference(root(&html), &[]), "ABC-123");
    }

    #[test]
    fn missing_reference_is_empty() {
        let html = card(r#"<div class="card"><h3>Écran</h3></div>"#);
        assert_eq!(derive_reference(root(&html), &[]), "");
        assert_eq!(find_reference_token("Référence"), None);
    }

    #[test]
    fn name_falls_back_to_link_title_then_text() {
        let titled = card(r#"<div class="card"><a href="/p/1" title="Nappe volume"><img src="x.jpg"></a></div>"#);
        assert_eq!(derive_name(root(&titled), &[]).as_deref(), Some("Nappe volume"));

        let plain = card("<div class=\"card\"><a href=\"/p/2\">\n  Haut-parleur  \n interne</a></div>");
        assert_eq!(derive_name(root(&plain), &[]).as_deref(), Some("Haut-parleur"));
    }

    #[test]
    fn image_prefers_lazy_source_over_placeholder() {
        let base = Url::parse("https://www.supplier-a.example/").unwrap();
        let html = card(
            r#"<div class="card"><img src="data:image/gif;base64,R0lG" data-src="/img/ecran.jpg"></div>"#,
        );
        assert_eq!(
            derive_image(root(&html), &base),
            "https://www.supplier-a.example/img/ecran.jpg"
        );
    }

    #[test]
    fn relative_links_are_absolutized() {
        let base = Url::parse("https://www.supplier-a.example/").unwrap();
        let html = card(r##"<div class="card"><a href="#">x</a><a href="/produit/12-ecran.html">Écran</a></div>"##);
        // first anchor leads nowhere, so the link is empty rather than a guess
        assert_eq!(derive_link(root(&html), &base), "");

        let good = card(r#"<div class="card"><a href="/produit/12-ecran.html">Écran</a></div>"#);
        assert_eq!(
            derive_link(root(&good), &base),
            "https://www.supplier-a.example/produit/12-ecran.html"
        );
    }
}
