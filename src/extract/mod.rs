//! Product extraction from rendered supplier pages
//!
//! Extraction is pure over a parsed document snapshot:
//! 1. Walk the supplier's selector cascade; the first strategy matching at
//!    least one card wins and later strategies are not consulted.
//! 2. With no cascade match, treat every anchor pointing under the
//!    supplier's product path as a card.
//! 3. Derive each field independently (see [`fields`]); a card whose name
//!    cannot be resolved to 3+ characters is skipped, never fatal.
//! 4. De-duplicate by normalized name, keeping DOM order.

pub mod fields;
pub mod suppliers;

use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::product::{MIN_NAME_CHARS, ProductRecord, dedup_by_name};
use crate::supplier::{SupplierCatalog, SupplierId, SupplierProfile};
use crate::utils::SearchError;
pub use suppliers::{CardStrategy, SupplierRules, rules_for};

/// Compile selector strings, logging and skipping any that fail to parse
pub(crate) fn compile_selectors(sources: &[&str]) -> Vec<Selector> {
    sources
        .iter()
        .filter_map(|source| match Selector::parse(source) {
            Ok(selector) => Some(selector),
            Err(e) => {
                warn!("Skipping invalid selector '{}': {}", source, e);
                None
            }
        })
        .collect()
}

/// Why a candidate card produced no record
#[derive(Error, Debug, PartialEq)]
pub enum SkipReason {
    #[error("no name could be resolved")]
    NameMissing,

    #[error("name too short: {0:?}")]
    NameTooShort(String),
}

/// Where the candidate cards came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSource {
    /// A cascade strategy matched; carries its label
    Strategy(&'static str),
    /// No strategy matched; product-path anchors were used
    AnchorFallback,
    /// Nothing on the page looked like a product
    Nothing,
}

/// Result of one extraction pass, with diagnostics
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub source: CardSource,
    pub candidates: usize,
    pub skipped: usize,
    pub records: Vec<ProductRecord>,
}

struct CompiledStrategy {
    label: &'static str,
    container: Selector,
    name: Vec<Selector>,
    reference: Vec<Selector>,
}

/// Selector cascade and field rules for one supplier, compiled once
pub struct SupplierExtractor {
    supplier: SupplierId,
    label: String,
    origin: Url,
    cascade: Vec<CompiledStrategy>,
    fallback: Option<Selector>,
    login_markers: Vec<Selector>,
}

impl SupplierExtractor {
    pub fn new(supplier: SupplierId, profile: &SupplierProfile) -> Result<Self, SearchError> {
        Self::with_rules(supplier, profile, rules_for(supplier))
    }

    pub fn with_rules(
        supplier: SupplierId,
        profile: &SupplierProfile,
        rules: &SupplierRules,
    ) -> Result<Self, SearchError> {
        let cascade = rules
            .cascade
            .iter()
            .filter_map(|strategy| {
                let container = compile_selectors(&[strategy.container]).pop()?;
                Some(CompiledStrategy {
                    label: strategy.label,
                    container,
                    name: compile_selectors(strategy.name),
                    reference: compile_selectors(strategy.reference),
                })
            })
            .collect();

        let path = profile.product_path.replace(['"', '\\'], "");
        let fallback = if path.is_empty() {
            None
        } else {
            let css = format!("a[href*=\"{path}\"]");
            compile_selectors(&[css.as_str()]).pop()
        };

        Ok(Self {
            supplier,
            label: profile.label.clone(),
            origin: profile.origin()?,
            cascade,
            fallback,
            login_markers: compile_selectors(rules.login_markers),
        })
    }

    pub fn supplier(&self) -> SupplierId {
        self.supplier
    }

    pub fn extract(&self, document: &Html) -> Vec<ProductRecord> {
        self.extract_with_report(document).records
    }

    pub fn extract_html(&self, html: &str) -> Vec<ProductRecord> {
        self.extract(&Html::parse_document(html))
    }

    pub fn extract_with_report(&self, document: &Html) -> ExtractionReport {
        let (source, cards) = self.locate(document);
        let candidates = cards.len();

        let mut records = Vec::with_capacity(candidates);
        let mut skipped = 0;
        for (index, (card, strategy)) in cards.into_iter().enumerate() {
            match self.derive(card, strategy) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    skipped += 1;
                    debug!("{}: skipping card {}: {}", self.supplier, index, reason);
                }
            }
        }

        let records = dedup_by_name(records);
        debug!(
            "{}: {:?} yielded {} candidates, {} skipped, {} records",
            self.supplier,
            source,
            candidates,
            skipped,
            records.len()
        );

        ExtractionReport {
            source,
            candidates,
            skipped,
            records,
        }
    }

    fn locate<'a>(
        &'a self,
        document: &'a Html,
    ) -> (CardSource, Vec<(ElementRef<'a>, Option<&'a CompiledStrategy>)>) {
        for strategy in &self.cascade {
            let cards: Vec<_> = document
                .select(&strategy.container)
                .map(|card| (card, Some(strategy)))
                .collect();
            if !cards.is_empty() {
                return (CardSource::Strategy(strategy.label), cards);
            }
        }

        if let Some(fallback) = &self.fallback {
            let anchors: Vec<_> = document.select(fallback).map(|a| (a, None)).collect();
            if !anchors.is_empty() {
                return (CardSource::AnchorFallback, anchors);
            }
        }

        (CardSource::Nothing, Vec::new())
    }

    fn derive(
        &self,
        card: ElementRef<'_>,
        strategy: Option<&CompiledStrategy>,
    ) -> Result<ProductRecord, SkipReason> {
        let (name_hints, reference_hints): (&[Selector], &[Selector]) = match strategy {
            Some(strategy) => (strategy.name.as_slice(), strategy.reference.as_slice()),
            None => Default::default(),
        };

        let name = fields::derive_name(card, name_hints).ok_or(SkipReason::NameMissing)?;
        if name.chars().count() < MIN_NAME_CHARS {
            return Err(SkipReason::NameTooShort(name));
        }

        let text = fields::element_text(card);
        Ok(ProductRecord::new(
            &name,
            fields::derive_reference(card, reference_hints),
            self.label.as_str(),
            fields::derive_price(card, &text),
            fields::derive_availability(card, &text, &self.login_markers),
            fields::derive_link(card, &self.origin),
            fields::derive_image(card, &self.origin),
        ))
    }
}

/// One compiled extractor per configured supplier
pub struct ExtractorSet {
    extractors: HashMap<SupplierId, SupplierExtractor>,
}

impl ExtractorSet {
    pub fn from_catalog(catalog: &SupplierCatalog) -> Result<Self, SearchError> {
        let extractors = catalog
            .iter()
            .map(|(id, profile)| Ok((id, SupplierExtractor::new(id, profile)?)))
            .collect::<Result<HashMap<_, _>, SearchError>>()?;
        Ok(Self { extractors })
    }

    pub fn get(&self, supplier: SupplierId) -> Option<&SupplierExtractor> {
        self.extractors.get(&supplier)
    }
}
