//! Supplier identifiers and their catalog configuration
//!
//! Each supplier maps to a search URL template, a domain predicate used to
//! recognise its tabs, and the path segment its product pages live under.
//! The mapping is configuration: `config.yaml` may override any entry, and
//! missing entries fall back to the built-in defaults below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::utils::SearchError;

/// Placeholder substituted with the encoded query when present in a template
const QUERY_PLACEHOLDER: &str = "{query}";

/// A known supplier catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SupplierId {
    SupplierA,
    SupplierB,
}

impl SupplierId {
    /// Every supplier, in the order searches are issued by default
    pub const ALL: [SupplierId; 2] = [SupplierId::SupplierA, SupplierId::SupplierB];

    pub fn as_str(self) -> &'static str {
        match self {
            SupplierId::SupplierA => "supplierA",
            SupplierId::SupplierB => "supplierB",
        }
    }
}

impl fmt::Display for SupplierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SupplierId {
    type Err = SearchError;

    /// Accepts `supplierA`, `supplier-a`, `supplier_a` and `a` in any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();

        match key.as_str() {
            "suppliera" | "a" => Ok(SupplierId::SupplierA),
            "supplierb" | "b" => Ok(SupplierId::SupplierB),
            _ => Err(SearchError::UnknownSupplier(s.to_string())),
        }
    }
}

/// Catalog configuration for one supplier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplierProfile {
    /// Human-readable label copied into every extracted record
    pub label: String,

    /// Search URL; the encoded query replaces `{query}` or is appended
    pub search_url: String,

    /// Registrable domain used to recognise tabs already on this supplier
    pub domain: String,

    /// Path segment that identifies product detail links
    pub product_path: String,

    /// Optional on-disk agent script replacing the embedded default
    #[serde(default)]
    pub agent_script: Option<PathBuf>,
}

impl SupplierProfile {
    /// Build the query URL for a search
    pub fn search_url(&self, query: &str) -> Result<Url, SearchError> {
        let encoded = urlencoding::encode(query.trim());
        let raw = if self.search_url.contains(QUERY_PLACEHOLDER) {
            self.search_url.replace(QUERY_PLACEHOLDER, &encoded)
        } else {
            format!("{}{}", self.search_url, encoded)
        };

        Url::parse(&raw).map_err(|e| {
            SearchError::Config(format!("invalid search URL for {}: {raw} ({e})", self.label))
        })
    }

    /// Base origin used to absolutize relative links found on the page
    pub fn origin(&self) -> Result<Url, SearchError> {
        let url = Url::parse(&self.search_url.replace(QUERY_PLACEHOLDER, "")).map_err(|e| {
            SearchError::Config(format!("invalid search URL for {}: {e}", self.label))
        })?;
        let origin = url.origin().ascii_serialization();
        Url::parse(&format!("{origin}/"))
            .map_err(|e| SearchError::Config(format!("invalid origin for {}: {e}", self.label)))
    }

    /// Whether `location` is a page on this supplier's domain (sub-domains included)
    pub fn matches_url(&self, location: &str) -> bool {
        let Ok(url) = Url::parse(location) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };

        let host = host.to_ascii_lowercase();
        let domain = self.domain.trim_start_matches('.').to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    }
}

/// Configured suppliers, keyed by identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SupplierCatalog {
    profiles: BTreeMap<SupplierId, SupplierProfile>,
}

impl SupplierCatalog {
    pub fn new(profiles: BTreeMap<SupplierId, SupplierProfile>) -> Self {
        Self { profiles }
    }

    pub fn profile(&self, id: SupplierId) -> Option<&SupplierProfile> {
        self.profiles.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = SupplierId> + '_ {
        self.profiles.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SupplierId, &SupplierProfile)> {
        self.profiles.iter().map(|(id, profile)| (*id, profile))
    }

    /// Fill in built-in profiles for any supplier the configuration omitted
    pub fn with_defaults(mut self) -> Self {
        for (id, profile) in Self::default().profiles {
            self.profiles.entry(id).or_insert(profile);
        }
        self
    }

    /// Supplier whose domain matches `location`, if any
    pub fn supplier_for_url(&self, location: &str) -> Option<SupplierId> {
        self.iter()
            .find(|(_, profile)| profile.matches_url(location))
            .map(|(id, _)| id)
    }
}

impl Default for SupplierCatalog {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            SupplierId::SupplierA,
            SupplierProfile {
                label: "SupplierA".to_string(),
                search_url: "https://www.supplier-a.example/recherche?controller=search&s=".to_string(),
                domain: "supplier-a.example".to_string(),
                product_path: "/produit/".to_string(),
                agent_script: None,
            },
        );
        profiles.insert(
            SupplierId::SupplierB,
            SupplierProfile {
                label: "SupplierB".to_string(),
                search_url: "https://shop.supplier-b.example/catalogsearch/result/?q={query}".to_string(),
                domain: "supplier-b.example".to_string(),
                product_path: "/product/".to_string(),
                agent_script: None,
            },
        );
        Self { profiles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supplier_aliases() {
        assert_eq!("supplierA".parse::<SupplierId>().unwrap(), SupplierId::SupplierA);
        assert_eq!("SUPPLIER-B".parse::<SupplierId>().unwrap(), SupplierId::SupplierB);
        assert_eq!("a".parse::<SupplierId>().unwrap(), SupplierId::SupplierA);
    }

    #[test]
    fn unknown_supplier_is_rejected() {
        let err = "supplierZ".parse::<SupplierId>().unwrap_err();
        assert!(matches!(err, SearchError::UnknownSupplier(name) if name == "supplierZ"));
    }

    #[test]
    fn appends_encoded_query() {
        let catalog = SupplierCatalog::default();
        let profile = catalog.profile(SupplierId::SupplierA).unwrap();
        let url = profile.search_url("ecran iphone 11").unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.supplier-a.example/recherche?controller=search&s=ecran%20iphone%2011"
        );
    }

    #[test]
    fn substitutes_query_placeholder() {
        let catalog = SupplierCatalog::default();
        let profile = catalog.profile(SupplierId::SupplierB).unwrap();
        let url = profile.search_url("écran & vitre").unwrap();
        assert_eq!(
            url.as_str(),
            "https://shop.supplier-b.example/catalogsearch/result/?q=%C3%A9cran%20%26%20vitre"
        );
    }

    #[test]
    fn domain_predicate_accepts_subdomains_only() {
        let catalog = SupplierCatalog::default();
        let profile = catalog.profile(SupplierId::SupplierA).unwrap();
        assert!(profile.matches_url("https://www.supplier-a.example/produit/1"));
        assert!(profile.matches_url("https://supplier-a.example/"));
        assert!(!profile.matches_url("https://notsupplier-a.example/"));
        assert!(!profile.matches_url("about:blank"));
        assert!(!profile.matches_url("not a url"));
    }

    #[test]
    fn origin_strips_path_and_query() {
        let catalog = SupplierCatalog::default();
        let profile = catalog.profile(SupplierId::SupplierB).unwrap();
        assert_eq!(profile.origin().unwrap().as_str(), "https://shop.supplier-b.example/");
    }

    #[test]
    fn partial_catalog_is_completed_with_defaults() {
        let mut profiles = BTreeMap::new();
        let mut custom = SupplierCatalog::default()
            .profile(SupplierId::SupplierA)
            .cloned()
            .unwrap();
        custom.label = "Custom".to_string();
        profiles.insert(SupplierId::SupplierA, custom);

        let catalog = SupplierCatalog::new(profiles).with_defaults();
        assert_eq!(catalog.profile(SupplierId::SupplierA).unwrap().label, "Custom");
        assert!(catalog.profile(SupplierId::SupplierB).is_some());
    }
}
