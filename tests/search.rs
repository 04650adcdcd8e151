//! End-to-end searches against in-memory tabs serving fixture pages

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parts_search::{
    Availability, ExtractorSet, MemoryTabs, PageAgent, SearchOrchestrator, SearchRequest,
    SupplierCatalog, SupplierId, TabRegistry, Timings, merge_responses, sort_by_price,
};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

const SUPPLIER_A_PAGE: &str = include_str!("fixtures/supplierA.html");
const SUPPLIER_B_PAGE: &str = include_str!("fixtures/supplierB.html");

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn memory_tabs(catalog: &SupplierCatalog) -> MemoryTabs {
    let agent = PageAgent::new(Arc::new(ExtractorSet::from_catalog(catalog).unwrap()));
    let tabs = MemoryTabs::new(catalog.clone(), agent);
    tabs.serve(SupplierId::SupplierA, SUPPLIER_A_PAGE);
    tabs.serve(SupplierId::SupplierB, SUPPLIER_B_PAGE);
    tabs
}

fn orchestrator(tabs: Arc<MemoryTabs>, catalog: SupplierCatalog) -> SearchOrchestrator {
    SearchOrchestrator::new(
        tabs,
        Arc::new(TabRegistry::new()),
        Arc::new(catalog),
        Timings::default(),
    )
}

fn setup(configure: impl FnOnce(MemoryTabs) -> MemoryTabs) -> (Arc<MemoryTabs>, SearchOrchestrator) {
    init_tracing();
    let catalog = SupplierCatalog::default();
    let tabs = Arc::new(configure(memory_tabs(&catalog)));
    let orchestrator = orchestrator(tabs.clone(), catalog);
    (tabs, orchestrator)
}

#[tokio::test(start_paused = true)]
async fn duplicate_cards_merge_into_two_records() {
    let (_tabs, orchestrator) = setup(|tabs| tabs);

    let response = orchestrator
        .handle(SearchRequest {
            supplier: "supplierA".into(),
            query: "ecran iphone 11".into(),
        })
        .await;

    assert_eq!(response.error, None);
    let names: Vec<_> = response.products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Ecran iPhone 11 Noir", "Batterie iPhone 11"]);
    assert!(response.products.iter().all(|p| p.supplier_label == "SupplierA"));

    let screen = &response.products[0];
    assert_eq!(screen.price, 54.90);
    assert_eq!(screen.reference, "ECR-IP11-BK");
    assert_eq!(
        screen.source_url,
        "https://www.supplier-a.example/produit/101-ecran-iphone-11-noir.html"
    );
    assert_eq!(screen.image_url, "https://www.supplier-a.example/img/p/101-home.jpg");

    let battery = &response.products[1];
    assert_eq!(battery.price, 19.90);
    assert_eq!(battery.availability, Availability::OutOfStock);
    assert_eq!(battery.image_url, "https://www.supplier-a.example/img/p/103-home.jpg");
}

#[tokio::test(start_paused = true)]
async fn unreachable_agent_after_reinstall_returns_empty_with_diagnostic() {
    let (tabs, orchestrator) =
        setup(|tabs| tabs.with_auto_agent(false).with_broken_injection());

    let response = orchestrator.search(SupplierId::SupplierA, "ecran iphone 11").await;

    assert!(response.products.is_empty());
    let error = response.error.expect("diagnostic");
    assert!(!error.is_empty());
    assert!(error.starts_with("supplierA"));
    assert_eq!(tabs.stats().injections, 1);
}

#[tokio::test(start_paused = true)]
async fn missing_load_signal_still_extracts_within_bound() {
    let (_tabs, orchestrator) = setup(|tabs| tabs.with_load_events(false));
    let timings = Timings::default();

    let start = Instant::now();
    let response = orchestrator.search(SupplierId::SupplierA, "ecran iphone 11").await;
    let elapsed = start.elapsed();

    assert_eq!(response.products.len(), 2);
    assert!(elapsed >= timings.load_ceiling);
    assert!(elapsed <= timings.load_ceiling + timings.quiet_period + timings.agent_timeout);
}

#[tokio::test(start_paused = true)]
async fn settled_search_takes_only_the_quiet_period() {
    let (_tabs, orchestrator) = setup(|tabs| tabs);

    let start = Instant::now();
    orchestrator.search(SupplierId::SupplierB, "lcd").await;
    let elapsed = start.elapsed();

    assert!(elapsed >= Timings::default().quiet_period);
    assert!(elapsed < Timings::default().quiet_period + Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn resident_agent_answers_without_reinstall() {
    let (tabs, orchestrator) = setup(|tabs| tabs);
    let timings = Timings::default();

    let start = Instant::now();
    let first = orchestrator.search(SupplierId::SupplierA, "ecran").await;
    let second = orchestrator.search(SupplierId::SupplierA, "batterie").await;
    let elapsed = start.elapsed();

    assert_eq!(first.products.len(), 2);
    assert_eq!(second.products.len(), 2);
    assert_eq!(tabs.stats().injections, 0);
    assert!(elapsed < (timings.quiet_period + timings.install_settle) * 2);
}

#[tokio::test(start_paused = true)]
async fn second_search_navigates_the_same_tab() {
    let (tabs, orchestrator) = setup(|tabs| tabs);

    orchestrator.search(SupplierId::SupplierB, "lcd iphone 11").await;
    let tab = orchestrator.registry().get(SupplierId::SupplierB).unwrap();
    let response = orchestrator.search(SupplierId::SupplierB, "battery iphone 11").await;

    assert_eq!(response.products.len(), 2);
    assert_eq!(tabs.stats().tabs_created, 1);
    assert_eq!(tabs.stats().navigations, 1);
    assert_eq!(orchestrator.registry().get(SupplierId::SupplierB), Some(tab.clone()));

    let info = tabs.tabs().into_iter().find(|t| t.id == tab).unwrap();
    assert!(info.url.ends_with("q=battery%20iphone%2011"));
}

#[tokio::test(start_paused = true)]
async fn tab_the_user_left_on_the_supplier_is_reused() {
    let (tabs, orchestrator) = setup(|tabs| tabs);
    tabs.open_tab("https://mail.example/inbox");
    let existing = tabs.open_tab("https://www.supplier-a.example/panier");

    let response = orchestrator.search(SupplierId::SupplierA, "batterie").await;

    assert_eq!(response.products.len(), 2);
    assert_eq!(tabs.stats().tabs_created, 0);
    assert_eq!(orchestrator.registry().get(SupplierId::SupplierA), Some(existing));
}

#[tokio::test(start_paused = true)]
async fn each_search_gets_its_own_recovery_cycle() {
    let (tabs, orchestrator) = setup(|tabs| tabs.with_auto_agent(false));

    let first = orchestrator.search(SupplierId::SupplierA, "ecran").await;
    assert_eq!(first.products.len(), 2);
    assert_eq!(tabs.stats().injections, 1);

    // navigating for the next query wipes the injected agent again
    let second = orchestrator.search(SupplierId::SupplierA, "batterie").await;
    assert_eq!(second.products.len(), 2);
    assert_eq!(tabs.stats().injections, 2);
    assert_eq!(tabs.stats().tabs_created, 1);
}

#[tokio::test(start_paused = true)]
async fn refused_tab_creation_returns_empty_with_diagnostic() {
    let (_tabs, orchestrator) = setup(|tabs| tabs.refusing_tabs());

    let response = orchestrator.search(SupplierId::SupplierB, "lcd").await;

    assert!(response.products.is_empty());
    assert!(response.error.unwrap().contains("refused"));
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_supplier_never_touches_tabs() {
    let (tabs, orchestrator) = setup(|tabs| tabs);

    let response = orchestrator
        .handle(SearchRequest {
            supplier: "supplierQ".into(),
            query: "ecran".into(),
        })
        .await;

    assert!(response.products.is_empty());
    assert!(response.error.unwrap().contains("Unknown supplier"));
    assert!(tabs.tabs().is_empty());
    assert_eq!(tabs.stats(), Default::default());
}

#[tokio::test(start_paused = true)]
async fn sequential_searches_merge_and_sort_keeping_login_gated_items() {
    let (_tabs, orchestrator) = setup(|tabs| tabs);

    let mut responses = Vec::new();
    for supplier in SupplierId::ALL {
        responses.push(orchestrator.search(supplier, "iphone 11").await);
    }
    let (mut products, errors) = merge_responses(responses);
    sort_by_price(&mut products);

    assert!(errors.is_empty());
    let prices: Vec<_> = products.iter().map(|p| p.price).collect();
    assert_eq!(prices, vec![19.90, 24.50, 54.90, 0.0]);

    let gated = products.last().unwrap();
    assert_eq!(gated.name, "LCD iPhone 11 Incell");
    assert_eq!(gated.availability, Availability::NeedsLogin);
    assert_eq!(gated.supplier_label, "SupplierB");
    assert_eq!(gated.reference, "LCD-IP11-INC");
}

#[tokio::test(start_paused = true)]
async fn unreadable_agent_script_override_is_reported() {
    init_tracing();
    let defaults = SupplierCatalog::default();
    let mut profile = defaults.profile(SupplierId::SupplierA).cloned().unwrap();
    profile.agent_script = Some(PathBuf::from("/nonexistent/parts-search/agent.js"));
    let catalog = SupplierCatalog::new(BTreeMap::from([(SupplierId::SupplierA, profile)])).with_defaults();

    let tabs = Arc::new(memory_tabs(&catalog).with_auto_agent(false));
    let orchestrator = orchestrator(tabs.clone(), catalog);

    let response = orchestrator.search(SupplierId::SupplierA, "ecran").await;

    assert!(response.products.is_empty());
    assert!(response.error.unwrap().contains("Agent install failed"));
    assert_eq!(tabs.stats().injections, 0);
}
