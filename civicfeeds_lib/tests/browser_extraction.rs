mod common;

use std::collections::HashMap;
use std::sync::Mutex;

use civicfeeds_lib::civicfeeds_transport::TransportError;
use civicfeeds_lib::config::{AppConfig, BrowserSettings, DataDirs, OutputTarget};
use civicfeeds_lib::extract::{
    Extractor, PropertyDetailExtractor, SaleListingExtractor, DETAIL_COLUMNS, LISTING_COLUMNS,
};
use civicfeeds_lib::record::{Record, RecordSet};
use civicfeeds_lib::{CsvSink, ProjectLayout, ScrapeError, Sink};

use common::{detail_page, listing_page, FakeLauncher, FakeSite};

const ASSESSOR: &str = "https://assessor.test/PropertyAccess/";

fn listing_config(max_pages: u32) -> AppConfig {
    let yaml = format!(
        r#"
scrapers:
  property_sales:
    kind: sale_listings
    url: "{ASSESSOR}SaleSearch.aspx"
    output_file: property_sales.csv
    rate_limit_seconds: 0
    max_retries: 2
    timeout: 2
    backoff: {{ base_ms: 1, min_ms: 1, max_ms: 5, jitter: false }}
    max_pages: {max_pages}
"#
    );
    AppConfig::from_yaml_str(&yaml).unwrap()
}

fn pages(count: usize) -> Vec<String> {
    (1..=count).map(|p| listing_page(p, p * 10, 2)).collect()
}

// ============================================================================
// Rendered-table pagination
// ============================================================================

#[tokio::test]
async fn stops_after_last_page_link() {
    let launcher = FakeLauncher::new(FakeSite {
        listing_pages: pages(4),
        ..Default::default()
    });
    let config = listing_config(200);
    let source = config.source("property_sales").unwrap();

    let extractor = SaleListingExtractor::new(launcher.clone(), BrowserSettings::default());
    let set = extractor.extract(source).await.unwrap();

    assert_eq!(set.columns(), &LISTING_COLUMNS);
    assert_eq!(set.len(), 8);
    let addresses: Vec<_> = set
        .records()
        .iter()
        .map(|r| r.text("Address").unwrap().to_string())
        .collect();
    assert_eq!(addresses[0], "10 Holly St");
    assert_eq!(addresses[7], "41 Holly St");
    assert_eq!(launcher.launches(), 1);
    assert_eq!(launcher.quits(), 1);
}

#[tokio::test]
async fn page_cap_bounds_pagination() {
    let launcher = FakeLauncher::new(FakeSite {
        listing_pages: pages(6),
        ..Default::default()
    });
    let config = listing_config(3);
    let source = config.source("property_sales").unwrap();

    let extractor = SaleListingExtractor::new(launcher.clone(), BrowserSettings::default());
    let set = extractor.extract(source).await.unwrap();

    assert_eq!(set.len(), 6);
    assert_eq!(set.records()[5].text("Address"), Some("31 Holly St"));
    assert_eq!(launcher.quits(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_grid_is_a_render_timeout_and_browser_is_released() {
    let launcher = FakeLauncher::new(FakeSite {
        listing_pages: vec!["<p>Service unavailable</p>".to_string()],
        ..Default::default()
    });
    let config = listing_config(200);
    let source = config.source("property_sales").unwrap();

    let extractor = SaleListingExtractor::new(launcher.clone(), BrowserSettings::default());
    let err = extractor.extract(source).await.unwrap_err();

    assert!(matches!(
        err,
        ScrapeError::Transport(TransportError::RenderTimeout { .. })
    ));
    // one navigation per attempt
    assert_eq!(launcher.site.visits().len(), 2);
    assert_eq!(launcher.quits(), 1);
}

#[tokio::test]
async fn transient_read_error_on_later_page_is_retried() {
    let launcher = FakeLauncher::new(FakeSite {
        listing_pages: pages(4),
        read_failures: Mutex::new(HashMap::from([(2, 1)])),
        ..Default::default()
    });
    let config = listing_config(200);
    let source = config.source("property_sales").unwrap();

    let extractor = SaleListingExtractor::new(launcher.clone(), BrowserSettings::default());
    let set = extractor.extract(source).await.unwrap();

    assert_eq!(set.len(), 8);
    assert_eq!(set.records()[2].text("Address"), Some("20 Holly St"));
    assert_eq!(launcher.quits(), 1);
}

#[tokio::test]
async fn transient_click_error_is_retried() {
    let launcher = FakeLauncher::new(FakeSite {
        listing_pages: pages(3),
        click_failures: Mutex::new(HashMap::from([(3, 1)])),
        ..Default::default()
    });
    let config = listing_config(200);
    let source = config.source("property_sales").unwrap();

    let extractor = SaleListingExtractor::new(launcher.clone(), BrowserSettings::default());
    let set = extractor.extract(source).await.unwrap();

    assert_eq!(set.len(), 6);
}

#[tokio::test]
async fn later_page_failing_past_budget_fails_the_source() {
    let launcher = FakeLauncher::new(FakeSite {
        listing_pages: pages(4),
        read_failures: Mutex::new(HashMap::from([(3, 2)])),
        ..Default::default()
    });
    let config = listing_config(200);
    let source = config.source("property_sales").unwrap();

    let extractor = SaleListingExtractor::new(launcher.clone(), BrowserSettings::default());
    let err = extractor.extract(source).await.unwrap_err();

    assert!(matches!(
        err,
        ScrapeError::Transport(TransportError::Browser(_))
    ));
    assert_eq!(launcher.quits(), 1);
}

#[tokio::test]
async fn launch_failure_is_resource_acquisition() {
    let launcher = FakeLauncher::failing();
    let config = listing_config(200);
    let source = config.source("property_sales").unwrap();

    let extractor = SaleListingExtractor::new(launcher.clone(), BrowserSettings::default());
    let err = extractor.extract(source).await.unwrap_err();

    assert!(matches!(err, ScrapeError::ResourceAcquisition(_)));
    assert_eq!(launcher.launches(), 1);
    assert_eq!(launcher.quits(), 0);
}

// ============================================================================
// Property details worker pool
// ============================================================================

fn details_config(workers: usize) -> AppConfig {
    let yaml = format!(
        r#"
scrapers:
  property_details:
    kind: property_details
    url: "{ASSESSOR}"
    output_file: property_details.csv
    output_dir: interim
    rate_limit_seconds: 0
    max_retries: 1
    input_file: property_sales.csv
    workers: {workers}
"#
    );
    AppConfig::from_yaml_str(&yaml).unwrap()
}

fn write_listings(layout: &ProjectLayout, count: usize) {
    let mut listings = RecordSet::with_columns(&LISTING_COLUMNS);
    for n in 1..=count {
        listings.push(
            Record::new()
                .with("Assessor Link", format!("Property.aspx?prop_id={n}"))
                .with("Address", format!("{n} Holly St"))
                .with("Sale Date", "03/01/2021")
                .with("Sale Price", "$1"),
        );
    }
    let target = OutputTarget {
        dir: "raw".into(),
        file: "property_sales.csv".into(),
    };
    CsvSink::new(layout.clone()).write(&listings, &target).unwrap();
}

fn detail_site(count: usize, failing: Vec<String>) -> FakeSite {
    FakeSite {
        details: (1..=count)
            .map(|n| (format!("{ASSESSOR}Property.aspx?prop_id={n}"), detail_page(n)))
            .collect(),
        failing,
        ..Default::default()
    }
}

#[tokio::test]
async fn every_key_is_scraped_exactly_once_across_workers() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(tmp.path(), DataDirs::default());
    write_listings(&layout, 7);

    let launcher = FakeLauncher::new(detail_site(7, Vec::new()));
    let config = details_config(3);
    let source = config.source("property_details").unwrap();

    let extractor = PropertyDetailExtractor::new(
        launcher.clone(),
        BrowserSettings::default(),
        layout.clone(),
    );
    let set = extractor.extract(source).await.unwrap();

    assert_eq!(set.columns(), &DETAIL_COLUMNS);
    assert_eq!(set.len(), 7);
    assert_eq!(launcher.launches(), 3);
    assert_eq!(launcher.quits(), 3);

    let mut visits = launcher.site.visits();
    visits.sort();
    visits.dedup();
    assert_eq!(visits.len(), 7);

    // worker order: [1, 4, 7], [2, 5], [3, 6]
    let links: Vec<_> = set
        .records()
        .iter()
        .map(|r| r.text("Assessor Link").unwrap().to_string())
        .collect();
    let ids: Vec<_> = links
        .iter()
        .map(|l| l.trim_start_matches("Property.aspx?prop_id=").to_string())
        .collect();
    assert_eq!(ids, vec!["1", "4", "7", "2", "5", "3", "6"]);

    let first = &set.records()[0];
    assert_eq!(first.text("Unique ID"), Some("03/01/2021_sep_Property.aspx?prop_id=1"));
    assert_eq!(first.text("Neighborhood"), Some("Hood 1"));
    assert_eq!(first.text("Built Sq ft"), Some("1000"));
    assert_eq!(first.text("Bathrooms"), Some("1"));
    assert_eq!(first.text("Year Built"), Some("1901"));
}

#[tokio::test]
async fn failed_detail_page_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(tmp.path(), DataDirs::default());
    write_listings(&layout, 4);

    let broken = format!("{ASSESSOR}Property.aspx?prop_id=2");
    let launcher = FakeLauncher::new(detail_site(4, vec![broken]));
    let config = details_config(2);
    let source = config.source("property_details").unwrap();

    let extractor = PropertyDetailExtractor::new(
        launcher.clone(),
        BrowserSettings::default(),
        layout,
    );
    let set = extractor.extract(source).await.unwrap();

    assert_eq!(set.len(), 3);
    assert!(set
        .records()
        .iter()
        .all(|r| r.text("Assessor Link") != Some("Property.aspx?prop_id=2")));
    assert_eq!(launcher.quits(), 2);
}

#[tokio::test]
async fn every_detail_page_failing_is_exhausted() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(tmp.path(), DataDirs::default());
    write_listings(&layout, 3);

    let broken = (1..=3)
        .map(|n| format!("{ASSESSOR}Property.aspx?prop_id={n}"))
        .collect();
    let launcher = FakeLauncher::new(detail_site(3, broken));
    let config = details_config(2);
    let source = config.source("property_details").unwrap();

    let extractor =
        PropertyDetailExtractor::new(launcher.clone(), BrowserSettings::default(), layout);
    let err = extractor.extract(source).await.unwrap_err();

    match err {
        ScrapeError::Exhausted { failed, last } => {
            assert_eq!(failed, 3);
            assert!(last.contains("net::ERR_FAILED"));
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert_eq!(launcher.quits(), 2);
}

#[tokio::test]
async fn missing_listing_file_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(tmp.path(), DataDirs::default());
    let launcher = FakeLauncher::new(FakeSite::default());
    let config = details_config(2);
    let source = config.source("property_details").unwrap();

    let extractor =
        PropertyDetailExtractor::new(launcher.clone(), BrowserSettings::default(), layout);
    let err = extractor.extract(source).await.unwrap_err();

    assert!(matches!(err, ScrapeError::Sink(_)));
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn worker_launch_failure_aborts_the_source() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(tmp.path(), DataDirs::default());
    write_listings(&layout, 3);

    let launcher = FakeLauncher::failing();
    let config = details_config(2);
    let source = config.source("property_details").unwrap();

    let extractor =
        PropertyDetailExtractor::new(launcher.clone(), BrowserSettings::default(), layout);
    let err = extractor.extract(source).await.unwrap_err();
    assert!(matches!(err, ScrapeError::ResourceAcquisition(_)));
}
