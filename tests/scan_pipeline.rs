//! End-to-end scans over fixture HTML.

mod support;

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sitemend::application::scanner::ScanService;
use sitemend::domain::types::AssetStatus;

use support::{InMemoryRepos, StaticPageFetcher};

const PRODUCT_PAGE: &str = r#"<html><body>
  <img src="/images/mug.jpg" width="640" height="480">
  <img src="/images/mug-in-hand.jpg" alt="A hand holding the mug">
  <img src="/images/divider.png" role="presentation">
  <div style="background-image: url('/images/hero-bg.jpg')">promo</div>
</body></html>"#;

fn service(repos: &Arc<InMemoryRepos>, fetcher: Arc<StaticPageFetcher>) -> ScanService {
    ScanService::new(repos.clone(), repos.clone(), fetcher, support::cache())
}

#[tokio::test]
async fn scan_classifies_and_counts_images() {
    let repos = InMemoryRepos::new();
    let connection = repos.add_connection(Uuid::new_v4());
    repos.add_page(connection.id, "https://shop.example.com/products/mug", true);

    let fetcher = StaticPageFetcher::new();
    fetcher.serve("https://shop.example.com/products/mug", PRODUCT_PAGE);

    let scanner = service(&repos, fetcher);
    let outcome = scanner
        .scan_connection(connection.id, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.pages_scanned, 1);
    assert_eq!(outcome.pages_failed, 0);
    assert_eq!(outcome.images_found, 4);
    // only the bare <img> is missing alt text; the role=presentation image
    // and the css background are decorative
    assert_eq!(outcome.images_missing_alt, 1);
    assert!(!outcome.cancelled);

    let assets = repos.assets_for(connection.id);
    assert_eq!(assets.len(), 4);

    let mug = assets
        .iter()
        .find(|a| a.url.ends_with("/images/mug.jpg"))
        .unwrap();
    assert_eq!(mug.status, AssetStatus::NeedsAltText);
    assert_eq!(mug.width, Some(640));
    assert_eq!(mug.height, Some(480));

    let described = assets
        .iter()
        .find(|a| a.url.ends_with("/images/mug-in-hand.jpg"))
        .unwrap();
    assert_eq!(described.status, AssetStatus::Detected);
    assert!(described.has_alt_text);

    let divider = assets
        .iter()
        .find(|a| a.url.ends_with("/images/divider.png"))
        .unwrap();
    assert!(divider.is_decorative);
    assert_eq!(divider.status, AssetStatus::Detected);

    let background = assets
        .iter()
        .find(|a| a.url.ends_with("/images/hero-bg.jpg"))
        .unwrap();
    assert!(background.is_decorative);
}

#[tokio::test]
async fn one_broken_page_never_aborts_the_scan() {
    let repos = InMemoryRepos::new();
    let connection = repos.add_connection(Uuid::new_v4());
    repos.add_page(connection.id, "https://shop.example.com/a", true);
    repos.add_page(connection.id, "https://shop.example.com/b", true);
    repos.add_page(connection.id, "https://shop.example.com/c", true);

    let fetcher = StaticPageFetcher::new();
    fetcher.serve("https://shop.example.com/a", PRODUCT_PAGE);
    fetcher.fail("https://shop.example.com/b", 500);
    fetcher.serve("https://shop.example.com/c", PRODUCT_PAGE);

    let scanner = service(&repos, fetcher);
    let outcome = scanner
        .scan_connection(connection.id, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.pages_scanned, 2);
    assert_eq!(outcome.pages_failed, 1);
}

#[tokio::test]
async fn pages_not_crawled_ok_are_skipped() {
    let repos = InMemoryRepos::new();
    let connection = repos.add_connection(Uuid::new_v4());
    repos.add_page(connection.id, "https://shop.example.com/ok", true);
    repos.add_page(connection.id, "https://shop.example.com/broken", false);

    let fetcher = StaticPageFetcher::new();
    fetcher.serve("https://shop.example.com/ok", PRODUCT_PAGE);

    let scanner = service(&repos, fetcher);
    let outcome = scanner
        .scan_connection(connection.id, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.pages_scanned, 1);
    assert_eq!(outcome.pages_failed, 0);
}

#[tokio::test]
async fn rescan_never_demotes_an_optimized_asset() {
    let repos = InMemoryRepos::new();
    let connection = repos.add_connection(Uuid::new_v4());
    repos.add_page(connection.id, "https://shop.example.com/products/mug", true);

    // the asset was optimized in a previous run but the live page still
    // serves the old markup without alt text
    let optimized = repos
        .add_asset(connection.id, "https://shop.example.com/images/mug.jpg")
        .status(AssetStatus::Optimized)
        .build();

    let fetcher = StaticPageFetcher::new();
    fetcher.serve("https://shop.example.com/products/mug", PRODUCT_PAGE);

    let scanner = service(&repos, fetcher);
    scanner
        .scan_connection(connection.id, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    let after = repos.asset(optimized.id);
    assert_eq!(after.status, AssetStatus::Optimized);
    assert!(after.last_scanned_at >= optimized.last_scanned_at);
}

#[tokio::test]
async fn progress_is_reported_per_page() {
    let repos = InMemoryRepos::new();
    let connection = repos.add_connection(Uuid::new_v4());
    repos.add_page(connection.id, "https://shop.example.com/a", true);
    repos.add_page(connection.id, "https://shop.example.com/b", true);

    let fetcher = StaticPageFetcher::new();
    fetcher.serve("https://shop.example.com/a", PRODUCT_PAGE);
    fetcher.serve("https://shop.example.com/b", PRODUCT_PAGE);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let seen = Arc::clone(&seen);
        move |p: i16| seen.lock().unwrap().push(p)
    };

    let scanner = service(&repos, fetcher);
    scanner
        .scan_connection(connection.id, &CancellationToken::new(), sink)
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![50, 100]);
}

#[tokio::test]
async fn cancellation_stops_before_the_next_page() {
    let repos = InMemoryRepos::new();
    let connection = repos.add_connection(Uuid::new_v4());
    repos.add_page(connection.id, "https://shop.example.com/a", true);
    repos.add_page(connection.id, "https://shop.example.com/b", true);

    let fetcher = StaticPageFetcher::new();
    fetcher.serve("https://shop.example.com/a", PRODUCT_PAGE);
    fetcher.serve("https://shop.example.com/b", PRODUCT_PAGE);

    let token = CancellationToken::new();
    let sink = {
        let token = token.clone();
        // cancel after the first page's progress report
        move |_p: i16| token.cancel()
    };

    let scanner = service(&repos, fetcher);
    let outcome = scanner
        .scan_connection(connection.id, &token, sink)
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.pages_scanned, 1);
}
