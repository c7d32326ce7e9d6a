use super::*;
use crate::types::{ProductSummary, SortMode, MAX_RESULTS};

const SHAPE: PageShape = PageShape {
    limit: MAX_RESULTS,
    sort: SortMode::Rank,
};

/// Helper function to create a test page
fn create_test_page(title: &str) -> SearchResultPage {
    SearchResultPage {
        items: vec![ProductSummary {
            product_id: 1,
            domain: "shop.example".to_string(),
            title: title.to_string(),
            price: Some("19.99".to_string()),
            image_url: Some("https://cdn.example/1.jpg".to_string()),
        }],
        total: 1,
        has_more: false,
        next_cursor: None,
        sort: SortMode::Rank,
    }
}

fn key(query: &str) -> CacheKey {
    CacheKey::new(query, None)
}

#[tokio::test(start_paused = true)]
async fn test_get_returns_stored_page_within_ttl() {
    let cache = SearchCache::new();
    let page = create_test_page("Field Watch");

    cache.set(key("watch"), SHAPE, page.clone()).await;
    tokio::time::advance(Duration::from_secs(299)).await;

    assert_eq!(cache.get(&key("watch"), SHAPE).await, Some(page));
}

#[tokio::test(start_paused = true)]
async fn test_get_expires_after_ttl() {
    let cache = SearchCache::with_config(CacheConfig {
        ttl: Duration::from_secs(60),
        max_size: 10,
    });

    cache.set(key("watch"), SHAPE, create_test_page("Field Watch")).await;
    tokio::time::advance(Duration::from_secs(61)).await;

    assert_eq!(cache.get(&key("watch"), SHAPE).await, None);
    // The stale entry was dropped on read
    assert_eq!(cache.len().await, 0);
}

#[tokio::test]
async fn test_eviction_drops_oldest_stored() {
    let cache = SearchCache::with_config(CacheConfig {
        ttl: Duration::from_secs(300),
        max_size: 3,
    });

    for q in ["a1", "b2", "c3", "d4"] {
        cache.set(key(q), SHAPE, create_test_page(q)).await;
    }

    assert_eq!(cache.len().await, 3);
    assert_eq!(cache.get(&key("a1"), SHAPE).await, None);
    assert!(cache.get(&key("d4"), SHAPE).await.is_some());
}

#[tokio::test]
async fn test_reads_do_not_refresh_recency() {
    let cache = SearchCache::with_config(CacheConfig {
        ttl: Duration::from_secs(300),
        max_size: 2,
    });

    cache.set(key("first"), SHAPE, create_test_page("first")).await;
    cache.set(key("second"), SHAPE, create_test_page("second")).await;
    assert!(cache.get(&key("first"), SHAPE).await.is_some());

    cache.set(key("third"), SHAPE, create_test_page("third")).await;

    assert_eq!(cache.get(&key("first"), SHAPE).await, None);
    assert!(cache.get(&key("second"), SHAPE).await.is_some());
}

#[tokio::test]
async fn test_overwrite_refreshes_recency() {
    let cache = SearchCache::with_config(CacheConfig {
        ttl: Duration::from_secs(300),
        max_size: 2,
    });

    cache.set(key("first"), SHAPE, create_test_page("first")).await;
    cache.set(key("second"), SHAPE, create_test_page("second")).await;
    cache.set(key("first"), SHAPE, create_test_page("first again")).await;
    cache.set(key("third"), SHAPE, create_test_page("third")).await;

    assert_eq!(cache.get(&key("second"), SHAPE).await, None);
    let first = cache.get(&key("first"), SHAPE).await.unwrap();
    assert_eq!(first.items[0].title, "first again");
}

#[tokio::test(start_paused = true)]
async fn test_set_purges_expired_entries_first() {
    let cache = SearchCache::with_config(CacheConfig {
        ttl: Duration::from_secs(10),
        max_size: 5,
    });

    cache.set(key("old"), SHAPE, create_test_page("old")).await;
    tokio::time::advance(Duration::from_secs(11)).await;
    cache.set(key("new"), SHAPE, create_test_page("new")).await;

    assert_eq!(cache.len().await, 1);
    let stats = cache.stats().await;
    assert_eq!(stats.evictions, 1);
}

#[tokio::test]
async fn test_domain_is_part_of_the_key() {
    let cache = SearchCache::new();
    cache
        .set(CacheKey::new("watch", Some("shop.example")), SHAPE, create_test_page("scoped"))
        .await;

    assert!(cache.get(&CacheKey::new("watch", None), SHAPE).await.is_none());
    assert!(cache.get(&CacheKey::new(" watch ", Some("shop.example")), SHAPE).await.is_some());
}

#[tokio::test]
async fn test_clear_and_stats() {
    let cache = SearchCache::new();
    cache.set(key("watch"), SHAPE, create_test_page("watch")).await;

    assert!(cache.get(&key("watch"), SHAPE).await.is_some());
    assert!(cache.get(&key("boots"), SHAPE).await.is_none());

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.insertions, 1);
    assert_eq!(stats.size, 1);
    assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);

    cache.clear().await;
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_page_of_another_shape_is_a_miss() {
    let cache = SearchCache::new();
    cache.set(key("watch"), SHAPE, create_test_page("watch")).await;

    let smaller = PageShape { limit: 5, ..SHAPE };
    let recent = PageShape {
        sort: SortMode::Recent,
        ..SHAPE
    };
    assert!(cache.get(&key("watch"), smaller).await.is_none());
    assert!(cache.get(&key("watch"), recent).await.is_none());

    // The mismatched lookups leave the stored page in place
    assert_eq!(cache.len().await, 1);
    assert!(cache.get(&key("watch"), SHAPE).await.is_some());

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.evictions, 0);
}

#[tokio::test(start_paused = true)]
async fn test_peek_leaves_counters_alone() {
    let cache = SearchCache::with_config(CacheConfig {
        ttl: Duration::from_secs(60),
        max_size: 10,
    });
    cache.set(key("watch"), SHAPE, create_test_page("watch")).await;

    assert!(cache.peek(&key("watch"), SHAPE).await.is_some());
    assert!(cache.peek(&key("boots"), SHAPE).await.is_none());
    assert!(cache.peek(&key("watch"), PageShape { limit: 5, ..SHAPE }).await.is_none());

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(cache.peek(&key("watch"), SHAPE).await.is_none());
    assert_eq!(cache.len().await, 1);

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.evictions, 0);
}
