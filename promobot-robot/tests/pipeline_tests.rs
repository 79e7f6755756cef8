//! Fetch → enrich → upsert → select → deliver, end to end

mod helpers;

use chrono::Utc;
use std::sync::Arc;

use helpers::*;
use promobot_robot::db::products::{self, ProductFilter, TrackEvent, UpsertOutcome};
use promobot_robot::models::{Category, CommissionQuality, Platform, ProductDraft};
use promobot_robot::services::{FixedClock, ListingSource};

async fn all_products(pool: &sqlx::SqlitePool) -> Vec<promobot_robot::models::Product> {
    products::list_products(pool, &ProductFilter::default(), None, Some(100), products::DEFAULT_SORT)
        .await
        .unwrap()
        .docs
}

#[tokio::test]
async fn test_end_to_end_run() {
    let pool = memory_pool().await;
    let group = seed_group(&pool, "120363000000100@g.us", 10).await;
    seed_default_template(&pool, Category::Electronics, "{{title}} por {{price}}\n{{affiliateLink}}").await;

    let source: Arc<dyn ListingSource> = Arc::new(FakeSource::new(
        Platform::MercadoLivre,
        vec![
            // Below the price floor
            listing("MLB1", 5.0, 20.0),
            listing("MLB2", 100.0, 20.0),
            // Passes the gate but lands in the low band
            listing("MLB3", 100.0, 3.0),
        ],
    ));
    let transport = Arc::new(ScriptedTransport::new());
    let robot = build_orchestrator(
        &pool,
        vec![source],
        transport.clone(),
        Arc::new(FixedClock::new(at_hour(10))),
        test_config(),
    );

    // First run: catalogue filled, nothing approved yet
    let first = robot.run_once().await.unwrap();
    assert!(first.success);
    assert_eq!(first.counts.scraped, 3);
    assert_eq!(first.counts.sent, 0);

    let stored = all_products(&pool).await;
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|p| !p.is_approved));

    let mlb2 = products::find_by_natural_key(&pool, Platform::MercadoLivre, "MLB2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mlb2.commission_rate, 0.2);
    assert_eq!(mlb2.estimated_commission, 20.0);
    assert_eq!(mlb2.commission_quality, CommissionQuality::Excellent);
    assert_eq!(mlb2.discount, 25.0);
    assert_eq!(mlb2.discount_percentage, 20);

    let mlb3 = products::find_by_natural_key(&pool, Platform::MercadoLivre, "MLB3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mlb3.commission_quality, CommissionQuality::Low);

    for mut product in stored {
        product.approve("operator");
        products::save_product(&pool, &product).await.unwrap();
    }

    // Second run: listings refreshed in place, one product qualifies
    let second = robot.run_once().await.unwrap();
    assert!(second.success);
    assert_eq!(second.counts.sent, 1);
    assert_eq!(second.counts.succeeded, 1);
    assert_eq!(all_products(&pool).await.len(), 2, "Re-fetch must not duplicate products");

    let refreshed = products::get_product(&pool, mlb2.id).await.unwrap();
    assert!(refreshed.is_approved, "Upsert keeps the approval");
    assert_eq!(refreshed.approved_by.as_deref(), Some("operator"));

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat_id, group.whatsapp_id);
    assert!(sent[0].text.starts_with("Fone Bluetooth Modelo MLB2 por R$ 100,00"));
    assert!(sent[0].text.contains("https://produto.mercadolivre.com.br/MLB2"));
}

#[tokio::test]
async fn test_deactivated_product_survives_refetch() {
    let pool = memory_pool().await;
    seed_group(&pool, "120363000000200@g.us", 10).await;
    seed_default_template(&pool, Category::Electronics, "{{title}} por {{price}}").await;

    let source: Arc<dyn ListingSource> = Arc::new(FakeSource::new(
        Platform::MercadoLivre,
        vec![listing("MLB7", 150.0, 18.0)],
    ));
    let transport = Arc::new(ScriptedTransport::new());
    let robot = build_orchestrator(
        &pool,
        vec![source],
        transport.clone(),
        Arc::new(FixedClock::new(at_hour(11))),
        test_config(),
    );

    robot.run_once().await.unwrap();
    let mut product = products::find_by_natural_key(&pool, Platform::MercadoLivre, "MLB7")
        .await
        .unwrap()
        .unwrap();
    product.approve("operator");
    products::save_product(&pool, &product).await.unwrap();
    products::deactivate_product(&pool, product.id).await.unwrap();

    // The same listing comes back from the source
    let result = robot.run_once().await.unwrap();
    assert!(result.success);
    assert_eq!(result.counts.scraped, 1);
    assert_eq!(result.counts.sent, 0);
    assert!(transport.sent().is_empty());

    let after = products::get_product(&pool, product.id).await.unwrap();
    assert!(!after.is_active, "Re-fetch must not reactivate a deleted product");
    assert!(after.is_approved);
    assert!(after.scraped_at.is_some());
}

fn draft(platform_id: &str, price: f64) -> ProductDraft {
    ProductDraft {
        platform: Platform::Amazon,
        platform_id: platform_id.to_string(),
        title: "Cafeteira Expresso Automática".to_string(),
        description: None,
        category: Category::Home,
        price,
        original_price: Some(899.0),
        commission_rate: 0.08,
        product_url: format!("https://www.amazon.com.br/dp/{}", platform_id),
        affiliate_link: None,
        image_url: None,
        rating: Some(4.4),
        review_count: 31,
        sales_count: 0,
        seller: None,
    }
}

#[tokio::test]
async fn test_double_upsert_keeps_one_row() {
    let pool = memory_pool().await;

    let first = products::bulk_upsert(&pool, vec![draft("B0CAFE0001", 699.0)], Some(Utc::now())).await;
    assert_eq!(first.created, 1);

    let id = first.items[0].product_id.unwrap();
    products::track_event(&pool, id, TrackEvent::Click).await.unwrap();

    let second = products::bulk_upsert(&pool, vec![draft("B0CAFE0001", 649.0)], Some(Utc::now())).await;
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(second.items[0].outcome, UpsertOutcome::Updated);
    assert_eq!(second.items[0].product_id, Some(id));

    let stored = all_products(&pool).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].price, 649.0);
    assert_eq!(stored[0].estimated_commission, 51.92);
    assert_eq!(stored[0].clicks, 1, "Engagement survives a refresh");
}

#[tokio::test]
async fn test_bulk_upsert_continues_past_bad_items() {
    let pool = memory_pool().await;

    let mut bad = draft("B0CAFE0002", 100.0);
    bad.commission_rate = 7.0;
    let report = products::bulk_upsert(
        &pool,
        vec![draft("B0CAFE0003", 300.0), bad, draft("B0CAFE0004", 320.0)],
        Some(Utc::now()),
    )
    .await;

    assert_eq!(report.created, 2);
    assert_eq!(report.errored, 1);
    assert_eq!(report.items[1].outcome, UpsertOutcome::Errored);
    assert!(report.items[1].error.as_deref().unwrap().contains("commissionRate"));
    assert_eq!(all_products(&pool).await.len(), 2);
}

#[tokio::test]
async fn test_file_database_round_trip() {
    let (_dir, pool) = create_test_db().await;
    let product = seed_approved_product(&pool, "MLB900", 59.9, 0.11).await;

    let loaded = products::get_product(&pool, product.id).await.unwrap();
    assert_eq!(loaded.title, product.title);
    assert_eq!(loaded.commission_quality, CommissionQuality::Good);
    assert!(loaded.is_approved);
}
