//! Database fixtures and orchestrator wiring

use chrono::{NaiveDate, NaiveDateTime};
use promobot_common::config::AffiliateConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use promobot_robot::config::RobotConfig;
use promobot_robot::db::{groups, products, templates};
use promobot_robot::models::{
    AllowedHours, CandidateListing, Category, CommissionQuality, Group, GroupInput, Platform, Product, ProductDraft,
    Template, TemplateInput, TemplateVariable, VariableType,
};
use promobot_robot::services::{
    Clock, Enricher, ListingSource, MessageTransport, OrchestratorOptions, QualityGate, RobotDeps, RobotOrchestrator,
    SourceFetcher,
};

/// In-memory database with tables created
pub async fn memory_pool() -> SqlitePool {
    promobot_robot::db::init_memory_pool()
        .await
        .expect("Failed to create in-memory database")
}

/// File-backed database in a temp dir
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("promobot_test.db");
    let pool = promobot_robot::db::init_database_pool(&db_path)
        .await
        .expect("Failed to create test database");
    (temp_dir, pool)
}

/// 2026-03-10 at `hour`:30 local time
pub fn at_hour(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 10)
        .unwrap()
        .and_hms_opt(hour, 30, 0)
        .unwrap()
}

/// Mercado Livre listing with a descriptive title
pub fn listing(platform_id: &str, price: f64, commission_percent: f64) -> CandidateListing {
    CandidateListing {
        platform: Platform::MercadoLivre,
        platform_id: platform_id.to_string(),
        title: format!("Fone Bluetooth Modelo {}", platform_id),
        price,
        original_price: Some(price * 1.25),
        rating: Some(4.6),
        review_count: 120,
        sales_count: 500,
        product_url: format!("https://produto.mercadolivre.com.br/{}", platform_id),
        image_url: None,
        seller: Some("Loja Oficial".to_string()),
        commission_percent,
        affiliate_link: None,
    }
}

/// Robot config with no delays so runs finish fast
pub fn test_config() -> RobotConfig {
    RobotConfig {
        categories: vec![Category::Electronics],
        platforms: vec![Platform::MercadoLivre],
        quality_allow_list: vec![CommissionQuality::Excellent, CommissionQuality::Good],
        products_per_fetch: 10,
        max_products_per_run: 10,
        send_delay_ms: 0,
        max_send_attempts: 3,
        retry_base_delay_ms: 5,
    }
}

pub async fn seed_group(pool: &SqlitePool, whatsapp_id: &str, max_per_day: i64) -> Group {
    let group = Group::new(GroupInput {
        whatsapp_id: whatsapp_id.to_string(),
        name: format!("Ofertas {}", whatsapp_id),
        description: None,
        category: Category::Electronics,
        is_active: None,
        sending_enabled: None,
        max_messages_per_day: Some(max_per_day),
        allowed_hours: Some(AllowedHours { start: 8, end: 22 }),
        template_id: None,
    });
    groups::insert_group(pool, &group).await.expect("Failed to seed group");
    group
}

/// Active default template for `category`
pub async fn seed_default_template(pool: &SqlitePool, category: Category, content: &str) -> Template {
    let template = Template::new(TemplateInput {
        name: format!("Padrão {}", category),
        category,
        content: content.to_string(),
        variables: vec![
            TemplateVariable {
                name: "title".to_string(),
                var_type: VariableType::Text,
                required: true,
            },
            TemplateVariable {
                name: "price".to_string(),
                var_type: VariableType::Currency,
                required: true,
            },
        ],
        is_default: true,
        is_active: None,
    });
    templates::insert_template(pool, &template)
        .await
        .expect("Failed to seed template");
    template
}

/// Approved, active product with the given commission fraction
pub async fn seed_approved_product(pool: &SqlitePool, platform_id: &str, price: f64, rate: f64) -> Product {
    let draft = ProductDraft {
        platform: Platform::MercadoLivre,
        platform_id: platform_id.to_string(),
        title: format!("Smartwatch Esportivo {}", platform_id),
        description: None,
        category: Category::Electronics,
        price,
        original_price: None,
        commission_rate: rate,
        product_url: format!("https://produto.mercadolivre.com.br/{}", platform_id),
        affiliate_link: None,
        image_url: None,
        rating: Some(4.2),
        review_count: 10,
        sales_count: 50,
        seller: None,
    };
    let mut product = Product::from_draft(draft, None);
    product.approve("tester");
    products::insert_product(pool, &product)
        .await
        .expect("Failed to seed product");
    product
}

/// A Mercado Livre source with nothing to offer, so runs have no fetch errors
pub fn no_sources() -> Vec<Arc<dyn ListingSource>> {
    vec![Arc::new(super::FakeSource::new(Platform::MercadoLivre, Vec::new())) as Arc<dyn ListingSource>]
}

/// Orchestrator over the given collaborators with fast stop grace
pub fn build_orchestrator(
    pool: &SqlitePool,
    sources: Vec<Arc<dyn ListingSource>>,
    transport: Arc<dyn MessageTransport>,
    clock: Arc<dyn Clock>,
    config: RobotConfig,
) -> Arc<RobotOrchestrator> {
    let fetcher = sources
        .into_iter()
        .fold(SourceFetcher::new(AffiliateConfig::default()), |fetcher, source| {
            fetcher.with_source(source)
        });

    Arc::new(RobotOrchestrator::new(
        RobotDeps {
            db: pool.clone(),
            fetcher: Arc::new(fetcher),
            enricher: Enricher::new(QualityGate::default()),
            transport,
            clock,
        },
        config,
        OrchestratorOptions {
            history_capacity: 5,
            stop_grace: Duration::from_millis(20),
        },
    ))
}
