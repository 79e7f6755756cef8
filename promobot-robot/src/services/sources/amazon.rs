//! Amazon search-results page extraction
//!
//! No public API: the HTML search page is fetched and each `data-asin` result
//! block is matched with regular expressions. A failed request or a page that
//! yields nothing (markup change, captcha) falls back to a small sample set.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

use super::{commission_percent, parse_brl, FetchError, ListingSource};
use crate::models::{CandidateListing, Category, Platform};
use crate::services::RateLimiter;

static ASIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"data-asin="([A-Z0-9]{10})""#).unwrap());
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<h2[^>]*>.*?<span[^>]*>([^<]+)</span>"#).unwrap());
static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<span class="a-price"[^>]*>\s*<span class="a-offscreen">([^<]+)</span>"#).unwrap());
static LIST_PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span class="a-price a-text-price"[^>]*>\s*<span class="a-offscreen">([^<]+)</span>"#).unwrap()
});
static RATING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"class="a-icon-alt">\s*([\d]+[,.]?\d*) de 5"#).unwrap());
static REVIEWS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<span class="a-size-base s-underline-text">([\d.]+)</span>"#).unwrap());
static IMAGE_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"<img[^>]*class="s-image"[^>]*>"#).unwrap());
static SRC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bsrc="([^"]+)""#).unwrap());

/// Search-page scraper (`/s?k=`)
pub struct AmazonSource {
    http_client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
}

impl AmazonSource {
    pub fn new(
        base_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
        })
    }

    async fn fetch_page(&self, category: Category) -> Result<String, FetchError> {
        self.rate_limiter.wait().await;

        let response = self
            .http_client
            .get(format!("{}/s", self.base_url))
            .query(&[("k", category.search_query())])
            .header("Accept-Language", "pt-BR,pt;q=0.9")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                platform: Platform::Amazon,
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    /// Extract listings from a search-results page
    pub fn parse_results(&self, html: &str, category: Category, limit: usize) -> Vec<CandidateListing> {
        let starts: Vec<(usize, &str)> = ASIN_RE
            .captures_iter(html)
            .filter_map(|c| Some((c.get(0)?.start(), c.get(1)?.as_str())))
            .collect();

        let mut listings = Vec::new();
        for (i, (start, asin)) in starts.iter().enumerate() {
            if listings.len() >= limit {
                break;
            }
            let end = starts.get(i + 1).map(|(s, _)| *s).unwrap_or(html.len());
            if let Some(listing) = self.parse_block(&html[*start..end], asin, category) {
                listings.push(listing);
            }
        }
        listings
    }

    fn parse_block(&self, block: &str, asin: &str, category: Category) -> Option<CandidateListing> {
        let title = capture(&TITLE_RE, block).map(|t| html_unescape(t.trim()))?;
        let price = capture(&PRICE_RE, block).and_then(parse_brl)?;
        let original_price = capture(&LIST_PRICE_RE, block).and_then(parse_brl);
        let rating = capture(&RATING_RE, block).and_then(|r| r.replace(',', ".").parse().ok());
        let review_count = capture(&REVIEWS_RE, block)
            .and_then(|r| r.replace('.', "").parse().ok())
            .unwrap_or(0);
        let image_url = IMAGE_TAG_RE
            .find(block)
            .and_then(|tag| capture(&SRC_RE, tag.as_str()))
            .map(str::to_string);

        Some(CandidateListing {
            platform: Platform::Amazon,
            platform_id: asin.to_string(),
            title,
            price,
            original_price,
            rating,
            review_count,
            sales_count: 0,
            product_url: format!("{}/dp/{}", self.base_url, asin),
            image_url,
            seller: None,
            commission_percent: commission_percent(Platform::Amazon, category),
            affiliate_link: None,
        })
    }

    fn samples(&self, category: Category, limit: usize) -> Vec<CandidateListing> {
        let noun = sample_noun(category);
        SAMPLE_PRICES
            .iter()
            .enumerate()
            .take(limit)
            .map(|(i, (price, original, rating, reviews))| {
                let asin = format!("SAMPLE{:02}{}", i + 1, &category.as_str()[..2].to_uppercase());
                CandidateListing {
                    platform: Platform::Amazon,
                    platform_id: asin.clone(),
                    title: format!("{} Modelo {}", noun, i + 1),
                    price: *price,
                    original_price: Some(*original),
                    rating: Some(*rating),
                    review_count: *reviews,
                    sales_count: 0,
                    product_url: format!("{}/dp/{}", self.base_url, asin),
                    image_url: None,
                    seller: Some("Amazon.com.br".to_string()),
                    commission_percent: commission_percent(Platform::Amazon, category),
                    affiliate_link: None,
                }
            })
            .collect()
    }
}

#[async_trait]
impl ListingSource for AmazonSource {
    fn platform(&self) -> Platform {
        Platform::Amazon
    }

    async fn search(&self, category: Category, limit: usize) -> Result<Vec<CandidateListing>, FetchError> {
        let listings = match self.fetch_page(category).await {
            Ok(html) => self.parse_results(&html, category, limit),
            Err(e) => {
                tracing::warn!(%category, error = %e, "Amazon search failed, using samples");
                return Ok(self.samples(category, limit));
            }
        };

        if listings.is_empty() {
            tracing::warn!(%category, "No listings extracted from Amazon page, using samples");
            return Ok(self.samples(category, limit));
        }

        tracing::info!(%category, count = listings.len(), "Amazon listings extracted");
        Ok(listings)
    }
}

/// (price, list price, rating, reviews)
const SAMPLE_PRICES: &[(f64, f64, f64, i64)] = &[
    (129.90, 199.90, 4.6, 2310),
    (89.90, 119.90, 4.4, 870),
    (249.00, 349.00, 4.7, 5120),
];

fn sample_noun(category: Category) -> &'static str {
    match category {
        Category::Electronics => "Fone de Ouvido Bluetooth",
        Category::Home => "Jogo de Panelas Antiaderente",
        Category::Fashion => "Mochila Casual Impermeável",
        Category::Beauty => "Kit Skincare Facial",
        Category::Sports => "Garrafa Térmica Esportiva",
        Category::Books => "Box Livros Clássicos",
        Category::Games => "Controle Sem Fio para Console",
        Category::Toys => "Blocos de Montar Criativos",
        Category::Health => "Balança Digital Corporal",
        Category::General => "Organizador Multiuso",
    }
}

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn html_unescape(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<div data-asin="" class="s-result-item">header</div>
<div data-asin="B0ABCDEF12" class="s-result-item">
  <img class="s-image" src="https://m.media-amazon.com/images/I/a.jpg" alt="">
  <h2 class="a-size-mini"><a href="/dp/B0ABCDEF12"><span class="a-size-base-plus a-text-normal">Fone Bluetooth JBL &amp; Case</span></a></h2>
  <span class="a-icon-alt">4,6 de 5 estrelas</span>
  <span class="a-size-base s-underline-text">1.234</span>
  <span class="a-price" data-a-size="xl"><span class="a-offscreen">R$&nbsp;199,90</span></span>
  <span class="a-price a-text-price" data-a-strike="true"><span class="a-offscreen">R$&nbsp;299,00</span></span>
</div>
<div data-asin="B0ZZZZZZZ9" class="s-result-item">
  <h2><span>Sem preço</span></h2>
</div>
"#;

    fn source() -> AmazonSource {
        AmazonSource::new(
            "https://www.amazon.com.br",
            "test",
            Duration::from_secs(1),
            Arc::new(RateLimiter::new(Duration::ZERO, 100, Duration::ZERO)),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_result_block() {
        let listings = source().parse_results(PAGE, Category::Electronics, 10);
        // The block without a price is skipped
        assert_eq!(listings.len(), 1);

        let l = &listings[0];
        assert_eq!(l.platform_id, "B0ABCDEF12");
        assert_eq!(l.title, "Fone Bluetooth JBL & Case");
        assert_eq!(l.price, 199.9);
        assert_eq!(l.original_price, Some(299.0));
        assert_eq!(l.rating, Some(4.6));
        assert_eq!(l.review_count, 1234);
        assert_eq!(l.image_url.as_deref(), Some("https://m.media-amazon.com/images/I/a.jpg"));
        assert_eq!(l.product_url, "https://www.amazon.com.br/dp/B0ABCDEF12");
    }

    #[test]
    fn test_samples_bounded_by_limit() {
        let samples = source().samples(Category::Home, 2);
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.platform == Platform::Amazon));
        assert_ne!(samples[0].platform_id, samples[1].platform_id);
    }
}
