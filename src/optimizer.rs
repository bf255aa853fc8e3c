//! Platform-specific listing copy and pricing.
//!
//! Everything here is a pure function of the canonical listing: the adapters
//! call in before touching a page so the browser only ever sees final values.

use crate::models::{Condition, ListingSnapshot, Platform};
use serde::Serialize;

/// Fixed rates against USD.
const EXCHANGE_RATES: [(&str, f64); 3] = [("USD", 1.0), ("EUR", 0.92), ("SEK", 10.5)];

const GRAILED_BOILERPLATE_TAGS: &[&str] = &["streetwear", "designer", "vintage"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizedContent {
    pub title: String,
    pub description: String,
    pub price: i64,
    pub currency: &'static str,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlatformPrice {
    pub price: i64,
    pub currency: &'static str,
    pub net_earnings: i64,
}

fn rate(currency: &str) -> f64 {
    EXCHANGE_RATES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(currency.trim()))
        .map(|(_, rate)| *rate)
        .unwrap_or(1.0)
}

/// Converts through USD and rounds to the nearest whole unit. Unknown
/// currency codes convert at 1.
pub fn convert_price(amount: f64, from: &str, to: &str) -> i64 {
    let usd = amount / rate(from);
    (usd * rate(to)).round() as i64
}

pub fn platform_price(base_price: f64, base_currency: &str, platform: Platform) -> PlatformPrice {
    let currency = platform.currency();
    let price = convert_price(base_price, base_currency, currency);
    let fee = price as f64 * (platform.fee_percentage() / 100.0);
    PlatformPrice {
        price,
        currency,
        net_earnings: (price as f64 - fee).round() as i64,
    }
}

pub fn title_limit(platform: Platform) -> usize {
    match platform {
        Platform::Grailed => 60,
        Platform::Vinted | Platform::Plick => 50,
    }
}

pub fn tag_limit(platform: Platform) -> usize {
    match platform {
        Platform::Grailed => 10,
        Platform::Vinted | Platform::Plick => 5,
    }
}

/// Condition phrase used in listing copy. Unknown codes get the platform's
/// most common label, the one `good` maps to.
pub fn condition_label(platform: Platform, condition: &str) -> &'static str {
    let condition = Condition::parse(condition).unwrap_or(Condition::Good);
    match (platform, condition) {
        (Platform::Grailed, Condition::New) => "New/Never Worn",
        (Platform::Grailed, Condition::LikeNew) => "Gently Used",
        (Platform::Grailed, Condition::Good) => "Used",
        (Platform::Grailed, Condition::Fair) => "Very Worn",
        (Platform::Grailed, Condition::Poor) => "Not Specified",
        (Platform::Vinted, Condition::New) => "New with tags",
        (Platform::Vinted, Condition::LikeNew) => "New without tags",
        (Platform::Vinted, Condition::Good) => "Very good",
        (Platform::Vinted, Condition::Fair) => "Good",
        (Platform::Vinted, Condition::Poor) => "Satisfactory",
        (Platform::Plick, Condition::New) => "Nytt med lappar",
        (Platform::Plick, Condition::LikeNew) => "Nyskick",
        (Platform::Plick, Condition::Good) => "Bra skick",
        (Platform::Plick, Condition::Fair) => "Okej skick",
        (Platform::Plick, Condition::Poor) => "Slitet",
    }
}

pub fn optimize(platform: Platform, listing: &ListingSnapshot) -> OptimizedContent {
    let brand = listing.brand.as_deref().unwrap_or("").trim();
    let size = listing.size.as_deref().unwrap_or("").trim();
    let category = listing.category.as_deref().unwrap_or("").trim();
    let description = listing.description.as_deref().unwrap_or("");
    let priced = platform_price(listing.base_price, &listing.currency, platform);

    OptimizedContent {
        title: build_title(platform, brand, &listing.title),
        description: build_description(
            platform,
            description,
            brand,
            size,
            condition_label(platform, &listing.condition),
        ),
        price: priced.price,
        currency: priced.currency,
        tags: build_tags(
            platform,
            brand,
            category,
            listing.tags.as_deref().unwrap_or_default(),
        ),
    }
}

fn build_title(platform: Platform, brand: &str, title: &str) -> String {
    let combined = format!("{brand} {}", title.trim());
    truncate_chars(combined.trim(), title_limit(platform))
}

fn build_description(
    platform: Platform,
    description: &str,
    brand: &str,
    size: &str,
    condition: &str,
) -> String {
    match platform {
        Platform::Grailed => format!(
            "{description}\n\nCondition: {condition}\nSize: {size}\nBrand: {brand}\n\nShips fast. Open to offers."
        ),
        Platform::Vinted => format!(
            "{description}\n\n📏 Size: {size}\n🏷️ Brand: {brand}\n✨ Condition: {condition}\n\nFast shipping! Feel free to make an offer or bundle for discount."
        ),
        Platform::Plick => format!(
            "{description}\n\nStorlek: {size}\nMärke: {brand}\nSkick: {condition}\n\nSnabb leverans! Skicka meddelande för frågor."
        ),
    }
}

fn build_tags(platform: Platform, brand: &str, category: &str, user_tags: &[String]) -> Vec<String> {
    let boilerplate: &[&str] = match platform {
        Platform::Grailed => GRAILED_BOILERPLATE_TAGS,
        Platform::Vinted | Platform::Plick => &[],
    };
    [brand.to_lowercase(), category.to_lowercase()]
        .into_iter()
        .chain(user_tags.iter().cloned())
        .chain(boilerplate.iter().map(|tag| tag.to_string()))
        .filter(|tag| !tag.trim().is_empty())
        .take(tag_limit(platform))
        .collect()
}

fn truncate_chars(value: &str, limit: usize) -> String {
    value.chars().take(limit).collect()
}
