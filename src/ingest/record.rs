//! Typed crawl records.
//!
//! Records arrive as JSON objects tagged by `type`. Field names follow the
//! crate's vocabulary; the crawler's own names are accepted as aliases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

/// Highest accepted star rating.
pub const MAX_RATING: i64 = 5;

/// One record emitted by the crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlRecord {
    Book(BookRecord),
    Category(CategoryRecord),
    Quote(QuoteRecord),
    Author(AuthorRecord),
}

/// A catalog entry observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    /// Natural key.
    #[serde(alias = "upc")]
    pub external_id: String,

    #[serde(default, alias = "genre")]
    pub category: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "description")]
    pub summary: Option<String>,
    #[serde(default, alias = "thumbnail")]
    pub image_ref: Option<String>,
    #[serde(default, alias = "link")]
    pub source_link: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub availability: bool,

    #[serde(default)]
    pub rating: Option<i64>,
    /// Minor currency units.
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default, alias = "stock")]
    pub stock_level: Option<i64>,
    /// Minor currency units.
    #[serde(default, alias = "tax")]
    pub tax_amount: Option<i64>,
    #[serde(default, alias = "reviews")]
    pub review_count: Option<i64>,

    #[serde(default = "Utc::now", alias = "scraped_at")]
    pub observed_at: DateTime<Utc>,
}

/// A category label seen during the crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    #[serde(alias = "genre", alias = "name")]
    pub label: String,
}

/// A quote, keyed on content and author slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRecord {
    #[serde(alias = "text")]
    pub content: String,
    pub author: String,
    /// A list, or a single comma-joined string.
    #[serde(default, deserialize_with = "tag_list")]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now", alias = "scraped_at")]
    pub observed_at: DateTime<Utc>,
}

/// An author profile, keyed on slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub slug: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

impl CrawlRecord {
    /// Entity name used in logs and metrics.
    #[must_use]
    pub const fn entity(&self) -> &'static str {
        match self {
            Self::Book(_) => "book",
            Self::Category(_) => "category",
            Self::Quote(_) => "quote",
            Self::Author(_) => "author",
        }
    }

    /// Natural key, rendered for logs.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Book(r) => r.external_id.clone(),
            Self::Category(r) => r.label.clone(),
            Self::Quote(r) => r.key(),
            Self::Author(r) => r.slug.clone(),
        }
    }

    /// Check the record before any write.
    ///
    /// # Errors
    ///
    /// Returns the first constraint the record violates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Book(r) => r.validate(),
            Self::Category(r) => r.validate(),
            Self::Quote(r) => r.validate(),
            Self::Author(r) => r.validate(),
        }
    }
}

impl BookRecord {
    /// A record with only its natural key set, observed now.
    #[must_use]
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            category: None,
            title: None,
            summary: None,
            image_ref: None,
            source_link: None,
            kind: None,
            availability: false,
            rating: None,
            price: None,
            stock_level: None,
            tax_amount: None,
            review_count: None,
            observed_at: Utc::now(),
        }
    }

    /// Check the natural key and numeric ranges.
    ///
    /// # Errors
    ///
    /// Returns the first constraint the record violates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_key("book", "external_id", &self.external_id)?;
        check_range("rating", self.rating, 0, MAX_RATING)?;
        for (field, value) in [
            ("price", self.price),
            ("stock_level", self.stock_level),
            ("tax_amount", self.tax_amount),
            ("review_count", self.review_count),
        ] {
            check_range(field, value, 0, i64::MAX)?;
        }
        Ok(())
    }
}

impl CategoryRecord {
    /// Check the label.
    ///
    /// # Errors
    ///
    /// Returns an error if the label is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_key("category", "label", &self.label)
    }
}

impl QuoteRecord {
    /// Both halves of the composite key.
    ///
    /// # Errors
    ///
    /// Returns an error if either half is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_key("quote", "content", &self.content)?;
        require_key("quote", "author", &self.author)
    }

    /// Tags as stored: comma-joined, `None` when there are none.
    #[must_use]
    pub fn joined_tags(&self) -> Option<String> {
        let tags: Vec<&str> = self
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        (!tags.is_empty()).then(|| tags.join(","))
    }

    fn key(&self) -> String {
        let mut preview: String = self.content.chars().take(40).collect();
        if preview.len() < self.content.len() {
            preview.push_str("...");
        }
        format!("{}: {preview}", self.author)
    }
}

impl AuthorRecord {
    /// Check the slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the slug is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_key("author", "slug", &self.slug)
    }
}

fn tag_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match Option::<Tags>::deserialize(deserializer)? {
        Some(Tags::Joined(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Tags::List(tags)) => tags,
        None => Vec::new(),
    })
}

fn require_key(
    entity: &'static str,
    field: &'static str,
    value: &str,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::missing_key(entity, field));
    }
    Ok(())
}

fn check_range(
    field: &'static str,
    value: Option<i64>,
    min: i64,
    max: i64,
) -> Result<(), ValidationError> {
    match value {
        Some(value) if value < min || value > max => Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        }),
        _ => Ok(()),
    }
}
