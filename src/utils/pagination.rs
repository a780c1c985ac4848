//! Paginated, filtered listing shared by the admin and catalog list endpoints.
//!
//! Every listable collection declares a [`ListSchema`] naming which query keys it
//! accepts, how each one is matched, and which fields a free-text `search` runs over.
//! Keys a schema does not declare are ignored.

use mongodb::bson::{doc, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::Collection;
use rocket::futures::TryStreamExt;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::utils::ApiError;

const DEFAULT_LIMIT: u64 = 10;
const MAX_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    /// Upper-case tokens; anything else is rejected.
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lte,
}

#[derive(Debug)]
pub struct FilterField {
    pub param: &'static str,
    pub field: &'static str,
    pub kind: FieldKind,
    pub op: FilterOp,
}

#[derive(Debug)]
pub struct SearchField {
    pub field: &'static str,
    pub kind: FieldKind,
}

#[derive(Debug)]
pub struct ListSchema {
    pub filters: &'static [FilterField],
    pub search: &'static [SearchField],
    /// Field `sort_order` applies to; lists fall back to newest first.
    pub sort_field: Option<&'static str>,
}

#[derive(Debug, Default, Clone, FromForm, Deserialize, JsonSchema)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub sort_order: Option<String>,

    #[field(name = "type")]
    #[serde(rename = "type")]
    pub car_type: Option<String>,
    pub fuel: Option<String>,
    pub transmission: Option<String>,
    pub seats: Option<String>,
    pub is_available: Option<String>,
    pub price_range: Option<String>,

    pub status: Option<String>,
    pub delivery_status: Option<String>,
    pub payment_status: Option<String>,
}

impl ListQuery {
    fn param(&self, name: &str) -> Option<&str> {
        let value = match name {
            "type" => self.car_type.as_deref(),
            "fuel" => self.fuel.as_deref(),
            "transmission" => self.transmission.as_deref(),
            "seats" => self.seats.as_deref(),
            "is_available" => self.is_available.as_deref(),
            "price_range" => self.price_range.as_deref(),
            "status" => self.status.as_deref(),
            "delivery_status" => self.delivery_status.as_deref(),
            "payment_status" => self.payment_status.as_deref(),
            _ => None,
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    /// Offset and limit, only when the caller asked for a page.
    pub fn paging(&self) -> Result<Option<(u64, u64)>, ApiError> {
        if self.page.is_none() && self.limit.is_none() {
            return Ok(None);
        }
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        // the driver sends skip as a signed 64-bit value
        let skip = (page - 1)
            .checked_mul(limit)
            .filter(|skip| i64::try_from(*skip).is_ok())
            .ok_or_else(|| ApiError::bad_request("page out of range"))?;
        Ok(Some((skip, limit)))
    }

    pub fn page_number(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct Page<T> {
    pub total: u64,
    pub page: u64,
    pub limit: Option<u64>,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total: self.total,
            page: self.page,
            limit: self.limit,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

fn parse_value(kind: FieldKind, param: &str, raw: &str) -> Result<Bson, ApiError> {
    match kind {
        FieldKind::Text => Ok(Bson::String(raw.to_string())),
        FieldKind::Number => raw
            .parse::<f64>()
            .map(Bson::Double)
            .map_err(|_| ApiError::bad_request(format!("'{}' must be a number", param))),
        FieldKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Bson::Boolean(true)),
            "false" => Ok(Bson::Boolean(false)),
            _ => Err(ApiError::bad_request(format!("'{}' must be true or false", param))),
        },
        FieldKind::Enum(allowed) => {
            let upper = raw.to_ascii_uppercase();
            if allowed.contains(&upper.as_str()) {
                Ok(Bson::String(upper))
            } else {
                Err(ApiError::bad_request(format!(
                    "'{}' must be one of {}",
                    param,
                    allowed.join(", ")
                )))
            }
        }
    }
}

fn search_clause(schema: &ListSchema, term: &str) -> Vec<Document> {
    let escaped = regex::escape(term);
    let number = term.parse::<f64>().ok();

    schema
        .search
        .iter()
        .filter_map(|field| match field.kind {
            FieldKind::Text | FieldKind::Enum(_) => Some(doc! {
                field.field: { "$regex": escaped.clone(), "$options": "i" }
            }),
            FieldKind::Number => number.map(|n| doc! { field.field: n }),
            FieldKind::Bool => None,
        })
        .collect()
}

/// Builds the match document for `query` on top of `base`.
pub fn build_filter(schema: &ListSchema, query: &ListQuery, base: Document) -> Result<Document, ApiError> {
    let mut filter = base;

    for field in schema.filters {
        let Some(raw) = query.param(field.param) else {
            continue;
        };
        let value = parse_value(field.kind, field.param, raw)?;
        match field.op {
            FilterOp::Eq => {
                filter.insert(field.field, value);
            }
            FilterOp::Lte => {
                filter.insert(field.field, doc! { "$lte": value });
            }
        }
    }

    if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let clauses = search_clause(schema, term);
        if !clauses.is_empty() {
            filter.insert("$or", clauses);
        }
    }

    Ok(filter)
}

pub fn sort_document(schema: &ListSchema, query: &ListQuery) -> Document {
    match (schema.sort_field, query.sort_order.as_deref()) {
        (Some(field), Some(order)) => {
            let direction = if order.eq_ignore_ascii_case("asc") { 1 } else { -1 };
            doc! { field: direction }
        }
        _ => doc! { "created_at": -1 },
    }
}

/// Runs a schema-driven listing against `collection`.
pub async fn paginate<T>(
    collection: &Collection<T>,
    schema: &ListSchema,
    query: &ListQuery,
    base: Document,
) -> Result<Page<T>, ApiError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let filter = build_filter(schema, query, base)?;
    let paging = query.paging()?;

    let mut options = FindOptions::builder().sort(sort_document(schema, query)).build();
    if let Some((skip, limit)) = paging {
        options.skip = Some(skip);
        options.limit = Some(limit as i64);
    }

    let total = collection.count_documents(filter.clone(), None).await?;
    let data: Vec<T> = collection.find(filter, options).await?.try_collect().await?;

    Ok(Page {
        total,
        page: query.page_number(),
        limit: paging.map(|(_, limit)| limit),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    static SCHEMA: ListSchema = ListSchema {
        filters: &[
            FilterField { param: "type", field: "type", kind: FieldKind::Enum(&["SUV", "SEDAN"]), op: FilterOp::Eq },
            FilterField { param: "seats", field: "seats", kind: FieldKind::Number, op: FilterOp::Eq },
            FilterField { param: "is_available", field: "is_available", kind: FieldKind::Bool, op: FilterOp::Eq },
            FilterField { param: "price_range", field: "price_per_day", kind: FieldKind::Number, op: FilterOp::Lte },
        ],
        search: &[
            SearchField { field: "model", kind: FieldKind::Text },
            SearchField { field: "price_per_day", kind: FieldKind::Number },
        ],
        sort_field: Some("price_per_day"),
    };

    #[test]
    fn no_page_or_limit_means_no_paging() {
        assert_eq!(ListQuery::default().paging().unwrap(), None);
    }

    #[test]
    fn page_alone_uses_default_limit() {
        let query = ListQuery { page: Some(3), ..Default::default() };
        assert_eq!(query.paging().unwrap(), Some((20, 10)));
    }

    #[test]
    fn limit_is_capped() {
        let query = ListQuery { limit: Some(1_000), ..Default::default() };
        assert_eq!(query.paging().unwrap(), Some((0, MAX_LIMIT)));
    }

    #[test]
    fn huge_page_is_rejected() {
        let query = ListQuery { page: Some(u64::MAX), limit: Some(100), ..Default::default() };
        let err = query.paging().unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);

        // fits u64 but not the driver's i64 skip
        let query = ListQuery { page: Some(u64::MAX / 100), limit: Some(100), ..Default::default() };
        assert!(query.paging().is_err());
    }

    #[test]
    fn filters_follow_the_schema() {
        let query = ListQuery {
            car_type: Some("suv".into()),
            seats: Some("5".into()),
            is_available: Some("TRUE".into()),
            price_range: Some("2500".into()),
            fuel: Some("PETROL".into()),
            ..Default::default()
        };
        let filter = build_filter(&SCHEMA, &query, Document::new()).unwrap();
        assert_eq!(filter.get_str("type").unwrap(), "SUV");
        assert_eq!(filter.get_f64("seats").unwrap(), 5.0);
        assert!(filter.get_bool("is_available").unwrap());
        assert_eq!(
            filter.get_document("price_per_day").unwrap(),
            &doc! { "$lte": 2500.0 }
        );
        // fuel is not declared by this schema
        assert!(!filter.contains_key("fuel"));
    }

    #[test]
    fn bad_values_are_rejected() {
        let query = ListQuery { car_type: Some("TRUCK".into()), ..Default::default() };
        assert!(build_filter(&SCHEMA, &query, Document::new()).is_err());

        let query = ListQuery { price_range: Some("cheap".into()), ..Default::default() };
        let err = build_filter(&SCHEMA, &query, Document::new()).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
    }

    #[test]
    fn text_search_is_escaped_and_case_insensitive() {
        let query = ListQuery { search: Some("  i20 (n) ".into()), ..Default::default() };
        let filter = build_filter(&SCHEMA, &query, Document::new()).unwrap();
        let clauses = filter.get_array("$or").unwrap();
        assert_eq!(clauses.len(), 1);
        assert_eq!(
            clauses[0].as_document().unwrap(),
            &doc! { "model": { "$regex": r"i20 \(n\)", "$options": "i" } }
        );
    }

    #[test]
    fn numeric_search_adds_number_fields() {
        let query = ListQuery { search: Some("1500".into()), ..Default::default() };
        let filter = build_filter(&SCHEMA, &query, doc! { "owner": "x" }).unwrap();
        assert_eq!(filter.get_str("owner").unwrap(), "x");
        assert_eq!(filter.get_array("$or").unwrap().len(), 2);
    }

    #[test]
    fn blank_search_is_ignored() {
        let query = ListQuery { search: Some("   ".into()), ..Default::default() };
        let filter = build_filter(&SCHEMA, &query, Document::new()).unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn sort_order_applies_to_schema_field() {
        let asc = ListQuery { sort_order: Some("ASC".into()), ..Default::default() };
        assert_eq!(sort_document(&SCHEMA, &asc), doc! { "price_per_day": 1 });
        assert_eq!(sort_document(&SCHEMA, &ListQuery::default()), doc! { "created_at": -1 });
    }
}
