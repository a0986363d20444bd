//! Query specification and its raw, caller-facing form.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::SortOrder;
use crate::errors::CoreError;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

/// Inclusive bounds on a collection's date column. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// A `field = value` equality filter. The value is checked and coerced
/// against the collection's allow-list when the query is planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    /// Null and empty-string values mean "no filter".
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match &self.value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }
}

/// A validated query over one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuerySpec {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub search_fields: Vec<String>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    pub date_range: DateRange,
    pub filters: Vec<Filter>,
    pub relations: Vec<String>,
    pub include_soft_deleted: bool,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            search: None,
            search_fields: Vec::new(),
            sort_by: None,
            sort_order: SortOrder::Desc,
            date_range: DateRange::default(),
            filters: Vec::new(),
            relations: Vec::new(),
            include_soft_deleted: false,
        }
    }
}

impl QuerySpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Match `term` as a substring of any of `fields`.
    #[must_use]
    pub fn search<I, S>(mut self, term: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search = Some(term.into());
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = order;
        self
    }

    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub const fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.date_range = DateRange {
            start: Some(start),
            end: Some(end),
        };
        self
    }

    #[must_use]
    pub const fn since(mut self, start: DateTime<Utc>) -> Self {
        self.date_range.start = Some(start);
        self
    }

    #[must_use]
    pub const fn until(mut self, end: DateTime<Utc>) -> Self {
        self.date_range.end = Some(end);
        self
    }

    #[must_use]
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relations.push(relation.into());
        self
    }

    #[must_use]
    pub const fn include_soft_deleted(mut self) -> Self {
        self.include_soft_deleted = true;
        self
    }

    /// Use `fields` for search when the caller did not name any.
    #[must_use]
    pub fn with_default_search_fields(mut self, fields: &[&str]) -> Self {
        if self.search_fields.is_empty() {
            self.search_fields = fields.iter().map(|f| (*f).to_string()).collect();
        }
        self
    }

    /// Rows skipped before this page starts.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Check the structural invariants that do not depend on a collection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for a zero page or limit, or a start
    /// date after the end date.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.page == 0 {
            return Err(CoreError::validation("page must be a positive integer"));
        }
        if self.limit == 0 {
            return Err(CoreError::validation("limit must be a positive integer"));
        }
        if let (Some(start), Some(end)) = (self.date_range.start, self.date_range.end) {
            if start > end {
                return Err(CoreError::validation(format!(
                    "start_date {start} is after end_date {end}"
                )));
            }
        }
        Ok(())
    }
}

/// Untyped query input as it arrives from a caller (query string, JSON body).
///
/// Convert with `QuerySpec::try_from`, which performs all validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub search_fields: Vec<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    #[serde(alias = "start_date")]
    pub start_date: Option<String>,
    #[serde(alias = "end_date")]
    pub end_date: Option<String>,
    pub filters: BTreeMap<String, Value>,
    pub relations: Vec<String>,
    pub include_soft_deleted: bool,
}

impl TryFrom<QueryParams> for QuerySpec {
    type Error = CoreError;

    fn try_from(params: QueryParams) -> Result<Self, Self::Error> {
        let page = positive("page", params.page.unwrap_or(i64::from(DEFAULT_PAGE)))?;
        let limit = positive("limit", params.limit.unwrap_or(i64::from(DEFAULT_LIMIT)))?;

        let start = params
            .start_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_bound(s, Bound::Start))
            .transpose()?;
        let end = params
            .end_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_bound(s, Bound::End))
            .transpose()?;

        let spec = Self {
            page,
            limit,
            search: params.search,
            search_fields: params.search_fields,
            sort_by: params.sort_by.filter(|s| !s.trim().is_empty()),
            sort_order: params
                .sort_order
                .as_deref()
                .map_or(SortOrder::Desc, SortOrder::parse_lenient),
            date_range: DateRange { start, end },
            filters: params
                .filters
                .into_iter()
                .map(|(field, value)| Filter { field, value })
                .collect(),
            relations: params.relations,
            include_soft_deleted: params.include_soft_deleted,
        };
        spec.validate()?;
        Ok(spec)
    }
}

fn positive(name: &str, value: i64) -> Result<u32, CoreError> {
    if value < 1 {
        return Err(CoreError::validation(format!(
            "{name} must be a positive integer, got {value}"
        )));
    }
    u32::try_from(value)
        .map_err(|_| CoreError::validation(format!("{name} is too large: {value}")))
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Parse an RFC 3339 instant or a `YYYY-MM-DD` date.
///
/// A bare date widens to the whole UTC day: midnight for a start bound, the
/// last microsecond of the day for an end bound.
fn parse_bound(s: &str, bound: Bound) -> Result<DateTime<Utc>, CoreError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        CoreError::validation(format!("'{s}' is not an ISO 8601 date or instant"))
    })?;
    let time = match bound {
        Bound::Start => NaiveTime::MIN,
        Bound::End => NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
            .ok_or_else(|| CoreError::validation("invalid end-of-day time"))?,
    };
    Ok(date.and_time(time).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn defaults_are_first_page_of_ten_descending() {
        let spec = QuerySpec::try_from(QueryParams::default()).unwrap();
        assert_eq!(spec.page, 1);
        assert_eq!(spec.limit, 10);
        assert_eq!(spec.sort_order, SortOrder::Desc);
        assert!(spec.date_range.is_open());
        assert_eq!(spec.offset(), 0);
    }

    #[rstest]
    #[case(Some(0), None)]
    #[case(Some(-3), None)]
    #[case(None, Some(0))]
    #[case(None, Some(-1))]
    fn non_positive_page_or_limit_is_rejected(#[case] page: Option<i64>, #[case] limit: Option<i64>) {
        let err = QuerySpec::try_from(QueryParams {
            page,
            limit,
            ..QueryParams::default()
        })
        .unwrap_err();
        assert!(err.is_validation(), "expected validation error, got {err}");
    }

    #[test]
    fn zero_limit_built_directly_fails_validation() {
        assert!(QuerySpec::new().limit(0).validate().is_err());
        assert!(QuerySpec::new().page(0).validate().is_err());
    }

    #[test]
    fn non_integer_page_fails_to_deserialize() {
        let parsed: Result<QueryParams, _> = serde_json::from_value(json!({"page": "two"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn date_only_bounds_cover_whole_days() {
        let spec = QuerySpec::try_from(QueryParams {
            start_date: Some("2024-01-01".into()),
            end_date: Some("2024-01-31".into()),
            ..QueryParams::default()
        })
        .unwrap();

        assert_eq!(
            spec.date_range.start,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        let end = spec.date_range.end.unwrap();
        assert!(end > Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap());
        assert!(end < Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn rfc3339_bounds_are_kept_exact() {
        let spec = QuerySpec::try_from(QueryParams {
            start_date: Some("2024-01-01T08:30:00+02:00".into()),
            ..QueryParams::default()
        })
        .unwrap();
        assert_eq!(
            spec.date_range.start,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 6, 30, 0).unwrap())
        );
        assert_eq!(spec.date_range.end, None);
    }

    #[test]
    fn malformed_dates_are_validation_errors() {
        let err = QuerySpec::try_from(QueryParams {
            end_date: Some("last tuesday".into()),
            ..QueryParams::default()
        })
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = QuerySpec::try_from(QueryParams {
            start_date: Some("2024-02-01".into()),
            end_date: Some("2024-01-01".into()),
            ..QueryParams::default()
        })
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn camel_case_params_deserialize() {
        let params: QueryParams = serde_json::from_value(json!({
            "page": 2,
            "limit": 5,
            "sortBy": "due_date",
            "sortOrder": "asc",
            "startDate": "2024-01-01",
            "filters": {"status": "pending"},
            "includeSoftDeleted": true,
        }))
        .unwrap();
        let spec = QuerySpec::try_from(params).unwrap();

        assert_eq!(spec.offset(), 5);
        assert_eq!(spec.sort_by.as_deref(), Some("due_date"));
        assert_eq!(spec.sort_order, SortOrder::Asc);
        assert_eq!(spec.filters.len(), 1);
        assert!(spec.include_soft_deleted);
    }

    #[test]
    fn blank_filters_are_detected() {
        assert!(Filter { field: "a".into(), value: Value::Null }.is_blank());
        assert!(Filter { field: "a".into(), value: json!("") }.is_blank());
        assert!(!Filter { field: "a".into(), value: json!(false) }.is_blank());
        assert!(!Filter { field: "a".into(), value: json!(0) }.is_blank());
    }
}
