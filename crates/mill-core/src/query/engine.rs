//! Plans a [`QuerySpec`] into a [`StoreQuery`] and runs it against a store.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::CoreError;
use crate::query::page::PageResult;
use crate::query::predicate::{Predicate, Scalar, Sort, StoreQuery};
use crate::query::schema::{CollectionSchema, FieldKind};
use crate::query::spec::QuerySpec;

/// Anything that can execute a planned query for items of type `T`.
///
/// `fetch` returns the requested window of items and the number of rows
/// matching the predicate regardless of offset/limit.
#[async_trait]
pub trait QueryStore<T: Send>: Send + Sync {
    type Error: From<CoreError> + Send;

    async fn fetch(&self, query: &StoreQuery) -> Result<(Vec<T>, u64), Self::Error>;
}

/// Stateless planner/executor. Cheap to copy and safe to share.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEngine {
    max_limit: Option<u32>,
}

impl QueryEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self { max_limit: None }
    }

    /// Reject specs whose `limit` exceeds `max`.
    #[must_use]
    pub const fn with_max_limit(max: u32) -> Self {
        Self {
            max_limit: Some(max),
        }
    }

    /// Validate `spec` against `schema` and build the store query.
    ///
    /// Search, filter, and date-range predicates are all ANDed into one
    /// group; none replaces another.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the spec is structurally invalid or
    /// names a field or relation outside the collection's allow-lists.
    pub fn plan(
        &self,
        spec: &QuerySpec,
        schema: &'static CollectionSchema,
    ) -> Result<StoreQuery, CoreError> {
        spec.validate()?;
        if let Some(max) = self.max_limit {
            if spec.limit > max {
                return Err(CoreError::validation(format!(
                    "limit {} exceeds the maximum of {max}",
                    spec.limit
                )));
            }
        }

        let mut predicate = Predicate::default();

        if let Some(term) = spec.search.as_deref().filter(|t| !t.is_empty()) {
            if !spec.search_fields.is_empty() {
                let mut any = Vec::with_capacity(spec.search_fields.len());
                for field in &spec.search_fields {
                    if !schema.is_searchable(field) {
                        return Err(CoreError::validation(format!(
                            "'{field}' is not searchable on {}",
                            schema.name
                        )));
                    }
                    any.push(Predicate::contains(field.clone(), term));
                }
                predicate = predicate.and(Predicate::Any(any));
            }
        }

        for filter in spec.filters.iter().filter(|f| !f.is_blank()) {
            let kind = schema.filter_kind(&filter.field).ok_or_else(|| {
                CoreError::validation(format!(
                    "'{}' is not filterable on {}",
                    filter.field, schema.name
                ))
            })?;
            let value = coerce(&filter.field, kind, &filter.value)?;
            predicate = predicate.and(Predicate::eq(filter.field.clone(), value));
        }

        for relation in &spec.relations {
            if !schema.has_relation(relation) {
                return Err(CoreError::validation(format!(
                    "'{relation}' is not a relation of {}",
                    schema.name
                )));
            }
        }

        let sort_field = match spec.sort_by.as_deref() {
            Some(field) if schema.is_sortable(field) => field,
            Some(field) => {
                return Err(CoreError::validation(format!(
                    "'{field}' is not sortable on {}",
                    schema.name
                )));
            }
            None => schema.default_sort,
        };

        if let Some(start) = spec.date_range.start {
            predicate = predicate.and(Predicate::ge(schema.date_column, start));
        }
        if let Some(end) = spec.date_range.end {
            predicate = predicate.and(Predicate::le(schema.date_column, end));
        }

        Ok(StoreQuery {
            collection: schema,
            predicate,
            sort: Some(Sort {
                field: sort_field.to_string(),
                order: spec.sort_order,
            }),
            relations: spec.relations.clone(),
            offset: spec.offset(),
            limit: Some(spec.limit),
            include_soft_deleted: spec.include_soft_deleted,
        })
    }

    /// Plan `spec` and execute it against `store`.
    ///
    /// # Errors
    ///
    /// Validation failures are raised before the store is touched; store
    /// failures propagate unchanged.
    pub async fn execute<T, S>(
        &self,
        spec: &QuerySpec,
        schema: &'static CollectionSchema,
        store: &S,
    ) -> Result<PageResult<T>, S::Error>
    where
        T: Send,
        S: QueryStore<T> + ?Sized,
    {
        let query = self.plan(spec, schema)?;
        let (items, total) = store.fetch(&query).await?;
        Ok(PageResult::new(items, total, spec.page, spec.limit))
    }

    /// Like [`execute`](Self::execute), then map every item through
    /// `transform` (e.g. to replace loaded relations with counts).
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn execute_with<T, U, S>(
        &self,
        spec: &QuerySpec,
        schema: &'static CollectionSchema,
        store: &S,
        transform: impl FnMut(T) -> U + Send,
    ) -> Result<PageResult<U>, S::Error>
    where
        T: Send,
        S: QueryStore<T> + ?Sized,
    {
        Ok(self.execute(spec, schema, store).await?.map(transform))
    }
}

fn coerce(field: &str, kind: FieldKind, value: &Value) -> Result<Scalar, CoreError> {
    let mismatch = || {
        CoreError::validation(format!(
            "filter value {value} does not fit {kind:?} field '{field}'"
        ))
    };
    match kind {
        FieldKind::Text => match value {
            Value::String(s) => Ok(Scalar::Text(s.clone())),
            Value::Number(n) => Ok(Scalar::Text(n.to_string())),
            _ => Err(mismatch()),
        },
        FieldKind::Bool => match value {
            Value::Bool(b) => Ok(Scalar::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Scalar::Bool(false)),
                Some(1) => Ok(Scalar::Bool(true)),
                _ => Err(mismatch()),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Scalar::Bool(true)),
                "false" | "0" => Ok(Scalar::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::{Map, json};

    use super::*;
    use crate::enums::SortOrder;
    use crate::query::predicate::{Condition, Operator};
    use crate::query::schema::TASKS;

    /// Evaluates planned queries over JSON rows, the way a SQL store would.
    struct MemoryStore {
        rows: Vec<Value>,
    }

    fn scalar_cmp(row: &Value, scalar: &Scalar) -> Option<Ordering> {
        match (row, scalar) {
            (Value::String(s), Scalar::Text(t)) => Some(s.as_str().cmp(t.as_str())),
            (Value::String(s), Scalar::Timestamp(t)) => s
                .parse::<DateTime<Utc>>()
                .ok()
                .map(|dt| dt.cmp(t)),
            (Value::Number(n), Scalar::Integer(i)) => n.as_i64().map(|v| v.cmp(i)),
            (Value::Bool(b), Scalar::Bool(c)) => Some(b.cmp(c)),
            _ => None,
        }
    }

    fn matches(predicate: &Predicate, row: &Map<String, Value>) -> bool {
        match predicate {
            Predicate::All(children) => children.iter().all(|p| matches(p, row)),
            Predicate::Any(children) => children.iter().any(|p| matches(p, row)),
            Predicate::Condition(Condition { field, op, value }) => {
                let cell = row.get(field).unwrap_or(&Value::Null);
                match (op, value) {
                    (Operator::IsNull, _) => cell.is_null(),
                    (Operator::IsNotNull, _) => !cell.is_null(),
                    (Operator::Contains, Some(Scalar::Text(term))) => cell
                        .as_str()
                        .is_some_and(|s| s.to_lowercase().contains(&term.to_lowercase())),
                    (op, Some(scalar)) => scalar_cmp(cell, scalar).is_some_and(|ord| match op {
                        Operator::Eq => ord == Ordering::Equal,
                        Operator::Lt => ord == Ordering::Less,
                        Operator::Le => ord != Ordering::Greater,
                        Operator::Gt => ord == Ordering::Greater,
                        Operator::Ge => ord != Ordering::Less,
                        _ => false,
                    }),
                    _ => false,
                }
            }
        }
    }

    #[async_trait]
    impl QueryStore<Value> for MemoryStore {
        type Error = CoreError;

        async fn fetch(&self, query: &StoreQuery) -> Result<(Vec<Value>, u64), CoreError> {
            let mut hits: Vec<Value> = self
                .rows
                .iter()
                .filter(|row| {
                    let obj = row.as_object().expect("rows are objects");
                    let live = query.include_soft_deleted
                        || query
                            .collection
                            .soft_delete_column
                            .is_none_or(|col| obj.get(col).is_none_or(Value::is_null));
                    live && matches(&query.predicate, obj)
                })
                .cloned()
                .collect();
            if let Some(sort) = &query.sort {
                hits.sort_by(|a, b| {
                    let ord = a[&sort.field].to_string().cmp(&b[&sort.field].to_string());
                    match sort.order {
                        SortOrder::Asc => ord,
                        SortOrder::Desc => ord.reverse(),
                    }
                });
            }
            let total = hits.len() as u64;
            let offset = usize::try_from(query.offset).unwrap();
            let limit = query.limit.map_or(usize::MAX, |l| l as usize);
            Ok((hits.into_iter().skip(offset).take(limit).collect(), total))
        }
    }

    fn ts(y: i32, m: u32, d: u32) -> String {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap().to_rfc3339()
    }

    fn store() -> MemoryStore {
        MemoryStore {
            rows: vec![
                json!({"id": "1", "title": "Implement auth", "status": "pending", "created_at": ts(2023, 12, 20), "deleted_at": null}),
                json!({"id": "2", "title": "Auth flow", "status": "completed", "created_at": ts(2024, 1, 15), "deleted_at": null}),
                json!({"id": "3", "title": "Unrelated", "status": "pending", "created_at": ts(2024, 2, 10), "deleted_at": null}),
                json!({"id": "4", "title": "Old auth notes", "status": "pending", "created_at": ts(2024, 1, 20), "deleted_at": ts(2024, 1, 21)}),
            ],
        }
    }

    fn ids(page: &PageResult<Value>) -> Vec<&str> {
        page.items.iter().map(|v| v["id"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn search_matches_title_case_insensitively() {
        let spec = QuerySpec::new().page(1).limit(10).search("auth", ["title"]);
        let page = QueryEngine::new().execute(&spec, &TASKS, &store()).await.unwrap();

        assert_eq!(page.total, 2);
        let mut found = ids(&page);
        found.sort_unstable();
        assert_eq!(found, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn search_term_is_matched_verbatim() {
        let engine = QueryEngine::new();

        let padded = QuerySpec::new().search("auth ", ["title"]);
        let page = engine.execute(&padded, &TASKS, &store()).await.unwrap();
        assert_eq!(ids(&page), vec!["2"]);

        let empty = QuerySpec::new().search("", ["title"]);
        let page = engine.execute(&empty, &TASKS, &store()).await.unwrap();
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn search_without_fields_is_ignored() {
        let spec = QuerySpec {
            search: Some("auth".into()),
            ..QuerySpec::default()
        };
        let page = QueryEngine::new().execute(&spec, &TASKS, &store()).await.unwrap();
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn date_range_is_anded_with_search_and_filters() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();

        let only_range = QuerySpec::new().between(start, end);
        let page = QueryEngine::new().execute(&only_range, &TASKS, &store()).await.unwrap();
        assert_eq!(ids(&page), vec!["2"]);

        // "Implement auth" matches the search but was created in December.
        let with_search = QuerySpec::new().between(start, end).search("auth", ["title"]);
        let page = QueryEngine::new().execute(&with_search, &TASKS, &store()).await.unwrap();
        assert_eq!(ids(&page), vec!["2"]);

        // The filter must survive alongside the range.
        let with_filter = QuerySpec::new().between(start, end).filter("status", "pending");
        let page = QueryEngine::new().execute(&with_filter, &TASKS, &store()).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn soft_deleted_rows_need_opt_in() {
        let spec = QuerySpec::new().search("auth", ["title"]);
        let page = QueryEngine::new().execute(&spec, &TASKS, &store()).await.unwrap();
        assert_eq!(page.total, 2);

        let page = QueryEngine::new()
            .execute(&spec.include_soft_deleted(), &TASKS, &store())
            .await
            .unwrap();
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty_with_same_total() {
        let spec = QuerySpec::new().page(5).limit(2);
        let page = QueryEngine::new().execute(&spec, &TASKS, &store()).await.unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
    }

    #[tokio::test]
    async fn page_sizes_follow_the_window() {
        let engine = QueryEngine::new();
        let first = engine
            .execute(&QuerySpec::new().page(1).limit(2), &TASKS, &store())
            .await
            .unwrap();
        let second = engine
            .execute(&QuerySpec::new().page(2).limit(2), &TASKS, &store())
            .await
            .unwrap();

        assert_eq!(first.items.len(), 2);
        assert_eq!(second.items.len(), 1);
        assert_eq!(first.total, second.total);
    }

    #[tokio::test]
    async fn transform_reshapes_items() {
        let spec = QuerySpec::new().sort_by("title", SortOrder::Asc);
        let page = QueryEngine::new()
            .execute_with(&spec, &TASKS, &store(), |row| {
                row["title"].as_str().unwrap().to_uppercase()
            })
            .await
            .unwrap();
        assert_eq!(page.items, vec!["AUTH FLOW", "IMPLEMENT AUTH", "UNRELATED"]);
    }

    #[test]
    fn plan_uses_default_sort_descending() {
        let plan = QueryEngine::new().plan(&QuerySpec::new(), &TASKS).unwrap();
        assert_eq!(
            plan.sort,
            Some(Sort {
                field: "created_at".into(),
                order: SortOrder::Desc,
            })
        );
        assert_eq!(plan.offset, 0);
        assert_eq!(plan.limit, Some(10));
    }

    #[test]
    fn plan_skips_blank_filters() {
        let spec = QuerySpec::new()
            .filter("status", Value::Null)
            .filter("priority", "")
            .filter("assignee_id", "usr-1");
        let plan = QueryEngine::new().plan(&spec, &TASKS).unwrap();
        assert_eq!(plan.predicate.fields(), vec!["assignee_id"]);
    }

    #[test]
    fn plan_coerces_bool_filters() {
        let spec = QuerySpec::new().filter("reminder_sent", "false");
        let plan = QueryEngine::new().plan(&spec, &TASKS).unwrap();
        assert_eq!(
            plan.predicate,
            Predicate::All(vec![Predicate::eq("reminder_sent", false)])
        );
    }

    #[test]
    fn plan_rejects_fields_outside_allow_lists() {
        let engine = QueryEngine::new();
        let cases = [
            QuerySpec::new().filter("password; DROP TABLE tasks", "x"),
            QuerySpec::new().sort_by("secret", SortOrder::Asc),
            QuerySpec::new().search("x", ["file_path"]),
            QuerySpec::new().with_relation("everything"),
            QuerySpec::new().filter("reminder_sent", "maybe"),
        ];
        for spec in cases {
            let err = engine.plan(&spec, &TASKS).unwrap_err();
            assert!(err.is_validation(), "expected validation error for {spec:?}");
        }
    }

    #[test]
    fn plan_enforces_max_limit() {
        let engine = QueryEngine::with_max_limit(50);
        assert!(engine.plan(&QuerySpec::new().limit(50), &TASKS).is_ok());
        assert!(engine.plan(&QuerySpec::new().limit(51), &TASKS).is_err());
    }
}
