//! Compiles a planned [`StoreQuery`] into parameterized SQL and runs it.
//!
//! Identifiers come only from the collection's column list; every value is
//! bound as a parameter. The page and the total are read in one statement
//! with `COUNT(*) OVER ()`. When the page is empty the window has no row to
//! ride on, so a separate `COUNT(*)` runs instead.

use libsql::Value;
use mill_core::errors::CoreError;
use mill_core::query::{CollectionSchema, Condition, Operator, Predicate, Scalar, StoreQuery};

use crate::MillDb;
use crate::error::DatabaseError;
use crate::helpers::format_datetime;

#[derive(Debug)]
pub(crate) struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub count_sql: String,
    pub count_params: Vec<Value>,
    /// Column index of the window count in `sql`'s result rows.
    pub total_idx: i32,
}

#[derive(Default)]
struct Binder {
    params: Vec<Value>,
}

impl Binder {
    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }
}

fn column<'a>(schema: &CollectionSchema, field: &'a str) -> Result<&'a str, DatabaseError> {
    if schema.has_column(field) {
        Ok(field)
    } else {
        Err(CoreError::validation(format!("unknown column '{field}' on {}", schema.name)).into())
    }
}

fn scalar_value(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Text(s) => Value::Text(s.clone()),
        Scalar::Integer(n) => Value::Integer(*n),
        Scalar::Bool(b) => Value::Integer(i64::from(*b)),
        Scalar::Timestamp(dt) => Value::Text(format_datetime(dt)),
    }
}

/// Escape `LIKE` wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn condition(
    binder: &mut Binder,
    schema: &CollectionSchema,
    cond: &Condition,
) -> Result<String, DatabaseError> {
    let col = column(schema, &cond.field)?;
    let value = || {
        cond.value.as_ref().ok_or_else(|| {
            DatabaseError::Query(format!("{:?} on '{col}' needs a value", cond.op))
        })
    };
    let cmp = |binder: &mut Binder, op: &str| -> Result<String, DatabaseError> {
        let p = binder.bind(scalar_value(value()?));
        Ok(format!("{col} {op} {p}"))
    };
    match cond.op {
        Operator::Eq => cmp(binder, "="),
        Operator::Lt => cmp(binder, "<"),
        Operator::Le => cmp(binder, "<="),
        Operator::Gt => cmp(binder, ">"),
        Operator::Ge => cmp(binder, ">="),
        Operator::Contains => {
            let Scalar::Text(term) = value()? else {
                return Err(DatabaseError::Query(format!(
                    "substring match on '{col}' needs a text value"
                )));
            };
            let p = binder.bind(Value::Text(format!("%{}%", escape_like(term))));
            Ok(format!("{col} LIKE {p} ESCAPE '\\'"))
        }
        Operator::IsNull => Ok(format!("{col} IS NULL")),
        Operator::IsNotNull => Ok(format!("{col} IS NOT NULL")),
    }
}

/// `None` means "no constraint".
fn predicate(
    binder: &mut Binder,
    schema: &CollectionSchema,
    pred: &Predicate,
) -> Result<Option<String>, DatabaseError> {
    match pred {
        Predicate::Condition(cond) => condition(binder, schema, cond).map(Some),
        Predicate::All(children) => {
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                if let Some(sql) = predicate(binder, schema, child)? {
                    parts.push(sql);
                }
            }
            Ok(match parts.len() {
                0 => None,
                1 => parts.pop(),
                _ => Some(format!("({})", parts.join(" AND "))),
            })
        }
        Predicate::Any(children) => {
            if children.is_empty() {
                return Ok(Some("0 = 1".to_string()));
            }
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                let sql = predicate(binder, schema, child)?;
                parts.push(sql.unwrap_or_else(|| "1 = 1".to_string()));
            }
            Ok(Some(format!("({})", parts.join(" OR "))))
        }
    }
}

/// Build the page and count statements for `query`, selecting `select_cols`
/// (a comma-separated column list) from the collection's table.
pub(crate) fn compile(query: &StoreQuery, select_cols: &str) -> Result<CompiledQuery, DatabaseError> {
    let schema = query.collection;
    let mut binder = Binder::default();
    let mut clauses = Vec::new();

    if !query.include_soft_deleted {
        if let Some(col) = schema.soft_delete_column {
            clauses.push(format!("{col} IS NULL"));
        }
    }
    if let Some(sql) = predicate(&mut binder, schema, &query.predicate)? {
        clauses.push(sql);
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let table = schema.table;
    let count_sql = format!("SELECT COUNT(*) FROM {table}{where_sql}");
    let count_params = binder.params.clone();

    // Ties broken on id so pages never overlap or skip rows.
    let order_sql = match &query.sort {
        Some(sort) => {
            let col = column(schema, &sort.field)?;
            let dir = sort.order.as_sql();
            format!(" ORDER BY {col} {dir}, id {dir}")
        }
        None => String::new(),
    };

    let mut sql =
        format!("SELECT {select_cols}, COUNT(*) OVER () FROM {table}{where_sql}{order_sql}");
    match query.limit {
        Some(limit) => {
            let l = binder.bind(Value::Integer(i64::from(limit)));
            let o = binder.bind(Value::Integer(offset_value(query.offset)?));
            sql.push_str(&format!(" LIMIT {l} OFFSET {o}"));
        }
        None if query.offset > 0 => {
            let o = binder.bind(Value::Integer(offset_value(query.offset)?));
            sql.push_str(&format!(" LIMIT -1 OFFSET {o}"));
        }
        None => {}
    }

    let total_idx = i32::try_from(select_cols.split(',').count())
        .map_err(|_| DatabaseError::Query("too many select columns".into()))?;

    Ok(CompiledQuery {
        sql,
        params: binder.params,
        count_sql,
        count_params,
        total_idx,
    })
}

fn offset_value(offset: u64) -> Result<i64, DatabaseError> {
    i64::try_from(offset)
        .map_err(|_| CoreError::validation(format!("offset {offset} is out of range")).into())
}

impl MillDb {
    /// Execute `query`, mapping each row with `map`. Returns the page and the
    /// number of rows matching regardless of offset/limit.
    pub(crate) async fn fetch_rows<T>(
        &self,
        query: &StoreQuery,
        select_cols: &str,
        map: impl Fn(&libsql::Row) -> Result<T, DatabaseError>,
    ) -> Result<(Vec<T>, u64), DatabaseError> {
        let compiled = compile(query, select_cols)?;
        let mut rows = self
            .conn()
            .query(&compiled.sql, libsql::params_from_iter(compiled.params))
            .await?;

        let mut items = Vec::new();
        let mut total = None;
        while let Some(row) = rows.next().await? {
            if total.is_none() {
                total = Some(row.get::<i64>(compiled.total_idx)?);
            }
            items.push(map(&row)?);
        }

        let total = match total {
            Some(n) => n,
            None if query.offset == 0 && query.limit != Some(0) => 0,
            None => {
                let mut rows = self
                    .conn()
                    .query(
                        &compiled.count_sql,
                        libsql::params_from_iter(compiled.count_params),
                    )
                    .await?;
                let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
                row.get::<i64>(0)?
            }
        };
        let total = u64::try_from(total)
            .map_err(|_| DatabaseError::Query(format!("negative row count {total}")))?;
        Ok((items, total))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use mill_core::enums::SortOrder;
    use mill_core::query::{QueryEngine, QuerySpec, TASKS};

    use super::*;

    #[test]
    fn date_range_search_and_filter_share_one_where_clause() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();
        let spec = QuerySpec::new()
            .between(start, end)
            .search("auth", ["title", "description"])
            .filter("status", "pending");
        let plan = QueryEngine::new().plan(&spec, &TASKS).unwrap();
        let compiled = compile(&plan, "id, title").unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT id, title, COUNT(*) OVER () FROM tasks \
             WHERE deleted_at IS NULL AND \
             ((title LIKE ?1 ESCAPE '\\' OR description LIKE ?2 ESCAPE '\\') \
             AND status = ?3 AND created_at >= ?4 AND created_at <= ?5) \
             ORDER BY created_at DESC, id DESC LIMIT ?6 OFFSET ?7"
        );
        assert_eq!(compiled.params.len(), 7);
        assert_eq!(compiled.count_params.len(), 5);
        assert_eq!(compiled.total_idx, 2);
        assert_eq!(
            compiled.params[3],
            Value::Text("2024-01-01T00:00:00.000000Z".into())
        );
    }

    #[test]
    fn like_wildcards_in_terms_are_literal() {
        let plan = StoreQuery::all(&TASKS).filter(Predicate::contains("title", "100%_done"));
        let compiled = compile(&plan, "id").unwrap();
        assert_eq!(compiled.params[0], Value::Text("%100\\%\\_done%".into()));
    }

    #[test]
    fn unknown_columns_never_reach_sql() {
        let plan = StoreQuery::all(&TASKS).filter(Predicate::eq("1=1; DROP TABLE tasks", 1_i64));
        let err = compile(&plan, "id").unwrap_err();
        assert!(err.is_validation());

        let plan = StoreQuery::all(&TASKS).order_by("password", SortOrder::Desc);
        assert!(compile(&plan, "id").unwrap_err().is_validation());
    }

    #[test]
    fn soft_deleted_rows_included_on_request() {
        let mut plan = StoreQuery::all(&TASKS);
        plan.include_soft_deleted = true;
        let compiled = compile(&plan, "id").unwrap();
        assert_eq!(compiled.sql, "SELECT id, COUNT(*) OVER () FROM tasks");
        assert_eq!(compiled.count_sql, "SELECT COUNT(*) FROM tasks");
    }

    #[test]
    fn empty_any_matches_nothing() {
        let plan = StoreQuery::all(&TASKS).filter(Predicate::Any(Vec::new()));
        let compiled = compile(&plan, "id").unwrap();
        assert!(compiled.sql.ends_with("WHERE deleted_at IS NULL AND 0 = 1"));
    }

    #[test]
    fn bools_bind_as_integers() {
        let plan = StoreQuery::all(&TASKS).filter(Predicate::eq("reminder_sent", false));
        let compiled = compile(&plan, "id").unwrap();
        assert_eq!(compiled.params, vec![Value::Integer(0)]);
    }
}
