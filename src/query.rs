use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{database::Database, error::AppError};

/// Query-string keys consumed by the builder itself. These are never
/// interpreted as entity filters.
const RESERVED: [&str; 5] = ["searchTerm", "sort", "limit", "page", "fields"];

const DEFAULT_LIMIT: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Text,
    Uuid,
    Bool,
    Int,
    Date,
}

/// One entry of a list endpoint's filter allow-list: the exposed query
/// parameter, the column it maps to, and the value type it must parse as.
#[derive(Debug, Clone, Copy)]
pub struct FilterField {
    pub param: &'static str,
    pub column: &'static str,
    pub kind: FilterKind,
}

impl FilterField {
    pub const fn text(param: &'static str, column: &'static str) -> Self {
        Self { param, column, kind: FilterKind::Text }
    }
    pub const fn uuid(param: &'static str, column: &'static str) -> Self {
        Self { param, column, kind: FilterKind::Uuid }
    }
    pub const fn boolean(param: &'static str, column: &'static str) -> Self {
        Self { param, column, kind: FilterKind::Bool }
    }
    pub const fn int(param: &'static str, column: &'static str) -> Self {
        Self { param, column, kind: FilterKind::Int }
    }
    pub const fn date(param: &'static str, column: &'static str) -> Self {
        Self { param, column, kind: FilterKind::Date }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SortField {
    pub param: &'static str,
    pub column: &'static str,
}

impl SortField {
    pub const fn new(param: &'static str, column: &'static str) -> Self {
        Self { param, column }
    }
}

/// Per-entity contract a list endpoint hands to the builder. Column names
/// only ever enter SQL through these lists; values are always bound.
#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    pub filterable: &'static [FilterField],
    pub searchable: &'static [&'static str],
    pub sortable: &'static [SortField],
    pub selectable: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Uuid(Uuid),
    Bool(bool),
    Int(i64),
    Date(NaiveDate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeOp {
    Gte,
    Lte,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PaginationMeta {
    pub total: i64,
    #[serde(rename = "totalPage")]
    pub total_page: i64,
    pub page: i64,
    pub limit: i64,
}

/// A parsed list request: equality filters, search, ordering, pagination
/// and projection, ready to render onto a `sqlx::QueryBuilder`.
#[derive(Debug)]
pub struct ListQuery {
    filters: Vec<(&'static str, FilterValue)>,
    search: Option<(Vec<&'static str>, String)>,
    ranges: Vec<(String, RangeOp, FilterValue)>,
    sort: Vec<(&'static str, bool)>,
    pub page: i64,
    pub limit: i64,
    fields: Option<Vec<String>>,
}

impl ListQuery {
    /// Parses a raw query-parameter map against the endpoint's allow-lists.
    /// Reserved keys are consumed by the builder; every other key must name
    /// a filterable field and parse as its declared type.
    pub fn parse(
        params: &HashMap<String, String>,
        opts: &ListOptions,
    ) -> Result<Self, AppError> {
        let page = match params.get("page") {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| AppError::Validation(format!("page must be a number, got '{raw}'")))?
                .max(1),
            None => 1,
        };
        let limit = match params.get("limit") {
            Some(raw) => {
                let n = raw
                    .parse::<i64>()
                    .map_err(|_| AppError::Validation(format!("limit must be a number, got '{raw}'")))?;
                if n < 1 {
                    DEFAULT_LIMIT
                } else {
                    n
                }
            }
            None => DEFAULT_LIMIT,
        };

        let mut sort = Vec::new();
        if let Some(raw) = params.get("sort") {
            for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let (name, desc) = match entry.strip_prefix('-') {
                    Some(rest) => (rest, true),
                    None => (entry, false),
                };
                let field = opts
                    .sortable
                    .iter()
                    .find(|f| f.param == name)
                    .ok_or_else(|| AppError::Validation(format!("cannot sort by '{name}'")))?;
                sort.push((field.column, desc));
            }
        }
        if sort.is_empty() {
            sort.push(("created_at", true));
        }

        let fields = match params.get("fields") {
            Some(raw) => {
                let mut list = Vec::new();
                for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    if !opts.selectable.iter().any(|s| *s == entry) {
                        return Err(AppError::Validation(format!("unknown field '{entry}'")));
                    }
                    list.push(entry.to_string());
                }
                if list.is_empty() {
                    None
                } else {
                    Some(list)
                }
            }
            None => None,
        };

        let search = params
            .get("searchTerm")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && !opts.searchable.is_empty())
            .map(|term| (opts.searchable.to_vec(), term.to_string()));

        let mut filters = Vec::new();
        for (key, raw) in params {
            if RESERVED.iter().any(|r| *r == key.as_str()) {
                continue;
            }
            let field = opts
                .filterable
                .iter()
                .find(|f| f.param == key.as_str())
                .ok_or_else(|| AppError::Validation(format!("unknown query parameter '{key}'")))?;
            filters.push((field.column, parse_value(field, raw)?));
        }
        // HashMap iteration order is arbitrary; keep generated SQL stable.
        filters.sort_by(|a, b| a.0.cmp(b.0));

        Ok(Self {
            filters,
            search,
            ranges: Vec::new(),
            sort,
            page,
            limit,
            fields,
        })
    }

    /// Forces an equality condition the client did not (or may not)
    /// supply, e.g. scoping a list to the caller's own rows or pinning
    /// `published = true` for anonymous visitors.
    pub fn and_eq(&mut self, column: &'static str, value: FilterValue) {
        self.filters.push((column, value));
    }

    /// Adds a `column >= value` condition outside the equality allow-list,
    /// for range filters the endpoint extracts itself (date windows).
    pub fn and_gte(&mut self, column: &str, value: FilterValue) {
        self.ranges.push((column.to_string(), RangeOp::Gte, value));
    }

    pub fn and_lte(&mut self, column: &str, value: FilterValue) {
        self.ranges.push((column.to_string(), RangeOp::Lte, value));
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn meta(&self, total: i64) -> PaginationMeta {
        PaginationMeta {
            total,
            total_page: (total + self.limit - 1) / self.limit,
            page: self.page,
            limit: self.limit,
        }
    }

    pub fn filter_columns(&self) -> Vec<&'static str> {
        self.filters.iter().map(|(c, _)| *c).collect()
    }

    pub fn sort_spec(&self) -> &[(&'static str, bool)] {
        &self.sort
    }

    /// Full paged SELECT for `table`.
    pub fn build_select(&self, table: &str) -> QueryBuilder<'static, Postgres> {
        self.build_select_from("*", table)
    }

    /// Same, with an explicit select list and FROM clause for joined
    /// listings. Allow-list columns must then be qualified.
    pub fn build_select_from(&self, select: &str, from: &str) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("SELECT {select} FROM {from}"));
        self.push_where(&mut qb);
        qb.push(" ORDER BY ");
        for (i, (column, desc)) in self.sort.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(*column);
            qb.push(if *desc { " DESC" } else { " ASC" });
        }
        qb.push(" LIMIT ");
        qb.push_bind(self.limit);
        qb.push(" OFFSET ");
        qb.push_bind(self.offset());
        qb
    }

    /// COUNT over the same filters, ignoring sort/pagination/projection.
    /// Runs outside the page fetch's snapshot; under concurrent writes the
    /// reported total may not match the returned page.
    pub fn build_count(&self, table: &str) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {table}"));
        self.push_where(&mut qb);
        qb
    }

    pub async fn fetch_total(&self, db: &Database, table: &str) -> Result<i64, AppError> {
        let mut qb = self.build_count(table);
        let total = qb.build_query_scalar::<i64>().fetch_one(db).await?;
        Ok(total)
    }

    /// Serializes rows and applies the field projection, if one was
    /// requested. Projection happens after row decoding so typed `FromRow`
    /// mapping stays intact.
    pub fn project<T: Serialize>(&self, rows: Vec<T>) -> Vec<serde_json::Value> {
        let values: Vec<serde_json::Value> = rows
            .into_iter()
            .map(|r| serde_json::to_value(r).unwrap_or(serde_json::Value::Null))
            .collect();
        match &self.fields {
            None => values,
            Some(fields) => values
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::Object(map) => {
                        let kept: serde_json::Map<String, serde_json::Value> = map
                            .into_iter()
                            .filter(|(k, _)| fields.iter().any(|f| f == k))
                            .collect();
                        serde_json::Value::Object(kept)
                    }
                    other => other,
                })
                .collect(),
        }
    }

    fn push_where(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        let mut first = true;
        let mut sep = |qb: &mut QueryBuilder<'static, Postgres>| {
            qb.push(if first { " WHERE " } else { " AND " });
            first = false;
        };

        for (column, value) in &self.filters {
            sep(qb);
            qb.push(*column);
            qb.push(" = ");
            push_value(qb, value);
        }

        if let Some((columns, term)) = &self.search {
            sep(qb);
            qb.push("(");
            let pattern = format!("%{term}%");
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(*column);
                qb.push(" ILIKE ");
                qb.push_bind(pattern.clone());
            }
            qb.push(")");
        }

        for (column, op, value) in &self.ranges {
            sep(qb);
            qb.push(column.clone());
            qb.push(match op {
                RangeOp::Gte => " >= ",
                RangeOp::Lte => " <= ",
            });
            push_value(qb, value);
        }
    }
}

fn push_value(qb: &mut QueryBuilder<'static, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Text(s) => qb.push_bind(s.clone()),
        FilterValue::Uuid(u) => qb.push_bind(*u),
        FilterValue::Bool(b) => qb.push_bind(*b),
        FilterValue::Int(i) => qb.push_bind(*i),
        FilterValue::Date(d) => qb.push_bind(*d),
    };
}

fn parse_value(field: &FilterField, raw: &str) -> Result<FilterValue, AppError> {
    match field.kind {
        FilterKind::Text => Ok(FilterValue::Text(raw.to_string())),
        FilterKind::Uuid => Uuid::parse_str(raw)
            .map(FilterValue::Uuid)
            .map_err(|_| AppError::Validation(format!("'{}' must be a UUID", field.param))),
        FilterKind::Bool => match raw {
            "true" => Ok(FilterValue::Bool(true)),
            "false" => Ok(FilterValue::Bool(false)),
            _ => Err(AppError::Validation(format!(
                "'{}' must be true or false",
                field.param
            ))),
        },
        FilterKind::Int => raw
            .parse::<i64>()
            .map(FilterValue::Int)
            .map_err(|_| AppError::Validation(format!("'{}' must be an integer", field.param))),
        FilterKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(FilterValue::Date)
            .map_err(|_| AppError::Validation(format!("'{}' must be YYYY-MM-DD", field.param))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OPTS: ListOptions = ListOptions {
        filterable: &[
            FilterField::uuid("categoryId", "category_id"),
            FilterField::boolean("published", "published"),
            FilterField::text("status", "status"),
        ],
        searchable: &["name", "description"],
        sortable: &[
            SortField::new("createdAt", "created_at"),
            SortField::new("name", "name"),
        ],
        selectable: &["id", "name", "price"],
    };

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reserved_keys_never_become_filters() {
        let q = ListQuery::parse(
            &params(&[
                ("searchTerm", "rose"),
                ("sort", "name"),
                ("limit", "5"),
                ("page", "2"),
                ("fields", "id,name"),
                ("status", "ACTIVE"),
            ]),
            &OPTS,
        )
        .unwrap();
        assert_eq!(q.filter_columns(), vec!["status"]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ListQuery::parse(&params(&[("evil", "1")]), &OPTS).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn sort_parses_direction_and_order() {
        let q = ListQuery::parse(&params(&[("sort", "-createdAt,name")]), &OPTS).unwrap();
        assert_eq!(q.sort_spec().to_vec(), vec![("created_at", true), ("name", false)]);
    }

    #[test]
    fn sort_defaults_to_created_at_desc() {
        let q = ListQuery::parse(&params(&[]), &OPTS).unwrap();
        assert_eq!(q.sort_spec().to_vec(), vec![("created_at", true)]);
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let err = ListQuery::parse(&params(&[("sort", "password_hash")]), &OPTS).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn pagination_defaults_and_offsets() {
        let q = ListQuery::parse(&params(&[]), &OPTS).unwrap();
        assert_eq!((q.page, q.limit, q.offset()), (1, 10, 0));

        let q = ListQuery::parse(&params(&[("page", "0")]), &OPTS).unwrap();
        assert_eq!(q.page, 1);

        let q = ListQuery::parse(&params(&[("page", "3"), ("limit", "5")]), &OPTS).unwrap();
        assert_eq!((q.offset(), q.limit), (10, 5));
    }

    #[test]
    fn meta_total_page_is_ceiling() {
        let q = ListQuery::parse(&params(&[("limit", "10")]), &OPTS).unwrap();
        assert_eq!(
            q.meta(23),
            PaginationMeta { total: 23, total_page: 3, page: 1, limit: 10 }
        );
        assert_eq!(q.meta(0).total_page, 0);
        assert_eq!(q.meta(20).total_page, 2);
    }

    #[test]
    fn filter_values_parse_against_declared_kind() {
        let err = ListQuery::parse(&params(&[("categoryId", "not-a-uuid")]), &OPTS).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = ListQuery::parse(&params(&[("published", "yes")]), &OPTS).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let q = ListQuery::parse(&params(&[("published", "true")]), &OPTS).unwrap();
        assert_eq!(q.filter_columns(), vec!["published"]);
    }

    #[test]
    fn search_renders_ilike_across_searchable_columns() {
        let q = ListQuery::parse(&params(&[("searchTerm", "rose")]), &OPTS).unwrap();
        let qb = q.build_select("products");
        let sql = qb.sql();
        assert!(sql.contains("name ILIKE"));
        assert!(sql.contains("description ILIKE"));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn search_is_ignored_without_searchable_columns() {
        const NO_SEARCH: ListOptions = ListOptions {
            filterable: &[],
            searchable: &[],
            sortable: &[SortField::new("createdAt", "created_at")],
            selectable: &[],
        };
        let q = ListQuery::parse(&params(&[("searchTerm", "rose")]), &NO_SEARCH).unwrap();
        let qb = q.build_select("products");
        assert!(!qb.sql().contains("ILIKE"));
    }

    #[test]
    fn count_query_ignores_sort_and_pagination() {
        let q = ListQuery::parse(
            &params(&[("status", "ACTIVE"), ("sort", "-createdAt"), ("limit", "3")]),
            &OPTS,
        )
        .unwrap();
        let qb = q.build_count("products");
        let sql = qb.sql();
        assert!(sql.starts_with("SELECT COUNT(*) FROM products"));
        assert!(sql.contains("status = "));
        assert!(!sql.contains("ORDER BY"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn projection_keeps_only_requested_fields() {
        let q = ListQuery::parse(&params(&[("fields", "id,name")]), &OPTS).unwrap();
        let rows = q.project(vec![json!({"id": 1, "name": "Rose", "price": 20})]);
        assert_eq!(rows, vec![json!({"id": 1, "name": "Rose"})]);
    }

    #[test]
    fn projection_rejects_unknown_fields() {
        let err = ListQuery::parse(&params(&[("fields", "password_hash")]), &OPTS).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn absent_projection_returns_rows_unchanged() {
        let q = ListQuery::parse(&params(&[]), &OPTS).unwrap();
        let rows = q.project(vec![json!({"id": 1, "name": "Rose", "price": 20})]);
        assert_eq!(rows[0]["price"], 20);
    }

    #[test]
    fn range_conditions_join_with_and() {
        let mut q = ListQuery::parse(&params(&[("status", "APPROVED")]), &OPTS).unwrap();
        q.and_gte(
            "spent_at",
            FilterValue::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
        );
        q.and_lte(
            "spent_at",
            FilterValue::Date(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()),
        );
        let qb = q.build_count("expenses");
        let sql = qb.sql();
        assert!(sql.contains("spent_at >= "));
        assert!(sql.contains("spent_at <= "));
    }
}
