//! Query feature pipeline.
//!
//! Turns list-request parameters into a [`QueryDescriptor`] in four chained
//! steps (filter → sort → project → paginate). Only fields present in a
//! record's [`Queryable::FIELDS`] allow-list can be filtered, sorted or
//! selected, so client keys never reach the store unchecked.
//!
//! The descriptor is a plain value: `PostgresRepository` translates it into
//! SQL, `InMemoryRepository` evaluates it directly with
//! [`QueryDescriptor::evaluate`].

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Parameter names consumed by the pipeline itself and never treated as filters.
pub const RESERVED_PARAMS: [&str; 4] = ["page", "sort", "limit", "fields"];
pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 100;

// --- Field allow-lists ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Number,
    Boolean,
    Timestamp,
    Uuid,
}

/// One queryable field: its wire (JSON) name, its storage column and how
/// request values for it are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self { name, column, kind }
    }

    fn parse_value(&self, raw: &str) -> AppResult<FilterValue> {
        let invalid = || {
            AppError::Validation(format!(
                "Invalid value `{raw}` for field `{}`",
                self.name
            ))
        };

        let value = match self.kind {
            FieldKind::Text => FilterValue::Text(raw.to_string()),
            FieldKind::Integer => FilterValue::Integer(raw.trim().parse().map_err(|_| invalid())?),
            FieldKind::Number => FilterValue::Number(raw.trim().parse().map_err(|_| invalid())?),
            FieldKind::Boolean => match raw.trim() {
                "true" => FilterValue::Boolean(true),
                "false" => FilterValue::Boolean(false),
                _ => return Err(invalid()),
            },
            FieldKind::Timestamp => {
                FilterValue::Timestamp(parse_timestamp(raw.trim()).ok_or_else(invalid)?)
            }
            FieldKind::Uuid => FilterValue::Uuid(Uuid::parse_str(raw.trim()).map_err(|_| invalid())?),
        };

        Ok(value)
    }
}

/// Queryable
///
/// Implemented by every record type that can be listed through the pipeline.
pub trait Queryable {
    /// Human name used in error messages.
    const RESOURCE: &'static str;
    const FIELDS: &'static [FieldSpec];
    /// Order applied when the request carries no usable `sort` parameter.
    const DEFAULT_SORT: (&'static str, SortDirection);
    /// Fields hidden from responses unless explicitly requested via `fields`.
    const INTERNAL_FIELDS: &'static [&'static str];

    fn field(name: &str) -> Option<&'static FieldSpec> {
        Self::FIELDS.iter().find(|spec| spec.name == name)
    }
}

// --- Descriptor parts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparator {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "eq" => Some(Comparator::Eq),
            "gt" => Some(Comparator::Gt),
            "gte" => Some(Comparator::Gte),
            "lt" => Some(Comparator::Lt),
            "lte" => Some(Comparator::Lte),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
        }
    }

    /// Whether `stored.cmp(requested)` satisfies this comparator.
    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Comparator::Eq => ordering == Ordering::Equal,
            Comparator::Gt => ordering == Ordering::Greater,
            Comparator::Gte => ordering != Ordering::Less,
            Comparator::Lt => ordering == Ordering::Less,
            Comparator::Lte => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl FilterValue {
    /// Orders a stored JSON value against this requested value. `None` when
    /// the stored value has an incompatible shape.
    fn compare_stored(&self, stored: &Value) -> Option<Ordering> {
        match self {
            FilterValue::Text(v) => Some(stored.as_str()?.cmp(v.as_str())),
            FilterValue::Integer(v) => stored.as_f64()?.partial_cmp(&(*v as f64)),
            FilterValue::Number(v) => stored.as_f64()?.partial_cmp(v),
            FilterValue::Boolean(v) => Some(stored.as_bool()?.cmp(v)),
            FilterValue::Timestamp(v) => Some(parse_timestamp(stored.as_str()?)?.cmp(v)),
            FilterValue::Uuid(v) => Some(Uuid::parse_str(stored.as_str()?).ok()?.cmp(v)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub field: &'static FieldSpec,
    pub comparator: Comparator,
    pub value: FilterValue,
}

impl FilterClause {
    fn matches(&self, document: &Value) -> bool {
        match document.get(self.field.name) {
            Some(stored) if !stored.is_null() => self
                .value
                .compare_stored(stored)
                .is_some_and(|ordering| self.comparator.accepts(ordering)),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC NULLS FIRST",
            SortDirection::Descending => "DESC NULLS LAST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static FieldSpec,
    pub direction: SortDirection,
}

/// Which fields survive into the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Everything except the listed internal fields.
    Exclude(&'static [&'static str]),
    /// Exactly these fields (`id` is always kept).
    Only(Vec<&'static str>),
}

impl Projection {
    pub fn apply(&self, document: Value) -> Value {
        match (self, document) {
            (Projection::Exclude(hidden), Value::Object(mut map)) => {
                for field in hidden.iter() {
                    map.remove(*field);
                }
                Value::Object(map)
            }
            (Projection::Only(kept), Value::Object(map)) => Value::Object(
                map.into_iter()
                    .filter(|(key, _)| kept.iter().any(|field| field == key))
                    .collect(),
            ),
            (_, other) => other,
        }
    }
}

// --- Descriptor ---

/// QueryDescriptor
///
/// The validated, store-agnostic form of a list request for records of type `R`.
pub struct QueryDescriptor<R> {
    pub filters: Vec<FilterClause>,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub page: u32,
    pub limit: u32,
    record: PhantomData<fn() -> R>,
}

impl<R: Queryable> QueryDescriptor<R> {
    /// An unconstrained descriptor: no filters, no ordering, default page window.
    pub fn unconstrained() -> Self {
        Self {
            filters: Vec::new(),
            sort: Vec::new(),
            projection: Projection::Exclude(R::INTERNAL_FIELDS),
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            record: PhantomData,
        }
    }

    /// Builds the full filter → sort → project → paginate chain from raw parameters.
    pub fn from_params(params: &[(String, String)]) -> AppResult<Self> {
        Ok(QueryFeatures::new(params)
            .filter()?
            .sort()
            .limit_fields()
            .paginate()
            .into_descriptor())
    }
}

impl<R> QueryDescriptor<R> {
    pub fn skip(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.filters.iter().all(|clause| clause.matches(document))
    }

    /// Composite ordering: first key decides, later keys break ties.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for key in &self.sort {
            let ordering = compare_documents(key.field, a, b);
            let ordering = match key.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Applies filter, order and page window to an in-process record set.
    /// Projection is left to the caller since it changes the output shape.
    pub fn evaluate(&self, records: &[R]) -> Result<Vec<R>, serde_json::Error>
    where
        R: Serialize + Clone,
    {
        let mut documents = records
            .iter()
            .map(|record| serde_json::to_value(record).map(|document| (document, record)))
            .collect::<Result<Vec<_>, _>>()?;

        documents.retain(|(document, _)| self.matches(document));
        documents.sort_by(|(a, _), (b, _)| self.compare(a, b));

        let skip = usize::try_from(self.skip()).unwrap_or(usize::MAX);
        Ok(documents
            .into_iter()
            .skip(skip)
            .take(self.limit as usize)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

impl<R> Clone for QueryDescriptor<R> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            sort: self.sort.clone(),
            projection: self.projection.clone(),
            page: self.page,
            limit: self.limit,
            record: PhantomData,
        }
    }
}

impl<R> PartialEq for QueryDescriptor<R> {
    fn eq(&self, other: &Self) -> bool {
        self.filters == other.filters
            && self.sort == other.sort
            && self.projection == other.projection
            && self.page == other.page
            && self.limit == other.limit
    }
}

impl<R> fmt::Debug for QueryDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDescriptor")
            .field("filters", &self.filters)
            .field("sort", &self.sort)
            .field("projection", &self.projection)
            .field("page", &self.page)
            .field("limit", &self.limit)
            .finish()
    }
}

// --- Builder ---

/// QueryFeatures
///
/// Chainable builder over request parameters. Each step reads only its own
/// parameters and refines the descriptor built so far.
pub struct QueryFeatures<'a, R> {
    params: &'a [(String, String)],
    descriptor: QueryDescriptor<R>,
}

impl<'a, R: Queryable> QueryFeatures<'a, R> {
    pub fn new(params: &'a [(String, String)]) -> Self {
        Self {
            params,
            descriptor: QueryDescriptor::unconstrained(),
        }
    }

    /// Last occurrence wins for repeated single-valued parameters.
    fn param(&self, name: &str) -> Option<&'a str> {
        self.params
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Maps every non-reserved parameter to a constraint. `amount[gte]=1000`
    /// becomes a range bound, a bare `name=Ann` an equality.
    pub fn filter(mut self) -> AppResult<Self> {
        for (key, raw) in self.params {
            if RESERVED_PARAMS.contains(&key.as_str()) {
                continue;
            }

            let (name, comparator) = split_operator(key)?;
            let field = R::field(name).ok_or_else(|| {
                AppError::Validation(format!(
                    "`{name}` is not a filterable {} field",
                    R::RESOURCE
                ))
            })?;

            self.descriptor.filters.push(FilterClause {
                field,
                comparator,
                value: field.parse_value(raw)?,
            });
        }

        Ok(self)
    }

    /// `sort=-amount,name` orders by amount descending, then name ascending.
    pub fn sort(mut self) -> Self {
        let mut keys: Vec<SortKey> = Vec::new();

        for token in self.param("sort").unwrap_or_default().split(',') {
            let token = token.trim();
            let (name, direction) = match token.strip_prefix('-') {
                Some(name) => (name, SortDirection::Descending),
                None => (token, SortDirection::Ascending),
            };
            if name.is_empty() {
                continue;
            }

            match R::field(name) {
                Some(field) if !keys.iter().any(|key| key.field == field) => {
                    keys.push(SortKey { field, direction })
                }
                Some(_) => {}
                None => tracing::debug!(field = name, "ignoring unknown sort field"),
            }
        }

        if keys.is_empty() {
            let (name, direction) = R::DEFAULT_SORT;
            keys.extend(R::field(name).map(|field| SortKey { field, direction }));
        }

        self.descriptor.sort = keys;
        self
    }

    /// `fields=name,amount` restricts the response to those fields plus `id`.
    pub fn limit_fields(mut self) -> Self {
        let mut kept: Vec<&'static str> = Vec::new();

        for name in self.param("fields").unwrap_or_default().split(',') {
            match R::field(name.trim()) {
                Some(field) if !kept.contains(&field.name) => kept.push(field.name),
                Some(_) => {}
                None if name.trim().is_empty() => {}
                None => tracing::debug!(field = name, "ignoring unknown projected field"),
            }
        }

        self.descriptor.projection = if kept.is_empty() {
            Projection::Exclude(R::INTERNAL_FIELDS)
        } else {
            if !kept.contains(&"id") {
                kept.insert(0, "id");
            }
            Projection::Only(kept)
        };
        self
    }

    /// Missing, zero, negative or non-numeric values fall back to the defaults.
    pub fn paginate(mut self) -> Self {
        self.descriptor.page = positive_or(self.param("page"), DEFAULT_PAGE);
        self.descriptor.limit = positive_or(self.param("limit"), DEFAULT_LIMIT);
        self
    }

    pub fn into_descriptor(self) -> QueryDescriptor<R> {
        self.descriptor
    }
}

// --- Helpers ---

fn split_operator(key: &str) -> AppResult<(&str, Comparator)> {
    let Some((name, rest)) = key.split_once('[') else {
        return Ok((key, Comparator::Eq));
    };

    rest.strip_suffix(']')
        .and_then(Comparator::parse)
        .map(|comparator| (name, comparator))
        .ok_or_else(|| AppError::Validation(format!("Unsupported filter operator in `{key}`")))
}

fn positive_or(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Missing and null sort before any present value.
fn compare_documents(field: &FieldSpec, a: &Value, b: &Value) -> Ordering {
    let a = a.get(field.name).filter(|value| !value.is_null());
    let b = b.get(field.name).filter(|value| !value.is_null());

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match field.kind {
            FieldKind::Integer | FieldKind::Number => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
            FieldKind::Boolean => a.as_bool().cmp(&b.as_bool()),
            FieldKind::Timestamp => a
                .as_str()
                .and_then(parse_timestamp)
                .cmp(&b.as_str().and_then(parse_timestamp)),
            FieldKind::Text | FieldKind::Uuid => a.as_str().cmp(&b.as_str()),
        },
    }
}
