use crate::errors::{Result, SearchError};
use crate::fields::{self, FieldKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 500;
/// Deepest offset the backend will serve; `page * page_size` past this
/// is rejected rather than forwarded.
pub const MAX_RESULT_WINDOW: u32 = 50_000;

const MIN_QUERY_LEN: usize = 2;

/// Parameter names that are not per-field constraints. Anything else
/// must resolve in the field taxonomy or the request is rejected.
const CONTROL_PARAMS: &[&str] = &[
    "q",
    "fields",
    "page",
    "page_size",
    "sort_by",
    "sort_order",
    "sort_by_pin",
    "facets",
    "exact_field_match",
];

/// Constraint fields whose values must be URL-shaped.
const URL_PARAMS: &[&str] = &["rights", "sourceResource.rights"];

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[-a-zA-Z0-9_.:/@%~?&=#]+$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// A validated, typed search request. Constructed once per request by
/// [`validate`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub q: Option<String>,
    /// Per-field constraints, keyed by taxonomy field name.
    pub constraints: BTreeMap<String, String>,
    pub exact_field_match: bool,
    /// `_source` projection, in the order given.
    pub fields: Option<Vec<String>>,
    pub page: u32,
    pub page_size: u32,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    /// `"lat,lon"` origin for geo-distance sorting.
    pub sort_by_pin: Option<String>,
    /// Facet specs as given (geo facets keep their `:lat:lon` tail);
    /// resolved against the taxonomy at compile time.
    pub facets: Option<Vec<String>>,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            q: None,
            constraints: BTreeMap::new(),
            exact_field_match: false,
            fields: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: None,
            sort_order: SortOrder::Asc,
            sort_by_pin: None,
            facets: None,
        }
    }
}

/// Validate a raw querystring parameter map into a [`SearchParams`].
///
/// Fails on the first violated constraint. Control parameters are
/// checked in a fixed order, then the remaining keys are resolved as
/// field constraints in map (lexicographic) order, so the reported
/// field is deterministic for any given input.
pub fn validate(raw: &BTreeMap<String, String>) -> Result<SearchParams> {
    let mut out = SearchParams::default();

    if let Some(q) = raw.get("q") {
        if q.chars().count() < MIN_QUERY_LEN {
            return Err(SearchError::validation(
                "q",
                format!("must be at least {} characters", MIN_QUERY_LEN),
            ));
        }
        out.q = Some(q.clone());
    }

    if let Some(v) = raw.get("page") {
        out.page = parse_positive("page", v)?;
    }
    if let Some(v) = raw.get("page_size") {
        // Oversized page_size clamps instead of failing. Not ideal,
        // but it is what the API has always done.
        out.page_size = parse_positive("page_size", v)?.min(MAX_PAGE_SIZE);
    }
    if u64::from(out.page) * u64::from(out.page_size) > u64::from(MAX_RESULT_WINDOW) {
        return Err(SearchError::validation(
            "page",
            format!("page * page_size must not exceed {}", MAX_RESULT_WINDOW),
        ));
    }

    if let Some(v) = raw.get("sort_order") {
        out.sort_order = match v.as_str() {
            "asc" => SortOrder::Asc,
            "desc" => SortOrder::Desc,
            _ => {
                return Err(SearchError::validation(
                    "sort_order",
                    "must be 'asc' or 'desc'",
                ))
            }
        };
    }

    if let Some(pin) = raw.get("sort_by_pin") {
        parse_coordinates("sort_by_pin", pin)?;
        out.sort_by_pin = Some(pin.clone());
    }

    if let Some(sort_by) = raw.get("sort_by") {
        let desc = fields::describe(sort_by).ok_or_else(|| {
            SearchError::validation("sort_by", format!("'{}' is not a sortable field", sort_by))
        })?;
        if desc.kind == FieldKind::GeoPoint && out.sort_by_pin.is_none() {
            return Err(SearchError::validation(
                "sort_by",
                format!("sorting by '{}' requires sort_by_pin", sort_by),
            ));
        }
        out.sort_by = Some(sort_by.clone());
    }

    if let Some(v) = raw.get("exact_field_match") {
        out.exact_field_match = match v.as_str() {
            "true" => true,
            "false" => false,
            _ => {
                return Err(SearchError::validation(
                    "exact_field_match",
                    "must be 'true' or 'false'",
                ))
            }
        };
    }

    if let Some(v) = raw.get("fields") {
        out.fields = Some(split_csv(v));
    }
    if let Some(v) = raw.get("facets") {
        out.facets = Some(split_csv(v));
    }

    for (name, value) in raw {
        if CONTROL_PARAMS.contains(&name.as_str()) {
            continue;
        }
        if fields::describe(name).is_none() {
            return Err(SearchError::validation(name, "unrecognized parameter"));
        }
        if URL_PARAMS.contains(&name.as_str()) && !URL_PATTERN.is_match(value) {
            return Err(SearchError::validation(name, "must be a URL"));
        }
        out.constraints.insert(name.clone(), value.clone());
    }

    Ok(out)
}

fn parse_positive(field: &str, value: &str) -> Result<u32> {
    match value.parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(SearchError::validation(
            field,
            "must be a positive integer",
        )),
    }
}

/// Check that a pin parses as `"<lat>,<lon>"`.
pub(crate) fn parse_coordinates(field: &str, value: &str) -> Result<(f64, f64)> {
    let mut parts = value.splitn(2, ',');
    let lat = parts.next().and_then(|s| s.trim().parse::<f64>().ok());
    let lon = parts.next().and_then(|s| s.trim().parse::<f64>().ok());
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok((lat, lon)),
        _ => Err(SearchError::validation(field, "must be '<lat>,<lon>'")),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value.split(',').map(str::to_string).collect()
}
