use crate::errors::{Result, SearchError};
use crate::fields::{self, FieldKind};
use crate::params::{SortOrder, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MAX_RESULT_WINDOW};
use crate::query::{self, SearchQuery};
use serde::Deserialize;
use serde_json::json;

const SIMILARITY_SCRIPT: &str = "cosineSimilarity(params.queryVector, doc.ldaVector)";

/// Input to the vector-similarity strategy. Arrives as a JSON request
/// body rather than a query string; vectors do not fit in one.
#[derive(Debug, Clone, Deserialize)]
pub struct SimilarityParams {
    pub vector: Vec<f64>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl SimilarityParams {
    /// Apply the validator's pagination rules: positive page, clamped
    /// page_size, bounded result window. Also rejects an empty vector
    /// and any sort the strategy cannot express.
    pub fn normalized(mut self) -> Result<Self> {
        if self.vector.is_empty() {
            return Err(SearchError::validation("vector", "must not be empty"));
        }
        if self.page < 1 {
            return Err(SearchError::validation("page", "must be a positive integer"));
        }
        self.page_size = self.page_size.min(MAX_PAGE_SIZE);
        if self.page_size < 1 {
            return Err(SearchError::validation(
                "page_size",
                "must be a positive integer",
            ));
        }
        if u64::from(self.page) * u64::from(self.page_size) > u64::from(MAX_RESULT_WINDOW) {
            return Err(SearchError::validation(
                "page",
                format!("page * page_size must not exceed {}", MAX_RESULT_WINDOW),
            ));
        }
        if let Some(sort_by) = &self.sort_by {
            let desc = fields::describe(sort_by).ok_or_else(|| {
                SearchError::validation("sort_by", format!("'{}' is not a sortable field", sort_by))
            })?;
            if desc.kind == FieldKind::GeoPoint {
                return Err(SearchError::validation(
                    "sort_by",
                    "geo-distance sort is not supported for similarity queries",
                ));
            }
        }
        Ok(self)
    }
}

impl SearchQuery {
    /// Compile a similarity-ranking query: a `script_score` wrapper
    /// over `match_all`, scored by cosine similarity between the
    /// supplied vector and the per-document vector field. Same body
    /// shape as [`SearchQuery::matching`], different match clause.
    pub fn similarity(params: &SimilarityParams) -> Result<Self> {
        let sort = match &params.sort_by {
            Some(sort_by) => query::single_field_sort(sort_by, params.sort_order)?,
            None => json!([
                { "_score": { "order": "desc" } },
                { "id": { "order": "asc" } },
            ]),
        };
        let mut body = json!({
            "query": {
                "script_score": {
                    "query": { "match_all": {} },
                    "script": {
                        "source": SIMILARITY_SCRIPT,
                        "params": { "queryVector": params.vector },
                    }
                }
            },
            "sort": sort,
            "from": (params.page - 1) * params.page_size,
            "size": params.page_size,
        });
        if let Some(source) = &params.fields {
            body["_source"] = json!(source);
        }
        Ok(SearchQuery { body })
    }
}
