use crate::errors::{Result, SearchError};
use crate::fields::{self, FieldDescriptor, FieldKind};
use crate::params::{SearchParams, SortOrder};
use serde_json::{json, Map, Value};

/// A compiled Elasticsearch request body. Opaque beyond its JSON
/// shape; built once per request and handed to the transport for
/// serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub body: Value,
}

impl SearchQuery {
    /// Compile a term-match query from a validated parameter set.
    ///
    /// Pure function of its input and the static field taxonomy. The
    /// only failure is an unresolvable facet field name, which is a
    /// deferred validation error.
    pub fn matching(params: &SearchParams) -> Result<Self> {
        let mut body = json!({
            "query": match_clause(params)?,
            "sort": sort_clause(params)?,
            "from": (params.page - 1) * params.page_size,
            "size": params.page_size,
        });
        if let Some(source) = &params.fields {
            body["_source"] = json!(source);
        }
        if let Some(facets) = &params.facets {
            body["aggs"] = facets_clause(facets)?;
        }
        Ok(SearchQuery { body })
    }
}

fn match_clause(params: &SearchParams) -> Result<Value> {
    if params.q.is_none() && params.constraints.is_empty() {
        return Ok(json!({ "match_all": {} }));
    }
    let mut must: Vec<Value> = Vec::new();
    if let Some(q) = &params.q {
        must.push(json!({
            "query_string": {
                "query": q,
                "fields": fields::boosted_fields(),
                "default_operator": "AND",
                "lenient": true,
            }
        }));
    }
    for (name, value) in &params.constraints {
        let desc = fields::describe(name).ok_or_else(|| {
            SearchError::Internal(format!("no descriptor for constraint field '{}'", name))
        })?;
        must.push(json!({
            "query_string": {
                "query": value,
                "fields": [field_reference(desc, params.exact_field_match)],
            }
        }));
    }
    Ok(json!({ "bool": { "must": must } }))
}

/// Resolve a single-field reference: the `.not_analyzed` sibling when
/// exact matching is in effect (boost omitted), otherwise the boosted
/// or bare name.
pub fn field_reference(desc: &FieldDescriptor, exact_field_match: bool) -> String {
    if exact_field_match {
        if let Some(sibling) = desc.exact_sibling() {
            return sibling;
        }
    }
    desc.boosted_name()
}

fn default_sort() -> Value {
    json!([
        { "_score": { "order": "desc" } },
        { "id": { "order": "asc" } },
    ])
}

/// Sort entry for a named field followed by a `_score` tiebreak.
/// Analyzed text sorts through its `.not_analyzed` sibling; sorting on
/// tokenized text is not meaningful.
pub(crate) fn single_field_sort(sort_by: &str, order: SortOrder) -> Result<Value> {
    let desc = fields::describe(sort_by)
        .ok_or_else(|| SearchError::Internal(format!("no descriptor for sort field '{}'", sort_by)))?;
    let key = desc.exact_sibling().unwrap_or_else(|| desc.name.to_string());
    let mut entry = Map::new();
    entry.insert(key, json!({ "order": order.as_str() }));
    Ok(json!([entry, { "_score": { "order": "desc" } }]))
}

fn sort_clause(params: &SearchParams) -> Result<Value> {
    let Some(sort_by) = &params.sort_by else {
        return Ok(default_sort());
    };
    let desc = fields::describe(sort_by)
        .ok_or_else(|| SearchError::Internal(format!("no descriptor for sort field '{}'", sort_by)))?;
    if desc.kind == FieldKind::GeoPoint {
        // Validation guarantees a pin accompanies a geo sort. No
        // secondary tiebreak in this branch.
        let pin = params.sort_by_pin.as_deref().ok_or_else(|| {
            SearchError::Internal("geo sort without a pin survived validation".to_string())
        })?;
        let mut geo = Map::new();
        geo.insert(desc.name.to_string(), json!(pin));
        geo.insert("order".to_string(), json!(params.sort_order.as_str()));
        geo.insert("unit".to_string(), json!("mi"));
        return Ok(json!([{ "_geo_distance": geo }]));
    }
    single_field_sort(sort_by, params.sort_order)
}

/// Aggregation key for a facet spec: the field name without any
/// trailing `:origin` qualifier.
pub fn clean_facet_name(spec: &str) -> &str {
    spec.split(':').next().unwrap_or(spec)
}

fn facets_clause(facets: &[String]) -> Result<Value> {
    let mut aggs = Map::new();
    for spec in facets {
        aggs.insert(clean_facet_name(spec).to_string(), facet_for(spec)?);
    }
    Ok(Value::Object(aggs))
}

/// Per-field aggregation, dispatched on the field's taxonomy kind.
/// Facet names are resolved here, at compile time, so an unknown name
/// surfaces as a bad request when the query is built.
fn facet_for(spec: &str) -> Result<Value> {
    let name = clean_facet_name(spec);
    let desc = fields::describe(name).ok_or_else(|| {
        SearchError::validation("facets", format!("'{}' is not a facetable field", name))
    })?;
    match desc.kind {
        FieldKind::Date => Ok(json!({
            "date_histogram": {
                "field": name,
                "interval": "year",
                "min_doc_count": 2,
                "order": { "_key": "desc" },
            }
        })),
        FieldKind::GeoPoint => {
            let parts: Vec<&str> = spec.split(':').collect();
            let origin = match parts.as_slice() {
                [_, lat, lon]
                    if lat.parse::<f64>().is_ok() && lon.parse::<f64>().is_ok() =>
                {
                    format!("{},{}", lat, lon)
                }
                _ => {
                    return Err(SearchError::validation(
                        "facets",
                        format!("'{}' must be given as '{}:<lat>:<lon>'", name, name),
                    ))
                }
            };
            Ok(json!({
                "geo_distance": {
                    "field": name,
                    "origin": origin,
                    "unit": "mi",
                    "ranges": distance_ranges(),
                }
            }))
        }
        FieldKind::Text => {
            let sibling = desc.exact_sibling().ok_or_else(|| {
                SearchError::Internal(format!("text field '{}' has no exact sibling", name))
            })?;
            Ok(json!({ "terms": { "field": sibling } }))
        }
        FieldKind::Keyword => Ok(json!({ "terms": { "field": name } })),
    }
}

// 21 closed buckets of 100 miles, then an open-ended tail.
fn distance_ranges() -> Vec<Value> {
    let mut ranges: Vec<Value> = (0..21)
        .map(|i| json!({ "from": i * 100, "to": i * 100 + 99 }))
        .collect();
    ranges.push(json!({ "from": 2100 }));
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::validate;
    use std::collections::BTreeMap;

    fn compiled(pairs: &[(&str, &str)]) -> SearchQuery {
        let raw: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SearchQuery::matching(&validate(&raw).unwrap()).unwrap()
    }

    #[test]
    fn produces_match_all_for_no_query_terms() {
        let sq = compiled(&[]);
        assert!(sq.body["query"].get("match_all").is_some());
        assert!(sq.body["query"].get("bool").is_none());
    }

    #[test]
    fn produces_bool_query_for_query_terms() {
        let sq = compiled(&[("q", "test")]);
        assert!(sq.body["query"].get("bool").is_some());
        assert!(sq.body["query"].get("match_all").is_none());
    }

    #[test]
    fn q_clause_hits_all_boosted_fields() {
        let sq = compiled(&[("q", "test")]);
        let got: Vec<&str> = sq.body["query"]["bool"]["must"][0]["query_string"]["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        let mut got_sorted = got.clone();
        got_sorted.sort();
        let mut want = vec![
            "sourceResource.title^2",
            "sourceResource.description^0.75",
            "sourceResource.subject.name^1",
            "sourceResource.collection.title^1",
            "sourceResource.collection.description^1",
            "sourceResource.contributor^1",
            "sourceResource.creator^1",
            "sourceResource.extent^1",
            "sourceResource.format^1",
            "sourceResource.language.name^1",
            "sourceResource.publisher^1",
            "sourceResource.relation^1",
            "sourceResource.spatial.name^1",
            "sourceResource.specType^1",
            "sourceResource.type^1",
            "dataProvider^1",
            "intermediateProvider^1",
            "provider.name^1",
        ];
        want.sort();
        assert_eq!(got_sorted, want);
    }

    #[test]
    fn has_source_clause_for_fields_param() {
        let sq = compiled(&[("fields", "id")]);
        assert_eq!(sq.body["_source"], serde_json::json!(["id"]));
    }

    #[test]
    fn handles_match_all_with_source() {
        let sq = compiled(&[("fields", "id")]);
        assert!(sq.body["query"].get("match_all").is_some());
        assert!(sq.body.get("_source").is_some());
    }

    #[test]
    fn handles_bool_with_source() {
        let sq = compiled(&[("provider.name", "test"), ("fields", "id")]);
        assert!(sq.body["query"].get("bool").is_some());
        assert!(sq.body.get("_source").is_some());
    }

    #[test]
    fn field_reference_appends_boost() {
        let desc = fields::describe("sourceResource.title").unwrap();
        assert_eq!(field_reference(desc, false), "sourceResource.title^2");
    }

    #[test]
    fn field_reference_bare_without_boost() {
        let desc = fields::describe("hasView.@id").unwrap();
        assert_eq!(field_reference(desc, false), "hasView.@id");
    }

    #[test]
    fn field_reference_uses_sibling_for_exact_match() {
        let desc = fields::describe("dataProvider").unwrap();
        assert_eq!(field_reference(desc, true), "dataProvider.not_analyzed");
    }

    #[test]
    fn constraint_clause_targets_the_sibling_under_exact_match() {
        let sq = compiled(&[("dataProvider", "x"), ("exact_field_match", "true")]);
        let fields = &sq.body["query"]["bool"]["must"][0]["query_string"]["fields"];
        assert_eq!(fields, &serde_json::json!(["dataProvider.not_analyzed"]));
    }

    #[test]
    fn has_size_and_from() {
        let sq = compiled(&[]);
        assert!(sq.body.get("size").is_some());
        assert!(sq.body.get("from").is_some());
    }

    #[test]
    fn from_is_calculated_from_page_and_page_size() {
        assert_eq!(compiled(&[]).body["from"], 0);
        let sq = compiled(&[("page", "2"), ("page_size", "2")]);
        assert_eq!(sq.body["from"], 2);
        assert_eq!(sq.body["size"], 2);
    }

    #[test]
    fn has_correct_default_sort() {
        let sq = compiled(&[]);
        assert_eq!(
            sq.body["sort"],
            serde_json::json!([
                { "_score": { "order": "desc" } },
                { "id": { "order": "asc" } },
            ])
        );
    }

    #[test]
    fn sorts_by_requested_field_with_score_tiebreak() {
        let sq = compiled(&[("sort_by", "sourceResource.type")]);
        assert_eq!(
            sq.body["sort"],
            serde_json::json!([
                { "sourceResource.type.not_analyzed": { "order": "asc" } },
                { "_score": { "order": "desc" } },
            ])
        );
    }

    #[test]
    fn sorts_keyword_fields_directly() {
        let sq = compiled(&[("sort_by", "id"), ("sort_order", "desc")]);
        assert_eq!(
            sq.body["sort"],
            serde_json::json!([
                { "id": { "order": "desc" } },
                { "_score": { "order": "desc" } },
            ])
        );
    }

    #[test]
    fn does_geo_distance_sort_without_tiebreak() {
        let sq = compiled(&[
            ("sort_by", "sourceResource.spatial.coordinates"),
            ("sort_by_pin", "26.15952,-97.99084"),
        ]);
        assert_eq!(
            sq.body["sort"],
            serde_json::json!([
                {
                    "_geo_distance": {
                        "sourceResource.spatial.coordinates": "26.15952,-97.99084",
                        "order": "asc",
                        "unit": "mi",
                    }
                }
            ])
        );
    }

    #[test]
    fn clean_facet_name_strips_origin_qualifier() {
        assert_eq!(clean_facet_name("x:y:z"), "x");
        assert_eq!(clean_facet_name("dataProvider"), "dataProvider");
    }

    #[test]
    fn adds_aggs_for_facets_param() {
        let sq = compiled(&[("facets", "provider.name")]);
        assert!(sq.body.get("aggs").is_some());
    }

    #[test]
    fn facets_clause_keys_by_cleaned_name() {
        let sq = compiled(&[(
            "facets",
            "dataProvider,sourceResource.spatial.coordinates:40.9:-73.8",
        )]);
        let aggs = sq.body["aggs"].as_object().unwrap();
        assert!(aggs.contains_key("dataProvider"));
        assert!(aggs.contains_key("sourceResource.spatial.coordinates"));
    }

    #[test]
    fn facet_on_keyword_field_is_plain_terms() {
        assert_eq!(
            facet_for("hasView.@id").unwrap(),
            serde_json::json!({ "terms": { "field": "hasView.@id" } })
        );
    }

    #[test]
    fn facet_on_text_field_uses_the_sibling() {
        assert_eq!(
            facet_for("intermediateProvider").unwrap(),
            serde_json::json!({ "terms": { "field": "intermediateProvider.not_analyzed" } })
        );
    }

    #[test]
    fn facet_on_date_field_is_a_year_histogram() {
        assert_eq!(
            facet_for("sourceResource.date.begin").unwrap(),
            serde_json::json!({
                "date_histogram": {
                    "field": "sourceResource.date.begin",
                    "interval": "year",
                    "min_doc_count": 2,
                    "order": { "_key": "desc" },
                }
            })
        );
    }

    #[test]
    fn facet_on_coordinates_builds_the_distance_ladder() {
        let spec = "sourceResource.spatial.coordinates:40.941258:-73.864468";
        let ranges: Vec<Value> = vec![
            json!({"from": 0, "to": 99}),
            json!({"from": 100, "to": 199}),
            json!({"from": 200, "to": 299}),
            json!({"from": 300, "to": 399}),
            json!({"from": 400, "to": 499}),
            json!({"from": 500, "to": 599}),
            json!({"from": 600, "to": 699}),
            json!({"from": 700, "to": 799}),
            json!({"from": 800, "to": 899}),
            json!({"from": 900, "to": 999}),
            json!({"from": 1000, "to": 1099}),
            json!({"from": 1100, "to": 1199}),
            json!({"from": 1200, "to": 1299}),
            json!({"from": 1300, "to": 1399}),
            json!({"from": 1400, "to": 1499}),
            json!({"from": 1500, "to": 1599}),
            json!({"from": 1600, "to": 1699}),
            json!({"from": 1700, "to": 1799}),
            json!({"from": 1800, "to": 1899}),
            json!({"from": 1900, "to": 1999}),
            json!({"from": 2000, "to": 2099}),
            json!({"from": 2100}),
        ];
        assert_eq!(
            facet_for(spec).unwrap(),
            serde_json::json!({
                "geo_distance": {
                    "field": "sourceResource.spatial.coordinates",
                    "origin": "40.941258,-73.864468",
                    "unit": "mi",
                    "ranges": ranges,
                }
            })
        );
    }

    #[test]
    fn facet_on_coordinates_without_origin_fails() {
        let err = facet_for("sourceResource.spatial.coordinates").unwrap_err();
        assert!(matches!(err, SearchError::Validation { field, .. } if field == "facets"));
    }

    #[test]
    fn facet_on_unknown_field_fails_at_compile_time() {
        // Validation is lazy: the bad name passes the parameter
        // validator and fails when the query is built.
        let raw: BTreeMap<String, String> =
            [("facets".to_string(), "notAField".to_string())].into();
        let params = validate(&raw).unwrap();
        let err = SearchQuery::matching(&params).unwrap_err();
        assert!(matches!(err, SearchError::Validation { field, .. } if field == "facets"));
    }

    #[test]
    fn compilation_is_idempotent() {
        let raw: BTreeMap<String, String> = [
            ("q".to_string(), "test".to_string()),
            ("facets".to_string(), "dataProvider".to_string()),
            ("sort_by".to_string(), "sourceResource.title".to_string()),
        ]
        .into();
        let params = validate(&raw).unwrap();
        let a = SearchQuery::matching(&params).unwrap();
        let b = SearchQuery::matching(&params).unwrap();
        assert_eq!(a, b);
    }
}
