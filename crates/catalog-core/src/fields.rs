use once_cell::sync::Lazy;
use std::collections::HashMap;

/// The catalog's geo-coordinate field; the only field that sorts by
/// geo distance and facets into distance buckets.
pub const COORDINATES_FIELD: &str = "sourceResource.spatial.coordinates";

/// Index mapping type of a catalog field. Drives match weighting,
/// sort-field substitution, and aggregation shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Exact-match field, usable directly for terms aggregations.
    Keyword,
    /// Tokenized text; sorting and faceting go through the
    /// `.not_analyzed` sibling.
    Text,
    Date,
    GeoPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Relative weight in the multi-field text match. Only analyzed
    /// text fields carry one.
    pub boost: Option<f32>,
}

impl FieldDescriptor {
    /// The unsegmented sibling index of an analyzed text field.
    pub fn exact_sibling(&self) -> Option<String> {
        match self.kind {
            FieldKind::Text => Some(format!("{}.not_analyzed", self.name)),
            _ => None,
        }
    }

    /// Field reference for a query_string clause: `name^boost` when a
    /// boost is registered, the bare name otherwise.
    pub fn boosted_name(&self) -> String {
        match self.boost {
            Some(b) => format!("{}^{}", self.name, b),
            None => self.name.to_string(),
        }
    }
}

// Fixed taxonomy. Declaration order is the order boosted field lists
// are emitted in.
const TABLE: &[FieldDescriptor] = &[
    FieldDescriptor { name: "sourceResource.title", kind: FieldKind::Text, boost: Some(2.0) },
    FieldDescriptor { name: "sourceResource.description", kind: FieldKind::Text, boost: Some(0.75) },
    FieldDescriptor { name: "sourceResource.subject.name", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "sourceResource.collection.title", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "sourceResource.collection.description", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "sourceResource.contributor", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "sourceResource.creator", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "sourceResource.extent", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "sourceResource.format", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "sourceResource.language.name", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "sourceResource.publisher", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "sourceResource.relation", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "sourceResource.spatial.name", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "sourceResource.specType", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "sourceResource.type", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "dataProvider", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "intermediateProvider", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "provider.name", kind: FieldKind::Text, boost: Some(1.0) },
    FieldDescriptor { name: "id", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "@id", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "hasView.@id", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "hasView.format", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "isPartOf.@id", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "isShownAt", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "object", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "provider.@id", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "rights", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "sourceResource.identifier", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "sourceResource.rights", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "sourceResource.subject.@id", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "sourceResource.language.iso639_3", kind: FieldKind::Keyword, boost: None },
    FieldDescriptor { name: "sourceResource.date.begin", kind: FieldKind::Date, boost: None },
    FieldDescriptor { name: COORDINATES_FIELD, kind: FieldKind::GeoPoint, boost: None },
];

static FIELDS: Lazy<HashMap<&'static str, &'static FieldDescriptor>> =
    Lazy::new(|| TABLE.iter().map(|d| (d.name, d)).collect());

/// Look up a field descriptor by its exact, case-sensitive name.
pub fn describe(name: &str) -> Option<&'static FieldDescriptor> {
    FIELDS.get(name).copied()
}

/// All boosted field references for the free-text multi-field match,
/// in taxonomy order.
pub fn boosted_fields() -> Vec<String> {
    TABLE
        .iter()
        .filter(|d| d.boost.is_some())
        .map(FieldDescriptor::boosted_name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_finds_known_fields() {
        assert_eq!(describe("dataProvider").unwrap().kind, FieldKind::Text);
        assert_eq!(describe("hasView.@id").unwrap().kind, FieldKind::Keyword);
        assert_eq!(
            describe("sourceResource.date.begin").unwrap().kind,
            FieldKind::Date
        );
        assert_eq!(describe(COORDINATES_FIELD).unwrap().kind, FieldKind::GeoPoint);
    }

    #[test]
    fn describe_is_exact_and_case_sensitive() {
        assert!(describe("DataProvider").is_none());
        assert!(describe("sourceResource").is_none());
        assert!(describe("sourceResource.title.not_analyzed").is_none());
    }

    #[test]
    fn boosted_name_formats_weights() {
        assert_eq!(
            describe("sourceResource.title").unwrap().boosted_name(),
            "sourceResource.title^2"
        );
        assert_eq!(
            describe("sourceResource.description").unwrap().boosted_name(),
            "sourceResource.description^0.75"
        );
        assert_eq!(describe("dataProvider").unwrap().boosted_name(), "dataProvider^1");
        assert_eq!(describe("hasView.@id").unwrap().boosted_name(), "hasView.@id");
    }

    #[test]
    fn exact_sibling_only_for_text() {
        assert_eq!(
            describe("dataProvider").unwrap().exact_sibling().as_deref(),
            Some("dataProvider.not_analyzed")
        );
        assert!(describe("rights").unwrap().exact_sibling().is_none());
        assert!(describe(COORDINATES_FIELD).unwrap().exact_sibling().is_none());
    }

    #[test]
    fn boosted_fields_matches_the_boost_table() {
        let mut got = boosted_fields();
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
        got.sort();
        want.sort();
        assert_eq!(got, want);
    }
}
