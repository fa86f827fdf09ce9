//! # List Query
//!
//! Pagination, filter, and sort parameters for the `list` endpoint.
//!
//! ## Query String Format
//!
//! ```text
//! ?limit=10&offset=20&filter[status]=active&filter[owner]=7&sort[name]=asc
//! ```
//!
//! `limit` is mandatory and must lie in `1..=100`; `offset` defaults to 0.
//! `filter[...]` and `sort[...]` form two free maps whose keys are caller
//! field names. Keys are not checked against any schema here; the storage
//! collaborator decides what a key means.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ListQueryError;

/// Validated list-query descriptor.
///
/// Fields are private so the `limit` range invariant holds for every value
/// of this type, deserialized ones included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawListQuery")]
pub struct ListQuery {
    limit: u32,
    offset: u64,
    #[serde(default)]
    filter: BTreeMap<String, String>,
    #[serde(default)]
    sort: BTreeMap<String, String>,
}

/// Unchecked wire shape of a [`ListQuery`].
#[derive(Deserialize)]
struct RawListQuery {
    limit: u32,
    #[serde(default)]
    offset: u64,
    #[serde(default)]
    filter: BTreeMap<String, String>,
    #[serde(default)]
    sort: BTreeMap<String, String>,
}

impl TryFrom<RawListQuery> for ListQuery {
    type Error = ListQueryError;

    fn try_from(raw: RawListQuery) -> Result<Self, Self::Error> {
        Ok(Self::new(raw.limit, raw.offset)?
            .with_filter(raw.filter)
            .with_sort(raw.sort))
    }
}

impl ListQuery {
    /// Largest accepted page size.
    pub const MAX_LIMIT: u32 = 100;

    /// Build a query with the given pagination and empty filter/sort maps.
    pub fn new(limit: u32, offset: u64) -> Result<Self, ListQueryError> {
        if limit == 0 || limit > Self::MAX_LIMIT {
            return Err(ListQueryError::LimitOutOfRange(i64::from(limit)));
        }
        Ok(Self {
            limit,
            offset,
            filter: BTreeMap::new(),
            sort: BTreeMap::new(),
        })
    }

    /// Decode a raw (still percent-encoded) query string.
    ///
    /// When a parameter appears more than once the first occurrence wins.
    /// The `filter` and `sort` maps follow [`overlay_maps`](Self::overlay_maps).
    pub fn parse(raw: Option<&str>) -> Result<Self, ListQueryError> {
        let pairs = decode_pairs(raw);

        let limit = match first_value(&pairs, "limit") {
            None | Some("") => return Err(ListQueryError::MissingLimit),
            Some(raw) => parse_int("limit", raw)?,
        };
        if limit < 1 || limit > i64::from(Self::MAX_LIMIT) {
            return Err(ListQueryError::LimitOutOfRange(limit));
        }

        let offset = match first_value(&pairs, "offset") {
            None | Some("") => 0,
            Some(raw) => parse_int("offset", raw)?,
        };
        if offset < 0 {
            return Err(ListQueryError::NegativeOffset(offset));
        }

        // Range-checked above.
        Ok(Self::new(limit as u32, offset as u64)?.apply_maps(&pairs))
    }

    /// Take the `filter` and `sort` maps from a raw query string.
    ///
    /// A map present in the query replaces the current one wholesale; an
    /// absent map leaves it untouched. Pagination is not read.
    pub fn overlay_maps(self, raw: Option<&str>) -> Self {
        self.apply_maps(&decode_pairs(raw))
    }

    fn apply_maps(mut self, pairs: &[(String, String)]) -> Self {
        if let Some(filter) = query_map(pairs, "filter") {
            self.filter = filter;
        }
        if let Some(sort) = query_map(pairs, "sort") {
            self.sort = sort;
        }
        self
    }

    /// Page size.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of matching rows to skip.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Caller-supplied equality filters, keyed by field name.
    pub fn filter(&self) -> &BTreeMap<String, String> {
        &self.filter
    }

    /// Caller-supplied sort directions, keyed by field name.
    pub fn sort(&self) -> &BTreeMap<String, String> {
        &self.sort
    }

    /// Replace the filter map.
    pub fn with_filter(mut self, filter: BTreeMap<String, String>) -> Self {
        self.filter = filter;
        self
    }

    /// Replace the sort map.
    pub fn with_sort(mut self, sort: BTreeMap<String, String>) -> Self {
        self.sort = sort;
        self
    }
}

fn decode_pairs(raw: Option<&str>) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.unwrap_or("").as_bytes())
        .into_owned()
        .collect()
}

fn first_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.trim())
}

fn parse_int(field: &'static str, raw: &str) -> Result<i64, ListQueryError> {
    raw.parse::<i64>().map_err(|_| ListQueryError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

/// Collect every `name[key]=value` pair into a map.
///
/// Returns `None` when no pair with a non-empty bracketed key exists, so an
/// absent map is distinguishable from one that happens to be empty.
fn query_map(pairs: &[(String, String)], name: &str) -> Option<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    let mut present = false;

    for (key, value) in pairs {
        let Some(rest) = key.strip_prefix(name) else {
            continue;
        };
        let Some(inner) = rest.strip_prefix('[') else {
            continue;
        };
        let Some(end) = inner.find(']') else {
            continue;
        };
        if end == 0 {
            continue;
        }
        present = true;
        map.entry(inner[..end].to_string())
            .or_insert_with(|| value.clone());
    }

    present.then_some(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_limit_in_range() {
        for limit in 1..=100 {
            let raw = format!("limit={limit}&offset=0");
            let query = ListQuery::parse(Some(&raw)).unwrap();
            assert_eq!(query.limit(), limit);
            assert_eq!(query.offset(), 0);
        }
    }

    #[test]
    fn rejects_missing_limit() {
        assert_eq!(
            ListQuery::parse(Some("offset=5")),
            Err(ListQueryError::MissingLimit)
        );
        assert_eq!(ListQuery::parse(None), Err(ListQueryError::MissingLimit));
        assert_eq!(
            ListQuery::parse(Some("limit=")),
            Err(ListQueryError::MissingLimit)
        );
    }

    #[test]
    fn rejects_limit_out_of_range() {
        assert_eq!(
            ListQuery::parse(Some("limit=0")),
            Err(ListQueryError::LimitOutOfRange(0))
        );
        assert_eq!(
            ListQuery::parse(Some("limit=101")),
            Err(ListQueryError::LimitOutOfRange(101))
        );
        assert_eq!(
            ListQuery::parse(Some("limit=-3")),
            Err(ListQueryError::LimitOutOfRange(-3))
        );
    }

    #[test]
    fn rejects_non_numeric_values() {
        assert!(matches!(
            ListQuery::parse(Some("limit=ten")),
            Err(ListQueryError::InvalidNumber { field: "limit", .. })
        ));
        assert!(matches!(
            ListQuery::parse(Some("limit=10&offset=x")),
            Err(ListQueryError::InvalidNumber { field: "offset", .. })
        ));
    }

    #[test]
    fn rejects_negative_offset() {
        assert_eq!(
            ListQuery::parse(Some("limit=10&offset=-1")),
            Err(ListQueryError::NegativeOffset(-1))
        );
    }

    #[test]
    fn offset_defaults_to_zero() {
        let query = ListQuery::parse(Some("limit=25")).unwrap();
        assert_eq!(query.offset(), 0);
        assert!(query.filter().is_empty());
        assert!(query.sort().is_empty());
    }

    #[test]
    fn filter_key_appears_verbatim() {
        let query = ListQuery::parse(Some("limit=10&filter[status]=active")).unwrap();
        assert_eq!(query.filter().len(), 1);
        assert_eq!(query.filter().get("status").map(String::as_str), Some("active"));
    }

    #[test]
    fn percent_encoded_brackets_are_decoded() {
        let query =
            ListQuery::parse(Some("limit=10&filter%5Bname%5D=blue%20widget&sort%5Bname%5D=desc"))
                .unwrap();
        assert_eq!(
            query.filter().get("name").map(String::as_str),
            Some("blue widget")
        );
        assert_eq!(query.sort().get("name").map(String::as_str), Some("desc"));
    }

    #[test]
    fn present_filter_replaces_existing_map() {
        let defaults: BTreeMap<String, String> = [("owner", "1"), ("status", "open")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let sort: BTreeMap<String, String> = [("name".to_string(), "asc".to_string())].into();
        let base = ListQuery::new(10, 0)
            .unwrap()
            .with_filter(defaults.clone())
            .with_sort(sort.clone());

        let merged = base.clone().overlay_maps(Some("limit=50&filter[owner]=2"));
        let expected: BTreeMap<String, String> = [("owner".to_string(), "2".to_string())].into();
        assert_eq!(merged.filter(), &expected);
        assert_eq!(merged.sort(), &sort);
        assert_eq!(merged.limit(), 10);

        let untouched = base.overlay_maps(Some("filter[]=x&other=1"));
        assert_eq!(untouched.filter(), &defaults);
    }

    #[test]
    fn deserialize_enforces_limit_range() {
        let ok: ListQuery = serde_json::from_str(r#"{"limit": 5, "filter": {"a": "b"}}"#).unwrap();
        assert_eq!(ok.limit(), 5);
        assert_eq!(ok.offset(), 0);
        assert_eq!(ok.filter().get("a").map(String::as_str), Some("b"));

        for bad in [r#"{"limit": 0}"#, r#"{"limit": 101}"#, r#"{"offset": 3}"#] {
            assert!(serde_json::from_str::<ListQuery>(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn empty_bracket_key_does_not_mark_map_present() {
        let pairs = vec![("filter[]".to_string(), "x".to_string())];
        assert_eq!(query_map(&pairs, "filter"), None);

        let pairs = vec![("filters[a]".to_string(), "x".to_string())];
        assert_eq!(query_map(&pairs, "filter"), None);
    }

    #[test]
    fn first_occurrence_wins() {
        let query =
            ListQuery::parse(Some("limit=5&limit=50&filter[a]=1&filter[a]=2")).unwrap();
        assert_eq!(query.limit(), 5);
        assert_eq!(query.filter().get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn new_enforces_range() {
        assert!(ListQuery::new(0, 0).is_err());
        assert!(ListQuery::new(101, 0).is_err());
        assert!(ListQuery::new(100, 7).is_ok());
    }
}
