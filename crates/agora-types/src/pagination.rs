use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 5;
pub const DEFAULT_POST_SORT: &str = "-vote_count";

/// Sort values accepted by the post listing. A leading `-` means descending.
pub const POST_SORT_SAFELIST: &[&str] = &["created_at", "-created_at", "vote_count", "-vote_count"];

/// Field-scoped validation failures, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Accumulates errors instead of failing on the first one.
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` for `field` unless the field already has one.
    pub fn add(&mut self, field: &str, message: &str) {
        self.errors
            .0
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn read_string(&self, params: &HashMap<String, String>, key: &str, default: &str) -> String {
        match params.get(key) {
            Some(v) if !v.is_empty() => v.clone(),
            _ => default.to_string(),
        }
    }

    /// Parses an integer parameter. A malformed value records an error and
    /// yields `default` so the remaining fields still get validated.
    pub fn read_int(&mut self, params: &HashMap<String, String>, key: &str, default: i64) -> i64 {
        match params.get(key) {
            Some(v) if !v.is_empty() => match v.parse::<i64>() {
                Ok(n) => n,
                Err(_) => {
                    self.add(key, "must be an integer value");
                    default
                }
            },
            _ => default,
        }
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Bounded paging + sort request.
///
/// Build it from untrusted input with [`PaginateFilter::from_params`]; the sort
/// accessors assume the filter was validated and panic otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginateFilter {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl PaginateFilter {
    /// Reads `page`, `page_size` and `sort` from query parameters and
    /// validates them. All violations are returned at once.
    pub fn from_params(
        params: &HashMap<String, String>,
        default_sort: &str,
        sort_safelist: &'static [&'static str],
    ) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let filter = Self {
            page: v.read_int(params, "page", DEFAULT_PAGE),
            page_size: v.read_int(params, "page_size", DEFAULT_PAGE_SIZE),
            sort: v.read_string(params, "sort", default_sort),
            sort_safelist,
        };
        filter.validate(&mut v);
        v.finish()?;
        Ok(filter)
    }

    /// The single shape served from the top-posts cache.
    pub fn top_posts() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: DEFAULT_POST_SORT.to_string(),
            sort_safelist: POST_SORT_SAFELIST,
        }
    }

    pub fn is_top_posts(&self) -> bool {
        self.page == 1 && self.page_size == DEFAULT_PAGE_SIZE && self.sort == DEFAULT_POST_SORT
    }

    pub fn validate(&self, v: &mut Validator) {
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(self.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(self.page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");
        v.check(
            self.sort_safelist.contains(&self.sort.as_str()),
            "sort",
            "invalid sort value",
        );
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    /// Column to order by, taken from the safelist entry itself.
    ///
    /// # Panics
    ///
    /// If the sort value is not in the safelist. Only a validated filter may
    /// reach query construction.
    pub fn sort_column(&self) -> &'static str {
        match self.sort_safelist.iter().find(|s| **s == self.sort) {
            Some(safe) => safe.trim_start_matches('-'),
            None => panic!("unsafe sort parameter: {}", self.sort),
        }
    }

    /// # Panics
    ///
    /// Same contract as [`PaginateFilter::sort_column`].
    pub fn sort_direction(&self) -> SortDirection {
        let column = self.sort_column();
        if self.sort.len() > column.len() {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn parse(pairs: &[(&str, &str)]) -> Result<PaginateFilter, ValidationErrors> {
        PaginateFilter::from_params(&params(pairs), DEFAULT_POST_SORT, POST_SORT_SAFELIST)
    }

    #[test]
    fn defaults_apply_when_absent() {
        let f = parse(&[]).unwrap();
        assert_eq!(f.page, 1);
        assert_eq!(f.page_size, 5);
        assert_eq!(f.sort, "-vote_count");
        assert!(f.is_top_posts());
    }

    #[test]
    fn offset_follows_page_and_size() {
        for page in [1, 2, 7, 10_000_000] {
            for size in [1, 5, 100] {
                let (page_s, size_s) = (page.to_string(), size.to_string());
                let f = parse(&[("page", page_s.as_str()), ("page_size", size_s.as_str())]).unwrap();
                assert_eq!(f.offset(), (page - 1) * size);
                assert_eq!(f.limit(), size);
            }
        }
    }

    #[test]
    fn violations_are_batched() {
        let errs = parse(&[("page", "0"), ("page_size", "101"), ("sort", "title")]).unwrap_err();
        let fields: Vec<&str> = errs.fields().collect();
        assert_eq!(fields, vec!["page", "page_size", "sort"]);
        assert_eq!(errs.get("sort"), Some("invalid sort value"));
    }

    #[test]
    fn bounds() {
        assert!(parse(&[("page", "10000001")]).is_err());
        assert!(parse(&[("page", "-3")]).is_err());
        assert!(parse(&[("page_size", "0")]).is_err());
        assert!(parse(&[("page_size", "100")]).is_ok());
    }

    #[test]
    fn malformed_integer_keeps_validating_other_fields() {
        let errs = parse(&[("page_size", "abc"), ("sort", "nope")]).unwrap_err();
        assert_eq!(errs.get("page_size"), Some("must be an integer value"));
        assert_eq!(errs.get("sort"), Some("invalid sort value"));
    }

    #[test]
    fn unparseable_page_reports_only_the_parse_error() {
        // The fallback default is valid, so no range error is added.
        let errs = parse(&[("page", "x")]).unwrap_err();
        assert_eq!(errs.get("page"), Some("must be an integer value"));
    }

    #[test]
    fn sort_direction_tracks_prefix() {
        for sort in POST_SORT_SAFELIST {
            let f = parse(&[("sort", sort)]).unwrap();
            let expected = if sort.starts_with('-') { SortDirection::Desc } else { SortDirection::Asc };
            assert_eq!(f.sort_direction(), expected);
            assert_eq!(f.sort_column(), sort.trim_start_matches('-'));
        }
    }

    #[test]
    #[should_panic(expected = "unsafe sort parameter")]
    fn unvalidated_sort_is_a_programming_error() {
        let f = PaginateFilter {
            page: 1,
            page_size: 5,
            sort: "title; DROP TABLE posts".to_string(),
            sort_safelist: POST_SORT_SAFELIST,
        };
        let _ = f.sort_column();
    }

    #[test]
    fn top_posts_shape_is_exact() {
        let f = parse(&[("page", "1"), ("sort", "-vote_count"), ("page_size", "6")]).unwrap();
        assert!(!f.is_top_posts());
        assert!(PaginateFilter::top_posts().is_top_posts());
    }
}
