use simstore_core::{Metadata, MetadataValue};
use std::fmt;
use std::sync::Arc;

/// Caller-supplied metadata predicate.
pub type PredicateFn = Arc<dyn Fn(&Metadata) -> bool + Send + Sync>;

/// A predicate over record metadata.
///
/// Structural variants are cheap to evaluate and are applied before scoring.
/// A filter containing [`MetadataFilter::Predicate`] is considered expensive
/// and is applied after scoring, lazily in rank order.
#[derive(Clone)]
pub enum MetadataFilter {
    /// `key` is present and equals `value`.
    Eq(String, MetadataValue),
    /// `key` is present and equals one of the values.
    In(String, Vec<MetadataValue>),
    /// `key` is a number within the optional inclusive bounds.
    Range {
        /// Metadata key.
        key: String,
        /// Inclusive lower bound.
        min: Option<f64>,
        /// Inclusive upper bound.
        max: Option<f64>,
    },
    /// `key` is present with any value.
    Exists(String),
    /// Every sub-filter matches. Empty matches everything.
    And(Vec<MetadataFilter>),
    /// Some sub-filter matches. Empty matches nothing.
    Or(Vec<MetadataFilter>),
    /// The sub-filter does not match.
    Not(Box<MetadataFilter>),
    /// Opaque caller predicate.
    Predicate(PredicateFn),
}

/// Where in the query pipeline a filter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    /// Prune candidates before any scoring.
    PreScoring,
    /// Walk scored candidates best-first until `k` pass.
    PostScoring,
}

impl MetadataFilter {
    /// Shorthand for [`MetadataFilter::Eq`].
    pub fn eq(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Eq(key.into(), value.into())
    }

    /// Wrap a closure as a [`MetadataFilter::Predicate`].
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Metadata) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Evaluate against one record's metadata.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::Eq(key, value) => metadata.get(key) == Some(value),
            Self::In(key, values) => metadata.get(key).is_some_and(|v| values.contains(v)),
            Self::Range { key, min, max } => metadata
                .get(key)
                .and_then(MetadataValue::as_f64)
                .is_some_and(|n| min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi)),
            Self::Exists(key) => metadata.contains_key(key),
            Self::And(filters) => filters.iter().all(|f| f.matches(metadata)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(metadata)),
            Self::Not(filter) => !filter.matches(metadata),
            Self::Predicate(f) => f(metadata),
        }
    }

    /// Whether evaluating this filter may call into caller code.
    pub fn is_expensive(&self) -> bool {
        match self {
            Self::Predicate(_) => true,
            Self::And(filters) | Self::Or(filters) => filters.iter().any(Self::is_expensive),
            Self::Not(filter) => filter.is_expensive(),
            Self::Eq(..) | Self::In(..) | Self::Range { .. } | Self::Exists(_) => false,
        }
    }

    /// The stage this filter should run in.
    pub fn stage(&self) -> FilterStage {
        if self.is_expensive() {
            FilterStage::PostScoring
        } else {
            FilterStage::PreScoring
        }
    }

    /// Parse `key=value` into an equality filter; the value is typed with
    /// [`MetadataValue::parse_literal`].
    pub fn parse_eq(expr: &str) -> Option<Self> {
        let (key, value) = expr.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some(Self::Eq(
            key.to_string(),
            MetadataValue::parse_literal(value.trim()),
        ))
    }
}

impl fmt::Debug for MetadataFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq(k, v) => write!(f, "Eq({k:?}, {v:?})"),
            Self::In(k, vs) => write!(f, "In({k:?}, {vs:?})"),
            Self::Range { key, min, max } => write!(f, "Range({key:?}, {min:?}..={max:?})"),
            Self::Exists(k) => write!(f, "Exists({k:?})"),
            Self::And(fs) => f.debug_tuple("And").field(fs).finish(),
            Self::Or(fs) => f.debug_tuple("Or").field(fs).finish(),
            Self::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn meta() -> Metadata {
        let mut m = Metadata::new();
        m.insert("dept".to_string(), MetadataValue::from("sales"));
        m.insert("year".to_string(), MetadataValue::from(2023_i64));
        m.insert("public".to_string(), MetadataValue::from(true));
        m
    }

    #[test]
    fn test_eq_and_exists() {
        let m = meta();
        assert!(MetadataFilter::eq("dept", "sales").matches(&m));
        assert!(!MetadataFilter::eq("dept", "hr").matches(&m));
        assert!(!MetadataFilter::eq("missing", "x").matches(&m));
        assert!(MetadataFilter::Exists("public".to_string()).matches(&m));
        assert!(!MetadataFilter::Exists("nope".to_string()).matches(&m));
    }

    #[test]
    fn test_type_mismatch_does_not_match() {
        let m = meta();
        assert!(!MetadataFilter::eq("year", "2023").matches(&m));
        assert!(MetadataFilter::eq("year", 2023_i64).matches(&m));
    }

    #[test]
    fn test_in_and_range() {
        let m = meta();
        let f = MetadataFilter::In(
            "dept".to_string(),
            vec![MetadataValue::from("hr"), MetadataValue::from("sales")],
        );
        assert!(f.matches(&m));

        let range = |min, max| MetadataFilter::Range {
            key: "year".to_string(),
            min,
            max,
        };
        assert!(range(Some(2020.0), Some(2023.0)).matches(&m));
        assert!(!range(None, Some(2022.0)).matches(&m));
        assert!(range(Some(2023.0), None).matches(&m));
        // Non-numeric values never satisfy a range.
        let dept_range = MetadataFilter::Range {
            key: "dept".to_string(),
            min: None,
            max: None,
        };
        assert!(!dept_range.matches(&m));
    }

    #[test]
    fn test_boolean_combinators() {
        let m = meta();
        let sales = MetadataFilter::eq("dept", "sales");
        let hr = MetadataFilter::eq("dept", "hr");

        let public = MetadataFilter::eq("public", true);
        assert!(MetadataFilter::And(vec![sales.clone(), public]).matches(&m));
        assert!(!MetadataFilter::And(vec![sales.clone(), hr.clone()]).matches(&m));
        assert!(MetadataFilter::Or(vec![hr.clone(), sales]).matches(&m));
        assert!(MetadataFilter::Not(Box::new(hr)).matches(&m));
        assert!(MetadataFilter::And(vec![]).matches(&m));
        assert!(!MetadataFilter::Or(vec![]).matches(&m));
    }

    #[test]
    fn test_stage_selection() {
        assert_eq!(MetadataFilter::eq("a", "b").stage(), FilterStage::PreScoring);
        let custom = MetadataFilter::predicate(|m| m.len() > 1);
        assert_eq!(custom.stage(), FilterStage::PostScoring);
        let nested = MetadataFilter::Not(Box::new(MetadataFilter::And(vec![
            MetadataFilter::eq("a", "b"),
            custom,
        ])));
        assert_eq!(nested.stage(), FilterStage::PostScoring);
    }

    #[test]
    fn test_predicate_matches() {
        let f = MetadataFilter::predicate(|m| {
            m.get("year").and_then(MetadataValue::as_f64) > Some(2000.0)
        });
        assert!(f.matches(&meta()));
        assert!(!f.matches(&Metadata::new()));
        assert_eq!(format!("{f:?}"), "Predicate(..)");
    }

    #[test]
    fn test_parse_eq() {
        let f = MetadataFilter::parse_eq("year=2023").unwrap();
        assert!(f.matches(&meta()));
        assert!(MetadataFilter::parse_eq("novalue").is_none());
        assert!(MetadataFilter::parse_eq("=x").is_none());
    }
}
