//! Wildcard matching between required and held permissions
//!
//! A held permission is a pattern in which `*` stands for zero or more
//! permission characters; everything else, `.` included, matches literally.
//! Patterns are anchored at both ends and a single `*` may span `:` and `/`
//! delimited segments.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Escaped form of the wildcard after `regex::escape`
const ESCAPED_WILDCARD: &str = r"\*";

/// What a single `*` expands to: Han characters, ASCII alphanumerics and `_/.*-`
///
/// Han is the only non-Latin script covered. Cyrillic, kana, Hangul and
/// accented Latin letters are outside the class, so a wildcard never spans
/// them; such characters match only where the held permission spells them
/// out literally.
const WILDCARD_CLASS: &str = r"[\p{Han}a-zA-Z0-9_/.*-]*";

/// Default number of compiled patterns kept by a caching matcher
pub const DEFAULT_PATTERN_CACHE_CAPACITY: usize = 1024;

/// Matching errors
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("failed to compile permission pattern `{pattern}`: {source}")]
    PatternCompile {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compile a held permission into an anchored pattern
pub fn compile_pattern(held: &str) -> Result<Regex, MatchError> {
    let expanded = regex::escape(held).replace(ESCAPED_WILDCARD, WILDCARD_CLASS);
    Regex::new(&format!("^{}$", expanded)).map_err(|source| MatchError::PatternCompile {
        pattern: held.to_string(),
        source,
    })
}

/// Whether `required` is granted by the held pattern
pub fn permission_match(required: &str, held: &str) -> Result<bool, MatchError> {
    Ok(compile_pattern(held)?.is_match(required))
}

/// Whether any required permission is granted by any held pattern
pub fn permissions_match(required: &[String], held: &[String]) -> Result<bool, MatchError> {
    WildcardMatcher::new()
        .find_match(required, held)
        .map(|found| found.is_some())
}

/// Wildcard matcher with an optional compiled-pattern cache
///
/// Held permissions are usually drawn from a small set of role grants, so
/// caching compiled patterns by their literal text avoids recompiling them
/// on every call. The cache is safe to share between threads and never
/// holds more than `capacity` patterns, even under concurrent misses.
pub struct WildcardMatcher {
    /// Compiled pattern cache keyed by held permission
    cache: Option<DashMap<String, Arc<Regex>>>,

    /// Cache slots claimed; incremented before an insert, decremented on removal
    reserved: AtomicUsize,

    /// Maximum number of cached patterns
    capacity: usize,
}

impl WildcardMatcher {
    /// Create a matcher that compiles patterns on every use
    pub fn new() -> Self {
        Self {
            cache: None,
            reserved: AtomicUsize::new(0),
            capacity: 0,
        }
    }

    /// Create a matcher that keeps up to `capacity` compiled patterns
    pub fn with_cache(capacity: usize) -> Self {
        Self {
            cache: Some(DashMap::new()),
            reserved: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Compiled pattern for a held permission
    pub fn pattern(&self, held: &str) -> Result<Arc<Regex>, MatchError> {
        let Some(cache) = &self.cache else {
            return compile_pattern(held).map(Arc::new);
        };

        if let Some(pattern) = cache.get(held) {
            return Ok(pattern.clone());
        }

        let pattern = Arc::new(compile_pattern(held)?);
        match cache.entry(held.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                if self.try_reserve() {
                    entry.insert(pattern.clone());
                }
                Ok(pattern)
            }
        }
    }

    /// Claim a cache slot if any are left
    fn try_reserve(&self) -> bool {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |claimed| {
                (claimed < self.capacity).then_some(claimed + 1)
            })
            .is_ok()
    }

    /// Whether `required` is granted by the held pattern
    pub fn matches(&self, required: &str, held: &str) -> Result<bool, MatchError> {
        Ok(self.pattern(held)?.is_match(required))
    }

    /// First (required, held) pair that matches
    ///
    /// Required permissions are tried in order, each against every held
    /// permission in order. A pattern that fails to compile aborts the scan.
    pub fn find_match<'r, 'h>(
        &self,
        required: &'r [String],
        held: &'h [String],
    ) -> Result<Option<(&'r str, &'h str)>, MatchError> {
        for need in required {
            for grant in held {
                if self.matches(need, grant)? {
                    debug!("Permission `{}` granted by `{}`", need, grant);
                    return Ok(Some((need.as_str(), grant.as_str())));
                }
            }
        }
        Ok(None)
    }

    /// Drop all cached patterns
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.retain(|_, _| {
                self.reserved.fetch_sub(1, Ordering::AcqRel);
                false
            });
        }
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.cache.is_some(),
            size: self.cache.as_ref().map_or(0, |cache| cache.len()),
            capacity: self.capacity,
        }
    }
}

impl Default for WildcardMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Pattern cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub enabled: bool,
    /// Number of cached patterns
    pub size: usize,
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn check(required: &str, held: &str, want: bool) {
        assert_eq!(
            permission_match(required, held).unwrap(),
            want,
            "required={required:?} held={held:?}"
        );
    }

    #[test]
    fn test_wildcard_everything() {
        check("app:shop/dev:add", "*:*:*", true);
    }

    #[test]
    fn test_literal_dot_segments() {
        check("app:shop.c/dev:add", "*:shop.c/*:*", true);
        check("app:shop.c/dev:add", "*:shop.b/*:*", false);
    }

    #[test]
    fn test_dot_is_not_any_character() {
        check("ingress:www.shop.com/dev:add", "*:.*/*:*", false);
        check("ingress:www.shop.com/dev:add", "*:*.*/*:*", true);
        check("app:shopxc/dev:add", "*:shop.c/*:*", false);
    }

    #[test]
    fn test_anchored_at_both_ends() {
        check("ingress:www.shop.com/dev:add", "*:*.*/*:get", false);
        check("xa", "a*", false);
        check("ax", "a*", true);
        check("prefix-app:dev:get", "app:*:get", false);
        check("app:dev:get-suffix", "app:*:get", false);
    }

    #[test]
    fn test_wildcard_spans_delimiters() {
        check("ingress:qa1-api.xinfei.cn:add", "*:*:add", true);
        check("app:team/dev/tom:get", "app:*:get", true);
        check("ingress::add", "*:*:add", true);
        check("ingress::::add", "*:*:add", false);
    }

    #[test]
    fn test_required_strings_are_literal() {
        check("ingress:*:add", "*:*.*/*:add", false);
        check("ingress::add", "*:*.*/*:add", false);
        check("*:qa1-api.xinfei.cn:add", "*:*:add", true);
        check("*/a:qa1-api.xinfei.cn:add", "*/a:*:add", true);
        check("*/a:qa1-api.xinfei.cn:add", "*:*:add", true);
        check("*/a:qa1-api.xinfei.cn:add", "a/*:*:add", false);
    }

    #[test]
    fn test_unicode_permissions() {
        check("*/a:qa1-api.xinfei.我擦嘞:add", "*:*:add", true);
        check("app:命名空间/应用:get", "app:*:get", true);
        check("app:命名空间/应用:get", "app:命名空间/*:get", true);
    }

    #[test]
    fn test_case_sensitive() {
        check("App:dev:get", "app:*:get", false);
        check("app:dev:GET", "app:*:get", false);
    }

    #[test]
    fn test_exact_permission_without_wildcard() {
        check("app:dev/tom:get", "app:dev/tom:get", true);
        check("app:dev/tom:get", "app:dev/tom:ge", false);
        check("a+b(c)", "a+b(c)", true);
        check("aab", "a+b", false);
    }

    #[test]
    fn test_characters_outside_wildcard_class() {
        check("app:dev tom:get", "app:*:get", false);
        check("app:dev@tom:get", "app:*:get", false);
        check("app:разработка:get", "app:*:get", false);
        check("app:カタカナ:get", "app:*:get", false);
        check("app:café:get", "app:*:get", false);
        check("app:café:get", "app:café:get", true);
        check("app:разработка/tom:get", "app:разработка/*:get", true);
    }

    #[test]
    fn test_permissions_match_short_circuits() {
        let required = vec!["app:prod/tom:get".to_string(), "app:dev/tom:get".to_string()];
        let held = vec!["app:test/*:get".to_string(), "app:dev/*:get".to_string()];

        let matcher = WildcardMatcher::new();
        assert_eq!(
            matcher.find_match(&required, &held).unwrap(),
            Some(("app:dev/tom:get", "app:dev/*:get"))
        );
        assert!(permissions_match(&required, &held).unwrap());
        assert!(!permissions_match(&[], &held).unwrap());
        assert!(!permissions_match(&required, &[]).unwrap());
    }

    #[test]
    fn test_pattern_compile_error_is_surfaced() {
        // Exceeds the regex size limit once every wildcard is expanded.
        let held = "*".repeat(100_000);

        let result = permission_match("app", &held);
        assert!(matches!(result, Err(MatchError::PatternCompile { .. })));

        let required = vec!["app".to_string()];
        let grants = vec![held, "app".to_string()];
        assert!(WildcardMatcher::new().find_match(&required, &grants).is_err());
    }

    #[test]
    fn test_pattern_cache() {
        let matcher = WildcardMatcher::with_cache(2);
        assert_eq!(matcher.cache_stats().size, 0);

        assert!(matcher.matches("app:dev:get", "app:*:get").unwrap());
        assert!(matcher.matches("app:prod:get", "app:*:get").unwrap());
        assert_eq!(matcher.cache_stats().size, 1);

        assert!(!matcher.matches("app:dev:get", "app:*:add").unwrap());
        assert!(!matcher.matches("app:dev:get", "ops:*").unwrap());
        let stats = matcher.cache_stats();
        assert!(stats.enabled);
        assert_eq!(stats.size, 2);
        assert_eq!(stats.capacity, 2);

        matcher.clear_cache();
        assert_eq!(matcher.cache_stats().size, 0);
    }

    #[test]
    fn test_uncached_matcher_keeps_nothing() {
        let matcher = WildcardMatcher::default();
        assert!(matcher.matches("app:dev:get", "app:*:get").unwrap());
        assert_eq!(
            matcher.cache_stats(),
            CacheStats {
                enabled: false,
                size: 0,
                capacity: 0
            }
        );
    }

    #[test]
    fn test_concurrent_pattern_cache() {
        let matcher = Arc::new(WildcardMatcher::with_cache(DEFAULT_PATTERN_CACHE_CAPACITY));
        let mut handles = vec![];

        for i in 0..10 {
            let matcher = Arc::clone(&matcher);
            let handle = thread::spawn(move || {
                let held = format!("app:team{}/*:get", i % 5);
                let required = format!("app:team{}/tom:get", i % 5);
                matcher.matches(&required, &held).unwrap()
            });
            handles.push(handle);
        }

        for handle in handles {
            assert!(handle.join().unwrap());
        }

        assert_eq!(matcher.cache_stats().size, 5);
    }

    #[test]
    fn test_cache_capacity_holds_under_contention() {
        let matcher = Arc::new(WildcardMatcher::with_cache(8));
        let mut handles = vec![];

        for i in 0..32 {
            let matcher = Arc::clone(&matcher);
            let handle = thread::spawn(move || {
                for j in 0..16 {
                    let held = format!("app:team{}-{}/*:get", i, j);
                    let required = format!("app:team{}-{}/tom:get", i, j);
                    assert!(matcher.matches(&required, &held).unwrap());
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(matcher.cache_stats().size, 8);

        matcher.clear_cache();
        assert_eq!(matcher.cache_stats().size, 0);

        for j in 0..12 {
            let held = format!("ops:{}:*", j);
            assert!(matcher.matches(&format!("ops:{}:get", j), &held).unwrap());
        }
        assert_eq!(matcher.cache_stats().size, 8);
    }
}
