//! Paths exempt from credential checks.

use regex::Regex;

/// Operational endpoints that are always public. Matched as exact paths.
pub const BUILTIN_PUBLIC_ROUTES: [&str; 3] = ["^/metrics$", "^/healthz$", "^/readyz$"];

/// Compiled whitelist: the built-in routes plus caller-supplied patterns.
///
/// Caller patterns are regular expressions searched anywhere in the path;
/// anchor them (`^/public/`) to match prefixes only.
#[derive(Debug, Clone)]
pub struct Whitelist(Vec<Regex>);

impl Whitelist {
    pub fn new<I, S>(extra: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = BUILTIN_PUBLIC_ROUTES
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        for pattern in extra {
            patterns.push(Regex::new(pattern.as_ref())?);
        }
        Ok(Self(patterns))
    }

    /// Only the built-in routes.
    pub fn builtin() -> Result<Self, regex::Error> {
        Self::new(std::iter::empty::<&str>())
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.0.iter().any(|re| re.is_match(path))
    }
}
