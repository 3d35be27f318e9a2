//! Region and service selection
//!
//! Both filters are plain include/exclude sets. Exclusion always wins, and
//! service names are compared case-insensitively.

use std::collections::BTreeSet;
use std::future::Future;

/// Decides which services run in an aggregation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFilter {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

impl ServiceFilter {
    /// An empty include set selects every service
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            include: normalize(include),
            exclude: normalize(exclude),
        }
    }

    /// Filter that selects every service
    pub fn all() -> Self {
        Self::default()
    }

    pub fn allows(&self, service: &str) -> bool {
        let service = service.trim().to_lowercase();
        if self.exclude.contains(&service) {
            return false;
        }
        self.include.is_empty() || self.include.contains(&service)
    }

    /// Names in the filter that match none of `known`
    pub fn unknown<'a>(&'a self, known: &[&str]) -> Vec<&'a str> {
        self.include
            .iter()
            .chain(self.exclude.iter())
            .filter(|name| !known.iter().any(|k| k.eq_ignore_ascii_case(name)))
            .map(String::as_str)
            .collect()
    }
}

fn normalize<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| name.as_ref().trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Decides which regions an aggregation covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionFilter {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

impl RegionFilter {
    /// An empty include set means every region the project can see
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            include: normalize(include),
            exclude: normalize(exclude),
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    /// Whether the region list has to come from the API
    pub fn needs_listing(&self) -> bool {
        self.include.is_empty()
    }

    /// Resolve the final, sorted region list. `list_regions` is only called
    /// when no regions were explicitly requested.
    pub async fn resolve<F, Fut>(&self, list_regions: F) -> anyhow::Result<Vec<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<String>>>,
    {
        let candidates: BTreeSet<String> = if self.needs_listing() {
            normalize(list_regions().await?)
        } else {
            self.include.clone()
        };

        Ok(candidates
            .into_iter()
            .filter(|region| !self.exclude.contains(region))
            .collect())
    }
}
