//! Immutable discovery snapshot and the lookups defined over it.

use std::sync::OnceLock;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use krb_core::{GroupResource, Gvk, Gvr};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One served resource type as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Collection name (plural), e.g. `deployments`.
    pub resource: String,
    pub singular: String,
    pub short_names: SmallVec<[String; 4]>,
    pub namespaced: bool,
    /// The version fuzzy lookups use for this `(group, resource)`. Discovery sets it
    /// for the group's preferred version; `Catalog::new` extends it to resources that
    /// version does not serve.
    pub preferred: bool,
}

impl CatalogEntry {
    pub fn gvk(&self) -> Gvk {
        Gvk::new(&self.group, &self.version, &self.kind)
    }

    pub fn gvr(&self) -> Gvr {
        Gvr::new(&self.group, &self.version, &self.resource)
    }

    pub fn group_resource(&self) -> GroupResource {
        GroupResource::new(&self.group, &self.resource)
    }

    fn names_exactly(&self, name: &str) -> bool {
        if self.resource == name {
            return true;
        }
        if self.singular.is_empty() { self.kind.to_ascii_lowercase() == name } else { self.singular == name }
    }

    fn has_short_name(&self, name: &str) -> bool {
        self.short_names.iter().any(|s| s == name)
    }
}

/// Outcome of a fuzzy lookup that must collapse to one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Unique(Gvr),
    Ambiguous(Vec<Gvr>),
    NotFound,
}

/// A user-typed resource name: `deploy`, `deployments.apps`, `deployments.v1.apps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzyName {
    pub resource: String,
    pub version: Option<String>,
    pub group: Option<String>,
}

fn version_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^v[0-9]+((alpha|beta)[0-9]+)?$").expect("static regex"))
}

/// Discovery snapshot. Never mutated after construction; refreshes build a new one.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    /// Group order declared by the server; earlier wins ties. Empty means no preference.
    group_priority: Vec<String>,
    by_gvk: FxHashMap<Gvk, usize>,
}

impl Catalog {
    pub fn new(mut entries: Vec<CatalogEntry>, group_priority: Vec<String>) -> Self {
        // a resource missing from the preferred version is used at the first version listing it
        let covered: FxHashSet<(String, String)> =
            entries.iter().filter(|e| e.preferred).map(|e| (e.group.clone(), e.resource.clone())).collect();
        let mut promoted: FxHashSet<(String, String)> = FxHashSet::default();
        for e in entries.iter_mut() {
            let key = (e.group.clone(), e.resource.clone());
            if !covered.contains(&key) && promoted.insert(key) {
                e.preferred = true;
            }
        }
        let mut by_gvk = FxHashMap::default();
        for (i, e) in entries.iter().enumerate() {
            by_gvk.entry(e.gvk()).or_insert(i);
        }
        Self { entries, group_priority, by_gvk }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn group_priority(&self) -> &[String] {
        &self.group_priority
    }

    /// Exact kind-form lookup across all served versions.
    pub fn lookup(&self, gvk: &Gvk) -> Option<&CatalogEntry> {
        self.by_gvk.get(gvk).map(|&i| &self.entries[i])
    }

    pub fn parse_name(&self, input: &str) -> FuzzyName {
        let input = input.trim().to_ascii_lowercase();
        let Some((resource, rest)) = input.split_once('.') else {
            return FuzzyName { resource: input, version: None, group: None };
        };
        if let Some((version, group)) = rest.split_once('.') {
            if version_pattern().is_match(version) && self.knows_group(group) {
                return FuzzyName { resource: resource.to_string(), version: Some(version.to_string()), group: Some(group.to_string()) };
            }
        }
        FuzzyName { resource: resource.to_string(), version: None, group: Some(rest.to_string()) }
    }

    fn knows_group(&self, group: &str) -> bool {
        self.entries.iter().any(|e| e.group == group)
    }

    fn pool<'a>(&'a self, name: &'a FuzzyName) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
        self.entries.iter().filter(move |e| {
            let version_ok = match &name.version {
                Some(v) => &e.version == v,
                None => e.preferred,
            };
            let group_ok = name.group.as_ref().map(|g| &e.group == g).unwrap_or(true);
            version_ok && group_ok
        })
    }

    /// Every entry the name could denote, by plural, singular or short alias.
    pub fn candidates<'a>(&'a self, name: &'a FuzzyName) -> Vec<&'a CatalogEntry> {
        self.pool(name).filter(|e| e.names_exactly(&name.resource) || e.has_short_name(&name.resource)).collect()
    }

    /// Collapse a fuzzy name to one collection-form, using the declared group priority.
    ///
    /// Plural/singular matches shadow short aliases. Candidates left in different
    /// groups are ranked by group priority; if no single candidate ranks first the
    /// result is `Ambiguous` rather than a guess.
    pub fn resolve(&self, input: &str) -> Resolution {
        let name = self.parse_name(input);
        let exact: Vec<&CatalogEntry> = self.pool(&name).filter(|e| e.names_exactly(&name.resource)).collect();
        let tier = if exact.is_empty() {
            self.pool(&name).filter(|e| e.has_short_name(&name.resource)).collect()
        } else {
            exact
        };

        let mut gvrs: Vec<Gvr> = Vec::with_capacity(tier.len());
        for e in tier {
            let gvr = e.gvr();
            if !gvrs.contains(&gvr) {
                gvrs.push(gvr);
            }
        }
        match gvrs.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Unique(gvrs.remove(0)),
            _ => self.by_priority(gvrs),
        }
    }

    fn by_priority(&self, gvrs: Vec<Gvr>) -> Resolution {
        let ranked: Vec<(usize, &Gvr)> = gvrs.iter().filter_map(|g| self.group_rank(&g.group).map(|r| (r, g))).collect();
        let Some(best) = ranked.iter().map(|(r, _)| *r).min() else {
            return Resolution::Ambiguous(gvrs);
        };
        let mut top = ranked.iter().filter(|(r, _)| *r == best);
        match (top.next(), top.next()) {
            (Some((_, g)), None) => Resolution::Unique((*g).clone()),
            _ => Resolution::Ambiguous(gvrs),
        }
    }

    fn group_rank(&self, group: &str) -> Option<usize> {
        self.group_priority.iter().position(|g| g == group)
    }

    /// `resource.group` once per collection, in catalog order.
    pub fn collection_names(&self) -> Vec<String> {
        self.entries.iter().filter(|e| e.preferred).map(|e| e.group_resource().to_string()).collect()
    }

    /// Closest known collection name, for "did you mean" hints.
    pub fn suggest(&self, input: &str) -> Option<String> {
        let matcher = SkimMatcherV2::default();
        let pattern = input.trim().to_ascii_lowercase();
        self.collection_names()
            .into_iter()
            .filter_map(|c| matcher.fuzzy_match(&c, &pattern).map(|score| (score, c)))
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
            .map(|(_, c)| c)
    }
}
