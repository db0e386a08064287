//! Attribute Release Policy filtering (spec §4.6): each relying party's ARP names the
//! attributes it may receive, each with a pattern the asserted value must also satisfy
//! (exact, prefix, postfix, wildcard `*`, or full regexp).

use regex::Regex;

use super::AttributeSet;

#[derive(Debug, Clone)]
pub enum ValuePattern {
    Any,
    Exact(String),
    Prefix(String),
    Postfix(String),
    Wildcard(String),
    Regexp(Regex),
}

impl ValuePattern {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            ValuePattern::Any => true,
            ValuePattern::Exact(s) => value == s,
            ValuePattern::Prefix(p) => value.starts_with(p.as_str()),
            ValuePattern::Postfix(p) => value.ends_with(p.as_str()),
            ValuePattern::Wildcard(pattern) => wildcard_matches(pattern, value),
            ValuePattern::Regexp(re) => re.is_match(value),
        }
    }
}

fn wildcard_matches(pattern: &str, value: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == value;
    }
    let mut rest = value;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !rest.starts_with(part) {
                return false;
            }
            rest = &rest[part.len()..];
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else if let Some(idx) = rest.find(part) {
            rest = &rest[idx + part.len()..];
        } else {
            return false;
        }
    }
    true
}

#[derive(Debug, Clone, Default)]
pub struct Arp {
    rules: Vec<(String, ValuePattern)>,
}

impl Arp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, attribute: impl Into<String>, pattern: ValuePattern) -> Self {
        self.rules.push((attribute.into(), pattern));
        self
    }

    fn patterns_for(&self, attribute: &str) -> Vec<&ValuePattern> {
        self.rules
            .iter()
            .filter(|(name, _)| name == attribute)
            .map(|(_, p)| p)
            .collect()
    }
}

/// A permissive default policy releasing the hub's commonly federated attributes
/// unfiltered. No per-SP ARP configuration format was specified (Open Question, see
/// DESIGN.md); this stands in until per-relying-party policies are configured.
pub fn default_arp() -> Arp {
    const COMMONLY_RELEASED: &[&str] = &[
        "eduPersonPrincipalName",
        "eduPersonAffiliation",
        "eduPersonScopedAffiliation",
        "eduPersonTargetedID",
        "mail",
        "givenName",
        "sn",
        "displayName",
        "schacHomeOrganization",
        "schacPersonalUniqueID",
        "schacDateOfBirth",
        "schacYearOfBirth",
    ];
    COMMONLY_RELEASED
        .iter()
        .fold(Arp::new(), |arp, name| arp.allow(*name, ValuePattern::Any))
}

/// Filters `attrs` down to what `policy` permits: an attribute with no matching rule is
/// dropped entirely; a rule-matching attribute keeps only the values at least one of its
/// patterns accepts.
pub fn apply(attrs: &AttributeSet, policy: &Arp) -> AttributeSet {
    let mut out = AttributeSet::new();
    for (name, values) in attrs {
        let patterns = policy.patterns_for(name);
        if patterns.is_empty() {
            continue;
        }
        let kept: Vec<String> = values
            .iter()
            .filter(|v| patterns.iter().any(|p| p.matches(v)))
            .cloned()
            .collect();
        if !kept.is_empty() {
            out.insert(name.clone(), kept);
        }
    }
    out
}
