//! Domain suffix matching.
//!
//! Suffixes are compared label by label, case-insensitively, so `example.com.` matches
//! `www.example.com.` but never `badexample.com.`. A suffix written with a leading dot, e.g.
//! `.example.com.`, only matches strict subdomains and not `example.com.` itself.

use crate::error::Error;
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;
use trust_dns_proto::rr::Name;

/// A fully qualified domain suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suffix {
    name: Name,
    subdomains_only: bool,
}

impl Suffix {
    /// Parse a suffix, appending the root label separator when it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if the text isn't a valid domain name.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let text = text.trim();
        let subdomains_only = text.len() > 1 && text.starts_with('.');
        let mut normalized = text.trim_start_matches('.').to_string();
        if !normalized.ends_with('.') {
            normalized.push('.');
        }
        Ok(Self {
            name: Name::from_str(&normalized)?,
            subdomains_only,
        })
    }

    /// A suffix matching `name` and all of its subdomains.
    #[must_use]
    pub fn new(name: Name) -> Self {
        Self {
            name,
            subdomains_only: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[must_use]
    pub fn num_labels(&self) -> usize {
        label_count(&self.name)
    }

    /// Returns true if `name` ends with this suffix.
    #[must_use]
    pub fn matches(&self, name: &Name) -> bool {
        self.name.zone_of(name)
            && (!self.subdomains_only || label_count(name) > self.num_labels())
    }

    /// Replace this suffix of `name` with `with`, keeping the labels in front of it. Returns
    /// `Ok(None)` when `name` doesn't end with this suffix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if the resulting name would exceed the DNS name length limit.
    pub fn replace(&self, name: &Name, with: &Name) -> Result<Option<Name>, Error> {
        if !self.matches(name) {
            return Ok(None);
        }
        let keep = label_count(name) - self.num_labels();
        let prefix = Name::from_labels(name.iter().take(keep))?;
        Ok(Some(prefix.append_domain(with)?))
    }
}

// Name::num_labels doesn't count a leading wildcard label.
fn label_count(name: &Name) -> usize {
    name.iter().count()
}

impl fmt::Display for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subdomains_only {
            write!(f, ".")?;
        }
        write!(f, "{}", self.name)
    }
}

/// An ordered set of `(suffix, target)` pairs. Lookups return the longest matching suffix;
/// suffixes with the same number of labels keep their declaration order.
#[derive(Debug, Clone)]
pub struct SuffixTable<T> {
    entries: Vec<(Suffix, T)>,
}

impl<T> Default for SuffixTable<T> {
    fn default() -> Self {
        Self {
            entries: Vec::default(),
        }
    }
}

impl<T> FromIterator<(Suffix, T)> for SuffixTable<T> {
    fn from_iter<I: IntoIterator<Item = (Suffix, T)>>(iter: I) -> Self {
        let mut entries: Vec<(Suffix, T)> = iter.into_iter().collect();
        entries.sort_by_key(|(suffix, _)| Reverse(suffix.num_labels()));
        Self { entries }
    }
}

impl<T> SuffixTable<T> {
    #[must_use]
    pub fn lookup(&self, name: &Name) -> Option<(&Suffix, &T)> {
        self.entries
            .iter()
            .find(|(suffix, _)| suffix.matches(name))
            .map(|(suffix, target)| (suffix, target))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Suffix, &T)> {
        self.entries.iter().map(|(suffix, target)| (suffix, target))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    #[test]
    fn parse_appends_root() {
        let suffix = Suffix::parse("example.com").unwrap();
        assert_eq!(suffix.name(), &name("example.com."));
        assert!(suffix.name().is_fqdn());
        assert_eq!(suffix.to_string(), "example.com.");
        assert_eq!(Suffix::parse(".example.com").unwrap().to_string(), ".example.com.");
    }

    #[test]
    fn matches_whole_labels() {
        let suffix = Suffix::parse("example.com.").unwrap();
        assert!(suffix.matches(&name("example.com.")));
        assert!(suffix.matches(&name("foo.example.com.")));
        assert!(suffix.matches(&name("FOO.Example.COM.")));
        assert!(!suffix.matches(&name("badexample.com.")));
        assert!(!suffix.matches(&name("example.net.")));
    }

    #[test]
    fn leading_dot_is_subdomains_only() {
        let suffix = Suffix::parse(".example.com.").unwrap();
        assert!(!suffix.matches(&name("example.com.")));
        assert!(suffix.matches(&name("foo.example.com.")));
    }

    #[test]
    fn replace_keeps_prefix() {
        let suffix = Suffix::parse("old.com.").unwrap();
        let replaced = suffix
            .replace(&name("a.b.old.com."), &name("new.org."))
            .unwrap();
        assert_eq!(replaced, Some(name("a.b.new.org.")));
        assert_eq!(
            suffix.replace(&name("old.com."), &name("new.org.")).unwrap(),
            Some(name("new.org."))
        );
        assert_eq!(
            suffix.replace(&name("gold.com."), &name("new.org.")).unwrap(),
            None
        );
    }

    #[test]
    fn longest_suffix_wins() {
        let table: SuffixTable<&str> = vec![
            (Suffix::parse("b.com.").unwrap(), "short"),
            (Suffix::parse("a.b.com.").unwrap(), "long"),
        ]
        .into_iter()
        .collect();
        assert_eq!(table.lookup(&name("x.a.b.com.")).map(|(_, t)| *t), Some("long"));
        assert_eq!(table.lookup(&name("x.b.com.")).map(|(_, t)| *t), Some("short"));
        assert!(table.lookup(&name("x.c.com.")).is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn equal_length_keeps_declaration_order() {
        let table: SuffixTable<u8> = vec![
            (Suffix::parse("example.com.").unwrap(), 1),
            (Suffix::parse("EXAMPLE.com.").unwrap(), 2),
        ]
        .into_iter()
        .collect();
        assert_eq!(table.lookup(&name("www.example.com.")).map(|(_, t)| *t), Some(1));
    }
}
