//! Listing - the ordered name index of a vault
//!
//! Entries are kept in natural order ("db2" before "db10"), comparing
//! runs of digits by value and everything else byte by byte.

use std::cmp::Ordering;

/// Ordered mapping from secret name to its value, `None` when hidden
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    entries: Vec<(String, Option<Vec<u8>>)>,
}

impl Listing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry, keeping natural order
    pub fn insert(&mut self, name: impl Into<String>, value: Option<Vec<u8>>) {
        let name = name.into();
        match self.entries.binary_search_by(|(existing, _)| entry_cmp(existing, &name)) {
            Ok(idx) => self.entries[idx].1 = value,
            Err(idx) => self.entries.insert(idx, (name, value)),
        }
    }

    /// Remove an entry, returning whether it was present
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| existing != name);
        self.entries.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == name)
    }

    /// The value of an entry; `Some(None)` for a listed but hidden name
    pub fn get(&self, name: &str) -> Option<Option<&[u8]>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_deref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&[u8]>)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, Option<Vec<u8>>)> for Listing {
    fn from_iter<I: IntoIterator<Item = (N, Option<Vec<u8>>)>>(iter: I) -> Self {
        let mut listing = Self::new();
        for (name, value) in iter {
            listing.insert(name, value);
        }
        listing
    }
}

impl IntoIterator for Listing {
    type Item = (String, Option<Vec<u8>>);
    type IntoIter = std::vec::IntoIter<(String, Option<Vec<u8>>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Natural string comparison, case-sensitive and locale-independent.
///
/// Zeros at the very start of a string are skipped when a digit follows,
/// so "010" sorts after "9" and "007" equals "7". Past the start, digit
/// runs compare by magnitude unless either run has a leading zero, in
/// which case they compare digit by digit (so "x01" sorts before "x1").
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (leading_zeros(a), leading_zeros(b));

    loop {
        match (a.get(i), b.get(j)) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let end_a = digit_run_end(a, i);
                let end_b = digit_run_end(b, j);
                let ord = compare_digit_runs(&a[i..end_a], &b[j..end_b]);
                if ord != Ordering::Equal {
                    return ord;
                }
                i = end_a;
                j = end_b;
            }
            (Some(ca), Some(cb)) => {
                if ca != cb {
                    return ca.cmp(cb);
                }
                i += 1;
                j += 1;
            }
        }
    }
}

/// Names equal under natural order ("007", "7") still need a fixed place
fn entry_cmp(a: &str, b: &str) -> Ordering {
    natural_cmp(a, b).then_with(|| a.cmp(b))
}

fn leading_zeros(bytes: &[u8]) -> usize {
    let mut i = 0;
    while bytes[i..].starts_with(b"0") && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
        i += 1;
    }
    i
}

fn digit_run_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| !b.is_ascii_digit())
        .map_or(bytes.len(), |offset| start + offset)
}

fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    if a[0] == b'0' || b[0] == b'0' {
        a.cmp(b)
    } else {
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_cmp_numbers_by_value() {
        assert_eq!(natural_cmp("db2", "db10"), Ordering::Less);
        assert_eq!(natural_cmp("db10", "db2"), Ordering::Greater);
        assert_eq!(natural_cmp("db10", "db10"), Ordering::Equal);
    }

    #[test]
    fn test_natural_cmp_case_sensitive() {
        // Uppercase sorts before lowercase, as in byte order
        assert_eq!(natural_cmp("Zeta", "alpha"), Ordering::Less);
    }

    #[test]
    fn test_natural_cmp_leading_zeros() {
        assert_eq!(natural_cmp("x01", "x1"), Ordering::Less);
        assert_eq!(natural_cmp("x001", "x01"), Ordering::Less);
    }

    #[test]
    fn test_natural_cmp_skips_zeros_at_start() {
        assert_eq!(natural_cmp("010", "9"), Ordering::Greater);
        assert_eq!(natural_cmp("9", "010"), Ordering::Less);
        assert_eq!(natural_cmp("007", "7"), Ordering::Equal);
        assert_eq!(natural_cmp("0", "00"), Ordering::Equal);
        assert_eq!(natural_cmp("0_a", "1"), Ordering::Less);
    }

    #[test]
    fn test_insert_keeps_names_equal_in_natural_order() {
        let mut listing = Listing::new();
        listing.insert("7", None);
        listing.insert("010", None);
        listing.insert("007", Some(b"x".to_vec()));
        listing.insert("9", None);

        let names: Vec<&str> = listing.names().collect();
        assert_eq!(names, vec!["007", "7", "9", "010"]);
        assert_eq!(listing.get("7"), Some(None));
    }

    #[test]
    fn test_natural_cmp_prefix_is_smaller() {
        assert_eq!(natural_cmp("api", "api_key"), Ordering::Less);
        assert_eq!(natural_cmp("", "a"), Ordering::Less);
    }

    #[test]
    fn test_insert_keeps_natural_order() {
        let mut listing = Listing::new();
        listing.insert("key10", None);
        listing.insert("key2", None);
        listing.insert("API_TOKEN", None);
        listing.insert("key1", None);

        let names: Vec<&str> = listing.names().collect();
        assert_eq!(names, vec!["API_TOKEN", "key1", "key2", "key10"]);
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut listing = Listing::new();
        listing.insert("token", None);
        listing.insert("token", Some(b"s3cr3t".to_vec()));

        assert_eq!(listing.len(), 1);
        assert_eq!(listing.get("token"), Some(Some(&b"s3cr3t"[..])));
    }

    #[test]
    fn test_remove() {
        let mut listing: Listing = [("a", None), ("b", None)].into_iter().collect();
        assert!(listing.remove("a"));
        assert!(!listing.remove("a"));
        assert!(!listing.contains("a"));
        assert!(listing.contains("b"));
    }
}
