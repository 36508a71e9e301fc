//! Candidate parsing and latency ranking.
//!
//! The ranker turns raw listing entries into [`Candidate`]s, drops the ones the
//! [`CountryPolicy`] rejects and orders the rest by ascending latency. It does
//! no I/O: entries come from [`crate::listing`] or from tests.
//!
//! # Pipeline
//!
//! ```text
//!   RawEntry { country, latency, links }
//!        │
//!        ▼
//!   latency = first whitespace token as integer ──── unparseable ──▶ dropped
//!        │
//!        ▼
//!   CountryPolicy::allows(normalize(country)) ────── rejected ─────▶ dropped
//!        │
//!        ▼
//!   one Candidate per link (resolved against the listing origin)
//!        │
//!        ▼
//!   stable sort by latency_ms
//! ```
//!
//! Latency is the primary signal because every supervised attempt pays a fixed
//! connect-and-observe cost; trying the fastest endpoints first front-loads the
//! attempts most likely to succeed.
//!
//! # Example
//!
//! ```rust
//! use ovpn_scout::country::{CountryPolicy, StaticCountryTable};
//! use ovpn_scout::ranker::{rank, RawEntry};
//! use url::Url;
//!
//! let base = Url::parse("https://listing.example/free.php").unwrap();
//! let entries = vec![
//!     RawEntry::new("Japan", "120 ms", vec!["/ovpn/jp1.ovpn".to_string()]),
//!     RawEntry::new("Germany", "35 ms", vec!["/ovpn/de1.ovpn".to_string()]),
//! ];
//! let ranked = rank(&entries, &CountryPolicy::default(), &StaticCountryTable, &base);
//!
//! assert_eq!(ranked[0].config_url, "https://listing.example/ovpn/de1.ovpn");
//! assert_eq!(ranked[1].latency_ms, 120);
//! ```

use std::collections::{HashMap, HashSet};

use url::Url;

use crate::artifacts::basename_from_url;
use crate::country::{CountryLookup, CountryPolicy};

/// One entry of the listing page, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Country label as shown on the page.
    pub country: String,
    /// Latency field as shown on the page, e.g. `"42 ms"`.
    pub latency: String,
    /// Download links, relative or absolute.
    pub links: Vec<String>,
}

impl RawEntry {
    /// Creates a raw entry.
    pub fn new(country: &str, latency: &str, links: Vec<String>) -> Self {
        Self {
            country: country.to_string(),
            latency: latency.to_string(),
            links,
        }
    }
}

/// A rankable VPN configuration reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Country label as shown on the listing page.
    pub country: String,
    /// Upper-case alpha-2 code, if the label could be resolved.
    pub country_code: Option<String>,
    /// Advertised latency in milliseconds.
    pub latency_ms: u64,
    /// Absolute URL of the `.ovpn` file.
    pub config_url: String,
}

impl Candidate {
    /// Final path segment of the config URL without its extension.
    pub fn basename(&self) -> Option<String> {
        basename_from_url(&self.config_url)
    }
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ms - {} ({})", self.latency_ms, self.config_url, self.country)
    }
}

/// Extracts the latency from a field such as `"42 ms"`.
///
/// Only the first whitespace-delimited token is considered.
pub fn parse_latency(field: &str) -> Option<u64> {
    field.split_whitespace().next()?.parse().ok()
}

/// Resolves a download link against the origin of the listing URL.
///
/// Absolute links are returned unchanged.
pub fn resolve_link(href: &str, listing: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute);
    }
    let mut origin = listing.clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    origin.join(href).ok()
}

/// Parses, filters and orders listing entries.
///
/// Entries with an unparseable latency, a country the policy rejects, or no
/// resolvable link are dropped. Entries with equal latency keep their
/// relative input order.
pub fn rank(
    entries: &[RawEntry],
    policy: &CountryPolicy,
    lookup: &dyn CountryLookup,
    listing: &Url,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for entry in entries {
        let country = entry.country.trim();
        let code = lookup.normalize(country);
        if !policy.allows(code.as_deref()) {
            continue;
        }

        let Some(latency_ms) = parse_latency(&entry.latency) else {
            continue;
        };

        for link in &entry.links {
            if let Some(url) = resolve_link(link, listing) {
                candidates.push(Candidate {
                    country: country.to_string(),
                    country_code: code.clone(),
                    latency_ms,
                    config_url: url.to_string(),
                });
            }
        }
    }

    candidates.sort_by_key(|c| c.latency_ms);
    candidates
}

/// Removes candidates whose URL is on the blacklist, keeping order.
pub fn without_blacklisted(candidates: Vec<Candidate>, blacklist: &HashSet<String>) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| !blacklist.contains(&c.config_url))
        .collect()
}

/// Moves candidates with more recorded failures towards the end.
///
/// Latency order is kept among candidates with the same failure count.
pub fn demote_failed(mut candidates: Vec<Candidate>, failures: &HashMap<String, usize>) -> Vec<Candidate> {
    candidates.sort_by_key(|c| failures.get(&c.config_url).copied().unwrap_or(0));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::StaticCountryTable;

    fn base() -> Url {
        Url::parse("https://listing.example/freevpn_openvpn.php?language=en").unwrap()
    }

    fn links(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_parse_latency() {
        assert_eq!(parse_latency("42 ms"), Some(42));
        assert_eq!(parse_latency("  7"), Some(7));
        assert_eq!(parse_latency("0ms"), None);
        assert_eq!(parse_latency("-"), None);
        assert_eq!(parse_latency(""), None);
    }

    #[test]
    fn test_resolve_link() {
        let base = base();
        assert_eq!(
            resolve_link("/ovpn/a.ovpn", &base).unwrap().as_str(),
            "https://listing.example/ovpn/a.ovpn"
        );
        assert_eq!(
            resolve_link("b.ovpn", &base).unwrap().as_str(),
            "https://listing.example/b.ovpn"
        );
        assert_eq!(
            resolve_link("http://mirror.example/c.ovpn", &base).unwrap().as_str(),
            "http://mirror.example/c.ovpn"
        );
        assert!(resolve_link("   ", &base).is_none());
    }

    #[test]
    fn test_rank_orders_and_expands_links() {
        let entries = vec![
            RawEntry::new("Japan", "120 ms", links(&["/jp1.ovpn", "/jp2.ovpn"])),
            RawEntry::new("Germany", "35 ms", links(&["/de1.ovpn"])),
            RawEntry::new("United States", "80 ms", links(&["/us1.ovpn"])),
        ];
        let ranked = rank(&entries, &CountryPolicy::default(), &StaticCountryTable, &base());

        let urls: Vec<&str> = ranked.iter().map(|c| c.config_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://listing.example/de1.ovpn",
                "https://listing.example/us1.ovpn",
                "https://listing.example/jp1.ovpn",
                "https://listing.example/jp2.ovpn",
            ]
        );
        assert_eq!(ranked[0].country_code.as_deref(), Some("DE"));
    }

    #[test]
    fn test_rank_drops_bad_entries() {
        let entries = vec![
            RawEntry::new("Russian Federation", "5 ms", links(&["/ru.ovpn"])),
            RawEntry::new("Japan", "n/a", links(&["/jp.ovpn"])),
            RawEntry::new("Korea, Republic of", "60 ms", vec![]),
            RawEntry::new("Viet Nam", "70 ms", links(&["/vn.ovpn"])),
        ];
        let ranked = rank(&entries, &CountryPolicy::default(), &StaticCountryTable, &base());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].country, "Viet Nam");
        assert_eq!(ranked[0].basename().as_deref(), Some("vn"));
    }

    #[test]
    fn test_rank_stable_ties() {
        let entries = vec![
            RawEntry::new("Japan", "50", links(&["/first.ovpn"])),
            RawEntry::new("Germany", "10", links(&["/fast.ovpn"])),
            RawEntry::new("France", "50", links(&["/second.ovpn"])),
            RawEntry::new("Spain", "50", links(&["/third.ovpn"])),
        ];
        let ranked = rank(&entries, &CountryPolicy::default(), &StaticCountryTable, &base());
        let names: Vec<String> = ranked.iter().filter_map(Candidate::basename).collect();
        assert_eq!(names, vec!["fast", "first", "second", "third"]);
    }

    #[test]
    fn test_without_blacklisted() {
        let entries = vec![
            RawEntry::new("Japan", "1", links(&["/a.ovpn"])),
            RawEntry::new("Japan", "2", links(&["/b.ovpn"])),
        ];
        let ranked = rank(&entries, &CountryPolicy::default(), &StaticCountryTable, &base());
        let blacklist = HashSet::from(["https://listing.example/a.ovpn".to_string()]);
        let left = without_blacklisted(ranked, &blacklist);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].latency_ms, 2);
    }

    #[test]
    fn test_demote_failed() {
        let entries = vec![
            RawEntry::new("Japan", "1", links(&["/a.ovpn"])),
            RawEntry::new("Japan", "2", links(&["/b.ovpn"])),
            RawEntry::new("Japan", "3", links(&["/c.ovpn"])),
            RawEntry::new("Japan", "4", links(&["/d.ovpn"])),
        ];
        let ranked = rank(&entries, &CountryPolicy::default(), &StaticCountryTable, &base());
        let failures = HashMap::from([
            ("https://listing.example/a.ovpn".to_string(), 2),
            ("https://listing.example/c.ovpn".to_string(), 1),
        ]);
        let ordered: Vec<u64> = demote_failed(ranked, &failures)
            .iter()
            .map(|c| c.latency_ms)
            .collect();
        assert_eq!(ordered, vec![2, 4, 3, 1]);
    }

    #[test]
    fn test_display() {
        let candidate = Candidate {
            country: "Japan".to_string(),
            country_code: Some("JP".to_string()),
            latency_ms: 12,
            config_url: "https://listing.example/jp.ovpn".to_string(),
        };
        assert_eq!(
            candidate.to_string(),
            "12 ms - https://listing.example/jp.ovpn (Japan)"
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::country::StaticCountryTable;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn rank_is_sorted_and_stable(latencies in prop::collection::vec(0u64..20, 0..40)) {
            let base = Url::parse("https://listing.example/").unwrap();
            let entries: Vec<RawEntry> = latencies
                .iter()
                .enumerate()
                .map(|(i, l)| RawEntry::new("Japan", &format!("{} ms", l), vec![format!("/{}.ovpn", i)]))
                .collect();

            let policy: CountryPolicy = "*".parse().unwrap();
            let ranked = rank(&entries, &policy, &StaticCountryTable, &base);
            prop_assert_eq!(ranked.len(), entries.len());

            let keys: Vec<(u64, usize)> = ranked
                .iter()
                .map(|c| {
                    let index: usize = c.basename().unwrap().parse().unwrap();
                    (c.latency_ms, index)
                })
                .collect();
            for pair in keys.windows(2) {
                prop_assert!(pair[0] < pair[1], "{:?} not before {:?}", pair[0], pair[1]);
            }
        }
    }
}
