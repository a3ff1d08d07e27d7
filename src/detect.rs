//! Locate the column of a table that holds IP addresses.
//!
//! Detection runs in a fixed order and stops at the first hit:
//!
//! 1. a column forced by name,
//! 2. an exact (normalized) header match against [`DetectionPolicy::header_terms`],
//! 3. a header word matching one of [`DetectionPolicy::token_terms`],
//! 4. the column whose sampled values parse as IP addresses most often.
//!
//! Header candidates from steps 2 and 3 must also pass the value check
//! whenever the column has any sampled values, so a postal "Address"
//! column never wins over a column that really holds IPs. A header hit on
//! an empty column is kept only as a last resort, when no column's values
//! pass step 4.

use std::fmt;
use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::input::InputTable;

/// Tunable rules for [`detect_ip_column`].
#[derive(Clone, Debug)]
pub struct DetectionPolicy {
    /// Normalized header names treated as exact matches, highest priority first.
    pub header_terms: Vec<String>,
    /// Header words that mark a partial match.
    pub token_terms: Vec<String>,
    /// Number of non-empty cells sampled per column.
    pub sample_size: usize,
    /// Share of sampled cells that must parse as IP addresses.
    pub min_match_ratio: f64,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        DetectionPolicy {
            header_terms: [
                "ip", "ipaddress", "ipaddr", "dstaddr", "srcaddr", "address", "addr", "host",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            token_terms: ["ip", "addr", "address"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sample_size: 50,
            min_match_ratio: 0.6,
        }
    }
}

/// How a column was chosen.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Matched {
    /// Named explicitly by the caller.
    Forced,
    /// Header equal to one of the policy's header terms.
    Header,
    /// Header containing one of the policy's token terms.
    Token,
    /// Values parse as IP addresses.
    Values,
}

/// The detected IP column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnId {
    pub index: usize,
    pub name: String,
    pub matched: Matched,
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' (column {})", self.name, self.index + 1)
    }
}

/// Lowercase a header and drop everything but letters and digits.
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split a header into lowercase words on punctuation, whitespace and
/// camelCase boundaries: `"dstAddr"` gives `["dst", "addr"]`.
pub fn header_tokens(header: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in header.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// True if the trimmed string is an IPv4 or IPv6 address.
#[inline]
pub fn looks_like_ip(value: &str) -> bool {
    value.trim().parse::<IpAddr>().is_ok()
}

impl DetectionPolicy {
    /// Share of the sampled non-empty values in a column that are IPs.
    ///
    /// Returns `None` when the column has no non-empty values.
    pub fn ip_ratio<'a, I>(&self, values: I) -> Option<f64>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = 0usize;
        let mut hits = 0usize;
        for value in values
            .into_iter()
            .filter(|v| !v.trim().is_empty())
            .take(self.sample_size)
        {
            seen += 1;
            if looks_like_ip(value) {
                hits += 1;
            }
        }
        if seen == 0 {
            None
        } else {
            Some(hits as f64 / seen as f64)
        }
    }
}

/// Pick the column of `table` holding IP addresses.
///
/// `forced` names a column outright (case-insensitive) and bypasses the
/// heuristics. Fails with [`Error::NoIpColumnFound`] when nothing qualifies.
pub fn detect_ip_column(
    table: &InputTable,
    policy: &DetectionPolicy,
    forced: Option<&str>,
) -> Result<ColumnId> {
    let headers = table.headers();
    let column = |index: usize, matched: Matched| ColumnId {
        index,
        name: headers[index].clone(),
        matched,
    };

    if let Some(name) = forced {
        return headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name.trim()))
            .map(|i| column(i, Matched::Forced))
            .ok_or_else(|| Error::ColumnNotFound {
                name: name.to_string(),
                headers: headers.to_vec(),
            });
    }

    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

    // Header hits over empty columns only count if no column holds IPs.
    let mut empty_hit: Option<ColumnId> = None;

    for term in &policy.header_terms {
        let term = normalize_header(term);
        if let Some(index) = normalized.iter().position(|h| *h == term) {
            match policy.ip_ratio(table.column(index)) {
                Some(ratio) if ratio >= policy.min_match_ratio => {
                    return Ok(column(index, Matched::Header))
                }
                None if empty_hit.is_none() => empty_hit = Some(column(index, Matched::Header)),
                _ => {}
            }
        }
    }

    for (index, header) in headers.iter().enumerate() {
        let tokens = header_tokens(header);
        let hit = tokens
            .iter()
            .any(|t| policy.token_terms.iter().any(|term| term == t));
        if !hit {
            continue;
        }
        match policy.ip_ratio(table.column(index)) {
            Some(ratio) if ratio >= policy.min_match_ratio => {
                return Ok(column(index, Matched::Token))
            }
            None if empty_hit.is_none() => empty_hit = Some(column(index, Matched::Token)),
            _ => {}
        }
    }

    let mut best: Option<(usize, f64)> = None;
    for index in 0..headers.len() {
        if let Some(ratio) = policy.ip_ratio(table.column(index)) {
            if ratio >= policy.min_match_ratio && best.map_or(true, |(_, r)| ratio > r) {
                best = Some((index, ratio));
            }
        }
    }

    best.map(|(index, _)| column(index, Matched::Values))
        .or(empty_hit)
        .ok_or_else(|| Error::NoIpColumnFound {
            headers: headers.to_vec(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> InputTable {
        InputTable::from_parts(
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_header("IP Address"), "ipaddress");
        assert_eq!(normalize_header("dst_addr"), "dstaddr");
        assert_eq!(normalize_header("  Ip "), "ip");
    }

    #[test]
    fn tokens() {
        assert_eq!(header_tokens("dstAddr"), ["dst", "addr"]);
        assert_eq!(header_tokens("Client IP"), ["client", "ip"]);
        assert_eq!(header_tokens("src_ip_v4"), ["src", "ip", "v4"]);
        assert_eq!(header_tokens("IPAddress"), ["ipaddress"]);
        assert_eq!(header_tokens("zip"), ["zip"]);
    }

    #[test]
    fn ip_values() {
        assert!(looks_like_ip("8.8.8.8"));
        assert!(looks_like_ip(" 2001:4860:4860::8888 "));
        assert!(!looks_like_ip("8.8.8"));
        assert!(!looks_like_ip("999.1.1.1"));
        assert!(!looks_like_ip("example.com"));
    }

    #[test]
    fn exact_header_match() {
        let t = table(&["host", "dstAddr"], &[&["web", "8.8.8.8"]]);
        let col = detect_ip_column(&t, &DetectionPolicy::default(), None).unwrap();
        assert_eq!(col.index, 1);
        assert_eq!(col.name, "dstAddr");
        assert_eq!(col.matched, Matched::Header);
    }

    #[test]
    fn header_priority_follows_term_order() {
        let t = table(&["Address", "IP"], &[]);
        let col = detect_ip_column(&t, &DetectionPolicy::default(), None).unwrap();
        assert_eq!(col.name, "IP");
    }

    #[test]
    fn token_header_match() {
        let t = table(&["id", "Client IP (v4)"], &[&["1", "1.1.1.1"]]);
        let col = detect_ip_column(&t, &DetectionPolicy::default(), None).unwrap();
        assert_eq!(col.index, 1);
        assert_eq!(col.matched, Matched::Token);
    }

    #[test]
    fn zip_is_not_ip() {
        let t = table(&["zip", "peer"], &[&["90210", "9.9.9.9"]]);
        let col = detect_ip_column(&t, &DetectionPolicy::default(), None).unwrap();
        assert_eq!(col.name, "peer");
        assert_eq!(col.matched, Matched::Values);
    }

    #[test]
    fn street_address_does_not_shadow_ip_values() {
        let t = table(
            &["Address", "Value"],
            &[
                &["1 Main St", "8.8.8.8"],
                &["2 Main St", "1.1.1.1"],
            ],
        );
        let col = detect_ip_column(&t, &DetectionPolicy::default(), None).unwrap();
        assert_eq!(col.name, "Value");
    }

    #[test]
    fn empty_ip_header_loses_to_ip_values() {
        let t = table(&["IP", "peer"], &[&["", "8.8.8.8"], &["", "1.1.1.1"]]);
        let col = detect_ip_column(&t, &DetectionPolicy::default(), None).unwrap();
        assert_eq!(col.name, "peer");
        assert_eq!(col.matched, Matched::Values);

        let t = table(&["host", "Client IP", "x"], &[&["", "", "9.9.9.9"]]);
        let col = detect_ip_column(&t, &DetectionPolicy::default(), None).unwrap();
        assert_eq!(col.name, "x");
    }

    #[test]
    fn empty_ip_header_wins_without_ip_values() {
        let t = table(&["name", "IP"], &[&["alice", ""], &["bob", ""]]);
        let col = detect_ip_column(&t, &DetectionPolicy::default(), None).unwrap();
        assert_eq!(col.name, "IP");
        assert_eq!(col.matched, Matched::Header);
    }

    #[test]
    fn value_fallback_picks_best_ratio() {
        let t = table(
            &["a", "b", "c"],
            &[
                &["x", "8.8.8.8", "1.1.1.1"],
                &["y", "nope", "1.0.0.1"],
                &["z", "9.9.9.9", "::1"],
            ],
        );
        let col = detect_ip_column(&t, &DetectionPolicy::default(), None).unwrap();
        assert_eq!(col.name, "c");
    }

    #[test]
    fn forced_column_is_case_insensitive() {
        let t = table(&["Peer", "ip"], &[&["8.8.8.8", "junk"]]);
        let col = detect_ip_column(&t, &DetectionPolicy::default(), Some("peer")).unwrap();
        assert_eq!(col.index, 0);
        assert_eq!(col.matched, Matched::Forced);

        let err = detect_ip_column(&t, &DetectionPolicy::default(), Some("dst")).unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound { .. }));
    }

    #[test]
    fn no_column_found() {
        let t = table(&["name", "count"], &[&["a", "1"], &["b", "2"]]);
        let err = detect_ip_column(&t, &DetectionPolicy::default(), None).unwrap_err();
        match err {
            Error::NoIpColumnFound { headers } => assert_eq!(headers, ["name", "count"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn custom_policy_terms() {
        let policy = DetectionPolicy {
            header_terms: vec!["peer".into()],
            token_terms: vec![],
            ..DetectionPolicy::default()
        };
        let t = table(&["ip", "peer"], &[]);
        let col = detect_ip_column(&t, &policy, None).unwrap();
        assert_eq!(col.name, "peer");
    }
}
