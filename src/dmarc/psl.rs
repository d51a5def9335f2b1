/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::collections::HashSet;

const PUBLIC_SUFFIX_LIST: &str = include_str!("../../resources/public_suffix_list.dat");

/// Public Suffix List index for organisational-domain resolution.
///
/// The index is immutable once built; construct it during startup and share
/// it across concurrent evaluations.
#[derive(Debug, Clone)]
pub struct PslIndex {
    rules: HashSet<String>,
    wildcards: HashSet<String>,
    exceptions: HashSet<String>,
}

impl PslIndex {
    /// Builds the index from the bundled Public Suffix List snapshot.
    pub fn new() -> Self {
        Self::parse(PUBLIC_SUFFIX_LIST)
    }

    /// Builds the index from a Public Suffix List in its standard text
    /// format: one entry per line, `//` comments, `!` exception and `*.`
    /// wildcard prefixes.
    pub fn parse(data: &str) -> Self {
        let mut index = PslIndex {
            rules: HashSet::new(),
            wildcards: HashSet::new(),
            exceptions: HashSet::new(),
        };
        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            if let Some(exception) = line.strip_prefix('!') {
                index.exceptions.insert(exception.to_lowercase());
            } else if let Some(wildcard) = line.strip_prefix("*.") {
                index.wildcards.insert(wildcard.to_lowercase());
            } else {
                index.rules.insert(line.to_lowercase());
            }
        }
        index
    }

    /// Computes the organisational domain used for relaxed DMARC alignment.
    ///
    /// Candidate suffixes of `domain` are tested from the longest down; for
    /// each candidate an exception entry wins over a wildcard, which wins
    /// over a plain rule. Unlisted domains are returned whole.
    pub fn org_domain(&self, domain: &str) -> String {
        let domain = domain.trim().to_lowercase();
        if domain.is_empty() {
            return domain;
        }
        let labels = domain.split('.').collect::<Vec<_>>();

        for i in 0..labels.len() {
            let candidate = labels[i..].join(".");
            if self.exceptions.contains(&candidate) {
                return candidate;
            }
            if self.wildcards.contains(&candidate) {
                // the wildcard label itself plus one registrable label
                return match i {
                    0 => candidate,
                    1 => domain,
                    _ => labels[i - 2..].join("."),
                };
            }
            if self.rules.contains(&candidate) {
                return if i == 0 {
                    domain
                } else {
                    labels[i - 1..].join(".")
                };
            }
        }

        domain
    }
}

impl Default for PslIndex {
    fn default() -> Self {
        Self::new()
    }
}
