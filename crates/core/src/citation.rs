use crate::models::SearchHit;
use regex::Regex;
use std::fmt;

/// A filename must score above this ratio to replace the raw identifier.
pub const FILENAME_MATCH_THRESHOLD: u8 = 60;

const PAGE_PATTERNS: [&str; 5] = [
    r"(?i)pages?\s*(\d+)",
    r"(?i)pg\.?\s*(\d+)",
    r"(?i)p\.?\s*(\d+)",
    r"\[(\d+)\]",
    r"\((\d+)\)",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub filename: String,
    pub page: Option<u32>,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "{} (page {page})", self.filename),
            None => write!(f, "{}", self.filename),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CitationResolver {
    page_patterns: Vec<Regex>,
    threshold: u8,
}

impl CitationResolver {
    pub fn new() -> Result<Self, regex::Error> {
        let page_patterns = PAGE_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            page_patterns,
            threshold: FILENAME_MATCH_THRESHOLD,
        })
    }

    /// First pattern that matches wins. Page 0 counts as no page.
    pub fn extract_page_number(&self, text: &str) -> Option<u32> {
        self.page_patterns.iter().find_map(|pattern| {
            pattern
                .captures(text)
                .and_then(|capture| capture.get(1))
                .and_then(|digits| digits.as_str().parse::<u32>().ok())
                .filter(|page| *page > 0)
        })
    }

    /// Picks the known filename for `identifier`.
    ///
    /// Identifiers minted by the store (`<file>_page<n>_<i>`) resolve to their file
    /// directly; anything else goes through fuzzy matching.
    pub fn match_filename<'a>(&self, identifier: &str, known: &'a [String]) -> Option<&'a str> {
        let lowered = identifier.to_lowercase();

        let structural = known
            .iter()
            .filter(|file| lowered.starts_with(&format!("{}_page", file.to_lowercase())))
            .max_by_key(|file| file.len());
        if let Some(file) = structural {
            return Some(file.as_str());
        }

        let mut best: Option<(&'a str, u8)> = None;
        for file in known {
            let ratio = similarity_ratio(&lowered, &file.to_lowercase());
            let improves = best.map_or(true, |(_, best_ratio)| ratio > best_ratio);
            if ratio > self.threshold && improves {
                best = Some((file.as_str(), ratio));
            }
        }
        best.map(|(file, _)| file)
    }

    pub fn cite(&self, identifier: &str, known: &[String]) -> Citation {
        let filename = self
            .match_filename(identifier, known)
            .unwrap_or(identifier)
            .to_string();

        Citation {
            filename,
            page: self.extract_page_number(identifier),
        }
    }

    /// One rendered citation per hit, in hit order.
    pub fn resolve(&self, hits: &[SearchHit], known: &[String]) -> Vec<String> {
        hits.iter()
            .map(|hit| self.cite(&hit.chunk_id, known).to_string())
            .collect()
    }
}

/// Indel similarity on a 0-100 scale: `2 * lcs / (len_a + len_b)`, rounded.
pub fn similarity_ratio(left: &str, right: &str) -> u8 {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    if left.is_empty() || right.is_empty() {
        return 0;
    }

    let lcs = longest_common_subsequence(&left, &right);
    let ratio = 200.0 * lcs as f64 / (left.len() + right.len()) as f64;
    ratio.round().clamp(0.0, 100.0) as u8
}

fn longest_common_subsequence(left: &[char], right: &[char]) -> usize {
    let mut previous = vec![0usize; right.len() + 1];
    let mut current = vec![0usize; right.len() + 1];

    for a in left {
        for (j, b) in right.iter().enumerate() {
            current[j + 1] = if a == b {
                previous[j] + 1
            } else {
                current[j].max(previous[j + 1])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}
