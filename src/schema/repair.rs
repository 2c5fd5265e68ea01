//! Fuzzy reconciliation of raw headers against the canonical schema
//!
//! Older FED3 firmware wrote headers with stray whitespace and small typos
//! (" FR_Ratio", "Pellet_Count ", "Left_Poke_Coun"). Rather than keep a rename
//! table, every input header is scored against every canonical header with a
//! gestalt (Ratcliff/Obershelp) similarity ratio and renamed when the best
//! score clears `SIMILARITY_THRESHOLD`.

use serde::Serialize;

use crate::schema::raw_table::CONCAT_INDEX_COLUMN;
use crate::types::Field;

/// Minimum similarity (exclusive) for a header to be renamed
pub const SIMILARITY_THRESHOLD: f64 = 0.85;

/// Similarity ratio in [0, 1]: `2 * M / (len(a) + len(b))`, where `M` is the
/// number of characters in the recursively-found longest common blocks.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`; ties resolve to
/// the block starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo + 1;
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; width];
    for i in alo..ahi {
        let mut cur = vec![0usize; width];
        for j in blo..bhi {
            if a[i] == b[j] {
                let k = prev[j - blo] + 1;
                cur[j - blo + 1] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            }
        }
        prev = cur;
    }
    best
}

/// Where an input column ends up after repair
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Canonical(Field),
    /// The session-of-origin tag written by concatenation
    ConcatIndex,
    Foreign,
}

/// A rename performed by repair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMatch {
    pub source: String,
    pub field: Field,
    pub similarity: f64,
}

/// Outcome of reconciling one header row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairReport {
    /// One role per input column, in input order
    pub roles: Vec<ColumnRole>,
    pub matches: Vec<ColumnMatch>,
    pub foreign_columns: Vec<String>,
    pub missing_columns: Vec<Field>,
}

/// Schema reconciliation pass
pub struct SchemaRepair;

impl SchemaRepair {
    /// Best canonical match for a header, if it clears the threshold
    pub fn match_column(name: &str) -> Option<(Field, f64)> {
        let mut best: Option<(Field, f64)> = None;
        for field in Field::ALL {
            let score = similarity_ratio(name, field.header());
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((field, score));
            }
        }
        best.filter(|(_, score)| *score > SIMILARITY_THRESHOLD)
    }

    /// Reconcile a header row. Never fails: unmatched headers are reported as
    /// foreign and absent required fields as missing.
    pub fn repair<S: AsRef<str>>(names: &[S]) -> RepairReport {
        let mut report = RepairReport::default();
        let mut claimed: Vec<Field> = Vec::new();

        for name in names {
            let name = name.as_ref();
            if name == CONCAT_INDEX_COLUMN {
                report.roles.push(ColumnRole::ConcatIndex);
                continue;
            }
            match Self::match_column(name) {
                Some((field, _)) if claimed.contains(&field) => {
                    log::warn!(
                        "Column \"{}\" also matches {} which is already taken; keeping it as foreign",
                        name,
                        field
                    );
                    report.roles.push(ColumnRole::Foreign);
                    report.foreign_columns.push(name.to_string());
                }
                Some((field, similarity)) => {
                    if name != field.header() {
                        log::debug!("Renaming column \"{}\" to {} ({:.3})", name, field, similarity);
                    }
                    claimed.push(field);
                    report.roles.push(ColumnRole::Canonical(field));
                    report.matches.push(ColumnMatch {
                        source: name.to_string(),
                        field,
                        similarity,
                    });
                }
                None => {
                    report.roles.push(ColumnRole::Foreign);
                    report.foreign_columns.push(name.to_string());
                }
            }
        }

        report.missing_columns = Field::REQUIRED
            .iter()
            .copied()
            .filter(|f| !claimed.contains(f))
            .collect();
        report
    }
}
