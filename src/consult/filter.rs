use qdrant_client::qdrant::{Condition, Filter};

use crate::models::{Gender, Season};

/// Metadata filter for one consulting request, built once from the
/// caller's gender/season context and reused for every part's search.
///
/// The builder is pure and total: any combination of inputs yields a valid
/// filter, and the rendered expression is canonical (gender clause first,
/// seasons in fixed order) so the same logical filter always produces the
/// same string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchFilter {
    gender_codes: Option<&'static [i64]>,
    seasons: Vec<Season>,
}

/// Gender inclusivity table. Unisex records (code 3) satisfy every clause;
/// `Unspecified` produces no clause at all. Records carrying the ingestion
/// sentinel code 4 match none of these.
fn gender_match_codes(gender: Gender) -> Option<&'static [i64]> {
    match gender {
        Gender::Man => Some(&[1, 3]),
        Gender::Woman => Some(&[2, 3]),
        Gender::Other => Some(&[3]),
        Gender::Unspecified => None,
    }
}

impl SearchFilter {
    pub fn new(gender: Gender, seasons: &[Season]) -> Self {
        // Canonical order and dedup in one pass over Season::ALL.
        let seasons = Season::ALL
            .iter()
            .copied()
            .filter(|season| seasons.contains(season))
            .collect();
        Self {
            gender_codes: gender_match_codes(gender),
            seasons,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.gender_codes.is_none() && self.seasons.is_empty()
    }

    /// Canonical boolean expression, e.g.
    /// `gender in [1,3] and spring == 1 and summer == 1`.
    /// Empty string means "no filter".
    pub fn expr(&self) -> String {
        let mut clauses = Vec::new();
        if let Some(codes) = self.gender_codes {
            let codes: Vec<String> = codes.iter().map(|code| code.to_string()).collect();
            clauses.push(format!("gender in [{}]", codes.join(",")));
        }
        for season in &self.seasons {
            clauses.push(format!("{} == 1", season.field_name()));
        }
        clauses.join(" and ")
    }

    /// Native filter for the vector index; `None` means unfiltered search.
    pub fn to_qdrant(&self) -> Option<Filter> {
        if self.is_empty() {
            return None;
        }
        let mut must = Vec::new();
        if let Some(codes) = self.gender_codes {
            must.push(Condition::matches("gender", codes.to_vec()));
        }
        for season in &self.seasons {
            must.push(Condition::matches(season.field_name(), 1_i64));
        }
        Some(Filter::must(must))
    }
}

impl std::fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expr())
    }
}
