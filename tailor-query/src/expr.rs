use std::str::FromStr;

use serde_json::{json, Value};

/// Document fields addressable by a scoring expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocField {
    Title,
    Body,
    Category,
}

impl DocField {
    pub fn as_str(self) -> &'static str {
        match self {
            DocField::Title => "title",
            DocField::Body => "body",
            DocField::Category => "category",
        }
    }
}

/// Edit-distance tolerance for the base match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fuzziness {
    /// Scale with term length: 0 edits up to 2 chars, 1 edit for 3-5, 2 edits beyond.
    #[default]
    Auto,
    Fixed(u8),
}

impl Fuzziness {
    pub const MAX_DISTANCE: u8 = 2;

    pub fn distance_for(self, term: &str) -> u8 {
        match self {
            Fuzziness::Auto => match term.chars().count() {
                0..=2 => 0,
                3..=5 => 1,
                _ => 2,
            },
            Fuzziness::Fixed(d) => d.min(Self::MAX_DISTANCE),
        }
    }

    fn to_json(self) -> Value {
        match self {
            Fuzziness::Auto => json!("AUTO"),
            Fuzziness::Fixed(d) => json!(d.min(Self::MAX_DISTANCE)),
        }
    }
}

impl FromStr for Fuzziness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Fuzziness::Auto);
        }
        match s.parse::<u8>() {
            Ok(d) if d <= Self::MAX_DISTANCE => Ok(Fuzziness::Fixed(d)),
            _ => Err(format!("invalid fuzziness {s:?}; expected auto, 0, 1 or 2")),
        }
    }
}

/// Multi-field fuzzy match of the raw query text.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    pub query: String,
    pub fields: Vec<DocField>,
    pub fuzziness: Fuzziness,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoostTarget {
    /// Documents whose category field equals this value exactly.
    CategoryEquals(String),
    /// Documents containing the term in any of the fields.
    TermIn { term: String, fields: Vec<DocField> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoostClause {
    pub target: BoostTarget,
    pub weight: f64,
}

/// How boost weights merge with each other and with base relevance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombinationMode {
    /// `score = base + Σ weight(matching boosts)`.
    #[default]
    Sum,
}

impl CombinationMode {
    fn as_str(self) -> &'static str {
        match self {
            CombinationMode::Sum => "sum",
        }
    }
}

/// Scoring expression handed to the index. Built per request, consumed once.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoringExpression {
    /// Plain relevance, no personalization.
    Base(MatchClause),
    /// Base relevance plus weighted boosts. `boosts` is never empty.
    Composite {
        base: MatchClause,
        boosts: Vec<BoostClause>,
        mode: CombinationMode,
    },
    /// Query-less match of any document in one of the categories.
    AnyCategory(Vec<String>),
}

impl ScoringExpression {
    pub fn base(&self) -> Option<&MatchClause> {
        match self {
            ScoringExpression::Base(base) => Some(base),
            ScoringExpression::Composite { base, .. } => Some(base),
            ScoringExpression::AnyCategory(_) => None,
        }
    }

    pub fn boosts(&self) -> &[BoostClause] {
        match self {
            ScoringExpression::Composite { boosts, .. } => boosts,
            ScoringExpression::Base(_) | ScoringExpression::AnyCategory(_) => &[],
        }
    }

    /// Render as an Elasticsearch-style query DSL document.
    pub fn to_json(&self) -> Value {
        match self {
            ScoringExpression::Base(base) => match_json(base),
            ScoringExpression::Composite { base, boosts, mode } => {
                let functions: Vec<Value> = boosts
                    .iter()
                    .map(|b| json!({ "filter": boost_filter_json(&b.target), "weight": b.weight }))
                    .collect();
                json!({
                    "function_score": {
                        "query": match_json(base),
                        "functions": functions,
                        "score_mode": mode.as_str(),
                        "boost_mode": mode.as_str(),
                    }
                })
            }
            ScoringExpression::AnyCategory(categories) => {
                let should: Vec<Value> = categories
                    .iter()
                    .map(|c| json!({ "term": { "category": c } }))
                    .collect();
                json!({ "bool": { "should": should, "minimum_should_match": 1 } })
            }
        }
    }
}

fn field_names(fields: &[DocField]) -> Vec<&'static str> {
    fields.iter().map(|f| f.as_str()).collect()
}

fn match_json(m: &MatchClause) -> Value {
    json!({
        "multi_match": {
            "query": m.query,
            "fields": field_names(&m.fields),
            "fuzziness": m.fuzziness.to_json(),
        }
    })
}

fn boost_filter_json(target: &BoostTarget) -> Value {
    match target {
        BoostTarget::CategoryEquals(category) => json!({ "term": { "category": category } }),
        BoostTarget::TermIn { term, fields } => json!({
            "multi_match": { "query": term, "fields": field_names(fields) }
        }),
    }
}
