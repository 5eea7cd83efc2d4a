use crate::expr::{
    BoostClause, BoostTarget, CombinationMode, DocField, Fuzziness, MatchClause, ScoringExpression,
};
use crate::weights::WeightedSignal;

const BASE_FIELDS: [DocField; 3] = [DocField::Title, DocField::Body, DocField::Category];
const TERM_FIELDS: [DocField; 2] = [DocField::Title, DocField::Body];

pub fn base_clause(query: &str, fuzziness: Fuzziness) -> MatchClause {
    MatchClause {
        query: query.to_string(),
        fields: BASE_FIELDS.to_vec(),
        fuzziness,
    }
}

/// Combine the base match with one boost per category signal and one per term
/// signal. With no signals at all the base clause is returned as-is.
pub fn compose(
    query: &str,
    fuzziness: Fuzziness,
    categories: &[WeightedSignal],
    terms: &[WeightedSignal],
) -> ScoringExpression {
    let base = base_clause(query, fuzziness);
    if categories.is_empty() && terms.is_empty() {
        return ScoringExpression::Base(base);
    }

    let mut boosts = Vec::with_capacity(categories.len() + terms.len());
    boosts.extend(categories.iter().map(|c| BoostClause {
        target: BoostTarget::CategoryEquals(c.key.clone()),
        weight: c.weight,
    }));
    boosts.extend(terms.iter().map(|t| BoostClause {
        target: BoostTarget::TermIn {
            term: t.key.clone(),
            fields: TERM_FIELDS.to_vec(),
        },
        weight: t.weight,
    }));

    ScoringExpression::Composite {
        base,
        boosts,
        mode: CombinationMode::Sum,
    }
}

/// Query-less expression over a user's favourite categories, or `None` when
/// there is nothing to recommend from.
pub fn recommend<S: AsRef<str>>(categories: &[S]) -> Option<ScoringExpression> {
    let categories: Vec<String> = categories
        .iter()
        .map(|c| c.as_ref().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if categories.is_empty() {
        None
    } else {
        Some(ScoringExpression::AnyCategory(categories))
    }
}
