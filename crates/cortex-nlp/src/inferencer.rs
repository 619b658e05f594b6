//! Relationship Inferencer (spec §4.11): pattern-based pairs → typed
//! relationships.

use std::collections::HashMap;

use cortex_types::domain::{EntityType, RelationshipType};
use cortex_types::EntityId;
use regex::Regex;

use crate::error::Result;
use crate::extractor::ExtractedEntity;

struct Rule {
    source_types: Vec<EntityType>,
    target_types: Vec<EntityType>,
    patterns: Vec<Regex>,
    weight: f64,
}

/// An entity resolved to a graph id, carrying the text span it was
/// extracted from so co-location can be tested against `context_window`.
#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    pub id: EntityId,
    pub entity_type: EntityType,
    pub span: (usize, usize),
}

impl ResolvedEntity {
    pub fn from_extracted(id: EntityId, extracted: &ExtractedEntity) -> Self {
        Self {
            id,
            entity_type: extracted.entity_type,
            span: extracted.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferredRelationship {
    pub relationship_type: RelationshipType,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub weight: f64,
}

pub struct RelationshipInferencer {
    rules: Vec<(RelationshipType, Rule)>,
    max_relationships_per_pair: usize,
    min_confidence: f64,
}

const DEFAULT_MAX_PER_PAIR: usize = 3;
/// Characters of slack on either side of the tighter span when building the
/// context window searched for a rule's patterns.
const DEFAULT_WINDOW: usize = 120;

impl RelationshipInferencer {
    pub fn new(min_confidence: f64) -> Result<Self> {
        Ok(Self {
            rules: default_rules()?,
            max_relationships_per_pair: DEFAULT_MAX_PER_PAIR,
            min_confidence,
        })
    }

    pub fn with_max_per_pair(mut self, n: usize) -> Self {
        self.max_relationships_per_pair = n.max(1);
        self
    }

    /// Infers relationships between every ordered pair of entities that are
    /// co-located within a context window of `text`, where at least one
    /// rule's source/target types match and one of its patterns matches the
    /// window text. Dedups per `(source, target, type)` keeping the maximum
    /// weight, and caps emissions per ordered pair.
    pub fn infer(&self, text: &str, entities: &[ResolvedEntity]) -> Vec<InferredRelationship> {
        let mut best: HashMap<(EntityId, EntityId, RelationshipType), f64> = HashMap::new();
        let mut per_pair_count: HashMap<(EntityId, EntityId), usize> = HashMap::new();

        for source in entities {
            for target in entities {
                if source.id == target.id {
                    continue;
                }
                let Some(window) = context_window(text, source.span, target.span, DEFAULT_WINDOW)
                else {
                    continue;
                };

                for (rel_type, rule) in &self.rules {
                    if !rule.source_types.contains(&source.entity_type)
                        || !rule.target_types.contains(&target.entity_type)
                    {
                        continue;
                    }
                    if rule.weight < self.min_confidence {
                        continue;
                    }
                    if !rule.patterns.iter().any(|p| p.is_match(window)) {
                        continue;
                    }

                    let pair_key = (source.id, target.id);
                    let count = per_pair_count.entry(pair_key).or_insert(0);
                    if *count >= self.max_relationships_per_pair {
                        continue;
                    }

                    let key = (source.id, target.id, *rel_type);
                    let entry = best.entry(key).or_insert(rule.weight);
                    if rule.weight > *entry {
                        *entry = rule.weight;
                    } else {
                        continue;
                    }
                    *count += 1;
                }
            }
        }

        let mut out: Vec<_> = best
            .into_iter()
            .map(|((source_id, target_id, relationship_type), weight)| InferredRelationship {
                relationship_type,
                source_id,
                target_id,
                weight,
            })
            .collect();
        out.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }
}

/// The substring spanning both entities plus slack on either side, or
/// `None` when the pair is farther apart than `window` characters (not
/// "co-located" per spec §4.11).
fn context_window(
    text: &str,
    a: (usize, usize),
    b: (usize, usize),
    window: usize,
) -> Option<&str> {
    let lo = a.0.min(b.0);
    let hi = a.1.max(b.1);
    if hi.saturating_sub(lo) > window * 4 {
        return None;
    }
    let start = lo.saturating_sub(window);
    let end = (hi + window).min(text.len());
    // Regexes only match UTF-8 char boundaries; fall back to the nearest
    // valid boundary rather than panicking on a mid-character slice.
    let start = nearest_char_boundary(text, start);
    let end = nearest_char_boundary(text, end);
    text.get(start..end)
}

fn nearest_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && idx < text.len() && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx.min(text.len())
}

fn rule(
    source_types: &[EntityType],
    target_types: &[EntityType],
    patterns: &[&str],
    weight: f64,
) -> Result<Rule> {
    let compiled = patterns
        .iter()
        .map(|p| Regex::new(p).map_err(Into::into))
        .collect::<Result<Vec<_>>>()?;
    Ok(Rule {
        source_types: source_types.to_vec(),
        target_types: target_types.to_vec(),
        patterns: compiled,
        weight,
    })
}

fn default_rules() -> Result<Vec<(RelationshipType, Rule)>> {
    use EntityType::*;
    Ok(vec![
        (
            RelationshipType::DependsOn,
            rule(
                &[CodeFile, CodeFunction, CodeClass],
                &[CodeFile, CodeFunction, CodeClass],
                &[r"(?i)depends on", r"(?i)requires", r"(?i)needs"],
                0.8,
            )?,
        ),
        (
            RelationshipType::Implements,
            rule(
                &[CodeClass, CodeFunction],
                &[Concept, CodeClass],
                &[r"(?i)implements", r"(?i)satisfies"],
                0.85,
            )?,
        ),
        (
            RelationshipType::Uses,
            rule(
                &[CodeFunction, CodeClass, CodeFile],
                &[CodeFunction, CodeClass, CodeFile],
                &[r"(?i)\buses\b", r"(?i)calls", r"(?i)invokes"],
                0.7,
            )?,
        ),
        (
            RelationshipType::References,
            rule(
                &[Decision, Task, Concept],
                &[CodeFile, CodeFunction, CodeClass],
                &[r"(?i)references", r"(?i)see", r"(?i)in\s"],
                0.55,
            )?,
        ),
        (
            RelationshipType::Causes,
            rule(
                &[Error, Task, Decision],
                &[Error, Task],
                &[r"(?i)causes", r"(?i)leads to", r"(?i)results in"],
                0.75,
            )?,
        ),
        (
            RelationshipType::Blocks,
            rule(
                &[Task, Error],
                &[Task],
                &[r"(?i)blocks", r"(?i)blocked by", r"(?i)prevents"],
                0.75,
            )?,
        ),
        (
            RelationshipType::RelatedTo,
            rule(
                &[
                    Person, Organization, Concept, Decision, Task, Error, Event, CodeFile,
                    CodeFunction, CodeClass,
                ],
                &[
                    Person, Organization, Concept, Decision, Task, Error, Event, CodeFile,
                    CodeFunction, CodeClass,
                ],
                &[r"(?i)related to", r"(?i)associated with", r"(?i)regarding"],
                0.4,
            )?,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_types::EntityId;

    fn entity(entity_type: EntityType, span: (usize, usize)) -> ResolvedEntity {
        ResolvedEntity {
            id: EntityId::new(),
            entity_type,
            span,
        }
    }

    #[test]
    fn infers_depends_on_for_co_located_code_entities() {
        let text = "parser.rs depends on lexer.rs for tokenization";
        let source = entity(EntityType::CodeFile, (0, 9));
        let target = entity(EntityType::CodeFile, (21, 30));
        let inf = RelationshipInferencer::new(0.5).unwrap();
        let rels = inf.infer(text, &[source.clone(), target.clone()]);
        assert!(rels
            .iter()
            .any(|r| r.relationship_type == RelationshipType::DependsOn
                && r.source_id == source.id
                && r.target_id == target.id));
    }

    #[test]
    fn caps_emissions_per_ordered_pair() {
        let text = "a uses b, a related to b, a references b, a causes b";
        let a = entity(EntityType::CodeFile, (0, 1));
        let b = entity(EntityType::CodeFile, (1, 2));
        let inf = RelationshipInferencer::new(0.0).unwrap().with_max_per_pair(2);
        let rels = inf.infer(text, &[a.clone(), b.clone()]);
        let count = rels
            .iter()
            .filter(|r| r.source_id == a.id && r.target_id == b.id)
            .count();
        assert!(count <= 2);
    }

    #[test]
    fn does_not_relate_entities_outside_the_context_window() {
        let far_text_len = 10_000;
        let mut text = String::from("alpha.rs starts here");
        text.push_str(&" ".repeat(far_text_len));
        text.push_str("beta.rs uses it");
        let a = entity(EntityType::CodeFile, (0, 8));
        let b_start = text.find("beta.rs").unwrap();
        let b = entity(EntityType::CodeFile, (b_start, b_start + 7));
        let inf = RelationshipInferencer::new(0.0).unwrap();
        let rels = inf.infer(&text, &[a.clone(), b.clone()]);
        assert!(rels.is_empty());
    }

    #[test]
    fn min_confidence_filters_weak_rules() {
        let text = "alpha related to beta";
        let a = entity(EntityType::Concept, (0, 5));
        let b = entity(EntityType::Concept, (17, 21));
        let inf = RelationshipInferencer::new(0.9).unwrap();
        let rels = inf.infer(text, &[a, b]);
        assert!(rels.is_empty());
    }
}
