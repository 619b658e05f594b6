//! Entity Extractor (spec §4.10): pattern-based text → typed entities.

use std::collections::{HashMap, HashSet};

use cortex_types::domain::EntityType;
use regex::Regex;

use crate::error::Result;

/// One compiled pattern within a type's ordered list. Patterns are tried in
/// order; order determines the base confidence (earlier patterns are more
/// specific and score higher), per spec "confidence... derived from
/// match/pattern-count".
struct PatternRule {
    regex: Regex,
    base_confidence: f64,
}

struct TypeRegistration {
    entity_type: EntityType,
    patterns: Vec<PatternRule>,
    stoplist: HashSet<&'static str>,
    min_length: usize,
}

/// `{key, value, category?}` used to prioritize extraction types and tag
/// extracted entities with their source (spec §4.10 "context-aware
/// extraction").
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    pub key: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub entity_type: EntityType,
    pub name: String,
    pub confidence: f64,
    pub context_key: Option<String>,
    pub context_category: Option<String>,
    /// Byte offsets of the full pattern match in the source text, used by
    /// the Relationship Inferencer to test co-location (spec §4.11). When
    /// the same `(type, name)` is found more than once, this is the span of
    /// the surviving (highest-confidence) occurrence.
    pub span: (usize, usize),
}

/// Boost applied to a type's confidence when that type is prioritized by
/// the calling context's category (spec §4.10: "boost confidence ×1.2").
const CONTEXT_BOOST: f64 = 1.2;

pub struct EntityExtractor {
    registrations: Vec<TypeRegistration>,
    min_confidence: f64,
}

impl EntityExtractor {
    /// Builds the default typed registry. `min_confidence` caps emissions,
    /// defaulting to the spec's documented `0.5`.
    pub fn new(min_confidence: f64) -> Result<Self> {
        Ok(Self {
            registrations: default_registrations()?,
            min_confidence,
        })
    }

    /// Extracts entities from free text with no context hints.
    pub fn extract(&self, text: &str) -> Vec<ExtractedEntity> {
        self.extract_with_context(text, None)
    }

    /// Extracts entities, prioritizing types matching `context.category` and
    /// tagging survivors with `contextKey`/`contextCategory`.
    pub fn extract_with_context(
        &self,
        text: &str,
        context: Option<&ExtractionContext>,
    ) -> Vec<ExtractedEntity> {
        let mut found: HashMap<(EntityType, String), ExtractedEntity> = HashMap::new();

        for reg in &self.registrations {
            let prioritized = context
                .and_then(|c| c.category.as_deref())
                .is_some_and(|cat| type_matches_category(reg.entity_type, cat));

            for rule in &reg.patterns {
                for caps in rule.regex.captures_iter(text) {
                    let span = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
                    let raw = captured_group(&caps);
                    let Some(raw) = raw else { continue };
                    let Some(name) = normalize(reg.entity_type, raw) else {
                        continue;
                    };
                    if name.len() < reg.min_length {
                        continue;
                    }
                    if reg.stoplist.contains(name.to_lowercase().as_str()) {
                        continue;
                    }

                    let mut confidence = rule.base_confidence;
                    if prioritized {
                        confidence = (confidence * CONTEXT_BOOST).min(1.0);
                    }
                    if confidence < self.min_confidence {
                        continue;
                    }

                    let dedup_key = (reg.entity_type, name.to_lowercase());
                    let entity = ExtractedEntity {
                        entity_type: reg.entity_type,
                        name: name.clone(),
                        confidence,
                        context_key: context.and_then(|c| c.key.clone()),
                        context_category: context.and_then(|c| c.category.clone()),
                        span,
                    };
                    found
                        .entry(dedup_key)
                        .and_modify(|existing| {
                            if entity.confidence > existing.confidence {
                                *existing = entity.clone();
                            }
                        })
                        .or_insert(entity);
                }
            }
        }

        let mut out: Vec<_> = found.into_values().collect();
        out.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        out
    }
}

fn captured_group(caps: &regex::Captures<'_>) -> Option<String> {
    // Named/first capture group if present, else the full match.
    if let Some(m) = caps.iter().skip(1).flatten().next() {
        Some(m.as_str().to_string())
    } else {
        caps.get(0).map(|m| m.as_str().to_string())
    }
}

fn type_matches_category(entity_type: EntityType, category: &str) -> bool {
    let category = category.to_lowercase();
    matches!(
        (entity_type, category.as_str()),
        (EntityType::Decision, "decision")
            | (EntityType::Task, "task")
            | (EntityType::Error, "error" | "bug")
            | (EntityType::CodeFile, "code")
            | (EntityType::CodeFunction, "code")
            | (EntityType::CodeClass, "code")
            | (EntityType::Concept, "concept" | "architecture")
            | (EntityType::Person, "person" | "team")
            | (EntityType::Organization, "organization")
            | (EntityType::Event, "event")
    )
}

/// Applies the per-type normalization rules (spec §4.10): strip honorific,
/// drop trailing punctuation (except code files, where punctuation may be
/// part of the path/extension), strip leading articles for organizations,
/// strip `@` on mentions.
fn normalize(entity_type: EntityType, raw: String) -> Option<String> {
    let mut s = raw.trim().to_string();
    if s.is_empty() {
        return None;
    }

    if matches!(entity_type, EntityType::Person) {
        s = strip_honorific(&s);
    }
    if matches!(entity_type, EntityType::Organization) {
        s = strip_leading_article(&s);
    }
    s = s.trim_start_matches('@').to_string();

    if !matches!(entity_type, EntityType::CodeFile) {
        s = s
            .trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '_')
            .to_string();
    }

    let s = s.trim().to_string();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn strip_honorific(name: &str) -> String {
    const HONORIFICS: &[&str] = &["Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Mr", "Mrs", "Ms", "Dr", "Prof"];
    let mut rest = name;
    for h in HONORIFICS {
        if let Some(stripped) = rest.strip_prefix(h) {
            rest = stripped.trim_start();
            break;
        }
    }
    rest.to_string()
}

fn strip_leading_article(name: &str) -> String {
    for article in ["The ", "the ", "A ", "a ", "An ", "an "] {
        if let Some(stripped) = name.strip_prefix(article) {
            return stripped.to_string();
        }
    }
    name.to_string()
}

fn rule(pattern: &str, base_confidence: f64) -> Result<PatternRule> {
    Ok(PatternRule {
        regex: Regex::new(pattern)?,
        base_confidence,
    })
}

fn default_registrations() -> Result<Vec<TypeRegistration>> {
    Ok(vec![
        TypeRegistration {
            entity_type: EntityType::Person,
            patterns: vec![
                rule(r"\b(?:Mr|Mrs|Ms|Dr|Prof)\.?\s+([A-Z][a-z]+(?:\s[A-Z][a-z]+)?)\b", 0.9)?,
                rule(r"@([A-Za-z0-9_-]{2,32})\b", 0.6)?,
            ],
            stoplist: HashSet::from(["unknown", "n/a"]),
            min_length: 2,
        },
        TypeRegistration {
            entity_type: EntityType::Organization,
            patterns: vec![
                rule(
                    r"\b((?:[Tt]he\s+)?[A-Z][A-Za-z0-9&]+(?:\s[A-Z][A-Za-z0-9&]+){0,3}\s(?:Inc|Corp|LLC|Ltd|Foundation|Company)\.?)\b",
                    0.85,
                )?,
            ],
            stoplist: HashSet::new(),
            min_length: 3,
        },
        TypeRegistration {
            entity_type: EntityType::CodeFile,
            patterns: vec![
                rule(
                    r"\b([\w./-]+\.(?:rs|ts|tsx|js|jsx|py|go|java|rb|c|cpp|h|hpp|toml|yaml|yml|json|md|sql))\b",
                    0.9,
                )?,
            ],
            stoplist: HashSet::new(),
            min_length: 3,
        },
        TypeRegistration {
            entity_type: EntityType::CodeFunction,
            patterns: vec![
                rule(r"\bfn\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*\(", 0.9)?,
                rule(r"\bfunction\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*\(", 0.9)?,
                rule(r"`([a-zA-Z_][a-zA-Z0-9_]*)\(\)`", 0.75)?,
                rule(r"\b([a-zA-Z_][a-zA-Z0-9_]*)\(\)", 0.6)?,
            ],
            stoplist: HashSet::from(["if", "for", "while", "match", "return"]),
            min_length: 2,
        },
        TypeRegistration {
            entity_type: EntityType::CodeClass,
            patterns: vec![
                rule(r"\bclass\s+([A-Z][A-Za-z0-9_]*)\b", 0.9)?,
                rule(r"\bstruct\s+([A-Z][A-Za-z0-9_]*)\b", 0.9)?,
                rule(r"\btrait\s+([A-Z][A-Za-z0-9_]*)\b", 0.85)?,
                rule(r"`([A-Z][A-Za-z0-9_]*)`", 0.65)?,
            ],
            stoplist: HashSet::new(),
            min_length: 2,
        },
        TypeRegistration {
            entity_type: EntityType::Decision,
            patterns: vec![
                rule(r"(?i)\bdecided\s+to\s+([^.\n]{4,200})", 0.85)?,
                rule(r"(?i)\bwe(?:'ll| will)\s+([^.\n]{4,200})", 0.6)?,
            ],
            stoplist: HashSet::new(),
            min_length: 4,
        },
        TypeRegistration {
            entity_type: EntityType::Task,
            patterns: vec![
                rule(r"(?i)\bTODO:?\s*([^.\n]{4,200})", 0.9)?,
                rule(r"(?i)\b(?:need to|should)\s+([^.\n]{4,200})", 0.55)?,
            ],
            stoplist: HashSet::new(),
            min_length: 4,
        },
        TypeRegistration {
            entity_type: EntityType::Error,
            patterns: vec![
                rule(r"\b([A-Z][A-Za-z0-9]*(?:Error|Exception))\b", 0.9)?,
                rule(r"\b([A-Z]{2,8}\d{3,6})\b", 0.8)?,
            ],
            stoplist: HashSet::new(),
            min_length: 3,
        },
        TypeRegistration {
            entity_type: EntityType::Concept,
            patterns: vec![rule(r"`([a-zA-Z_][\w:-]{2,64})`", 0.5)?],
            stoplist: HashSet::new(),
            min_length: 3,
        },
        TypeRegistration {
            entity_type: EntityType::Event,
            patterns: vec![rule(
                r"(?i)\b(?:on|during)\s+(?:the\s+)?([A-Za-z][\w\s]{2,40}?(?:meeting|incident|outage|release|deploy|migration))\b",
                0.7,
            )?],
            stoplist: HashSet::new(),
            min_length: 4,
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_honorific_person_and_strips_title() {
        let ex = EntityExtractor::new(0.5).unwrap();
        let found = ex.extract("Dr. Alice Chen reviewed the migration plan.");
        let person = found
            .iter()
            .find(|e| e.entity_type == EntityType::Person)
            .expect("person extracted");
        assert_eq!(person.name, "Alice Chen");
    }

    #[test]
    fn extracts_code_file_and_keeps_trailing_extension() {
        let ex = EntityExtractor::new(0.5).unwrap();
        let found = ex.extract("See src/index.ts for the handler.");
        let file = found
            .iter()
            .find(|e| e.entity_type == EntityType::CodeFile)
            .expect("file extracted");
        assert_eq!(file.name, "src/index.ts");
    }

    #[test]
    fn dedups_by_type_and_lowercased_name_keeping_max_confidence() {
        let ex = EntityExtractor::new(0.5).unwrap();
        let found = ex.extract("fn handle_request() {} later we call handle_request() again.");
        let matches: Vec<_> = found
            .iter()
            .filter(|e| e.entity_type == EntityType::CodeFunction && e.name == "handle_request")
            .collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 0.9);
    }

    #[test]
    fn context_boosts_confidence_for_matching_category() {
        let ex = EntityExtractor::new(0.5).unwrap();
        let ctx = ExtractionContext {
            key: Some("note".into()),
            category: Some("task".into()),
        };
        let found = ex.extract_with_context("need to rotate the signing keys before Friday", Some(&ctx));
        let task = found
            .iter()
            .find(|e| e.entity_type == EntityType::Task)
            .expect("task extracted");
        assert!(task.confidence > 0.55);
        assert_eq!(task.context_key.as_deref(), Some("note"));
    }

    #[test]
    fn rejects_below_min_confidence_threshold() {
        let ex = EntityExtractor::new(0.95).unwrap();
        let found = ex.extract("@octocat filed a report.");
        assert!(found.iter().all(|e| e.entity_type != EntityType::Person));
    }
}
