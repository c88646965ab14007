use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::identity::Person;

/// Default cosine similarity a probe must reach to count as a match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.40;
/// Default score gap under which two above-threshold people are ambiguous.
pub const DEFAULT_AMBIGUITY_MARGIN: f32 = 0.05;
/// ArcFace (w600k_r50) embedding dimension.
pub const DEFAULT_EMBEDDING_DIM: usize = 512;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Uuid::parse_str(s.trim()).map(Self).map_err(|_| Error::UnknownVariant {
                    kind: stringify!($name),
                    value: s.to_string(),
                })
            }
        }
    };
}

id_type!(
    /// Identity of an account and, when enrolled, of the matching person.
    IdentityId
);
id_type!(EventId);
id_type!(RequestId);
id_type!(RecordId);
id_type!(NotificationId);

/// Face embedding vector (typically 512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Check the vector has exactly `dim` finite components.
    pub fn validate(&self, dim: usize) -> Result<()> {
        if self.values.len() != dim {
            return Err(Error::InvalidEmbedding(format!(
                "expected {dim}-dim embedding, got {}",
                self.values.len()
            )));
        }
        if let Some(pos) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidEmbedding(format!(
                "component {pos} is not a finite number"
            )));
        }
        Ok(())
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// Uses constant-time computation: always processes all dimensions.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// Acceptance threshold and ambiguity margin applied by a [`Matcher`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// Minimum similarity (τ) for a person to be considered at all.
    pub threshold: f32,
    /// Maximum gap (ε) between the best and another above-threshold score
    /// for the pair to be reported as ambiguous.
    pub ambiguity_margin: f32,
}

impl MatchPolicy {
    /// A validated policy: τ finite in [-1, 1], ε finite and non-negative.
    pub fn new(threshold: f32, ambiguity_margin: f32) -> Result<Self> {
        let policy = Self {
            threshold,
            ambiguity_margin,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Reject thresholds outside the cosine range and negative or non-finite
    /// margins. A NaN threshold would accept every face.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || !(-1.0..=1.0).contains(&self.threshold) {
            return Err(Error::InvalidPolicy(format!(
                "similarity threshold must lie in [-1, 1], got {}",
                self.threshold
            )));
        }
        if !self.ambiguity_margin.is_finite() || self.ambiguity_margin < 0.0 {
            return Err(Error::InvalidPolicy(format!(
                "ambiguity margin must be finite and non-negative, got {}",
                self.ambiguity_margin
            )));
        }
        Ok(())
    }
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            ambiguity_margin: DEFAULT_AMBIGUITY_MARGIN,
        }
    }
}

/// A scored gallery entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub person: IdentityId,
    pub display_name: String,
    pub similarity: f32,
}

/// Outcome of comparing a probe embedding against the enrolled gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Match(Candidate),
    NoMatch {
        /// Best score seen, if any person had references.
        best_similarity: Option<f32>,
    },
    /// Two or more people cleared the threshold within the margin, best first.
    Ambiguous(Vec<Candidate>),
}

/// Strategy for comparing a probe embedding against a gallery of enrolled people.
pub trait Matcher: Send + Sync {
    fn compare(&self, probe: &Embedding, gallery: &[Person], policy: &MatchPolicy) -> Comparison;
}

/// Cosine similarity matcher.
///
/// A person scores the best similarity over their reference embeddings.
/// Every reference of every person is visited, with no early exit.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[Person], policy: &MatchPolicy) -> Comparison {
        let mut scored: Vec<Candidate> = Vec::with_capacity(gallery.len());

        for person in gallery {
            let mut best_sim = f32::NEG_INFINITY;
            for reference in &person.references {
                let sim = probe.similarity(reference);
                if sim > best_sim {
                    best_sim = sim;
                }
            }
            // People without references cannot be matched.
            if best_sim.is_finite() {
                scored.push(Candidate {
                    person: person.id,
                    display_name: person.display_name.clone(),
                    similarity: best_sim,
                });
            }
        }

        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

        let Some(best) = scored.first() else {
            return Comparison::NoMatch {
                best_similarity: None,
            };
        };

        if policy.threshold.is_nan() || best.similarity < policy.threshold {
            return Comparison::NoMatch {
                best_similarity: Some(best.similarity),
            };
        }

        let contenders: Vec<Candidate> = scored
            .iter()
            .take_while(|c| {
                c.similarity >= policy.threshold
                    && best.similarity - c.similarity <= policy.ambiguity_margin
            })
            .cloned()
            .collect();

        if contenders.len() > 1 {
            Comparison::Ambiguous(contenders)
        } else {
            Comparison::Match(best.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(label: &str, refs: &[&[f32]]) -> Person {
        Person {
            id: IdentityId::generate(),
            display_name: label.into(),
            references: refs.iter().map(|r| Embedding::new(r.to_vec())).collect(),
        }
    }

    fn policy(threshold: f32, ambiguity_margin: f32) -> MatchPolicy {
        MatchPolicy {
            threshold,
            ambiguity_margin,
        }
    }

    #[test]
    fn test_policy_rejects_nan_and_negative_margin() {
        assert!(MatchPolicy::new(0.4, 0.05).is_ok());
        assert!(MatchPolicy::new(-1.0, 0.0).is_ok());
        for (threshold, margin) in [
            (f32::NAN, 0.05),
            (f32::INFINITY, 0.05),
            (1.5, 0.05),
            (0.4, -0.5),
            (0.4, f32::NAN),
        ] {
            assert!(
                matches!(MatchPolicy::new(threshold, margin), Err(Error::InvalidPolicy(_))),
                "accepted τ={threshold} ε={margin}"
            );
        }
    }

    #[test]
    fn test_nan_threshold_never_matches() {
        let face = Embedding::new(vec![0.0, 1.0]);
        let gallery = vec![person("alice", &[&[1.0, 0.0]])];
        assert!(matches!(
            CosineMatcher.compare(&face, &gallery, &policy(f32::NAN, 0.05)),
            Comparison::NoMatch { .. }
        ));
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_validate_rejects_wrong_dimension_and_nan() {
        assert!(Embedding::new(vec![1.0, 0.0]).validate(2).is_ok());
        assert!(matches!(
            Embedding::new(vec![1.0]).validate(2),
            Err(Error::InvalidEmbedding(_))
        ));
        assert!(matches!(
            Embedding::new(vec![1.0, f32::NAN]).validate(2),
            Err(Error::InvalidEmbedding(_))
        ));
    }

    #[test]
    fn test_matcher_scans_whole_gallery() {
        // Best match is the last entry.
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            person("decoy1", &[&[0.0, 1.0, 0.0]]),
            person("decoy2", &[&[0.0, 0.0, 1.0]]),
            person("match", &[&[1.0, 0.0, 0.0]]),
        ];

        match CosineMatcher.compare(&probe, &gallery, &policy(0.5, 0.05)) {
            Comparison::Match(c) => {
                assert_eq!(c.person, gallery[2].id);
                assert_eq!(c.display_name, "match");
                assert!((c.similarity - 1.0).abs() < 1e-6);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_matcher_uses_best_reference_per_person() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![person("alice", &[&[0.0, 1.0], &[1.0, 0.0]])];

        match CosineMatcher.compare(&probe, &gallery, &policy(0.9, 0.05)) {
            Comparison::Match(c) => assert!((c.similarity - 1.0).abs() < 1e-6),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_matcher_below_threshold_is_no_match() {
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![person("other", &[&[0.0, 1.0, 0.0]])];

        match CosineMatcher.compare(&probe, &gallery, &policy(0.5, 0.05)) {
            Comparison::NoMatch { best_similarity } => {
                assert!(best_similarity.is_some_and(|s| s.abs() < 1e-6));
            }
            other => panic!("expected no match, got {other:?}"),
        }
    }

    #[test]
    fn test_matcher_empty_gallery_and_unenrolled_people() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(
            CosineMatcher.compare(&probe, &[], &policy(0.5, 0.05)),
            Comparison::NoMatch { best_similarity: None }
        );

        let gallery = vec![person("no-refs", &[])];
        assert_eq!(
            CosineMatcher.compare(&probe, &gallery, &policy(0.5, 0.05)),
            Comparison::NoMatch { best_similarity: None }
        );
    }

    #[test]
    fn test_matcher_close_scores_are_ambiguous() {
        // Both about 0.995 and 0.98 against the probe.
        let probe = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![
            person("twin-a", &[&[1.0, 0.1]]),
            person("twin-b", &[&[1.0, 0.2]]),
        ];

        match CosineMatcher.compare(&probe, &gallery, &policy(0.8, 0.05)) {
            Comparison::Ambiguous(candidates) => {
                assert_eq!(candidates.len(), 2);
                assert_eq!(candidates[0].display_name, "twin-a");
            }
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_matcher_clear_winner_over_second_above_threshold() {
        // 1.0 versus about 0.894: both above 0.8 but far apart.
        let probe = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![
            person("runner-up", &[&[1.0, 0.5]]),
            person("winner", &[&[1.0, 0.0]]),
        ];

        match CosineMatcher.compare(&probe, &gallery, &policy(0.8, 0.05)) {
            Comparison::Match(c) => assert_eq!(c.display_name, "winner"),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_id_parse_roundtrip() {
        let id = EventId::generate();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<EventId>().is_err());
    }
}
