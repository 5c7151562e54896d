//! Semantic self-consistency via greedy answer clustering.
//!
//! Epistemic foundation:
//! - K_i: agreement among independent samples is evidence of confidence
//! - B_i: two differently-worded answers may still be equivalent; an
//!   injected similarity scorer judges that
//! - I^R: the equivalence threshold is configurable
//!
//! The clustering is a deliberate O(n²) greedy approximation: each
//! answer is compared only against the first member of each existing
//! cluster, in cluster insertion order, and joins the first match.
//! Assignment therefore depends on input order. Input order is
//! preserved (stable), so results are reproducible for a fixed answer
//! sequence.

/// Pairwise similarity oracle backing the clusterer.
///
/// Injected at construction; implementations must be safe for
/// concurrent use. A production deployment would back this with a
/// cross-encoder similarity model; the bundled implementations are
/// deterministic, dependency-free stand-ins behind the same interface.
pub trait SimilarityScorer: Send + Sync {
    /// Similarity of two texts in [0, 1].
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Strict equality: 1.0 for identical strings, 0.0 otherwise.
pub struct ExactMatchScorer;

impl SimilarityScorer for ExactMatchScorer {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            1.0
        } else {
            0.0
        }
    }
}

/// Token-set Jaccard overlap on lowercased alphanumeric words.
///
/// Cheap and deterministic. "Paris." and "paris" agree fully; "Paris"
/// and "The city of Paris" overlap at 1/4.
pub struct LexicalOverlapScorer;

impl LexicalOverlapScorer {
    fn tokens(text: &str) -> std::collections::HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }
}

impl SimilarityScorer for LexicalOverlapScorer {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let ta = Self::tokens(a);
        let tb = Self::tokens(b);

        if ta.is_empty() && tb.is_empty() {
            return 1.0;
        }

        let intersection = ta.intersection(&tb).count();
        let union = ta.union(&tb).count();
        intersection as f64 / union as f64
    }
}

/// Groups sampled answers into equivalence clusters and scores how much
/// of the batch the largest cluster captures.
pub struct ConsistencyClusterer {
    scorer: Box<dyn SimilarityScorer>,
    threshold: f64,
}

impl ConsistencyClusterer {
    pub fn new(scorer: Box<dyn SimilarityScorer>, threshold: f64) -> Self {
        Self { scorer, threshold }
    }

    /// Default lightweight configuration: lexical overlap scorer.
    pub fn with_default_scorer(threshold: f64) -> Self {
        Self::new(Box::new(LexicalOverlapScorer), threshold)
    }

    /// Two answers are equivalent iff identical, or similarity is
    /// strictly above the threshold.
    fn equivalent(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        self.scorer.similarity(a, b) > self.threshold
    }

    /// Greedy single-pass clustering. Each answer is matched against
    /// the representative (first member) of each cluster in insertion
    /// order; first match wins, not best match.
    pub fn clusters<'a>(&self, answers: &'a [String]) -> Vec<Vec<&'a str>> {
        let mut clusters: Vec<Vec<&str>> = Vec::new();

        for answer in answers {
            let answer = answer.as_str();
            let mut found = false;
            for cluster in &mut clusters {
                let representative = cluster[0];
                if self.equivalent(answer, representative) {
                    cluster.push(answer);
                    found = true;
                    break;
                }
            }
            if !found {
                clusters.push(vec![answer]);
            }
        }

        clusters
    }

    /// Fraction of answers in the largest cluster, in [0, 1].
    /// Empty input scores 0.0.
    pub fn score(&self, answers: &[String]) -> f64 {
        if answers.is_empty() {
            return 0.0;
        }

        let clusters = self.clusters(answers);
        let largest = clusters.iter().map(|c| c.len()).max().unwrap_or(0);
        largest as f64 / answers.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Scorer that never matches distinct strings.
    struct NeverMatch;
    impl SimilarityScorer for NeverMatch {
        fn similarity(&self, _: &str, _: &str) -> f64 {
            0.0
        }
    }

    #[test]
    fn empty_input_scores_zero() {
        let clusterer = ConsistencyClusterer::new(Box::new(ExactMatchScorer), 0.85);
        assert_eq!(clusterer.score(&[]), 0.0);
    }

    #[test]
    fn identical_answers_score_one() {
        let clusterer = ConsistencyClusterer::new(Box::new(ExactMatchScorer), 0.85);
        let score = clusterer.score(&answers(&["Paris", "Paris", "Paris"]));
        assert_eq!(score, 1.0);
    }

    #[test]
    fn all_distinct_answers_score_one_third() {
        let clusterer = ConsistencyClusterer::new(Box::new(NeverMatch), 0.85);
        let score = clusterer.score(&answers(&["Paris", "London", "Berlin"]));
        assert!((score - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn single_answer_scores_one_regardless_of_threshold() {
        let clusterer = ConsistencyClusterer::new(Box::new(NeverMatch), 0.99);
        assert_eq!(clusterer.score(&answers(&["42"])), 1.0);
    }

    #[test]
    fn majority_cluster_wins() {
        let clusterer = ConsistencyClusterer::new(Box::new(ExactMatchScorer), 0.85);
        let score = clusterer.score(&answers(&["Paris", "Paris", "London", "Paris", "Rome"]));
        assert_eq!(score, 3.0 / 5.0);
    }

    #[test]
    fn comparison_is_against_representative_only() {
        // B matches A (the representative) and joins the first cluster;
        // C matches B but NOT A, so it starts its own cluster. No
        // transitive closure.
        struct Chained;
        impl SimilarityScorer for Chained {
            fn similarity(&self, a: &str, b: &str) -> f64 {
                match (a, b) {
                    ("B", "A") | ("A", "B") => 0.9,
                    ("C", "B") | ("B", "C") => 0.9,
                    _ => 0.0,
                }
            }
        }

        let clusterer = ConsistencyClusterer::new(Box::new(Chained), 0.85);
        let batch = answers(&["A", "B", "C"]);
        let clusters = clusterer.clusters(&batch);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], vec!["A", "B"]);
        assert_eq!(clusters[1], vec!["C"]);
    }

    #[test]
    fn clustering_depends_on_input_order() {
        // With B first, A and C both match the representative B and the
        // batch collapses into one cluster.
        struct Chained;
        impl SimilarityScorer for Chained {
            fn similarity(&self, a: &str, b: &str) -> f64 {
                match (a, b) {
                    ("B", "A") | ("A", "B") => 0.9,
                    ("C", "B") | ("B", "C") => 0.9,
                    _ => 0.0,
                }
            }
        }

        let clusterer = ConsistencyClusterer::new(Box::new(Chained), 0.85);
        assert_eq!(clusterer.clusters(&answers(&["A", "B", "C"])).len(), 2);
        assert_eq!(clusterer.clusters(&answers(&["B", "A", "C"])).len(), 1);
    }

    #[test]
    fn lexical_scorer_handles_casing_and_punctuation() {
        let scorer = LexicalOverlapScorer;
        assert_eq!(scorer.similarity("Paris.", "paris"), 1.0);
        assert_eq!(scorer.similarity("Paris", "The city of Paris"), 0.25);
        assert_eq!(scorer.similarity("", ""), 1.0);
    }

    #[test]
    fn identical_strings_bypass_the_scorer() {
        // Even a scorer that always says 0 cannot split identical texts
        let clusterer = ConsistencyClusterer::new(Box::new(NeverMatch), 0.85);
        let score = clusterer.score(&answers(&["same", "same"]));
        assert_eq!(score, 1.0);
    }
}
