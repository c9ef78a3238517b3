use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::{RankedResult, RetrieverKind};

/// Which retrievers contributed a fused candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HybridSource {
    Lexical,
    Semantic,
    Both,
}

impl From<RetrieverKind> for HybridSource {
    fn from(kind: RetrieverKind) -> Self {
        match kind {
            RetrieverKind::Lexical => HybridSource::Lexical,
            RetrieverKind::Semantic => HybridSource::Semantic,
        }
    }
}

impl HybridSource {
    fn merge(self, other: HybridSource) -> HybridSource {
        if self == other {
            self
        } else {
            HybridSource::Both
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult {
    pub id: String,
    pub fused_score: f32,
    pub source: HybridSource,
}

/// Weighted Reciprocal Rank Fusion over any number of ranked lists.
/// Formula: score(doc) = Σ weight_i / (rank_constant + rank_i), rank 1-based.
/// Raw retriever scores are ignored. Equal fused scores are ordered by id.
pub fn weighted_rank_fusion(
    lists: &[(Vec<RankedResult>, f32)],
    rank_constant: usize,
) -> Vec<FusedResult> {
    let mut scores: HashMap<&str, (f32, HybridSource)> = HashMap::new();

    for (results, weight) in lists {
        for result in results {
            let contribution = weight / (rank_constant as f32 + result.rank as f32);
            let kind = HybridSource::from(result.retriever);
            scores
                .entry(result.id.as_str())
                .and_modify(|(s, src)| {
                    *s += contribution;
                    *src = src.merge(kind);
                })
                .or_insert((contribution, kind));
        }
    }

    let mut fused: Vec<FusedResult> = scores
        .into_iter()
        .map(|(id, (fused_score, source))| FusedResult {
            id: id.to_string(),
            fused_score,
            source,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    fused
}
