//! Retrieval corpus built from accepted expert answers.
//!
//! Each accepted assignment with a response is a corpus entry. Its embedding
//! covers `question + " " + response` and is stored on the assignment row the
//! first time it is needed, either eagerly after consensus or lazily during
//! retrieval.

use crate::embeddings::EmbeddingGateway;
use crate::store::Store;
use crate::types::{Assignment, RagEntry};
use hivemind_core::AppResult;
use serde::Serialize;
use std::sync::Arc;

fn corpus_text(question: &str, response: &str) -> String {
    format!("{} {}", question, response)
}

/// Counts from a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    pub scanned: usize,
    pub embedded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct RagCorpusIndex {
    store: Arc<Store>,
    embeddings: EmbeddingGateway,
}

impl RagCorpusIndex {
    pub fn new(store: Arc<Store>, embeddings: EmbeddingGateway) -> Self {
        Self { store, embeddings }
    }

    /// Accepted answers most similar to `query`, best first.
    ///
    /// Entries scoring below `threshold` are dropped and at most `limit` are
    /// returned. Entries without a usable stored embedding are embedded and
    /// written back; one that fails to embed is skipped. Failing to embed the
    /// query itself is an error.
    #[tracing::instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> AppResult<Vec<RagEntry>> {
        let candidates = self.store.list_accepted_with_questions()?;
        if candidates.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embeddings.embed(query).await?;

        let mut entries = Vec::new();
        for (assignment, question) in candidates {
            let Some(answer) = assignment.response_text() else {
                continue;
            };

            let embedding = match &assignment.response_embedding {
                Some(stored) if stored.len() == query_embedding.len() => stored.clone(),
                _ => match self.embed_and_store(&assignment.id, &question, answer).await {
                    Ok(embedding) => embedding,
                    Err(e) => {
                        tracing::warn!(
                            assignment_id = %assignment.id,
                            error = %e,
                            "Skipping corpus entry that could not be embedded"
                        );
                        continue;
                    }
                },
            };

            let similarity = self.embeddings.similarity(&query_embedding, &embedding);
            if similarity >= threshold {
                entries.push(RagEntry {
                    assignment_id: assignment.id.clone(),
                    question,
                    answer: answer.to_string(),
                    similarity,
                });
            }
        }

        entries.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        entries.truncate(limit);

        tracing::debug!(matches = entries.len(), "Retrieved expert context");
        Ok(entries)
    }

    /// Compute and store the embedding of an accepted answer if it has none.
    ///
    /// Returns whether an embedding was written.
    pub async fn ensure_embedding(&self, assignment: &Assignment, question: &str) -> AppResult<bool> {
        if assignment.response_embedding.is_some() {
            return Ok(false);
        }
        let Some(answer) = assignment.response_text() else {
            tracing::debug!(assignment_id = %assignment.id, "No response to embed");
            return Ok(false);
        };

        self.embed_and_store(&assignment.id, question, answer).await?;
        Ok(true)
    }

    /// Embed every accepted answer that has no stored embedding.
    pub async fn backfill(&self) -> AppResult<BackfillStats> {
        let mut stats = BackfillStats::default();

        for (assignment, question) in self.store.list_accepted_with_questions()? {
            stats.scanned += 1;
            match self.ensure_embedding(&assignment, &question).await {
                Ok(true) => stats.embedded += 1,
                Ok(false) => {}
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(assignment_id = %assignment.id, error = %e, "Backfill embedding failed");
                }
            }
        }

        tracing::info!(
            scanned = stats.scanned,
            embedded = stats.embedded,
            failed = stats.failed,
            "Corpus backfill finished"
        );
        Ok(stats)
    }

    async fn embed_and_store(
        &self,
        assignment_id: &str,
        question: &str,
        answer: &str,
    ) -> AppResult<Vec<f32>> {
        let embedding = self.embeddings.embed(&corpus_text(question, answer)).await?;
        self.store.set_response_embedding(assignment_id, &embedding)?;
        tracing::debug!(assignment_id, "Stored response embedding");
        Ok(embedding)
    }
}

/// Render retrieved entries as expert context blocks for a system prompt.
pub fn format_expert_context(entries: &[RagEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }

    Some(
        entries
            .iter()
            .map(|entry| {
                format!(
                    "[EXPERT CONTEXT]\nQuestion: {}\nAnswer: {}\n[/EXPERT CONTEXT]",
                    entry.question, entry.answer
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(question: &str, answer: &str) -> RagEntry {
        RagEntry {
            assignment_id: "a".into(),
            question: question.into(),
            answer: answer.into(),
            similarity: 0.9,
        }
    }

    #[test]
    fn test_format_expert_context() {
        assert_eq!(format_expert_context(&[]), None);

        let context = format_expert_context(&[entry("Q1", "A1"), entry("Q2", "A2")]).unwrap();
        assert_eq!(
            context,
            "[EXPERT CONTEXT]\nQuestion: Q1\nAnswer: A1\n[/EXPERT CONTEXT]\n\n\
             [EXPERT CONTEXT]\nQuestion: Q2\nAnswer: A2\n[/EXPERT CONTEXT]"
        );
    }

    #[test]
    fn test_corpus_text() {
        assert_eq!(corpus_text("Why?", "Because."), "Why? Because.");
    }
}
