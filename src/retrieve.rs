//! Query-time retrieval and prompt assembly.
//!
//! [`Retriever::retrieve`] never fails. When the store is empty, or when
//! embedding the query or searching fails, the caller gets the bare
//! fallback prompt and no contexts.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::models::ContextRecord;
use crate::store::VectorStore;

/// Prompt to send to the generator plus the contexts it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub prompt: String,
    pub contexts: Vec<ContextRecord>,
}

pub struct Retriever {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Retrieval {
        let contexts = match self.search(query, k).await {
            Ok(contexts) => contexts,
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, answering without context");
                Vec::new()
            }
        };
        Retrieval {
            prompt: augment_prompt(query, &contexts),
            contexts,
        }
    }

    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<ContextRecord>> {
        if self.store.is_empty() {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(query).await?;
        let hits = self.store.search(&embedding, k)?;
        Ok(hits
            .into_iter()
            .map(|hit| ContextRecord {
                content: hit.meta.text,
                source: hit.meta.source,
                chunk_id: hit.meta.chunk_id,
                similarity: hit.distance,
            })
            .collect())
    }
}

/// Build the generation prompt for `query`.
///
/// With no contexts this is just `answer this query: {query}`.
pub fn augment_prompt(query: &str, contexts: &[ContextRecord]) -> String {
    if contexts.is_empty() {
        return format!("answer this query: {}", query);
    }

    let blocks = contexts
        .iter()
        .enumerate()
        .map(|(i, ctx)| format!("Document {} (Source: {}):\n{}", i + 1, ctx.source, ctx.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Use ONLY the following documents to answer the question.\n\
         If the documents do not contain the information needed, say that the \
         available documents do not provide sufficient information. Do not make \
         anything up.\n\n\
         {}\n\n\
         Question: {}\n\n\
         Answer:",
        blocks, query
    )
}
