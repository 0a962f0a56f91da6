//! Prompt templates for grounded answers

use crate::retrieval::SearchHit;

/// Answer returned when the store holds nothing to search
pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been uploaded yet. Please upload documents first.";

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build context from search results, each tagged with its source document
    pub fn build_context(hits: &[SearchHit]) -> String {
        let mut context = String::new();

        for (i, hit) in hits.iter().enumerate() {
            let location = match hit.metadata.page {
                Some(page) => format!("chunk {}, page {}", hit.metadata.ordinal, page),
                None => format!("chunk {}", hit.metadata.ordinal),
            };
            context.push_str(&format!(
                "[{}] Source: {} ({})\n{}\n\n---\n\n",
                i + 1,
                hit.metadata.document_id,
                location,
                hit.metadata.text.trim()
            ));
        }

        context
    }

    /// Build the full RAG prompt
    pub fn build_rag_prompt(question: &str, context: &str) -> String {
        format!(
            r#"You are a helpful AI assistant that answers questions based on the provided context.

Use the following pieces of context to answer the question at the end.
If you don't know the answer based on the context, just say that you don't know, don't try to make up an answer.
Keep your answer concise and relevant to the question.

Context:
{context}
Question: {question}

Answer:"#,
            context = context,
            question = question.trim()
        )
    }
}
