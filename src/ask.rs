//! Question answering over the summary index.
//!
//! Three model calls at most: pick a category for the question, answer it
//! from the retrieved chunks, and rewrite the raw answer formally.

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::artifacts::SummaryArtifacts;
use crate::categories;
use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::index::{SqliteIndex, VectorIndex};
use crate::llm::{self, CompletionRequest, LanguageModel};
use crate::models::SearchHit;
use crate::search::retrieve;

/// Reply used when nothing relevant is indexed.
pub const NOT_AVAILABLE: &str = "The information is not available in the provided documents.";

/// Classify `question` into one of `available` (the categories that have
/// summaries on disk). Unknown replies and an empty set yield `fallback`.
pub async fn detect_category(
    model: &dyn LanguageModel,
    question: &str,
    available: &[String],
    fallback: &str,
) -> Result<String> {
    if available.is_empty() {
        return Ok(fallback.to_string());
    }

    let system = format!(
        "You classify questions about European regulations. Choose exactly one \
         category from the following list:\n- {}\n\nRespond only with the category name.",
        available.join("\n- ")
    );
    let reply = model
        .complete(
            CompletionRequest::user(question)
                .with_system(system)
                .max_tokens(15),
        )
        .await?;

    let label = categories::resolve_label(&reply, available, fallback);
    if label == fallback && reply.trim() != fallback {
        warn!(%reply, %fallback, "unknown category detected");
    }
    Ok(label)
}

/// A grounded answer and the chunks it was built from.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub hits: Vec<SearchHit>,
}

fn grounded_prompt(question: &str, category: Option<&str>, hits: &[SearchHit]) -> String {
    let context = hits
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let scope = match category {
        Some(c) => format!(" The following context belongs to the '{}' category.", c),
        None => String::new(),
    };
    format!(
        "You are an expert in European regulations.{} Use only the context to answer \
         the user's question; the answer may be spread across the whole context. If the \
         answer is not in the context, say: '{}'\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        scope, NOT_AVAILABLE, context, question
    )
}

/// Retrieve the top `k` chunks for `question` and answer from them alone.
///
/// With no retrieved context the model is not called.
pub async fn answer(
    model: &dyn LanguageModel,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    question: &str,
    category: Option<&str>,
    k: usize,
) -> Result<Answer> {
    let hits = retrieve(embedder, index, question, k, category).await?;
    if hits.is_empty() {
        return Ok(Answer {
            text: NOT_AVAILABLE.to_string(),
            hits,
        });
    }

    let text = model
        .complete(CompletionRequest::user(grounded_prompt(question, category, &hits)).temperature(0.3))
        .await?;
    Ok(Answer {
        text: text.trim().to_string(),
        hits,
    })
}

/// Rewrite a raw answer in a clear, formal register without adding facts.
pub async fn refine(model: &dyn LanguageModel, raw_answer: &str, question: &str) -> Result<String> {
    let prompt = format!(
        "You are a legal assistant helping a user understand European Union regulations. \
         Rewrite the raw answer below in a clear, organized and formal tone, in full \
         sentences. Highlight legal obligations where relevant. Do not add new facts or \
         assumptions; rely only on the raw answer and the question.\n\n\
         User Question: {}\n\nRaw Answer: {}\n\nFormatted Answer:",
        question, raw_answer
    );
    let text = model
        .complete(CompletionRequest::user(prompt).temperature(0.5).max_tokens(600))
        .await?;
    Ok(text.trim().to_string())
}

/// Options for `reglex ask`.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub category: Option<String>,
    pub detect: bool,
    pub raw: bool,
    pub limit: Option<usize>,
}

/// `reglex ask`
pub async fn run_ask(config: &Config, question: &str, options: &AskOptions) -> Result<()> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }
    if !config.embedding.is_enabled() {
        bail!("Answering requires embeddings. Set [embedding] provider in config.");
    }
    if !config.llm.is_enabled() {
        bail!("Answering requires a language model. Set [llm] provider in config.");
    }

    let model = llm::create_model(&config.llm)?;
    let embedder = embedding::create_embedder(&config.embedding)?;
    let index = SqliteIndex::open(&config.db.path).await?;

    let category = match (&options.category, options.detect) {
        (Some(c), _) => Some(c.clone()),
        (None, true) => {
            let summaries = SummaryArtifacts::new(
                &config.paths.summary_dir,
                config.processing.layout,
                &config.processing.categories,
            );
            let detected = detect_category(
                model.as_ref(),
                question,
                &summaries.categories_on_disk(),
                &config.processing.fallback_category,
            )
            .await?;
            info!(category = %detected, "category detected");
            Some(detected)
        }
        (None, false) => None,
    };

    let k = options.limit.unwrap_or(config.retrieval.top_k);
    let raw = answer(
        model.as_ref(),
        embedder.as_ref(),
        &index,
        question,
        category.as_deref(),
        k,
    )
    .await?;
    index.close().await;

    let text = if options.raw || raw.hits.is_empty() {
        raw.text.clone()
    } else {
        refine(model.as_ref(), &raw.text, question).await?
    };

    println!("ask");
    println!("  category: {}", category.as_deref().unwrap_or("(all)"));
    println!("  sources: {}", raw.hits.len());
    for hit in &raw.hits {
        println!("    {} [{:.3}]", hit.source, hit.score);
    }
    println!();
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use crate::models::IndexChunk;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Echo {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl Echo {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.user);
            Ok(self.reply.clone())
        }
    }

    struct Axis;

    #[async_trait]
    impl Embedder for Axis {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("fish") { vec![0.0, 1.0] } else { vec![1.0, 0.0] })
                .collect())
        }
    }

    fn chunk(id: &str, category: &str, text: &str) -> IndexChunk {
        IndexChunk {
            id: id.to_string(),
            source: format!("{}.txt", id),
            identifier: id.to_string(),
            category: Some(category.to_string()),
            chunk_index: 0,
            offset: 0,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    #[tokio::test]
    async fn detect_category_maps_unknown_to_fallback() {
        let available = vec!["Energy".to_string(), "Transport".to_string()];
        let label = detect_category(&Echo::new("Energy"), "grid rules?", &available, "Others/Unidentified")
            .await
            .unwrap();
        assert_eq!(label, "Energy");

        let label = detect_category(&Echo::new("Cooking"), "recipes?", &available, "Others/Unidentified")
            .await
            .unwrap();
        assert_eq!(label, "Others/Unidentified");
    }

    #[tokio::test]
    async fn detect_category_without_summaries_skips_model() {
        let model = Echo::new("Energy");
        let label = detect_category(&model, "q", &[], "Others/Unidentified").await.unwrap();
        assert_eq!(label, "Others/Unidentified");
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn answer_uses_category_filtered_context() {
        let index = InMemoryIndex::new();
        index
            .insert(
                &[
                    chunk("F", "Oceans and fisheries", "fish quotas for 2025"),
                    chunk("E", "Energy", "grid tariffs"),
                ],
                &[vec![0.0, 1.0], vec![1.0, 0.0]],
            )
            .await
            .unwrap();

        let model = Echo::new(" Quotas are fixed. ");
        let result = answer(&model, &Axis, &index, "fish limits?", Some("Oceans and fisheries"), 5)
            .await
            .unwrap();
        assert_eq!(result.text, "Quotas are fixed.");
        assert_eq!(result.hits.len(), 1);

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("fish quotas for 2025"));
        assert!(!prompts[0].contains("grid tariffs"));
    }

    #[tokio::test]
    async fn answer_without_context_does_not_call_model() {
        let model = Echo::new("should not be used");
        let result = answer(&model, &Axis, &InMemoryIndex::new(), "anything?", None, 5)
            .await
            .unwrap();
        assert_eq!(result.text, NOT_AVAILABLE);
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refine_includes_raw_answer_and_question() {
        let model = Echo::new("Formal.");
        assert_eq!(refine(&model, "raw text", "why?").await.unwrap(), "Formal.");
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("raw text"));
        assert!(prompts[0].contains("why?"));
    }
}
