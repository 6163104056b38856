//! Turning ranked passages into generation calls.
use async_trait::async_trait;

use ragdb_core::{ContextStrategy, GenerativeModel, Prompt, ProviderError, SearchHit};

/// Separator `Prompt::render` puts between passages.
const PASSAGE_SEPARATOR_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub answer: String,
    /// Passages that were actually shown to the model, best first.
    pub used: Vec<SearchHit>,
}

#[async_trait]
pub trait ContextComposer: Send + Sync {
    async fn compose(
        &self,
        question: &str,
        hits: &[SearchHit],
        generator: &dyn GenerativeModel,
    ) -> Result<Composition, ProviderError>;
}

pub fn composer_for(strategy: ContextStrategy, context_budget: usize) -> Box<dyn ContextComposer> {
    match strategy {
        ContextStrategy::Stuff => Box::new(StuffComposer::new(context_budget)),
        ContextStrategy::Refine => Box::new(RefineComposer::new(context_budget)),
    }
}

/// Characters available for context in `shell`, honouring the model's own
/// input limit. Never zero.
fn budget_for(context_budget: usize, shell: &Prompt, generator: &dyn GenerativeModel) -> usize {
    let mut budget = context_budget;
    if let Some(max) = generator.max_input_chars() {
        let overhead = shell.render().chars().count();
        budget = budget.min(max.saturating_sub(overhead));
    }
    budget.max(1)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// All passages in one prompt. When they do not fit, the lowest-ranked ones
/// are dropped; a top passage that alone overflows is truncated.
pub struct StuffComposer {
    context_budget: usize,
}

impl StuffComposer {
    pub fn new(context_budget: usize) -> Self {
        Self { context_budget }
    }

    /// Rank-order prefix of `hits` that fits in `budget` characters.
    pub fn select(hits: &[SearchHit], budget: usize) -> (Vec<String>, Vec<SearchHit>) {
        let mut context = Vec::new();
        let mut used = Vec::new();
        let mut total = 0usize;
        for hit in hits {
            let len = hit.chunk.text.chars().count();
            let sep = if context.is_empty() { 0 } else { PASSAGE_SEPARATOR_CHARS };
            if total + sep + len <= budget {
                total += sep + len;
                context.push(hit.chunk.text.clone());
                used.push(hit.clone());
            } else if context.is_empty() {
                context.push(truncate_chars(&hit.chunk.text, budget));
                used.push(hit.clone());
                break;
            } else {
                break;
            }
        }
        if used.len() < hits.len() {
            tracing::debug!(kept = used.len(), dropped = hits.len() - used.len(), budget, "context over budget");
        }
        (context, used)
    }
}

#[async_trait]
impl ContextComposer for StuffComposer {
    async fn compose(
        &self,
        question: &str,
        hits: &[SearchHit],
        generator: &dyn GenerativeModel,
    ) -> Result<Composition, ProviderError> {
        let budget = budget_for(self.context_budget, &Prompt::new(question, Vec::new()), generator);
        let (context, used) = Self::select(hits, budget);
        let answer = generator.generate(&Prompt::new(question, context)).await?;
        Ok(Composition { answer, used })
    }
}

/// One call per passage: the first answers from passage 1, each later call
/// refines the running answer with the next passage.
pub struct RefineComposer {
    context_budget: usize,
}

impl RefineComposer {
    pub fn new(context_budget: usize) -> Self {
        Self { context_budget }
    }
}

#[async_trait]
impl ContextComposer for RefineComposer {
    async fn compose(
        &self,
        question: &str,
        hits: &[SearchHit],
        generator: &dyn GenerativeModel,
    ) -> Result<Composition, ProviderError> {
        if hits.is_empty() {
            let answer = generator.generate(&Prompt::new(question, Vec::new())).await?;
            return Ok(Composition { answer, used: Vec::new() });
        }

        let mut answer: Option<String> = None;
        let mut used = Vec::with_capacity(hits.len());
        for (step, hit) in hits.iter().enumerate() {
            let shell = match &answer {
                None => Prompt::new(question, Vec::new()),
                Some(prev) => Prompt::new(question, Vec::new()).refining(prev.as_str()),
            };
            let budget = budget_for(self.context_budget, &shell, generator);
            let prompt = Prompt { context: vec![truncate_chars(&hit.chunk.text, budget)], ..shell };
            tracing::debug!(step, passages = hits.len(), "refine step");
            answer = Some(generator.generate(&prompt).await?);
            used.push(hit.clone());
        }
        Ok(Composition { answer: answer.unwrap_or_default(), used })
    }
}
