//! Generation sampler
//!
//! Reads the most recent window of trend texts, samples a subset and asks
//! the completion backend for one kernel per sampled text. Calls run one at
//! a time; the kernels are written in one batch after the last call.

use std::sync::Arc;

use mks_model_openai::{CompletionBackend, CompletionRequest};
use mks_storage::{KernelStore, NewKernel, TrendStore};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::DaemonResult;

const TEXT_PLACEHOLDER: &str = "{text}";

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    pub window_size: usize,
    pub max_tokens: u32,
    pub system_prompt: String,
    /// `{text}` is replaced by the sampled trend
    pub prompt_template: String,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            max_tokens: 40,
            system_prompt: "You are a meme copywriter.".to_string(),
            prompt_template: "Write a 120-char meme caption inspired by:\n{text}".to_string(),
        }
    }
}

impl SamplerConfig {
    fn request_for(&self, text: &str) -> CompletionRequest {
        let user_prompt = if self.prompt_template.contains(TEXT_PLACEHOLDER) {
            self.prompt_template.replace(TEXT_PLACEHOLDER, text)
        } else {
            format!("{}\n{}", self.prompt_template, text)
        };
        CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            user_prompt,
            max_tokens: self.max_tokens,
        }
    }
}

pub struct Sampler {
    backend: Arc<dyn CompletionBackend>,
    config: SamplerConfig,
}

impl Sampler {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: SamplerConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Generate up to `desired` kernels and return how many were written.
    pub async fn generate<S>(&self, store: &S, desired: usize) -> DaemonResult<usize>
    where
        S: TrendStore + KernelStore + ?Sized,
    {
        let window = store.recent_trend_texts(self.config.window_size).await?;
        let sampled = sample_window(&mut rand::thread_rng(), window, desired);
        if sampled.is_empty() {
            tracing::info!("no trends to sample, skipping generation");
            return Ok(0);
        }

        let mut kernels = Vec::with_capacity(sampled.len());
        for text in &sampled {
            let completion = self.backend.complete(&self.config.request_for(text)).await?;
            kernels.push(NewKernel::seed(completion.trim()));
        }

        let written = store.insert_kernels(kernels).await?.len();
        tracing::info!(written, "generation complete");
        Ok(written)
    }
}

/// Uniform sample without replacement of `min(desired, window.len())`
/// texts. The sampled order is random.
pub fn sample_window<R>(rng: &mut R, window: Vec<String>, desired: usize) -> Vec<String>
where
    R: Rng + ?Sized,
{
    let amount = desired.min(window.len());
    let mut window = window;
    let (sampled, _) = window.partial_shuffle(rng, amount);
    sampled.to_vec()
}
