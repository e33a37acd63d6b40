use async_trait::async_trait;
use corpus_chunker::token;
use corpus_orchestrator::{Backend, BackendError, BackendResponse, TokenUsage};
use std::time::Instant;

/// Offline backend that describes each prompt instead of analyzing it
pub struct DryRunBackend;

fn field<'a>(prompt: &'a str, name: &str) -> &'a str {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix(name))
        .map(str::trim)
        .unwrap_or("?")
}

#[async_trait]
impl Backend for DryRunBackend {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn invoke(&self, prompt: &str, token_budget: usize) -> Result<BackendResponse, BackendError> {
        let started = Instant::now();
        let prompt_tokens = token::estimate(prompt);
        if prompt_tokens > token_budget {
            return Err(BackendError::MalformedResponse(format!(
                "prompt of {prompt_tokens} tokens exceeds budget {token_budget}"
            )));
        }

        let text = format!(
            "[dry-run] {} part {} (lines {}, {prompt_tokens} prompt tokens)",
            field(prompt, "Source:"),
            field(prompt, "Part:"),
            field(prompt, "Lines:"),
        );
        Ok(BackendResponse {
            text,
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens: 0,
            },
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}
