// LLM analysis of a session's records.
//
// Records are rendered as compact numbered blocks, packed greedily into
// batches under the input budget, and sent one chat call per batch.
// Failures are always surfaced as AnalysisError; there is no fallback text.

use std::sync::Arc;
use std::time::Duration;

use ai_client::{truncate_chars, AiError, ChatCompletion, OpenAi};
use chrono::Utc;
use threadscout_common::config::{AnalysisSettings, RetryPolicy};
use threadscout_common::{AnalysisError, AnalysisResult, DiscussionRecord, TokenUsage};
use tracing::{info, warn};
use uuid::Uuid;

use crate::traits::Summarizer;

const SYSTEM_PROMPT: &str = "You are an expert analyst of developer discussions about tooling \
and multi-agent systems. Identify recurring themes, concrete pain points, proposed solutions \
and notable projects. Cite items by their number, like [12], when drawing on them. Answer in \
Markdown with clear section headings.";

const BLOCK_SEPARATOR: &str = "\n\n";
const ELLIPSIS: char = '…';

// ---------------------------------------------------------------------------
// Rendering and batching
// ---------------------------------------------------------------------------

/// Records packed into prompt-sized batches.
#[derive(Debug, Default, PartialEq)]
pub struct Batches {
    pub batches: Vec<String>,
    pub truncated_records: usize,
}

/// Render one record as a numbered block. The body excerpt is capped at
/// `max_body_chars`; returns whether it was cut.
pub fn render_record(number: usize, record: &DiscussionRecord, max_body_chars: usize) -> (String, bool) {
    let (excerpt, cut) = truncate_chars(&record.body, max_body_chars);
    let mut block = format!(
        "[{number}] {} | {}\nURL: {}",
        record.platform.display_name(),
        record.title,
        record.url
    );
    if !record.matched_keywords.is_empty() {
        block.push_str("\nKeywords: ");
        block.push_str(&record.matched_keywords.join(", "));
    }
    if !excerpt.is_empty() {
        block.push('\n');
        block.push_str(excerpt);
        if cut {
            block.push(ELLIPSIS);
        }
    }
    (block, cut)
}

/// Greedily pack rendered records into batches of at most `max_input_chars`
/// characters. A single block over the budget is cut to fit.
pub fn pack(records: &[DiscussionRecord], max_record_chars: usize, max_input_chars: usize) -> Batches {
    let mut out = Batches::default();
    let mut current = String::new();
    let mut current_len = 0;
    let sep_len = BLOCK_SEPARATOR.chars().count();

    for (i, record) in records.iter().enumerate() {
        let (mut block, mut cut) = render_record(i + 1, record, max_record_chars);
        let mut block_len = block.chars().count();

        if block_len > max_input_chars {
            let (kept, _) = truncate_chars(&block, max_input_chars.saturating_sub(1));
            block = format!("{kept}{ELLIPSIS}");
            block_len = block.chars().count();
            cut = true;
        }
        if cut {
            out.truncated_records += 1;
        }

        let needed = if current.is_empty() { block_len } else { current_len + sep_len + block_len };
        if needed > max_input_chars && !current.is_empty() {
            out.batches.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str(BLOCK_SEPARATOR);
            current_len += sep_len;
        }
        current.push_str(&block);
        current_len += block_len;
    }

    if !current.is_empty() {
        out.batches.push(current);
    }
    out
}

fn user_prompt(batch: &str, part: usize, parts: usize, focus: Option<&str>) -> String {
    let mut prompt = String::from(
        "Analyze the following discussions collected from public forums, code hosts, Q&A sites, \
news aggregators and preprint servers.",
    );
    if parts > 1 {
        prompt.push_str(&format!(" This is part {part} of {parts} of the collection."));
    }
    if let Some(focus) = focus.map(str::trim).filter(|f| !f.is_empty()) {
        prompt.push_str("\nFocus on: ");
        prompt.push_str(focus);
    }
    prompt.push_str("\n\n");
    prompt.push_str(batch);
    prompt
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

pub struct Analyzer {
    summarizer: Arc<dyn Summarizer>,
    max_input_chars: usize,
    max_record_chars: usize,
    retry: RetryPolicy,
}

impl Analyzer {
    pub fn new(summarizer: Arc<dyn Summarizer>, settings: &AnalysisSettings) -> Self {
        Self {
            summarizer,
            max_input_chars: settings.max_input_chars,
            max_record_chars: settings.max_record_chars,
            retry: settings.retry,
        }
    }

    /// Build an OpenAI-backed analyzer, or `None` when no API key is configured.
    pub fn from_settings(settings: &AnalysisSettings, timeout: Duration) -> Option<Self> {
        let api_key = settings.api_key.as_ref()?;
        let mut ai = OpenAi::new(api_key, &settings.model)
            .with_max_tokens(settings.max_tokens)
            .with_temperature(settings.temperature)
            .with_timeout(timeout);
        if let Some(url) = &settings.base_url {
            ai = ai.with_base_url(url);
        }
        Some(Self::new(Arc::new(ai), settings))
    }

    pub async fn analyze(
        &self,
        session_id: Uuid,
        records: &[DiscussionRecord],
        focus: Option<&str>,
    ) -> Result<AnalysisResult, AnalysisError> {
        if records.is_empty() {
            return Err(AnalysisError::NoRecords);
        }

        let packed = pack(records, self.max_record_chars, self.max_input_chars);
        let parts = packed.batches.len();
        info!(
            session_id = %session_id,
            records = records.len(),
            batches = parts,
            truncated = packed.truncated_records,
            "Starting analysis"
        );

        let mut summaries = Vec::with_capacity(parts);
        let mut usage: Option<TokenUsage> = None;
        let mut model = None;

        for (i, batch) in packed.batches.iter().enumerate() {
            let prompt = user_prompt(batch, i + 1, parts, focus);
            let completion = self.complete(&prompt).await?;

            if let Some(u) = completion.usage {
                *usage.get_or_insert_with(TokenUsage::default) += TokenUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                };
            }
            if model.is_none() {
                model = Some(completion.model);
            }
            summaries.push(completion.content.trim().to_string());
        }

        let summary = if parts == 1 {
            summaries.remove(0)
        } else {
            summaries
                .iter()
                .enumerate()
                .map(|(i, s)| format!("## Part {} of {parts}\n\n{s}", i + 1))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        Ok(AnalysisResult {
            session_id,
            summary,
            model: model.unwrap_or_else(|| self.summarizer.model().to_string()),
            batches: parts,
            records_analyzed: records.len(),
            truncated_records: packed.truncated_records,
            usage,
            created_at: Utc::now(),
        })
    }

    /// One chat call with bounded retries for transient failures.
    async fn complete(&self, prompt: &str) -> Result<ChatCompletion, AnalysisError> {
        let mut attempt = 0;
        loop {
            let err = match self.summarizer.summarize(SYSTEM_PROMPT, prompt).await {
                Ok(completion) => return Ok(completion),
                Err(e) => e,
            };
            match classify(err) {
                Verdict::Retry(message) if attempt < self.retry.max_retries => {
                    let wait = self.retry.delay_for(attempt, None);
                    warn!(attempt = attempt + 1, wait_ms = wait.as_millis() as u64, error = %message, "Analysis call failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(wait).await;
                }
                Verdict::Retry(message) => {
                    return Err(AnalysisError::Transient {
                        attempts: attempt + 1,
                        message,
                    })
                }
                Verdict::Fail(e) => return Err(e),
            }
        }
    }
}

enum Verdict {
    Retry(String),
    Fail(AnalysisError),
}

fn classify(err: AiError) -> Verdict {
    if err.code() == Some("insufficient_quota") {
        return Verdict::Fail(AnalysisError::QuotaExceeded(err.to_string()));
    }
    match err {
        AiError::Api { status: 401 | 403, message, .. } => Verdict::Fail(AnalysisError::Auth(message)),
        AiError::Api { status, message, .. } if status == 429 || status >= 500 => {
            Verdict::Retry(format!("status {status}: {message}"))
        }
        AiError::Api { status, message, .. } => {
            Verdict::Fail(AnalysisError::Rejected { status, message })
        }
        AiError::Network(m) => Verdict::Retry(m),
        AiError::Timeout => Verdict::Retry("request timed out".to_string()),
        AiError::Parse(m) => Verdict::Fail(AnalysisError::InvalidResponse(m)),
        AiError::EmptyResponse => {
            Verdict::Fail(AnalysisError::InvalidResponse("model returned no content".to_string()))
        }
        AiError::Config(m) => Verdict::Fail(AnalysisError::NotConfigured(m)),
    }
}
