//! Chat bridge between an uploaded document and the language model

use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::gemini::{LanguageModel, Prompt};
use crate::settings::{AppSettings, API_KEY_ENV};

pub const UNAVAILABLE_MESSAGE: &str =
    "Sorry, the AI service is unavailable right now. Please try again later.";
pub const EMPTY_REPLY_MESSAGE: &str =
    "The AI service returned an empty response. Please try rephrasing your question.";

/// Bounded retry with exponential backoff and a per-attempt timeout.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: settings.base_delay(),
            attempt_timeout: settings.request_timeout(),
        }
    }

    /// Delay after the given failed attempt (1-based): base, 2*base, 4*base...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exp)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChatReply {
    Answer(String),
    /// The service answered without text.
    Warning(String),
    /// All attempts failed.
    Unavailable(String),
}

impl ChatReply {
    pub fn text(&self) -> &str {
        match self {
            ChatReply::Answer(t) | ChatReply::Warning(t) | ChatReply::Unavailable(t) => t,
        }
    }
}

pub struct ChatBridge {
    model: Option<Arc<dyn LanguageModel>>,
    policy: RetryPolicy,
    context_chars: usize,
}

impl ChatBridge {
    /// `model` is `None` when no credential is configured.
    pub fn new(
        model: Option<Arc<dyn LanguageModel>>,
        policy: RetryPolicy,
        context_chars: usize,
    ) -> Self {
        Self {
            model,
            policy,
            context_chars,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.model.is_some()
    }

    /// Answer `message` against `context`.
    ///
    /// Fails only for a missing context or missing credential; model
    /// failures degrade into [`ChatReply::Unavailable`].
    pub async fn ask(
        &self,
        context: Option<&str>,
        message: &str,
        system: Option<String>,
    ) -> AppResult<ChatReply> {
        let context = context.ok_or(AppError::ContextMissing)?;
        let model = self.model.as_ref().ok_or_else(|| {
            AppError::Configuration(format!("{} is not set; chat is disabled", API_KEY_ENV))
        })?;

        let prompt = Prompt {
            system,
            text: build_prompt(context, message, self.context_chars),
        };

        match self.call_with_retry(model.as_ref(), &prompt).await {
            Ok(Some(text)) => Ok(ChatReply::Answer(text)),
            Ok(None) => {
                log::warn!("Model returned no text");
                Ok(ChatReply::Warning(EMPTY_REPLY_MESSAGE.to_string()))
            }
            Err(e) => {
                log::error!("{}", e);
                Ok(ChatReply::Unavailable(UNAVAILABLE_MESSAGE.to_string()))
            }
        }
    }

    async fn call_with_retry(
        &self,
        model: &dyn LanguageModel,
        prompt: &Prompt,
    ) -> AppResult<Option<String>> {
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            match tokio::time::timeout(self.policy.attempt_timeout, model.generate(prompt)).await {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(e)) => last_error = e,
                Err(_) => {
                    last_error = format!(
                        "timed out after {}s",
                        self.policy.attempt_timeout.as_secs_f32()
                    )
                }
            }

            log::warn!(
                "Model call failed (attempt {}/{}): {}",
                attempt,
                self.policy.max_attempts,
                last_error
            );
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.delay_after(attempt)).await;
            }
        }

        Err(AppError::ServiceUnavailable(last_error))
    }
}

/// Excerpt of at most `context_chars` characters followed by the question.
pub fn build_prompt(context: &str, message: &str, context_chars: usize) -> String {
    let excerpt: String = context.chars().take(context_chars).collect();
    format!(
        "You are a research assistant. Use the following paper excerpt to answer.\n\n\
         Paper excerpt:\n{}\n\nUser question: {}",
        excerpt, message
    )
}


#[cfg(test)]
mod tests {
    use super::fake::ScriptedModel;
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(30),
        }
    }

    fn bridge(model: Arc<ScriptedModel>) -> ChatBridge {
        ChatBridge::new(Some(model as Arc<dyn LanguageModel>), policy(), 3000)
    }

    #[test]
    fn backoff_doubles() {
        let p = policy();
        assert_eq!(p.delay_after(1), Duration::from_millis(500));
        assert_eq!(p.delay_after(2), Duration::from_millis(1000));
        assert_eq!(p.delay_after(3), Duration::from_millis(2000));
    }

    #[test]
    fn prompt_uses_bounded_excerpt() {
        let context = "z".repeat(5000);
        let prompt = build_prompt(&context, "What is it?", 3000);
        assert_eq!(prompt.matches('z').count(), 3000);
        assert!(prompt.ends_with("User question: What is it?"));
    }

    #[tokio::test]
    async fn missing_context_never_calls_model() {
        let model = Arc::new(ScriptedModel::new(vec![Some(Ok(Some("hi".into())))]));
        let err = bridge(model.clone()).ask(None, "hello", None).await.unwrap_err();
        assert!(matches!(err, AppError::ContextMissing));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_credential_is_configuration_error() {
        let bridge = ChatBridge::new(None, policy(), 3000);
        assert!(!bridge.is_enabled());
        let err = bridge.ask(Some("text"), "hello", None).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn missing_context_is_checked_before_credential() {
        let bridge = ChatBridge::new(None, policy(), 3000);
        let err = bridge.ask(None, "hello", None).await.unwrap_err();
        assert!(matches!(err, AppError::ContextMissing));
    }

    #[tokio::test]
    async fn answer_is_returned() {
        let model = Arc::new(ScriptedModel::new(vec![Some(Ok(Some("42".into())))]));
        let reply = bridge(model.clone())
            .ask(Some("The answer is 42."), "What is the answer?", None)
            .await
            .unwrap();
        assert_eq!(reply, ChatReply::Answer("42".into()));

        let calls = model.calls.lock().unwrap();
        assert!(calls[0].1.contains("The answer is 42."));
        assert!(calls[0].1.contains("What is the answer?"));
    }

    #[tokio::test]
    async fn empty_reply_is_a_warning() {
        let model = Arc::new(ScriptedModel::new(vec![Some(Ok(None))]));
        let reply = bridge(model.clone()).ask(Some("ctx"), "q", None).await.unwrap();
        assert_eq!(reply, ChatReply::Warning(EMPTY_REPLY_MESSAGE.into()));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn three_failures_yield_one_unavailable_reply() {
        let model = Arc::new(ScriptedModel::new(vec![
            Some(Err("boom".into())),
            Some(Err("boom".into())),
            Some(Err("boom".into())),
            Some(Ok(Some("too late".into()))),
        ]));
        let reply = bridge(model.clone()).ask(Some("ctx"), "q", None).await.unwrap();

        assert_eq!(reply, ChatReply::Unavailable(UNAVAILABLE_MESSAGE.into()));
        let calls = model.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1].0 - calls[0].0;
        let second_gap = calls[2].0 - calls[1].0;
        assert!(first_gap >= Duration::from_millis(500));
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let model = Arc::new(ScriptedModel::new(vec![
            Some(Err("503".into())),
            Some(Ok(Some("ok".into()))),
        ]));
        let reply = bridge(model.clone()).ask(Some("ctx"), "q", None).await.unwrap();
        assert_eq!(reply, ChatReply::Answer("ok".into()));
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_call_times_out_and_retries() {
        let model = Arc::new(ScriptedModel::new(vec![None, Some(Ok(Some("done".into())))]));
        let reply = bridge(model.clone()).ask(Some("ctx"), "q", None).await.unwrap();
        assert_eq!(reply, ChatReply::Answer("done".into()));

        let calls = model.calls.lock().unwrap();
        assert!(calls[1].0 - calls[0].0 >= Duration::from_secs(30));
    }
}
