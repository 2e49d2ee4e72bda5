use super::ReviewOutcome;
use crate::llm::ModelClient;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

/// How long one model call may take before the file is counted as an error.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// Responses shorter than this are treated as "nothing useful came back".
const MIN_FIXED_CHARS: usize = 11;

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^```[a-z0-9_+-]*[ \t]*\r?\n").expect("valid regex"));
static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n```$").expect("valid regex"));

/// Remove a markdown fence wrapped around the whole response, then trim.
///
/// Best-effort cleanup only: anything after a closing fence is left in
/// place, so such responses keep their fences.
pub fn strip_code_fence(response: &str) -> String {
    let trimmed = response.trim();
    let without_open = OPENING_FENCE.replace(trimmed, "");
    let without_close = CLOSING_FENCE.replace(&without_open, "");
    without_close.trim().to_string()
}

/// Runs one model call per file, bounded by a deadline.
pub struct ReviewInvoker<'a, M> {
    client: &'a M,
    deadline: Duration,
}

impl<'a, M: ModelClient> ReviewInvoker<'a, M> {
    pub fn new(client: &'a M, deadline: Duration) -> Self {
        Self { client, deadline }
    }

    /// Send `prompt` and classify the response against `original`.
    ///
    /// On timeout the in-flight call is dropped and its result never observed.
    pub async fn invoke(&self, prompt: &str, original: &str) -> ReviewOutcome {
        let response = match tokio::time::timeout(self.deadline, self.client.generate(prompt)).await {
            Ok(response) => response,
            Err(_) => return ReviewOutcome::Error("timeout".to_string()),
        };

        match response {
            Ok(text) => classify(&text, original),
            Err(err) if err.is_quota_exceeded() => {
                debug!(error = %err, "quota exceeded");
                ReviewOutcome::QuotaExceeded
            }
            Err(err) => ReviewOutcome::Error(err.to_string()),
        }
    }
}

fn classify(response: &str, original: &str) -> ReviewOutcome {
    let candidate = strip_code_fence(response);
    if candidate.chars().count() < MIN_FIXED_CHARS || candidate == original.trim() {
        return ReviewOutcome::Clean;
    }
    ReviewOutcome::Fixed(match_trailing_newline(original, candidate))
}

/// Keep the original file's trailing newline convention.
fn match_trailing_newline(original: &str, mut candidate: String) -> String {
    if original.ends_with("\r\n") {
        candidate.push_str("\r\n");
    } else if original.ends_with('\n') {
        candidate.push('\n');
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelError;

    struct Reply(Result<&'static str, u16>);

    impl ModelClient for Reply {
        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(status) => Err(ModelError::Status {
                    provider: "test",
                    status,
                    message: "refused".to_string(),
                }),
            }
        }
    }

    struct Hang;

    impl ModelClient for Hang {
        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("never observed".to_string())
        }
    }

    const ORIGINAL: &str = "def add(a, b):\n    return a - b\n";

    async fn invoke(client: &impl ModelClient) -> ReviewOutcome {
        ReviewInvoker::new(client, Duration::from_secs(5))
            .invoke("prompt", ORIGINAL)
            .await
    }

    #[test]
    fn test_strip_code_fence_with_language() {
        assert_eq!(strip_code_fence("```python\nx = 1\n```"), "x = 1");
        assert_eq!(strip_code_fence("```\nx = 1\n```\n"), "x = 1");
        assert_eq!(strip_code_fence("```JS\nlet a;\n```"), "let a;");
    }

    #[test]
    fn test_strip_code_fence_plain_text_untouched() {
        assert_eq!(strip_code_fence("  x = 1\n"), "x = 1");
    }

    #[test]
    fn test_strip_code_fence_trailing_content_kept() {
        let response = "```js\nlet a;\n```\nHope this helps";
        assert_eq!(strip_code_fence(response), "let a;\n```\nHope this helps");
    }

    #[tokio::test]
    async fn test_fixed_response() {
        let outcome = invoke(&Reply(Ok(
            "def add(a, b):\n    return a + b  # KRITIQ FIX: wrong operator",
        )))
        .await;
        assert_eq!(
            outcome,
            ReviewOutcome::Fixed(
                "def add(a, b):\n    return a + b  # KRITIQ FIX: wrong operator\n".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_unchanged_response_is_clean() {
        assert_eq!(invoke(&Reply(Ok(ORIGINAL))).await, ReviewOutcome::Clean);
        let fenced = "```python\ndef add(a, b):\n    return a - b\n```";
        assert_eq!(invoke(&Reply(Ok(fenced))).await, ReviewOutcome::Clean);
    }

    #[tokio::test]
    async fn test_short_or_empty_response_is_clean() {
        assert_eq!(invoke(&Reply(Ok(""))).await, ReviewOutcome::Clean);
        assert_eq!(invoke(&Reply(Ok("ok"))).await, ReviewOutcome::Clean);
    }

    #[tokio::test]
    async fn test_429_is_quota_exceeded() {
        assert_eq!(invoke(&Reply(Err(429))).await, ReviewOutcome::QuotaExceeded);
    }

    #[tokio::test]
    async fn test_other_errors_are_per_file() {
        match invoke(&Reply(Err(500))).await {
            ReviewOutcome::Error(msg) => assert!(msg.contains("500")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deadline_yields_timeout_error() {
        let started = std::time::Instant::now();
        let outcome = ReviewInvoker::new(&Hang, Duration::from_millis(50))
            .invoke("prompt", ORIGINAL)
            .await;
        assert_eq!(outcome, ReviewOutcome::Error("timeout".to_string()));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
