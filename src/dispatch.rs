//! Credential-rotating dispatch.
//!
//! [`ResilientDispatcher`] walks an ordered credential list and issues one
//! generation call per credential until one succeeds:
//!
//! - success: stop and return the content (fences stripped)
//! - quota exhausted: warn, cool down for a fixed interval, try the next credential
//! - any other failure: stop immediately; another key would fail the same way
//!
//! There is no cooldown after the last credential or after a non-quota
//! failure, and running out of credentials is reported as
//! [`DispatchOutcome::Exhausted`], distinct from [`DispatchOutcome::Failed`].

use crate::api::{GenerateContent, GenerateError, GenerationRequest};
use crate::models::{Credential, CredentialSlot};
use crate::utils::truncate_for_log;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Leading fence line, with or without a language tag.
static OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```[A-Za-z0-9_+.-]*[ \t]*\r?\n?").unwrap());

/// Trailing fence, optionally followed by whitespace.
static CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```\s*$").unwrap());

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Succeeded,
    QuotaExceeded,
    Failed,
}

/// Ledger entry for one call made during a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchAttempt {
    /// 1-based position in the candidate list.
    pub ordinal: usize,
    /// Slot the credential came from; the secret itself is not recorded.
    pub slot: CredentialSlot,
    pub result: AttemptResult,
}

impl fmt::Display for DispatchAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self.result {
            AttemptResult::Succeeded => "ok",
            AttemptResult::QuotaExceeded => "quota",
            AttemptResult::Failed => "failed",
        };
        write!(f, "#{} {}={}", self.ordinal, self.slot, result)
    }
}

/// Terminal state of a dispatch.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A credential succeeded; content has had code fences stripped.
    Done(String),
    /// Every candidate hit its quota, or there were no candidates.
    Exhausted,
    /// A non-quota failure ended the dispatch early.
    Failed(GenerateError),
}

/// Everything a dispatch did: its outcome, the attempts made and the
/// number of cooldown pauses taken.
#[derive(Debug)]
pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    pub attempts: Vec<DispatchAttempt>,
    pub cooldowns: usize,
}

impl DispatchReport {
    /// Compact ledger for log lines, e.g. `#1 pool:KEY_1=quota, #2 pool:KEY_2=ok`.
    pub fn ledger(&self) -> String {
        self.attempts.iter().join(", ")
    }
}

/// Runs generation calls over a credential list with quota-only failover.
#[derive(Debug)]
pub struct ResilientDispatcher<C> {
    client: C,
    cooldown: Duration,
}

impl<C> ResilientDispatcher<C>
where
    C: GenerateContent,
{
    pub fn new(client: C, cooldown: Duration) -> Self {
        Self { client, cooldown }
    }

    #[cfg(test)]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Try `candidates` in order until one produces content.
    ///
    /// A quota failure moves on to the next credential after the cooldown;
    /// no cooldown follows the last candidate. Any other failure ends the
    /// dispatch at once.
    ///
    /// # Arguments
    ///
    /// * `label` - Names the work (usually the sector key) in log lines
    /// * `candidates` - Credentials in priority order
    /// * `request` - The generation request, sent unchanged with each credential
    ///
    /// # Returns
    ///
    /// A [`DispatchReport`] with the terminal outcome, one ledger entry per
    /// call made and the number of cooldown pauses taken. An empty
    /// `candidates` slice yields [`DispatchOutcome::Exhausted`] with no attempts.
    #[instrument(level = "info", skip_all, fields(label = %label, model = %request.model, candidates = candidates.len()))]
    pub async fn dispatch(
        &self,
        label: &str,
        candidates: &[Credential],
        request: &GenerationRequest,
    ) -> DispatchReport {
        let total = candidates.len();
        let mut attempts = Vec::with_capacity(total);
        let mut cooldowns = 0usize;

        if candidates.is_empty() {
            error!("No credential available; nothing to try");
            return DispatchReport {
                outcome: DispatchOutcome::Exhausted,
                attempts,
                cooldowns,
            };
        }

        let t0 = Instant::now();
        for (i, credential) in candidates.iter().enumerate() {
            let ordinal = i + 1;
            info!(attempt = ordinal, of = total, slot = %credential.source_tag(), "Dispatching generation request");

            match self.client.generate(credential, request).await {
                Ok(raw) => {
                    attempts.push(DispatchAttempt {
                        ordinal,
                        slot: credential.source_tag().clone(),
                        result: AttemptResult::Succeeded,
                    });
                    info!(
                        attempt = ordinal,
                        of = total,
                        elapsed_ms_total = t0.elapsed().as_millis() as u64,
                        preview = %truncate_for_log(&raw, 120),
                        "Generation succeeded"
                    );
                    return DispatchReport {
                        outcome: DispatchOutcome::Done(strip_code_fences(&raw)),
                        attempts,
                        cooldowns,
                    };
                }
                Err(e) if e.is_quota_exhausted() => {
                    attempts.push(DispatchAttempt {
                        ordinal,
                        slot: credential.source_tag().clone(),
                        result: AttemptResult::QuotaExceeded,
                    });
                    if ordinal < total {
                        warn!(
                            attempt = ordinal,
                            of = total,
                            cooldown = ?self.cooldown,
                            error = %e,
                            "Credential quota exhausted; switching to next credential"
                        );
                        sleep(self.cooldown).await;
                        cooldowns += 1;
                    } else {
                        warn!(attempt = ordinal, of = total, error = %e, "Credential quota exhausted");
                    }
                }
                Err(e) => {
                    attempts.push(DispatchAttempt {
                        ordinal,
                        slot: credential.source_tag().clone(),
                        result: AttemptResult::Failed,
                    });
                    error!(
                        attempt = ordinal,
                        of = total,
                        error = %e,
                        ledger = %attempts.iter().join(", "),
                        "Generation failed with a non-quota error; not trying remaining credentials"
                    );
                    return DispatchReport {
                        outcome: DispatchOutcome::Failed(e),
                        attempts,
                        cooldowns,
                    };
                }
            }
        }

        let report = DispatchReport {
            outcome: DispatchOutcome::Exhausted,
            attempts,
            cooldowns,
        };
        error!(
            attempts = total,
            elapsed_ms_total = t0.elapsed().as_millis() as u64,
            ledger = %report.ledger(),
            "All candidate credentials exhausted"
        );
        report
    }
}

/// Remove one leading fence line (with or without a language tag) and one
/// trailing fence from model output.
///
/// ```ignore
/// assert_eq!(strip_code_fences("```markdown\nX\n```"), "X\n");
/// ```
pub fn strip_code_fences(content: &str) -> String {
    let without_open = OPENING_FENCE.replace(content, "");
    CLOSING_FENCE.replace(&without_open, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays a fixed script of results, one per call.
    #[derive(Default)]
    struct ScriptedClient {
        script: RefCell<VecDeque<Result<String, GenerateError>>>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<String, GenerateError>>) -> Self {
            Self {
                script: RefCell::new(script.into()),
                calls: RefCell::default(),
            }
        }
    }

    impl GenerateContent for ScriptedClient {
        async fn generate(
            &self,
            credential: &Credential,
            _request: &GenerationRequest,
        ) -> Result<String, GenerateError> {
            self.calls.borrow_mut().push(credential.expose().to_string());
            self.script
                .borrow_mut()
                .pop_front()
                .expect("client called more often than scripted")
        }
    }

    fn quota() -> Result<String, GenerateError> {
        Err(GenerateError::QuotaExceeded {
            status: 429,
            message: "Resource has been exhausted".into(),
        })
    }

    fn rejected() -> Result<String, GenerateError> {
        Err(GenerateError::Rejected {
            status: 400,
            message: "API key not valid".into(),
        })
    }

    fn creds(n: usize) -> Vec<Credential> {
        (1..=n)
            .map(|i| Credential::new(format!("k{i}"), CredentialSlot::Pool(format!("KEY_{i}"))))
            .collect()
    }

    fn dispatcher(script: Vec<Result<String, GenerateError>>) -> ResilientDispatcher<ScriptedClient> {
        ResilientDispatcher::new(ScriptedClient::new(script), Duration::ZERO)
    }

    fn request() -> GenerationRequest {
        GenerationRequest::text("gemini-2.5-flash", "prompt")
    }

    fn content(report: &DispatchReport) -> Option<&str> {
        match &report.outcome {
            DispatchOutcome::Done(content) => Some(content),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_first_credential_succeeds() {
        let d = dispatcher(vec![Ok("report".into())]);
        let report = d.dispatch("tech", &creds(3), &request()).await;

        assert_eq!(content(&report), Some("report"));
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.cooldowns, 0);
        assert_eq!(*d.client().calls.borrow(), vec!["k1"]);
    }

    #[tokio::test]
    async fn test_all_quota_exhausted() {
        let d = dispatcher(vec![quota(), quota(), quota()]);
        let report = d.dispatch("tech", &creds(3), &request()).await;

        assert!(matches!(report.outcome, DispatchOutcome::Exhausted));
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.cooldowns, 2);
        assert!(report.attempts.iter().all(|a| a.result == AttemptResult::QuotaExceeded));
        assert_eq!(*d.client().calls.borrow(), vec!["k1", "k2", "k3"]);
    }

    #[tokio::test]
    async fn test_single_candidate_quota_has_no_cooldown() {
        let d = dispatcher(vec![quota()]);
        let report = d.dispatch("tech", &creds(1), &request()).await;

        assert!(matches!(report.outcome, DispatchOutcome::Exhausted));
        assert_eq!(report.cooldowns, 0);
    }

    #[tokio::test]
    async fn test_rotates_after_quota() {
        let d = dispatcher(vec![quota(), Ok("second".into())]);
        let report = d.dispatch("finance", &creds(3), &request()).await;

        assert_eq!(content(&report), Some("second"));
        assert_eq!(report.cooldowns, 1);
        assert_eq!(
            report.attempts.iter().map(|a| a.result).collect::<Vec<_>>(),
            vec![AttemptResult::QuotaExceeded, AttemptResult::Succeeded]
        );
        assert_eq!(report.attempts[1].ordinal, 2);
        assert_eq!(report.attempts[1].slot, CredentialSlot::Pool("KEY_2".into()));
        assert_eq!(report.ledger(), "#1 pool:KEY_1=quota, #2 pool:KEY_2=ok");
    }

    #[tokio::test]
    async fn test_non_quota_failure_stops_immediately() {
        // failure on attempt k = 2 of n = 4
        let d = dispatcher(vec![quota(), rejected()]);
        let report = d.dispatch("global", &creds(4), &request()).await;

        match &report.outcome {
            DispatchOutcome::Failed(GenerateError::Rejected { status, .. }) => assert_eq!(*status, 400),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.cooldowns, 1);
        assert_eq!(*d.client().calls.borrow(), vec!["k1", "k2"]);
    }

    #[tokio::test]
    async fn test_first_attempt_failure_has_no_cooldown() {
        let d = dispatcher(vec![rejected()]);
        let report = d.dispatch("global", &creds(3), &request()).await;

        assert!(matches!(report.outcome, DispatchOutcome::Failed(_)));
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.cooldowns, 0);
    }

    #[tokio::test]
    async fn test_no_candidates_is_exhausted_without_calls() {
        let d = dispatcher(vec![]);
        let report = d.dispatch("general", &[], &request()).await;

        assert!(matches!(report.outcome, DispatchOutcome::Exhausted));
        assert!(report.attempts.is_empty());
        assert_eq!(report.cooldowns, 0);
        assert!(d.client().calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_success_content_is_unfenced() {
        let d = dispatcher(vec![Ok("```markdown\n# Title\n```".into())]);
        let report = d.dispatch("tech", &creds(1), &request()).await;
        assert_eq!(content(&report), Some("# Title\n"));
    }

    #[test]
    fn test_strip_fences_with_language_tag() {
        assert_eq!(strip_code_fences("```markdown\nX\n```"), "X\n");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```\n"), "{\"a\": 1}\n");
    }

    #[test]
    fn test_strip_fences_without_language_tag() {
        assert_eq!(strip_code_fences("```\nX\n```"), "X\n");
    }

    #[test]
    fn test_strip_fences_leaves_plain_text() {
        assert_eq!(strip_code_fences("# Report\n\nBody"), "# Report\n\nBody");
    }

    #[test]
    fn test_strip_fences_only_outer_markers() {
        let input = "```markdown\nIntro\n```rust\nfn main() {}\n```\nOutro\n```";
        assert_eq!(
            strip_code_fences(input),
            "Intro\n```rust\nfn main() {}\n```\nOutro\n"
        );
    }

    #[test]
    fn test_strip_fences_one_sided() {
        assert_eq!(strip_code_fences("```markdown\nX"), "X");
        assert_eq!(strip_code_fences("X\n```"), "X\n");
    }
}
