//! Per-claim verification against web search.

use planeval_core::{ClaimVerdict, ExternalError, JudgeClient, SearchClient, SearchHit};
use tracing::{debug, warn};

use crate::claims::Claim;

const RESULTS_PER_QUERY: usize = 5;

/// Verdict for one claim plus the evidence snippets the judge saw,
/// kept for the audit breakdown. Evidence is empty when the claim was
/// never judged (no results, or a fail-fast skip).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimCheck {
    pub verdict: ClaimVerdict,
    pub evidence: String,
}

impl ClaimCheck {
    fn unknown() -> Self {
        Self {
            verdict: ClaimVerdict::Unknown,
            evidence: String::new(),
        }
    }
}

/// Verify each claim in order: paraphrase it into a search query, fetch
/// snippets, and ask the judge for a verdict.
///
/// A search failure that survives its bounded retries marks the current
/// claim and every remaining claim Unknown without issuing further search
/// calls; quota problems must not turn into per-claim retry storms. Judge
/// quota exhaustion fails fast the same way; other judge failures degrade
/// only that claim to Unknown.
pub async fn verify_claims(
    judge: &dyn JudgeClient,
    search: &dyn SearchClient,
    claims: &[Claim],
) -> Vec<ClaimCheck> {
    let mut checks = Vec::with_capacity(claims.len());
    let mut bail_out = false;

    for claim in claims {
        if bail_out {
            checks.push(ClaimCheck::unknown());
            continue;
        }

        let query = match judge.search_phrase(&claim.text).await {
            Ok(query) => query,
            Err(ExternalError::QuotaExhausted(msg)) => {
                warn!(error = %msg, "judge quota exhausted, remaining claims unknown");
                bail_out = true;
                checks.push(ClaimCheck::unknown());
                continue;
            }
            Err(err) => {
                debug!(error = %err, "search-phrase call failed, falling back to raw claim");
                claim.text.chars().take(80).collect()
            }
        };

        let hits = match search.search(&query, RESULTS_PER_QUERY).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(error = %err, "search failed, remaining claims unknown");
                bail_out = true;
                checks.push(ClaimCheck::unknown());
                continue;
            }
        };
        if hits.is_empty() {
            checks.push(ClaimCheck::unknown());
            continue;
        }

        let snippets = join_snippets(&hits);
        match judge.verify_claim(&claim.text, &snippets).await {
            Ok(verdict) => checks.push(ClaimCheck {
                verdict,
                evidence: snippets,
            }),
            Err(ExternalError::QuotaExhausted(msg)) => {
                warn!(error = %msg, "judge quota exhausted, remaining claims unknown");
                bail_out = true;
                checks.push(ClaimCheck::unknown());
            }
            Err(err) => {
                warn!(error = %err, "verdict call failed, claim unknown");
                checks.push(ClaimCheck::unknown());
            }
        }
    }

    checks
}

fn join_snippets(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| h.evidence())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `Verified / (Verified + Hallucination)` over the examined claims.
/// Unknown counts toward neither side; `None` when nothing resolved, so a
/// quota-starved task is not penalized as if every claim were a
/// hallucination.
pub fn ratio_verified(verdicts: &[ClaimVerdict]) -> Option<f64> {
    let verified = verdicts
        .iter()
        .filter(|v| **v == ClaimVerdict::Verified)
        .count();
    let hallucinated = verdicts
        .iter()
        .filter(|v| **v == ClaimVerdict::Hallucination)
        .count();
    let resolved = verified + hallucinated;
    if resolved == 0 {
        None
    } else {
        Some(verified as f64 / resolved as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planeval_core::{ScriptedJudge, ScriptedSearch};
    use std::sync::atomic::Ordering;

    fn claims(n: usize) -> Vec<Claim> {
        (0..n)
            .map(|i| Claim {
                step_index: i,
                text: format!("claim {i}"),
            })
            .collect()
    }

    #[test]
    fn ratio_excludes_unknown_from_both_sides() {
        use ClaimVerdict::*;
        let verdicts = [Verified, Verified, Hallucination, Unknown, Unknown];
        let ratio = ratio_verified(&verdicts).unwrap();
        assert!((ratio - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn all_unknown_is_undefined_not_zero() {
        let verdicts = [ClaimVerdict::Unknown, ClaimVerdict::Unknown];
        assert_eq!(ratio_verified(&verdicts), None);
        assert_eq!(ratio_verified(&[]), None);
    }

    #[tokio::test]
    async fn verdicts_follow_the_judge() {
        let judge = ScriptedJudge::new();
        judge.push_verdict(Ok(ClaimVerdict::Verified));
        judge.push_verdict(Ok(ClaimVerdict::Hallucination));
        let search = ScriptedSearch::new();
        search.push_snippet("axios-retry exists");
        search.push_snippet("no such flag");

        let checks = verify_claims(&judge, &search, &claims(2)).await;
        assert_eq!(checks[0].verdict, ClaimVerdict::Verified);
        assert_eq!(checks[1].verdict, ClaimVerdict::Hallucination);
        // The snippets shown to the judge are kept for audit
        assert!(checks[0].evidence.contains("axios-retry exists"));
        assert!(checks[1].evidence.contains("no such flag"));
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn quota_on_third_claim_stops_searching() {
        let judge = ScriptedJudge::new();
        judge.push_verdict(Ok(ClaimVerdict::Verified));
        judge.push_verdict(Ok(ClaimVerdict::Verified));
        let search = ScriptedSearch::new();
        search.push_snippet("ok");
        search.push_snippet("ok");
        search.push(Err(ExternalError::QuotaExhausted("out of quota".into())));

        let checks = verify_claims(&judge, &search, &claims(5)).await;
        assert_eq!(checks.len(), 5);
        // Claims examined before exhaustion keep their verdicts and evidence
        assert_eq!(checks[0].verdict, ClaimVerdict::Verified);
        assert_eq!(checks[1].verdict, ClaimVerdict::Verified);
        // The failing claim and everything after it are unknown, no evidence
        assert!(checks[2..]
            .iter()
            .all(|c| c.verdict == ClaimVerdict::Unknown && c.evidence.is_empty()));
        // No search call was attempted for claims 4 and 5
        assert_eq!(search.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_search_results_leave_claim_unknown_but_continue() {
        let judge = ScriptedJudge::new();
        judge.push_verdict(Ok(ClaimVerdict::Verified));
        let search = ScriptedSearch::new();
        search.push(Ok(Vec::new()));
        search.push_snippet("evidence");

        let checks = verify_claims(&judge, &search, &claims(2)).await;
        assert_eq!(checks[0].verdict, ClaimVerdict::Unknown);
        assert_eq!(checks[1].verdict, ClaimVerdict::Verified);
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
        // The judge was only consulted for the claim that had evidence
        assert_eq!(judge.verify_calls.load(Ordering::SeqCst), 1);
    }
}
