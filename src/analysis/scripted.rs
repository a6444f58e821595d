use std::collections::BTreeSet;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use super::{AnalysisError, Analyzer, RankedMatch, SurveyDigest, Verdict};

/// A deterministic stand-in for the analysis service.
///
/// Search ranks by shared words, validation rejects anything mentioning
/// "off-topic", and summaries just count the responses. Clones share state,
/// so a test can flip [`ScriptedAnalyzer::set_failing`] on a running server.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAnalyzer {
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

fn words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl ScriptedAnalyzer {
    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// How many calls have been made so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<(), AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(AnalysisError::Malformed("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[rocket::async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn search(
        &self,
        query: &str,
        corpus: &[SurveyDigest],
    ) -> Result<Vec<RankedMatch>, AnalysisError> {
        self.begin()?;
        let query = words(query);
        let mut scored: Vec<(usize, RankedMatch)> = corpus
            .iter()
            .filter_map(|digest| {
                let text = format!("{} {} {}", digest.title, digest.area, digest.description);
                let shared: Vec<String> = words(&text).intersection(&query).cloned().collect();
                (!shared.is_empty()).then(|| {
                    (
                        shared.len(),
                        RankedMatch {
                            id: digest.id,
                            reason: format!("mentions {}", shared.join(", ")),
                        },
                    )
                })
            })
            .collect();
        // Stable, so ties keep corpus order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().map(|(_, m)| m).collect())
    }

    async fn validate(&self, _rubric: &str, text: &str) -> Result<Verdict, AnalysisError> {
        self.begin()?;
        Ok(if text.to_lowercase().contains("off-topic") {
            Verdict {
                is_valid: false,
                feedback: "Response does not address the question".to_string(),
            }
        } else {
            Verdict {
                is_valid: true,
                feedback: "Looks fine".to_string(),
            }
        })
    }

    async fn summarize(
        &self,
        responses: &[String],
        instructions: &str,
    ) -> Result<String, AnalysisError> {
        self.begin()?;
        let mut summary = format!("{} responses received.", responses.len());
        if !instructions.is_empty() {
            summary.push_str(&format!(" ({instructions})"));
        }
        Ok(summary)
    }
}
