use super::{AnalysisError, Analyzer, RankedMatch, SurveyDigest, Verdict};

/// Used when no analysis service is configured: every call fails, so
/// nothing ever silently degrades.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAnalyzer;

#[rocket::async_trait]
impl Analyzer for DisabledAnalyzer {
    async fn search(
        &self,
        _query: &str,
        _corpus: &[SurveyDigest],
    ) -> Result<Vec<RankedMatch>, AnalysisError> {
        Err(AnalysisError::Disabled)
    }

    async fn validate(&self, _rubric: &str, _text: &str) -> Result<Verdict, AnalysisError> {
        Err(AnalysisError::Disabled)
    }

    async fn summarize(
        &self,
        _responses: &[String],
        _instructions: &str,
    ) -> Result<String, AnalysisError> {
        Err(AnalysisError::Disabled)
    }
}
