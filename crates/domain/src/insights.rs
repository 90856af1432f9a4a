use serde::{Deserialize, Serialize};

/// AI generated adherence summary
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsightReport {
    #[serde(default)]
    pub daily_score: u8,
    #[serde(default)]
    pub overall_score: u8,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub reminders: Vec<String>,
}

impl InsightReport {
    /// Shown before the first prescription is saved
    pub fn no_prescriptions() -> Self {
        Self {
            insights: vec![
                "No prescriptions found. Upload your first prescription to get started!"
                    .to_string(),
            ],
            reminders: vec![
                "Start by scanning a prescription to receive personalized insights.".to_string(),
            ],
            ..Default::default()
        }
    }

    /// Shown when the insight service fails
    pub fn unavailable() -> Self {
        Self {
            insights: vec!["Unable to generate insights at this time.".to_string()],
            reminders: vec!["Please try again later.".to_string()],
            ..Default::default()
        }
    }

    /// Scores outside 0..=100 are clamped
    pub fn clamped(mut self) -> Self {
        self.daily_score = self.daily_score.min(100);
        self.overall_score = self.overall_score.min(100);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_report() {
        let report: InsightReport = serde_json::from_str(
            r#"{"dailyScore": 85, "overallScore": 120, "insights": ["a"], "reminders": []}"#,
        )
        .unwrap();

        let report = report.clamped();
        assert_eq!(report.daily_score, 85);
        assert_eq!(report.overall_score, 100);
        assert_eq!(report.insights, vec!["a".to_string()]);
    }
}
