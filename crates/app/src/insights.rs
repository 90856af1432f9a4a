use domain::{insights::InsightReport, prescriptions::PrescriptionRow};
use serde_json::json;

use crate::{backend::Backend, errors::AppError};

pub const INSIGHTS_FUNCTION: &str = "prescription-insights";

/// Report to show, plus the error that forced a fallback report
#[derive(Debug)]
pub struct Insights {
    pub report: InsightReport,
    pub error: Option<AppError>,
}

pub async fn load(backend: &dyn Backend, prescriptions: &[PrescriptionRow]) -> Insights {
    if prescriptions.is_empty() {
        return Insights {
            report: InsightReport::no_prescriptions(),
            error: None,
        };
    }

    let body = json!({
        "prescriptions": prescriptions
            .iter()
            .map(|p| json!({
                "prescription_name": p.prescription_name,
                "created_at": p.created_at,
                "medicines": p.medicines,
            }))
            .collect::<Vec<_>>(),
    });

    let result = match backend.invoke_function(INSIGHTS_FUNCTION, body).await {
        Ok(reply) => reply.json::<InsightReport>(),
        Err(err) => Err(err),
    };

    match result {
        Ok(report) => Insights {
            report: report.clamped(),
            error: None,
        },
        Err(err) => {
            tracing::error!("Error fetching insights: {}", err);
            Insights {
                report: InsightReport::unavailable(),
                error: Some(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use domain::Medicine;

    use super::*;
    use crate::{
        backend::{BackendError, FunctionReply},
        memory::{signed_in, MemoryBackend},
    };

    fn row() -> PrescriptionRow {
        PrescriptionRow {
            user_id: "user-1".to_string(),
            id: "01".to_string(),
            prescription_name: "Clinic".to_string(),
            medicines: vec![Medicine::new("Metformin", "500mg")],
            notes: None,
            prescription_image_url: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn no_prescriptions_skips_the_call() {
        let backend = MemoryBackend::new(signed_in("user-1"));

        let insights = load(&backend, &[]).await;

        assert_eq!(insights.report, InsightReport::no_prescriptions());
        assert!(insights.error.is_none());
        assert!(backend.invocations().is_empty());
    }

    #[tokio::test]
    async fn report_is_clamped() {
        let backend = MemoryBackend::new(signed_in("user-1")).with_function(
            INSIGHTS_FUNCTION,
            |body| {
                assert_eq!(body["prescriptions"][0]["medicines"][0]["name"], "Metformin");
                Ok(FunctionReply::Json(json!({
                    "dailyScore": 80,
                    "overallScore": 140,
                    "insights": ["Take Metformin with meals"],
                    "reminders": []
                })))
            },
        );

        let insights = load(&backend, &[row()]).await;

        assert_eq!(insights.report.daily_score, 80);
        assert_eq!(insights.report.overall_score, 100);
    }

    #[tokio::test]
    async fn failure_falls_back_and_reports_the_error() {
        let backend = MemoryBackend::new(signed_in("user-1")).with_function(
            INSIGHTS_FUNCTION,
            |_| {
                Err(BackendError::Status {
                    status: 429,
                    message: "Rate limit exceeded. Please try again later.".to_string(),
                })
            },
        );

        let insights = load(&backend, &[row()]).await;

        assert_eq!(insights.report, InsightReport::unavailable());
        assert!(matches!(
            insights.error,
            Some(AppError::Backend(BackendError::Status { status: 429, .. }))
        ));
    }
}
