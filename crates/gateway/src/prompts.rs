//! Prompt builders for the serverless functions.

use chrono::{DateTime, Utc};
use domain::{chat::ChatMessage, Medicine};
use serde::{Deserialize, Serialize};

use crate::client::{CompletionRequest, Message};

/// Shortest query worth sending to autocomplete
pub const MIN_AUTOCOMPLETE_CHARS: usize = 2;

const ANALYZE_SYSTEM: &str = "You are a pharmaceutical assistant. Identify the medication in the image and answer briefly. \
Start with the medication name as a heading, then short bullet points covering active ingredients, uses, \
typical dosage, key side effects and warnings. No preamble.";

const ANALYZE_USER: &str = "Identify this medication: name, active ingredient, uses, typical dosage, \
main side effects and key warnings. Be concise.";

const EXTRACT_SYSTEM: &str = "You read photographed medical prescriptions. Extract every medicine with its dosage. \
Put frequency, duration and instructions in the dosage field.";

const EXTRACT_USER: &str = "Extract all medicines and dosages from this prescription. Reply with JSON only, shaped as \
{\"medicines\": [{\"name\": \"Medicine Name\", \"dosage\": \"dosage with frequency and duration\"}]}";

const AUTOCOMPLETE_SYSTEM: &str = "You autocomplete medicine names. Reply ONLY with a JSON array of 5 real, commonly \
used medicine names matching the partial input, e.g. [\"Name 1\", \"Name 2\"].";

const DRUG_INFO_SYSTEM: &str = "You are a pharmacist explaining a medicine to a patient. Cover what it is used for, \
how to take it, common and serious side effects, interactions and warnings. Use short paragraphs and plain \
language. Remind the reader to consult their healthcare provider.";

const INSIGHTS_SYSTEM: &str = "You are a healthcare assistant reviewing a patient's prescriptions. Give concise, \
actionable insights on adherence, possible interactions and general health.";

/// Prescription summary as sent by the client for chat and insights
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionContext {
    #[serde(default)]
    pub prescription_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub medicines: Vec<Medicine>,
}

impl PrescriptionContext {
    fn name(&self) -> &str {
        self.prescription_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(domain::prescriptions::UNNAMED_PRESCRIPTION)
    }
}

pub fn analyze_medication(image: &str) -> CompletionRequest {
    CompletionRequest::new(vec![
        Message::system(ANALYZE_SYSTEM),
        Message::user_with_image(ANALYZE_USER, image),
    ])
}

pub fn extract_prescription(image: &str) -> CompletionRequest {
    CompletionRequest::new(vec![
        Message::system(EXTRACT_SYSTEM),
        Message::user_with_image(EXTRACT_USER, image),
    ])
    .with_temperature(0.1)
}

pub fn drug_autocomplete(query: &str) -> CompletionRequest {
    CompletionRequest::new(vec![
        Message::system(AUTOCOMPLETE_SYSTEM),
        Message::user(format!(
            "Suggest 5 medicine names that start with or contain: {query}"
        )),
    ])
}

pub fn drug_info(medicine_name: &str) -> CompletionRequest {
    CompletionRequest::new(vec![
        Message::system(DRUG_INFO_SYSTEM),
        Message::user(format!("Tell me about {medicine_name}.")),
    ])
}

pub fn prescription_chat(
    message: &str,
    prescriptions: &[PrescriptionContext],
    history: &[ChatMessage],
) -> CompletionRequest {
    let listing = prescriptions
        .iter()
        .map(|p| {
            let uploaded = p
                .created_at
                .map(|at| at.format("%-m/%-d/%Y").to_string())
                .unwrap_or_else(|| "unknown date".to_string());
            format!("- {} (uploaded: {})", p.name(), uploaded)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        "You are a helpful medical assistant answering questions about the user's prescriptions:\n\n\
         {listing}\n\n\
         Answer clearly about interactions, side effects, dosages and general medication questions. \
         Always remind the user to consult their healthcare provider. Be concise and friendly."
    );

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system));
    messages.extend(history.iter().map(|turn| match turn.role {
        domain::chat::Role::User => Message::user(turn.content.clone()),
        domain::chat::Role::Assistant => Message::assistant(turn.content.clone()),
    }));
    messages.push(Message::user(message));

    CompletionRequest::new(messages)
}

pub fn prescription_insights(prescriptions: &[PrescriptionContext]) -> CompletionRequest {
    let summary = prescriptions
        .iter()
        .map(|p| {
            let medicines = if p.medicines.is_empty() {
                "No medicines listed".to_string()
            } else {
                p.medicines
                    .iter()
                    .map(|m| format!("{} ({})", m.name, m.dosage))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!("{}: {}", p.name(), medicines)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let user = format!(
        "Analyze these prescriptions and provide:\n\
         1. Daily adherence score (0-100)\n\
         2. Overall health progress score (0-100)\n\
         3. 3-4 key insights about the medications\n\
         4. Any important reminders or warnings\n\n\
         Prescriptions:\n{summary}\n\n\
         Return JSON with: {{ dailyScore: number, overallScore: number, insights: string[], reminders: string[] }}"
    );

    CompletionRequest::new(vec![Message::system(INSIGHTS_SYSTEM), Message::user(user)])
        .with_temperature(0.7)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::client::Content;

    fn text(message: &Message) -> &str {
        match &message.content {
            Content::Text(text) => text,
            Content::Parts(_) => panic!("expected plain text"),
        }
    }

    #[test]
    fn chat_lists_prescriptions_and_keeps_history_order() {
        let prescriptions = vec![
            PrescriptionContext {
                prescription_name: Some("Malaria course".to_string()),
                created_at: Some(Utc.with_ymd_and_hms(2025, 3, 9, 10, 0, 0).unwrap()),
                medicines: vec![],
            },
            PrescriptionContext::default(),
        ];
        let history = vec![
            ChatMessage::user("What is this for?"),
            ChatMessage::assistant("It treats malaria."),
        ];

        let request = prescription_chat("Any side effects?", &prescriptions, &history);

        assert_eq!(request.messages.len(), 4);
        let system = text(&request.messages[0]);
        assert!(system.contains("- Malaria course (uploaded: 3/9/2025)"));
        assert!(system.contains("- Unnamed prescription (uploaded: unknown date)"));
        assert_eq!(request.messages[2].role, "assistant");
        assert_eq!(text(&request.messages[3]), "Any side effects?");
    }

    #[test]
    fn insights_summarise_medicines() {
        let prescriptions = vec![PrescriptionContext {
            prescription_name: Some("Clinic".to_string()),
            created_at: None,
            medicines: vec![
                Medicine::new("Metformin", "500mg twice daily"),
                Medicine::new("Lisinopril", "10mg"),
            ],
        }];

        let request = prescription_insights(&prescriptions);

        assert_eq!(request.temperature, Some(0.7));
        assert!(text(&request.messages[1])
            .contains("Clinic: Metformin (500mg twice daily), Lisinopril (10mg)"));
    }

    #[test]
    fn extraction_carries_the_image() {
        let request = extract_prescription("data:image/jpeg;base64,AAAA");

        assert_eq!(request.temperature, Some(0.1));
        assert!(matches!(request.messages[1].content, Content::Parts(ref parts) if parts.len() == 2));
    }
}
