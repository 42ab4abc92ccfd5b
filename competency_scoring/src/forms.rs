//! Checks run before a form request or a submission is sent.

use log::debug;

use crate::config::*;
use crate::document::{FormRequestRow, ResponseDocument, SubmissionDocument};

/// A request, filled by a student, for a rater to evaluate them.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct NewFormRequest {
    pub student_id: Option<String>,
    pub clinical_setting: Option<String>,
    pub details: String,
    pub goals: String,
}

fn is_blank(s: Option<&str>) -> bool {
    s.map(|x| x.trim().is_empty()).unwrap_or(true)
}

impl NewFormRequest {
    /// `existing` are the requests already addressed to the rater.
    pub fn validate(&self, existing: &[FormRequestRow], rater_id: &str) -> Result<(), ScoringErrors> {
        if is_blank(self.student_id.as_deref())
            || is_blank(self.clinical_setting.as_deref())
            || self.details.trim().is_empty()
        {
            return Err(ScoringErrors::MissingRequiredFields);
        }
        let student_id = self.student_id.as_deref().unwrap_or_default().trim();
        let duplicate = existing
            .iter()
            .any(|r| r.completed_by == rater_id && r.student_id == student_id);
        if duplicate {
            debug!(
                "validate: student {} already asked rater {}",
                student_id, rater_id
            );
            return Err(ScoringErrors::DuplicateFormRequest {
                student_id: student_id.to_string(),
            });
        }
        Ok(())
    }
}

impl SubmissionDocument {
    /// Builds the document persisted for a submission.
    pub fn from_aggregated(metadata: Metadata, aggregated: &AggregatedResponses) -> ResponseDocument {
        let mut doc = ResponseDocument::new(metadata);
        for epa in aggregated.epas.iter() {
            doc.response.insert(
                epa.epa.to_string(),
                epa.key_functions.iter().cloned().collect(),
            );
        }
        doc
    }

    pub fn validate(&self) -> Result<(), ScoringErrors> {
        if self.metadata.student_id.trim().is_empty() {
            return Err(ScoringErrors::MissingMetadata("student_id".to_string()));
        }
        if self.metadata.rater_id.trim().is_empty() {
            return Err(ScoringErrors::MissingMetadata("rater_id".to_string()));
        }
        if self.response.values().all(|kfs| kfs.is_empty()) {
            return Err(ScoringErrors::EmptySubmission);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_timestamp;

    fn request() -> NewFormRequest {
        NewFormRequest {
            student_id: Some("s1".to_string()),
            clinical_setting: Some("Inpatient".to_string()),
            details: "Week 3 of medicine".to_string(),
            goals: String::new(),
        }
    }

    fn existing(student: &str, rater: &str) -> FormRequestRow {
        FormRequestRow {
            id: "q1".to_string(),
            created_at: parse_timestamp("2024-01-01").unwrap(),
            student_id: student.to_string(),
            completed_by: rater.to_string(),
            completed_at: None,
            clinical_settings: None,
            notes: None,
            goals: None,
            rater_display_name: None,
            rater_email: None,
        }
    }

    #[test]
    fn required_fields() {
        assert_eq!(request().validate(&[], "r1"), Ok(()));
        let mut r = request();
        r.clinical_setting = None;
        assert_eq!(
            r.validate(&[], "r1"),
            Err(ScoringErrors::MissingRequiredFields)
        );
        let mut r = request();
        r.details = "  ".to_string();
        let e = r.validate(&[], "r1").unwrap_err();
        assert_eq!(e.to_string(), "All fields are required.");
    }

    #[test]
    fn duplicate_requests() {
        let rows = vec![existing("s1", "r2"), existing("s2", "r1")];
        assert_eq!(request().validate(&rows, "r1"), Ok(()));
        let rows = vec![existing("s1", "r1")];
        assert_eq!(
            request().validate(&rows, "r1"),
            Err(ScoringErrors::DuplicateFormRequest {
                student_id: "s1".to_string()
            })
        );
    }

    #[test]
    fn submissions() {
        let mut agg = AggregatedResponses::default();
        let metadata = Metadata {
            student_id: "s1".to_string(),
            rater_id: "r1".to_string(),
        };
        let doc = SubmissionDocument::from_aggregated(metadata.clone(), &agg);
        assert_eq!(doc.validate(), Err(ScoringErrors::EmptySubmission));

        agg.epas.push(EpaAggregate {
            epa: 3,
            key_functions: vec![("3.1".to_string(), KfAggregate::default())],
        });
        let doc = SubmissionDocument::from_aggregated(metadata, &agg);
        assert_eq!(doc.validate(), Ok(()));
        assert!(doc.response["3"].contains_key("3.1"));

        let doc = SubmissionDocument::from_aggregated(Metadata::default(), &agg);
        assert_eq!(
            doc.validate(),
            Err(ScoringErrors::MissingMetadata("student_id".to_string()))
        );
    }

    fn kf(options: &[(&str, bool)], text: &[&str]) -> KfAggregate {
        KfAggregate {
            options: options.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            text: text.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn submissions_serialize_in_dotted_order() {
        let agg = AggregatedResponses {
            epas: vec![
                EpaAggregate {
                    epa: 2,
                    key_functions: vec![
                        ("2.2".to_string(), kf(&[("a", true)], &[])),
                        ("2.10".to_string(), kf(&[], &["x"])),
                    ],
                },
                EpaAggregate {
                    epa: 10,
                    key_functions: vec![("10.1".to_string(), kf(&[("b", false)], &[]))],
                },
            ],
        };
        let metadata = Metadata {
            student_id: "s".to_string(),
            rater_id: "r".to_string(),
        };
        let doc = SubmissionDocument::from_aggregated(metadata, &agg);
        assert_eq!(
            serde_json::to_string(&doc).unwrap(),
            concat!(
                r#"{"metadata":{"student_id":"s","rater_id":"r"},"response":{"#,
                r#""2":{"2.2":{"a":true,"text":[]},"2.10":{"text":["x"]}},"#,
                r#""10":{"10.1":{"b":false,"text":[]}}}}"#
            )
        );

        // Reading it back gives the same document.
        let js = serde_json::to_string(&doc).unwrap();
        let back: ResponseDocument = serde_json::from_str(&js).unwrap();
        assert_eq!(back, doc);
    }
}
