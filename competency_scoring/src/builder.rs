pub use crate::bank::QuestionBank;
pub use crate::config::*;

/// Collects the answers of a rater while they go through a form.
///
/// Every change is checked against the question bank, so that the responses handed over
/// to the aggregation only reference known questions and options.
///
/// ```
/// use competency_scoring::builder::ResponseBuilder;
/// use competency_scoring::{aggregate_responses, QuestionBank, QuestionRow, ScoringErrors};
///
/// let rows: Vec<QuestionRow> = vec![QuestionRow {
///     epa: "2".to_string(),
///     kf: "2.1".to_string(),
///     question: "Did the student gather a history?".to_string(),
///     options: [("a".to_string(), "Yes".to_string())].into_iter().collect(),
///     id: None,
/// }];
/// let bank = QuestionBank::from_rows(&rows)?;
///
/// let mut builder = ResponseBuilder::new(&bank);
/// builder.set_option("2.1.1", "a", true)?;
/// builder.set_text("2.1.1", "Thorough")?;
///
/// let aggregated = aggregate_responses(builder.responses(), &bank);
/// assert_eq!(aggregated.get(2, "2.1").map(|kf| kf.text.len()), Some(1));
/// # Ok::<(), ScoringErrors>(())
/// ```
pub struct ResponseBuilder<'a> {
    pub(crate) _bank: &'a QuestionBank,
    pub(crate) _responses: RaterResponses,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(bank: &'a QuestionBank) -> ResponseBuilder<'a> {
        ResponseBuilder {
            _bank: bank,
            _responses: RaterResponses::new(),
        }
    }

    fn entry(&mut self, question_id: &str) -> Result<&mut QuestionResponse, ScoringErrors> {
        let q = self
            ._bank
            .lookup(question_id)
            .ok_or_else(|| ScoringErrors::UnknownQuestion(question_id.to_string()))?;
        Ok(self
            ._responses
            .entry(q.epa)
            .or_default()
            .entry(q.question_id.clone())
            .or_default())
    }

    /// Ticks or unticks an option of a question.
    pub fn set_option(
        &mut self,
        question_id: &str,
        option: &str,
        value: bool,
    ) -> Result<(), ScoringErrors> {
        let known = self
            ._bank
            .lookup(question_id)
            .map(|q| q.options.contains_key(option));
        match known {
            None => Err(ScoringErrors::UnknownQuestion(question_id.to_string())),
            Some(false) => Err(ScoringErrors::UnknownOption {
                question_id: question_id.to_string(),
                option: option.to_string(),
            }),
            Some(true) => {
                self.entry(question_id)?
                    .options
                    .insert(option.to_string(), value);
                Ok(())
            }
        }
    }

    /// Records the comment of a question. A blank comment leaves the previous one in place.
    pub fn set_text(&mut self, question_id: &str, text: &str) -> Result<(), ScoringErrors> {
        let e = self.entry(question_id)?;
        if !text.trim().is_empty() {
            e.text = text.to_string();
        }
        Ok(())
    }

    /// Forgets everything answered for a question.
    pub fn clear_question(&mut self, question_id: &str) -> Result<(), ScoringErrors> {
        let q = self
            ._bank
            .lookup(question_id)
            .ok_or_else(|| ScoringErrors::UnknownQuestion(question_id.to_string()))?;
        if let Some(qs) = self._responses.get_mut(&q.epa) {
            qs.remove(&q.question_id);
            if qs.is_empty() {
                self._responses.remove(&q.epa);
            }
        }
        Ok(())
    }

    /// Adds a complete answer, for instance one restored from a saved form.
    ///
    /// The EPA under which the answer was filed must be the EPA of the question.
    pub fn add_response(
        &mut self,
        epa: EpaId,
        question_id: &str,
        response: &QuestionResponse,
    ) -> Result<(), ScoringErrors> {
        let q_epa = self
            ._bank
            .lookup(question_id)
            .map(|q| q.epa)
            .ok_or_else(|| ScoringErrors::UnknownQuestion(question_id.to_string()))?;
        if q_epa != epa {
            return Err(ScoringErrors::MismatchedEpa {
                question_id: question_id.to_string(),
                epa,
            });
        }
        for (option, value) in response.options.iter() {
            self.set_option(question_id, option, *value)?;
        }
        self.set_text(question_id, &response.text)
    }

    pub fn responses(&self) -> &RaterResponses {
        &self._responses
    }

    pub fn build(self) -> RaterResponses {
        self._responses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::QuestionRow;
    use std::collections::BTreeMap;

    fn bank() -> QuestionBank {
        let options: BTreeMap<String, String> = [("a", "A"), ("b", "B")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let rows: Vec<QuestionRow> = ["1.1", "1.1", "2.1"]
            .iter()
            .map(|kf| QuestionRow {
                epa: kf[..1].to_string(),
                kf: kf.to_string(),
                question: "q".to_string(),
                options: options.clone(),
                id: None,
            })
            .collect();
        QuestionBank::from_rows(&rows).unwrap()
    }

    #[test]
    fn collects_options_and_text() {
        let bank = bank();
        let mut b = ResponseBuilder::new(&bank);
        b.set_option("1.1.2", "a", true).unwrap();
        b.set_option("1.1.2", "b", false).unwrap();
        b.set_text("1.1.2", "fine").unwrap();
        b.set_text("1.1.2", "   ").unwrap();
        let r = b.build();
        let q = &r[&1]["1.1.2"];
        assert_eq!(q.options.get("a"), Some(&true));
        assert_eq!(q.options.get("b"), Some(&false));
        assert_eq!(q.text, "fine");
    }

    #[test]
    fn rejects_unknown_questions_and_options() {
        let bank = bank();
        let mut b = ResponseBuilder::new(&bank);
        assert_eq!(
            b.set_option("9.9.9", "a", true),
            Err(ScoringErrors::UnknownQuestion("9.9.9".to_string()))
        );
        assert_eq!(
            b.set_option("1.1.1", "z", true),
            Err(ScoringErrors::UnknownOption {
                question_id: "1.1.1".to_string(),
                option: "z".to_string()
            })
        );
        let resp = QuestionResponse {
            text: "x".to_string(),
            options: BTreeMap::new(),
        };
        assert_eq!(
            b.add_response(2, "1.1.1", &resp),
            Err(ScoringErrors::MismatchedEpa {
                question_id: "1.1.1".to_string(),
                epa: 2
            })
        );
        assert!(b.responses().is_empty());
    }

    #[test]
    fn clearing_removes_the_question() {
        let bank = bank();
        let mut b = ResponseBuilder::new(&bank);
        b.set_option("2.1.1", "a", true).unwrap();
        b.clear_question("2.1.1").unwrap();
        assert!(b.responses().is_empty());
    }
}
