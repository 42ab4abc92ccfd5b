use std::collections::HashMap;

use log::debug;

use crate::config::*;
use crate::document::QuestionRow;

/// The question bank of a form session, indexed by question id.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<Question>,
    by_id: HashMap<String, usize>,
}

impl QuestionBank {
    /// Resolves the identifiers of the bank rows.
    ///
    /// A row without an explicit `id` gets `<kf>.<n>`, where `n` counts the questions of
    /// the same key function in bank order, starting at 1.
    pub fn from_rows(rows: &[QuestionRow]) -> Result<QuestionBank, ScoringErrors> {
        if rows.is_empty() {
            return Err(ScoringErrors::EmptyQuestionBank);
        }
        let mut per_kf: HashMap<String, usize> = HashMap::new();
        let mut questions: Vec<Question> = Vec::new();
        let mut by_id: HashMap<String, usize> = HashMap::new();
        for row in rows.iter() {
            let epa = row
                .epa
                .trim()
                .parse::<EpaId>()
                .map_err(|_| ScoringErrors::InvalidEpa(row.epa.clone()))?;
            let kf = row.kf.trim().to_string();
            let n = per_kf.entry(kf.clone()).or_insert(0);
            *n += 1;
            let question_id = match &row.id {
                Some(id) if !id.trim().is_empty() => id.trim().to_string(),
                _ => format!("{}.{}", kf, n),
            };
            if by_id.contains_key(&question_id) {
                return Err(ScoringErrors::DuplicateQuestion(question_id));
            }
            debug!("from_rows: question {} epa {} kf {}", question_id, epa, kf);
            by_id.insert(question_id.clone(), questions.len());
            questions.push(Question {
                epa,
                kf,
                question_id,
                question: row.question.clone(),
                options: row.options.clone(),
            });
        }
        Ok(QuestionBank { questions, by_id })
    }

    pub fn lookup(&self, question_id: &str) -> Option<&Question> {
        self.by_id
            .get(question_id.trim())
            .and_then(|idx| self.questions.get(*idx))
    }

    /// All the questions, in bank order.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn questions_for(&self, epa: EpaId) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(move |q| q.epa == epa)
    }

    pub fn epas(&self) -> Vec<EpaId> {
        let mut res: Vec<EpaId> = self.questions.iter().map(|q| q.epa).collect();
        res.sort_unstable();
        res.dedup();
        res
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
