mod bank;
pub mod builder;
mod config;
pub mod document;
pub mod dotted_id;
pub mod forms;
pub mod generation;
pub mod manual;
pub mod rollup;
pub mod stats;

use log::{debug, info, warn};

use std::collections::{BTreeMap, HashMap};

pub use crate::bank::QuestionBank;
pub use crate::config::*;
pub use crate::document::{
    parse_timestamp, DescriptionsRow, FormRequestRow, FormResponseRow, QuestionRow, ReportRow,
    ResponseDocument, ScoreRow, SubmissionDocument,
};
pub use crate::dotted_id::{compare_dotted, DottedId};

// **** Private structures ****

// The merged state of a key function while the answers are being scanned.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
struct KfAccumulator {
    options: BTreeMap<String, bool>,
    // Comments, with the question they come from.
    texts: Vec<(DottedId, String)>,
}

impl KfAccumulator {
    fn merge(&mut self, question_id: &str, response: &QuestionResponse) {
        for (option, value) in response.options.iter() {
            let e = self.options.entry(option.clone()).or_insert(*value);
            *e = *e || *value;
        }
        if !response.text.trim().is_empty() {
            self.texts
                .push((DottedId::from(question_id), response.text.clone()));
        }
    }

    fn finish(mut self) -> KfAggregate {
        self.texts.sort();
        KfAggregate {
            options: self.options,
            text: self.texts.into_iter().map(|(_, t)| t).collect(),
        }
    }
}

/// Groups the answers of a rater by key function.
///
/// For each key function that received at least one answer:
/// * an option is ticked if any of the questions of this key function ticked it
/// * the comments of all its questions are kept, ordered by question id.
///
/// EPAs come out in ascending order and the key functions of an EPA in dotted-id order. The
/// result does not depend on the iteration order of the input.
///
/// Answers to questions that are not in the bank are skipped.
pub fn aggregate_responses(responses: &RaterResponses, bank: &QuestionBank) -> AggregatedResponses {
    info!(
        "Aggregating answers for {:?} EPAs over a bank of {:?} questions",
        responses.len(),
        bank.len()
    );
    let mut accs: HashMap<(EpaId, DottedId), KfAccumulator> = HashMap::new();

    for (epa, questions) in responses.iter() {
        for (question_id, response) in questions.iter() {
            let question = match bank.lookup(question_id) {
                Some(q) => q,
                None => {
                    warn!(
                        "aggregate_responses: EPA {}: skipping unknown question {:?}",
                        epa, question_id
                    );
                    continue;
                }
            };
            if !response.is_answered() {
                debug!(
                    "aggregate_responses: EPA {}: question {} has no answer",
                    epa, question_id
                );
                continue;
            }
            accs.entry((*epa, DottedId::from(question.kf.as_str())))
                .or_default()
                .merge(question_id, response);
        }
    }

    let mut by_epa: BTreeMap<EpaId, BTreeMap<DottedId, KfAggregate>> = BTreeMap::new();
    for ((epa, kf), acc) in accs.into_iter() {
        by_epa.entry(epa).or_default().insert(kf, acc.finish());
    }

    let epas: Vec<EpaAggregate> = by_epa
        .into_iter()
        .map(|(epa, kfs)| EpaAggregate {
            epa,
            key_functions: kfs
                .into_iter()
                .map(|(kf, agg)| (kf.into_string(), agg))
                .collect(),
        })
        .collect();
    debug!("aggregate_responses: {:?}", epas);
    AggregatedResponses { epas }
}
