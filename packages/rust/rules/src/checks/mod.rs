//! Built-in section checks.

mod eav;
mod language;
mod structure;
mod style;
mod ymyl;

pub use eav::{EavDensity, MIN_FACT_WORDS, count_matches, triple_matches};
pub use language::{Modality, ProhibitedLanguage};
pub use structure::{
    AttributeOrdering, CENTERPIECE_WINDOW, Centerpiece, FormatCheck, HeadingAnswer,
    centerpiece_violations, defines_entity, format_violations, must_not_follow,
};
pub use style::{
    MAX_PARAGRAPH_WORDS, MAX_SENTENCE_WORDS, ParagraphLength, PronounOpening, RequiredPhrases,
    SentenceLength,
};
pub use ymyl::{YmylSafeAnswer, ymyl_topic};

use crate::validator::Check;

/// The section registry in evaluation order.
pub(crate) fn default_checks() -> Vec<Box<dyn Check>> {
    vec![
        Box::new(ProhibitedLanguage),
        Box::new(EavDensity),
        Box::new(Modality),
        Box::new(HeadingAnswer),
        Box::new(Centerpiece),
        Box::new(YmylSafeAnswer),
        Box::new(FormatCheck),
        Box::new(AttributeOrdering),
        Box::new(RequiredPhrases),
        Box::new(SentenceLength),
        Box::new(ParagraphLength),
        Box::new(PronounOpening),
    ]
}
