//! The question generation capability and the shape its output must have.
//!
//! A [`QuestionGenerator`] turns a [`GenerationRequest`] into exactly
//! [`QUESTIONS_PER_QUIZ`] questions: three single-choice, one multi-select
//! with at least two correct options, and one true/false.
//! [`validate_question_set`] enforces that shape; nothing is coerced.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{QuestError, Result};
use crate::model::{Answer, Difficulty, QuestionType};

pub const QUESTIONS_PER_QUIZ: usize = 5;
pub const SINGLE_CHOICE_COUNT: usize = 3;
pub const MULTI_SELECT_COUNT: usize = 1;
pub const TRUE_FALSE_COUNT: usize = 1;
/// Focus domains passed to one generation call.
pub const MAX_FOCUS_DOMAINS: usize = 3;

const TRUE_FALSE_VALUES: [&str; 2] = ["True", "False"];

/// A retrieved passage handed to the generator, tagged with its page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPassage {
    pub page_number: u32,
    pub text: String,
}

/// Everything the generator needs for one quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub certification: String,
    pub difficulty: Difficulty,
    pub focus_domains: Vec<String>,
    pub context: Vec<ContextPassage>,
}

/// One question as produced by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub question_text: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub correct_answer: Answer,
    #[serde(default)]
    pub explanation: Option<String>,
    pub difficulty: Difficulty,
    pub domain: String,
}

/// Structured generator output: `{ "questions": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestionSet {
    pub questions: Vec<GeneratedQuestion>,
}

/// Opaque question generation capability (an LLM, a fixture, ...).
///
/// Implementations make one call and do not retry. Returning a set that
/// fails [`validate_question_set`] is allowed; the quiz generator rejects it.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedQuestionSet>;

    /// Model identifier recorded on generated quizzes.
    fn model(&self) -> &str;
}

/// Parse generator output text.
///
/// Tolerates a Markdown code fence around the JSON object.
///
/// # Errors
///
/// Returns [`QuestError::GenerationSchema`] if the text is not a question set.
pub fn parse_question_set(raw: &str) -> Result<GeneratedQuestionSet> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
        .map_err(|e| QuestError::GenerationSchema(format!("output is not a question set: {e}")))
}

/// Check that a generated set has the required size, type mix and answer shapes.
///
/// # Errors
///
/// Returns [`QuestError::GenerationSchema`] naming the first violation.
pub fn validate_question_set(set: &GeneratedQuestionSet) -> Result<()> {
    if set.questions.len() != QUESTIONS_PER_QUIZ {
        return Err(schema(format!(
            "expected {QUESTIONS_PER_QUIZ} questions, got {}",
            set.questions.len()
        )));
    }

    let count = |kind: QuestionType| set.questions.iter().filter(|q| q.question_type == kind).count();
    let mix = (
        count(QuestionType::SingleChoice),
        count(QuestionType::MultiSelect),
        count(QuestionType::TrueFalse),
    );
    if mix != (SINGLE_CHOICE_COUNT, MULTI_SELECT_COUNT, TRUE_FALSE_COUNT) {
        return Err(schema(format!(
            "expected {SINGLE_CHOICE_COUNT} single-choice, {MULTI_SELECT_COUNT} multi-select and \
             {TRUE_FALSE_COUNT} true/false questions, got {}/{}/{}",
            mix.0, mix.1, mix.2
        )));
    }

    for (position, question) in set.questions.iter().enumerate() {
        validate_question(question).map_err(|reason| schema(format!("question {}: {reason}", position + 1)))?;
    }
    Ok(())
}

fn validate_question(question: &GeneratedQuestion) -> std::result::Result<(), String> {
    if question.question_text.trim().is_empty() {
        return Err("empty question text".into());
    }
    if question.domain.trim().is_empty() {
        return Err("empty domain".into());
    }

    let options: BTreeSet<&str> = question.options.iter().map(String::as_str).collect();
    if options.len() != question.options.len() {
        return Err("duplicate options".into());
    }

    match (question.question_type, &question.correct_answer) {
        (QuestionType::SingleChoice, Answer::Single(answer)) => {
            if options.len() < 2 {
                return Err("single-choice needs at least two options".into());
            }
            if !options.contains(answer.as_str()) {
                return Err(format!("correct answer '{answer}' is not an option"));
            }
        }
        (QuestionType::TrueFalse, Answer::Single(answer)) => {
            if question.options.iter().map(String::as_str).ne(TRUE_FALSE_VALUES) {
                return Err(format!("true/false options must be [\"True\", \"False\"], got {:?}", question.options));
            }
            if !TRUE_FALSE_VALUES.contains(&answer.as_str()) {
                return Err(format!("true/false answer must be True or False, got '{answer}'"));
            }
        }
        (QuestionType::MultiSelect, Answer::Multiple(answers)) => {
            let correct: BTreeSet<&str> = answers.iter().map(String::as_str).collect();
            if correct.len() != answers.len() {
                return Err("duplicate correct answers".into());
            }
            if correct.len() < 2 {
                return Err(format!("multi-select needs at least two correct answers, got {}", correct.len()));
            }
            if correct.len() >= options.len() {
                return Err("multi-select must leave at least one incorrect option".into());
            }
            if let Some(stray) = correct.iter().find(|a| !options.contains(*a)) {
                return Err(format!("correct answer '{stray}' is not an option"));
            }
        }
        (kind, answer) => {
            return Err(format!("answer {answer:?} does not fit a {kind:?} question"));
        }
    }
    Ok(())
}

fn schema(message: String) -> QuestError {
    QuestError::GenerationSchema(message)
}

/// Render the instruction prompt for a request.
pub fn render_prompt(request: &GenerationRequest) -> String {
    let domains = if request.focus_domains.is_empty() {
        "General topics of the certification".to_string()
    } else {
        request.focus_domains.join(", ")
    };

    let mut prompt = format!(
        "You are an expert certification instructor. Generate exactly {QUESTIONS_PER_QUIZ} quiz questions \
         for {certification} at {difficulty} difficulty level.\n\n\
         FOCUS PRIMARILY ON THESE DOMAINS: {domains}\n\n\
         Generate a mix of:\n\
         - {SINGLE_CHOICE_COUNT} multiple choice questions (single answer only)\n\
         - {MULTI_SELECT_COUNT} multi-select question (at least two correct answers)\n\
         - {TRUE_FALSE_COUNT} true/false question\n\n",
        certification = request.certification,
        difficulty = request.difficulty,
    );

    if !request.context.is_empty() {
        prompt.push_str("Base the questions on this study material:\n\n");
        for passage in &request.context {
            prompt.push_str(&format!("[Page {}]\n{}\n\n", passage.page_number, passage.text));
        }
    }

    prompt.push_str(
        "Respond with a JSON object {\"questions\": [...]} where each question has:\n\
         - question_text: string\n\
         - question_type: \"multiple_choice\", \"multi_select\" or \"true_false\"\n\
         - options: list of strings (\"True\" and \"False\" for true/false)\n\
         - correct_answer: one option, or a list of options for multi_select\n\
         - explanation: an educational explanation of the answer\n\
         - difficulty: \"easy\", \"medium\" or \"hard\"\n\
         - domain: the service or topic the question covers\n\n\
         Options must be plausible, correct answers unambiguous, and every question at the requested difficulty.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(kind: QuestionType, answer: Answer) -> GeneratedQuestion {
        let options = match kind {
            QuestionType::TrueFalse => vec!["True".into(), "False".into()],
            _ => vec!["A".into(), "B".into(), "C".into(), "D".into()],
        };
        GeneratedQuestion {
            question_text: "Which?".into(),
            question_type: kind,
            options,
            correct_answer: answer,
            explanation: None,
            difficulty: Difficulty::Medium,
            domain: "IAM".into(),
        }
    }

    fn valid_set() -> GeneratedQuestionSet {
        GeneratedQuestionSet {
            questions: vec![
                question(QuestionType::SingleChoice, Answer::from("A")),
                question(QuestionType::SingleChoice, Answer::from("B")),
                question(QuestionType::SingleChoice, Answer::from("C")),
                question(QuestionType::MultiSelect, Answer::from(["A", "C"])),
                question(QuestionType::TrueFalse, Answer::from("True")),
            ],
        }
    }

    #[test]
    fn accepts_the_required_shape() {
        validate_question_set(&valid_set()).unwrap();
    }

    #[test]
    fn rejects_wrong_count() {
        let mut set = valid_set();
        set.questions.pop();
        assert!(matches!(validate_question_set(&set), Err(QuestError::GenerationSchema(_))));
    }

    #[test]
    fn rejects_wrong_type_mix() {
        let mut set = valid_set();
        set.questions[4] = question(QuestionType::SingleChoice, Answer::from("A"));
        assert!(matches!(validate_question_set(&set), Err(QuestError::GenerationSchema(_))));
    }

    #[test]
    fn rejects_multi_select_with_one_correct_answer() {
        let mut set = valid_set();
        set.questions[3] = question(QuestionType::MultiSelect, Answer::from(["A"]));
        assert!(matches!(validate_question_set(&set), Err(QuestError::GenerationSchema(_))));
        set.questions[3] = question(QuestionType::MultiSelect, Answer::from("A"));
        assert!(matches!(validate_question_set(&set), Err(QuestError::GenerationSchema(_))));
    }

    #[test]
    fn rejects_answers_outside_options() {
        let mut set = valid_set();
        set.questions[0] = question(QuestionType::SingleChoice, Answer::from("Z"));
        assert!(validate_question_set(&set).is_err());
        let mut set = valid_set();
        set.questions[4] = question(QuestionType::TrueFalse, Answer::from("Maybe"));
        assert!(validate_question_set(&set).is_err());
    }

    #[test]
    fn rejects_true_false_with_other_options() {
        for options in [vec!["True", "False", "Unsure"], vec!["False", "True"], vec!["Yes", "No"]] {
            let mut set = valid_set();
            set.questions[4].options = options.iter().map(|o| o.to_string()).collect();
            let err = validate_question_set(&set).unwrap_err();
            assert!(matches!(err, QuestError::GenerationSchema(ref m) if m.contains("options")), "{options:?}");
        }
    }

    #[test]
    fn parses_fenced_json() {
        let json = serde_json::to_string(&valid_set()).unwrap();
        let parsed = parse_question_set(&format!("```json\n{json}\n```")).unwrap();
        assert_eq!(parsed, valid_set());
        assert!(matches!(parse_question_set("not json"), Err(QuestError::GenerationSchema(_))));
    }

    #[test]
    fn prompt_lists_domains_and_tagged_context() {
        let request = GenerationRequest {
            certification: "AWS Cloud Practitioner".into(),
            difficulty: Difficulty::Hard,
            focus_domains: vec!["IAM".into(), "S3".into()],
            context: vec![ContextPassage { page_number: 7, text: "Buckets hold objects.".into() }],
        };
        let prompt = render_prompt(&request);
        assert!(prompt.contains("AWS Cloud Practitioner at hard difficulty"));
        assert!(prompt.contains("IAM, S3"));
        assert!(prompt.contains("[Page 7]\nBuckets hold objects."));
    }
}
