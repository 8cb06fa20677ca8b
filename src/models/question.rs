// src/models/question.rs

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::utils::html::clean_html;

pub const MAX_PROMPT_LEN: usize = 1000;
pub const MAX_OPTION_LEN: usize = 500;
pub const MAX_OPTIONS: usize = 10;
pub const MAX_EXPLANATION_LEN: usize = 2000;

/// A stored multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,

    /// Zero-based order within the quiz; answers are matched by this index.
    pub position: i32,

    pub prompt: String,

    /// Stored as a JSON array in the database.
    pub options: Vec<String>,

    /// Always one of `options`.
    pub correct_option: String,

    pub explanation: Option<String>,
}

/// Question as shown to a student who has not attempted the quiz yet.
/// Has no field that could carry the answer or the explanation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedQuestion {
    pub id: i64,
    pub prompt: String,
    pub options: Vec<String>,
}

impl From<&Question> for RedactedQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            prompt: q.prompt.clone(),
            options: q.options.clone(),
        }
    }
}

/// Validated question ready to be stored. Position comes from its index in the list.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: String,
    pub explanation: Option<String>,
}

/// Question as sent by a teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: String,
    pub explanation: Option<String>,
}

impl QuestionInput {
    /// Checks the question and normalizes it for storage.
    ///
    /// Options and the correct option are trimmed but otherwise kept verbatim,
    /// because grading compares them against submitted answers.
    pub fn validate_into(self, index: usize) -> Result<NewQuestion, String> {
        let n = index + 1;

        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(format!("Question {} must have a question text", n));
        }
        if prompt.len() > MAX_PROMPT_LEN {
            return Err(format!("Question {} text is too long", n));
        }

        let options: Vec<String> = self.options.iter().map(|o| o.trim().to_string()).collect();
        if options.len() < 2 {
            return Err(format!("Question {} must have at least 2 options", n));
        }
        if options.len() > MAX_OPTIONS {
            return Err(format!("Question {} has more than {} options", n, MAX_OPTIONS));
        }
        if options.iter().any(|o| o.is_empty()) {
            return Err(format!("Question {} has an empty option", n));
        }
        if options.iter().any(|o| o.len() > MAX_OPTION_LEN) {
            return Err(format!("Question {} has an option that is too long", n));
        }
        let distinct: HashSet<&str> = options.iter().map(String::as_str).collect();
        if distinct.len() != options.len() {
            return Err(format!("Question {} has duplicate options", n));
        }

        let correct_option = self.correct_option.trim().to_string();
        if !options.contains(&correct_option) {
            return Err(format!("Question {}: the answer must be one of the options", n));
        }

        let explanation = match self.explanation.as_deref().map(str::trim) {
            Some(e) if e.len() > MAX_EXPLANATION_LEN => {
                return Err(format!("Question {} explanation is too long", n));
            }
            Some(e) if !e.is_empty() => Some(clean_html(e)),
            _ => None,
        };

        Ok(NewQuestion {
            prompt: clean_html(prompt),
            options,
            correct_option,
            explanation,
        })
    }
}

/// Validates a whole question list, reporting the first offending question.
pub fn validate_questions(inputs: Vec<QuestionInput>) -> Result<Vec<NewQuestion>, String> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(i, q)| q.validate_into(i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(options: &[&str], correct: &str) -> QuestionInput {
        QuestionInput {
            prompt: "What is 2 + 2?".to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_option: correct.to_string(),
            explanation: Some("Basic addition".to_string()),
        }
    }

    #[test]
    fn accepts_a_well_formed_question() {
        let q = input(&["3", " 4 "], "4").validate_into(0).unwrap();
        assert_eq!(q.options, vec!["3", "4"]);
        assert_eq!(q.correct_option, "4");
        assert_eq!(q.explanation.as_deref(), Some("Basic addition"));
    }

    #[test]
    fn rejects_fewer_than_two_options() {
        let err = input(&["4"], "4").validate_into(0).unwrap_err();
        assert!(err.contains("at least 2 options"));
    }

    #[test]
    fn rejects_duplicate_and_empty_options() {
        assert!(input(&["4", "4"], "4").validate_into(0).is_err());
        assert!(input(&["4", "  "], "4").validate_into(0).is_err());
    }

    #[test]
    fn rejects_answer_outside_options() {
        let err = input(&["3", "4"], "5").validate_into(2).unwrap_err();
        assert!(err.starts_with("Question 3"));
    }

    #[test]
    fn rejects_blank_prompt() {
        let mut q = input(&["A", "B"], "A");
        q.prompt = "   ".to_string();
        assert!(q.validate_into(0).is_err());
    }

    #[test]
    fn strips_script_from_prompt() {
        let mut q = input(&["A", "B"], "A");
        q.prompt = "Pick one<script>alert(1)</script>".to_string();
        let q = q.validate_into(0).unwrap();
        assert_eq!(q.prompt, "Pick one");
    }

    #[test]
    fn validate_questions_stops_at_first_error() {
        let list = vec![input(&["A", "B"], "A"), input(&["A"], "A")];
        let err = validate_questions(list).unwrap_err();
        assert!(err.starts_with("Question 2"));
    }
}
