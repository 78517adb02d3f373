// src/survey.rs

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    month::Month,
};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    Text,
    Rating,
    Choice { options: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SurveyQuestion {
    pub id: String,
    pub prompt: String,
    pub kind: QuestionKind,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Survey {
    pub id: Uuid,
    pub month: Month,
    pub title: String,
    pub questions: Vec<SurveyQuestion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SurveyResponse {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub certificate_id: Uuid,
    pub member_id: Uuid,
    pub month: Month,
    pub answers: HashMap<String, String>,
    pub submitted_at: DateTime<Utc>,
}

pub fn validate_questions(title: &str, questions: &[SurveyQuestion]) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::invalid("survey title is required"));
    }
    if questions.is_empty() {
        return Err(Error::invalid("a survey needs at least one question"));
    }

    let mut seen = HashSet::new();
    for q in questions {
        if q.id.trim().is_empty() || q.prompt.trim().is_empty() {
            return Err(Error::invalid("questions need an id and a prompt"));
        }
        if !seen.insert(q.id.as_str()) {
            return Err(Error::invalid(format!("duplicate question id '{}'", q.id)));
        }
        if let QuestionKind::Choice { options } = &q.kind {
            if options.iter().all(|o| o.trim().is_empty()) {
                return Err(Error::invalid(format!("question '{}' has no options", q.id)));
            }
        }
    }

    Ok(())
}

impl Survey {
    /// Every question answered, and every answer fits its question.
    pub fn check_answers(&self, answers: &HashMap<String, String>) -> Result<()> {
        for q in &self.questions {
            let answer = answers
                .get(&q.id)
                .map(|a| a.trim())
                .filter(|a| !a.is_empty())
                .ok_or_else(|| Error::invalid(format!("question '{}' is unanswered", q.id)))?;

            match &q.kind {
                QuestionKind::Text => {}
                QuestionKind::Rating => match answer.parse::<u8>() {
                    Ok(1..=5) => {}
                    _ => {
                        return Err(Error::invalid(format!(
                            "question '{}' needs a rating from 1 to 5",
                            q.id
                        )))
                    }
                },
                QuestionKind::Choice { options } => {
                    if !options.iter().any(|o| o == answer) {
                        return Err(Error::invalid(format!(
                            "'{}' is not an option for question '{}'",
                            answer, q.id
                        )));
                    }
                }
            }
        }

        if let Some(extra) = answers.keys().find(|k| !self.questions.iter().any(|q| &q.id == *k)) {
            return Err(Error::invalid(format!("unknown question '{}'", extra)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn survey() -> Survey {
        Survey {
            id: Uuid::new_v4(),
            month: "2026-04".parse().unwrap(),
            title: "April check-in".to_string(),
            questions: vec![
                SurveyQuestion {
                    id: "visit".into(),
                    prompt: "How was your visit?".into(),
                    kind: QuestionKind::Rating,
                },
                SurveyQuestion {
                    id: "dept".into(),
                    prompt: "Favourite department".into(),
                    kind: QuestionKind::Choice {
                        options: vec!["produce".into(), "bakery".into()],
                    },
                },
                SurveyQuestion {
                    id: "notes".into(),
                    prompt: "Anything else?".into(),
                    kind: QuestionKind::Text,
                },
            ],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn answers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_valid_answers() {
        let s = survey();
        s.check_answers(&answers(&[("visit", "4"), ("dept", "bakery"), ("notes", "great")]))
            .unwrap();
    }

    #[test]
    fn test_invalid_answers() {
        let s = survey();
        assert!(s.check_answers(&answers(&[("visit", "4"), ("dept", "bakery")])).is_err());
        assert!(s
            .check_answers(&answers(&[("visit", "6"), ("dept", "bakery"), ("notes", "x")]))
            .is_err());
        assert!(s
            .check_answers(&answers(&[("visit", "3"), ("dept", "deli"), ("notes", "x")]))
            .is_err());
        assert!(s
            .check_answers(&answers(&[
                ("visit", "3"),
                ("dept", "produce"),
                ("notes", "x"),
                ("bogus", "y")
            ]))
            .is_err());
    }

    #[test]
    fn test_validate_questions() {
        let s = survey();
        validate_questions(&s.title, &s.questions).unwrap();
        assert!(validate_questions("t", &[]).is_err());

        let mut dup = s.questions.clone();
        dup.push(dup[0].clone());
        assert!(validate_questions("t", &dup).is_err());

        let empty_choice = vec![SurveyQuestion {
            id: "q".into(),
            prompt: "p".into(),
            kind: QuestionKind::Choice { options: vec![] },
        }];
        assert!(validate_questions("t", &empty_choice).is_err());
    }
}
