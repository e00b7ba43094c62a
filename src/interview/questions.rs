use once_cell::sync::Lazy;
use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuestionCategory {
    Technical,
    Behavioral,
    Situational,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuestionDifficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Question {
    pub id: u32,
    pub text: String,
    pub category: QuestionCategory,
    pub difficulty: QuestionDifficulty,
    pub time_limit_seconds: u64,
}

static SAMPLE_QUESTIONS: Lazy<Vec<Question>> = Lazy::new(|| {
    vec![
        Question {
            id: 1,
            text: "Tell me about yourself and your professional background.".to_string(),
            category: QuestionCategory::Behavioral,
            difficulty: QuestionDifficulty::Easy,
            time_limit_seconds: 120,
        },
        Question {
            id: 2,
            text: "Describe a challenging project you worked on and how you overcame obstacles."
                .to_string(),
            category: QuestionCategory::Behavioral,
            difficulty: QuestionDifficulty::Medium,
            time_limit_seconds: 180,
        },
        Question {
            id: 3,
            text: "How do you handle working under pressure and tight deadlines?".to_string(),
            category: QuestionCategory::Situational,
            difficulty: QuestionDifficulty::Medium,
            time_limit_seconds: 150,
        },
        Question {
            id: 4,
            text: "What are your greatest strengths and how do they apply to this role?"
                .to_string(),
            category: QuestionCategory::Behavioral,
            difficulty: QuestionDifficulty::Easy,
            time_limit_seconds: 120,
        },
        Question {
            id: 5,
            text: "Describe a time when you had to work with a difficult team member.".to_string(),
            category: QuestionCategory::Situational,
            difficulty: QuestionDifficulty::Hard,
            time_limit_seconds: 180,
        },
    ]
});

/// The built-in practice sequence covering behavioral and situational scenarios.
pub fn sample_questions() -> Vec<Question> {
    SAMPLE_QUESTIONS.clone()
}
