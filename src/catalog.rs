//! Question catalog: the read-only lookup condition rules are checked against.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::parse::ConditionSource;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to read question file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode questions: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    ShortText,
    LongText,
    Date,
    /// Any type condition rules cannot read (file upload, rating, ...).
    #[serde(other)]
    Other,
}

impl QuestionType {
    pub fn from_name(name: &str) -> QuestionType {
        match name {
            "single_choice" => QuestionType::SingleChoice,
            "multiple_choice" => QuestionType::MultipleChoice,
            "short_text" => QuestionType::ShortText,
            "long_text" => QuestionType::LongText,
            "date" => QuestionType::Date,
            _ => QuestionType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::ShortText => "short_text",
            QuestionType::LongText => "long_text",
            QuestionType::Date => "date",
            QuestionType::Other => "other",
        }
    }
}

impl ConditionSource {
    /// Whether answers of `question_type` can feed a rule of this source.
    pub fn accepts(&self, question_type: QuestionType) -> bool {
        match self {
            ConditionSource::Choice => matches!(
                question_type,
                QuestionType::SingleChoice | QuestionType::MultipleChoice
            ),
            ConditionSource::NonChoice => matches!(
                question_type,
                QuestionType::ShortText | QuestionType::LongText | QuestionType::Date
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub form_id: Uuid,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
}

/// Lookup of question descriptors by id. Implementations must tolerate
/// concurrent calls.
#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    /// `Ok(None)` when no such question exists.
    async fn get_by_id(&self, question_id: Uuid) -> Result<Option<Question>, CatalogError>;
}

// =============================================================================
// IN-MEMORY CATALOG
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    questions: HashMap<Uuid, Question>,
}

impl InMemoryCatalog {
    pub fn new(questions: impl IntoIterator<Item = Question>) -> Self {
        Self {
            questions: questions.into_iter().map(|q| (q.id, q)).collect(),
        }
    }

    /// Load a JSON array of `{ id, formId, type }` objects.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let bytes = std::fs::read(path)?;
        let questions: Vec<Question> = serde_json::from_slice(&bytes)?;
        Ok(Self::new(questions))
    }
}

#[async_trait]
impl QuestionCatalog for InMemoryCatalog {
    async fn get_by_id(&self, question_id: Uuid) -> Result<Option<Question>, CatalogError> {
        Ok(self.questions.get(&question_id).cloned())
    }
}

// =============================================================================
// POSTGRES CATALOG
// =============================================================================

/// Reads the externally owned `questions(id, form_id, type)` table.
pub struct PgQuestionCatalog {
    pool: PgPool,
}

impl PgQuestionCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionCatalog for PgQuestionCatalog {
    async fn get_by_id(&self, question_id: Uuid) -> Result<Option<Question>, CatalogError> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String)>(
            r#"
            SELECT id, form_id, type
            FROM questions
            WHERE id = $1
            "#,
        )
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, form_id, question_type)| Question {
            id,
            form_id,
            question_type: QuestionType::from_name(&question_type),
        }))
    }
}
