use mongodb::bson::{Bson, doc};
use serde::Deserialize;

use crate::dao::models::{QuestionEntity, QuizEntity};

/// Quiz document as stored in the `quizzes` collection.
///
/// Authoring tools store `_id` either as an ObjectId or as a plain string,
/// so the identifier is kept as raw BSON and normalized on conversion.
#[derive(Debug, Deserialize)]
pub struct MongoQuizDocument {
    #[serde(rename = "_id")]
    pub id: Bson,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub questions: Vec<QuestionEntity>,
}

impl From<MongoQuizDocument> for QuizEntity {
    fn from(value: MongoQuizDocument) -> Self {
        let id = match value.id {
            Bson::ObjectId(oid) => oid.to_hex(),
            Bson::String(s) => s,
            other => other.to_string(),
        };
        Self {
            id,
            title: value.title,
            questions: value.questions,
        }
    }
}

/// Build the `_id` filter for a quiz identifier, preferring ObjectId form.
pub fn quiz_id_filter(quiz_id: &str) -> mongodb::bson::Document {
    match mongodb::bson::oid::ObjectId::parse_str(quiz_id) {
        Ok(oid) => doc! { "_id": oid },
        Err(_) => doc! { "_id": quiz_id },
    }
}
