//! OpenAI embeddings wire types

use serde::{Deserialize, Serialize};

pub const LIST_OBJECT: &str = "list";
pub const EMBEDDING_OBJECT: &str = "embedding";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub input: EmbeddingInput,
    #[serde(default)]
    pub encoding_format: EncodingFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Accepted `input` shapes; token arrays parse so they can be refused explicitly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Text(String),
    Texts(Vec<String>),
    Tokens(Vec<u32>),
    TokenBatches(Vec<Vec<u32>>),
}

impl EmbeddingInput {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(_) => 1,
            Self::Texts(texts) => texts.len(),
            Self::Tokens(tokens) => usize::from(!tokens.is_empty()),
            Self::TokenBatches(batches) => batches.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    #[default]
    Float,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsResponse {
    pub object: String,
    pub data: Vec<Embedding>,
    pub model: String,
    pub usage: EmbeddingUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub object: String,
    pub embedding: EmbeddingVector,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingVector {
    Float(Vec<f32>),
    Base64(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_shapes_parse_in_priority_order() {
        let single: EmbeddingInput = serde_json::from_value(json!("hello")).unwrap();
        assert_eq!(single, EmbeddingInput::Text("hello".to_string()));

        let batch: EmbeddingInput = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(batch.len(), 2);

        let tokens: EmbeddingInput = serde_json::from_value(json!([1, 2, 3])).unwrap();
        assert!(matches!(tokens, EmbeddingInput::Tokens(_)));

        let empty: EmbeddingInput = serde_json::from_value(json!([])).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn encoding_format_defaults_to_float() {
        let request: EmbeddingsRequest =
            serde_json::from_value(json!({"input": "hi"})).unwrap();
        assert_eq!(request.encoding_format, EncodingFormat::Float);
        assert_eq!(request.model, None);
    }
}
