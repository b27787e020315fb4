use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedSummary {
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub sections: Vec<SummarySection>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub word_count: u64,
    #[serde(
        default,
        deserialize_with = "lenient_optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySection {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub importance: Importance,
    #[serde(
        default,
        deserialize_with = "lenient_optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    #[default]
    Medium,
    Low,
    #[serde(other)]
    Unknown,
}

impl Importance {
    pub fn label(self) -> &'static str {
        match self {
            Importance::High => "High",
            Importance::Medium => "Medium",
            Importance::Low => "Low",
            Importance::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    #[serde(other)]
    Unknown,
}

impl Difficulty {
    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
            Difficulty::Unknown => "Unknown",
        }
    }
}

// Models answer counts as numbers, floats, "1,234" or "approx. 5000".
fn count_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(text) => {
            let digits: String = text
                .chars()
                .skip_while(|ch| !ch.is_ascii_digit())
                .take_while(|ch| ch.is_ascii_digit() || *ch == ',')
                .filter(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(count_from_value(&value).unwrap_or(0))
}

fn lenient_optional_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(count_from_value(&value).and_then(|count| u32::try_from(count).ok()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DetailedSummary, Difficulty, Importance};

    #[test]
    fn deserializes_camel_case_fields() {
        let summary: DetailedSummary = serde_json::from_value(json!({
            "overview": "A short report.",
            "keyPoints": ["one", "two"],
            "sections": [
                {"title": "Intro", "content": "Opening", "importance": "high", "page": 1}
            ],
            "wordCount": 1200,
            "pageCount": 4,
            "topics": ["finance"],
            "difficulty": "advanced"
        }))
        .expect("valid summary");

        assert_eq!(summary.key_points.len(), 2);
        assert_eq!(summary.sections[0].importance, Importance::High);
        assert_eq!(summary.sections[0].page, Some(1));
        assert_eq!(summary.word_count, 1200);
        assert_eq!(summary.page_count, Some(4));
        assert_eq!(summary.difficulty, Difficulty::Advanced);
    }

    #[test]
    fn tolerates_loose_model_output() {
        let summary: DetailedSummary = serde_json::from_value(json!({
            "overview": "Loose",
            "sections": [
                {"title": "Body", "content": "text", "importance": "high|medium|low", "page": null}
            ],
            "wordCount": "approx. 3,400 characters",
            "pageCount": null,
            "difficulty": "expert"
        }))
        .expect("lenient summary");

        assert!(summary.key_points.is_empty());
        assert!(summary.topics.is_empty());
        assert_eq!(summary.sections[0].importance, Importance::Unknown);
        assert_eq!(summary.sections[0].page, None);
        assert_eq!(summary.word_count, 3400);
        assert_eq!(summary.page_count, None);
        assert_eq!(summary.difficulty, Difficulty::Unknown);
    }

    #[test]
    fn serializes_back_to_camel_case() {
        let summary: DetailedSummary = serde_json::from_value(json!({
            "overview": "x",
            "wordCount": 10.4
        }))
        .expect("summary");
        let value = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(value["wordCount"], 10);
        assert!(value.get("pageCount").is_none());
        assert_eq!(value["keyPoints"], json!([]));
        assert_eq!(value["difficulty"], "intermediate");
    }
}
