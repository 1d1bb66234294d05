//! Wire shapes of the chat, chart and screener resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::Indicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    /// Set on the placeholder shown while the assistant is still working.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_analyzing: Option<bool>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            role: Role::User,
            timestamp,
            is_analyzing: None,
        }
    }

    pub fn system(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            role: Role::System,
            timestamp,
            is_analyzing: None,
        }
    }

    pub fn analyzing_placeholder(timestamp: DateTime<Utc>) -> Self {
        Self {
            is_analyzing: Some(true),
            ..Self::system(String::new(), timestamp)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// A chart record. By convention a chat and its chart share one id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub chart_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub symbol: String,
    pub timeframe: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date_from: String,
    #[serde(default)]
    pub date_to: String,
    #[serde(default)]
    pub indicators: Vec<Indicator>,
    #[serde(default)]
    pub chart_pattern: Vec<Value>,
    #[serde(default)]
    pub data: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screener {
    /// Assigned by the store on create; empty on a draft.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub query: String,
    #[serde(default)]
    pub records: Vec<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn message_field_names_match_the_wire() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let placeholder = serde_json::to_value(ChatMessage::analyzing_placeholder(ts)).unwrap();
        assert_eq!(
            placeholder,
            json!({"content": "", "role": "system", "timestamp": "2024-05-01T12:00:00Z", "isAnalyzing": true})
        );

        let user = serde_json::to_value(ChatMessage::user("hi", ts)).unwrap();
        assert!(user.get("isAnalyzing").is_none());
    }

    #[test]
    fn screener_uses_camel_case_timestamps() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let s = Screener {
            id: String::new(),
            query: "cheap tech".into(),
            records: vec![json!({"symbol": "MSFT"})],
            created_at: ts,
            updated_at: ts,
        };
        let v = serde_json::to_value(&s).unwrap();
        assert!(v.get("id").is_none());
        assert_eq!(v["createdAt"], "2024-05-01T00:00:00Z");
    }

    #[test]
    fn chart_reads_sparse_records() {
        let chart: Chart = serde_json::from_value(json!({
            "id": "c1", "type": "candles", "timeframe": "weekly"
        }))
        .unwrap();
        assert_eq!(chart.chart_type, "candles");
        assert!(chart.indicators.is_empty());
    }
}
