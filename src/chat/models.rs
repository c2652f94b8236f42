use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::availability::models::AvailabilityQuery;

/// Fulfilment request sent by the intent classifier
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    pub query_result: QueryResult,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub intent: IntentRef,
    #[serde(default)]
    pub parameters: ChatParams,
    pub fulfillment_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntentRef {
    pub display_name: String,
}

/// Structured parameters extracted by the classifier
///
/// Values arrive loosely typed: ids and guest counts may be numbers or
/// strings, dates may be full timestamps and unset slots are empty strings.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ChatParams {
    #[schema(value_type = Option<Object>)]
    pub property_id: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub check_in: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub check_out: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub guests: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub full_availability: Option<Value>,
}

fn text(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

impl ChatParams {
    pub fn guests(&self) -> Option<i32> {
        match &self.guests {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64))
                .and_then(|g| i32::try_from(g).ok()),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok().map(|f| f.round() as i32),
            _ => None,
        }
    }

    pub fn full_availability(&self) -> bool {
        match &self.full_availability {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// The parameters as an ordinary availability query
    pub fn to_query(&self) -> AvailabilityQuery {
        AvailabilityQuery {
            property_id: text(&self.property_id).unwrap_or_default(),
            check_in: text(&self.check_in),
            check_out: text(&self.check_out),
            guests: self.guests(),
            full_availability: self.full_availability(),
        }
    }
}

/// Intents this service fulfils
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatIntent {
    CheckAvailability,
}

impl ChatIntent {
    pub fn from_display_name(name: &str) -> Option<Self> {
        match name {
            "CheckAvailability" => Some(ChatIntent::CheckAvailability),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub fulfillment_text: String,
}
