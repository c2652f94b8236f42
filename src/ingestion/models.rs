use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// One property entry of an ingestion payload, as received
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PropertyInput {
    #[serde(default, deserialize_with = "lenient_id")]
    pub property_id: Option<String>,
    pub name: Option<String>,
    pub rooms: Option<Vec<RoomInput>>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RoomInput {
    #[serde(default, deserialize_with = "lenient_id")]
    pub room_id: Option<String>,
    pub name: Option<String>,
    pub max_guests: Option<i32>,
    #[serde(default)]
    pub availabilities: Vec<DayInput>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DayInput {
    pub date: NaiveDate,
    pub price: Decimal,
    /// Units offered that day; rooms are single-unit so this is only checked
    pub allotment: Option<i64>,
}

/// Response for an accepted ingestion payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestionAccepted {
    pub message: String,
    pub job_ids: Vec<uuid::Uuid>,
}

/// Identifiers arrive as strings or bare numbers; both become strings
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(id)) => Some(id),
        Some(serde_json::Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}
