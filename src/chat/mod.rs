// Chat Integration Module
//
// Fulfilment webhook for an external intent classifier. Recognised intents
// are answered from the availability service.

pub mod handlers;
pub mod models;

pub use models::{ChatIntent, ChatParams, WebhookRequest, WebhookResponse};
