use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub title: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub results: HashMap<String, i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPoll {
    pub title: String,
    pub options: Vec<String>,
}

impl Poll {
    pub fn new(title: String, options: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            options,
            results: HashMap::new(),
            created_at: Utc::now(),
        }
    }
}
