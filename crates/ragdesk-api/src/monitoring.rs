//! Usage monitoring

use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserUsage {
    pub email: String,
    pub requests: u64,
    pub tokens: u64,
}

/// Usage counters for the current day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageToday {
    pub date: Option<String>,
    #[serde(alias = "total_requests")]
    pub requests: u64,
    #[serde(alias = "total_tokens")]
    pub tokens: u64,
    pub cost: Option<f64>,
    #[serde(alias = "by_user")]
    pub users: Vec<UserUsage>,
}

impl UsageToday {
    /// Heaviest users by token count
    pub fn top_users(&self, n: usize) -> Vec<&UserUsage> {
        let mut users: Vec<&UserUsage> = self.users.iter().collect();
        users.sort_by(|a, b| b.tokens.cmp(&a.tokens).then_with(|| a.email.cmp(&b.email)));
        users.truncate(n);
        users
    }
}

impl ApiClient {
    pub async fn usage_today(&self) -> Result<UsageToday> {
        self.get_json("/api/monitoring/usage/today").await
    }
}
