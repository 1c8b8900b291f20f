//! Leaderboard and dashboard read models

use serde::{Deserialize, Serialize};

use super::UserRole;

/// Leaderboard reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardScope {
    #[default]
    Global,
    Province,
    City,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user_id: i64,
    pub name: String,
    pub province: String,
    pub city: String,
    pub points: i64,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyRank {
    pub user_id: i64,
    pub points: i64,
    pub overall_rank: i64,
    pub overall_total: i64,
    pub city_rank: i64,
    pub city_total: i64,
}

/// Public face of an account
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub id: i64,
    pub name: String,
    pub role: UserRole,
    pub province: String,
    pub city: String,
    pub points: i64,
    pub avatar_url: Option<String>,
    pub post_count: i64,
}

/// Citizens grouped by go bag completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessBuckets {
    #[serde(rename = "0-24")]
    pub low: i64,
    #[serde(rename = "25-49")]
    pub fair: i64,
    #[serde(rename = "50-74")]
    pub good: i64,
    #[serde(rename = "75-100")]
    pub ready: i64,
}

impl ReadinessBuckets {
    pub fn add(&mut self, completion: u8) {
        match completion {
            0..=24 => self.low += 1,
            25..=49 => self.fair += 1,
            50..=74 => self.good += 1,
            _ => self.ready += 1,
        }
    }

    pub fn total(&self) -> i64 {
        self.low + self.fair + self.good + self.ready
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPackRate {
    pub item_id: i64,
    pub name: String,
    pub packed_by: i64,
}

/// Aggregates for one city, or for everyone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadinessOverview {
    pub citizen_count: i64,
    /// Mean completion percent across citizens, one decimal
    pub average_completion: f64,
    pub readiness: ReadinessBuckets,
    pub least_packed_items: Vec<ItemPackRate>,
    pub module_completions: i64,
    pub quiz_attempts: i64,
    pub average_quiz_score: f64,
    pub post_count: i64,
    pub pending_reports: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LguDashboard {
    pub province: String,
    pub city: String,
    #[serde(flatten)]
    pub overview: ReadinessOverview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityBreakdown {
    pub province: String,
    pub city: String,
    pub citizens: i64,
    pub average_completion: f64,
    pub total_points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminDashboard {
    #[serde(flatten)]
    pub overview: ReadinessOverview,
    pub user_count: i64,
    pub lgu_count: i64,
    pub banned_count: i64,
    pub cities: Vec<CityBreakdown>,
}

/// Round to one decimal place for display
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_boundaries() {
        let mut buckets = ReadinessBuckets::default();
        for completion in [0, 24, 25, 49, 50, 74, 75, 100] {
            buckets.add(completion);
        }
        assert_eq!(
            buckets,
            ReadinessBuckets {
                low: 2,
                fair: 2,
                good: 2,
                ready: 2
            }
        );
        assert_eq!(buckets.total(), 8);
    }

    #[test]
    fn test_bucket_keys_serialize_as_ranges() {
        let json = serde_json::to_value(ReadinessBuckets::default()).unwrap();
        assert!(json.get("0-24").is_some());
        assert!(json.get("75-100").is_some());
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(66.666), 66.7);
        assert_eq!(round1(0.0), 0.0);
    }
}
