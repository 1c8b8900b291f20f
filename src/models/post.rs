//! Go Bag posts, their item snapshots and community ratings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Points the post owner earns for each newly verified snapshot item
pub const POINTS_PER_VERIFIED_ITEM: i64 = 10;

/// A photo of a user's go bag with the items they claim it holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub image_url: String,
    #[serde(skip_serializing)]
    pub image_public_id: String,
    pub caption: String,
    /// Number of ratings received
    pub rater_count: i64,
    /// Snapshot items currently confirmed by a strict majority of raters
    pub verified_item_count: i64,
    /// Highest verified count the owner has been paid for
    #[serde(skip_serializing)]
    pub awarded_item_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One item of a post's snapshot with its tally
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotItem {
    pub item_id: i64,
    pub item_name: String,
    pub vote_count: i64,
}

impl SnapshotItem {
    /// Confirmed by more than half of all raters
    pub fn is_verified(&self, rater_count: i64) -> bool {
        self.vote_count * 2 > rater_count
    }
}

/// Number of snapshot items whose votes exceed half of `rater_count`
pub fn count_verified(vote_counts: &[i64], rater_count: i64) -> i64 {
    vote_counts.iter().filter(|&&votes| votes * 2 > rater_count).count() as i64
}

/// Points owed when the verified count reaches `verified`, given that the
/// owner has already been paid for `awarded` items. Never negative.
pub fn points_for_verification(verified: i64, awarded: i64) -> i64 {
    (verified - awarded).max(0) * POINTS_PER_VERIFIED_ITEM
}

/// Post with author and snapshot, as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub author: PostAuthor,
    pub items: Vec<SnapshotItemView>,
    /// Whether the requesting user has already rated this post
    pub viewer_has_rated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostAuthor {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotItemView {
    pub item_id: i64,
    pub item_name: String,
    pub vote_count: i64,
    pub verified: bool,
}

impl SnapshotItemView {
    pub fn from_item(item: SnapshotItem, rater_count: i64) -> Self {
        let verified = item.is_verified(rater_count);
        Self {
            item_id: item.item_id,
            item_name: item.item_name,
            vote_count: item.vote_count,
            verified,
        }
    }
}

/// A rater's confirmation of a post snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub confirmed_item_ids: Vec<i64>,
    /// Points the post owner received because of this rating
    pub points_awarded: i64,
    pub created_at: DateTime<Utc>,
}

/// Outcome of submitting a rating
#[derive(Debug, Clone, Serialize)]
pub struct RatingOutcome {
    pub rating: Rating,
    pub rater_count: i64,
    pub verified_item_count: i64,
    pub points_awarded: i64,
}

/// Feed entry: a post and who made it
#[derive(Debug, Clone, Serialize)]
pub struct PostCard {
    #[serde(flatten)]
    pub post: Post,
    pub author: PostAuthor,
}

/// Feed filters; both are optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostFilter {
    pub user_id: Option<i64>,
    /// City of the post owner
    pub city: Option<String>,
}
