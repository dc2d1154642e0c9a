//! Database row types. These map directly to SQLite rows.
//! Distinct from agora-types API models to keep the DB layer independent.

#[derive(Debug)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

/// A post row with its vote total already aggregated.
#[derive(Debug)]
pub struct PostRow {
    pub id: String,
    pub title: String,
    pub text: String,
    pub created_at: String,
    pub updated_at: String,
    pub user_id: String,
    pub vote_count: i64,
}

#[derive(Debug)]
pub struct VoteRow {
    pub user_id: String,
    pub post_id: String,
    pub vote: i64,
}
