use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};

use agora_types::models::VoteValue;
use agora_types::pagination::PaginateFilter;

use crate::models::{PostRow, UserRow, VoteRow};
use crate::{Database, DbError, Result};

/// Post columns plus the aggregated vote total, in [`post_from_row`] order.
/// Must be paired with `LEFT JOIN votes v` and `GROUP BY p.id`.
const POST_COLUMNS: &str = "p.id, p.title, p.text, p.created_at, p.updated_at, p.user_id, \
                            COALESCE(SUM(v.vote), 0) AS vote_count";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, email: &str, password_hash: &str) -> Result<()> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, email, password_hash, &now),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, password, created_at FROM users WHERE email = ?1",
                [email],
                user_from_row,
            )
            .optional()
        })
    }

    // -- Posts --

    /// One page of posts with vote totals, plus the number of posts the
    /// listing spans. Both come from the same statement, so the total always
    /// matches the page it was read with. An empty page reports a total of 0.
    ///
    /// # Panics
    ///
    /// If `filter` was not validated (see [`PaginateFilter::sort_column`]).
    pub fn list_posts(&self, filter: &PaginateFilter) -> Result<(Vec<PostRow>, i64)> {
        let sql = format!(
            "SELECT COUNT(*) OVER () AS total_records, {POST_COLUMNS}
             FROM posts p
             LEFT JOIN votes v ON p.id = v.post_id
             GROUP BY p.id
             ORDER BY {column} {direction}, p.id {direction}
             LIMIT ?1 OFFSET ?2",
            column = filter.sort_column(),
            direction = filter.sort_direction().as_sql(),
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![filter.limit(), filter.offset()])?;

            let mut total_records = 0;
            let mut posts = Vec::new();
            while let Some(row) = rows.next()? {
                total_records = row.get(0)?;
                posts.push(post_from_row(row, 1)?);
            }

            Ok((posts, total_records))
        })
    }

    pub fn get_post_by_id(&self, id: &str) -> Result<PostRow> {
        self.with_conn(|conn| query_post_by_id(conn, id))
    }

    /// Titles are not unique; the oldest post with the title wins.
    pub fn get_post_by_title(&self, title: &str) -> Result<PostRow> {
        let sql = format!(
            "SELECT {POST_COLUMNS}
             FROM posts p
             LEFT JOIN votes v ON p.id = v.post_id
             WHERE p.title = ?1
             GROUP BY p.id
             ORDER BY p.created_at ASC, p.id ASC
             LIMIT 1"
        );
        self.with_conn(|conn| Ok(conn.query_row(&sql, [title], |row| post_from_row(row, 0))?))
    }

    /// Inserts a post and returns it as listings would show it (no votes yet).
    pub fn create_post(&self, id: &str, title: &str, text: &str, user_id: &str) -> Result<PostRow> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            let row = conn.query_row(
                "INSERT INTO posts (id, title, text, created_at, updated_at, user_id)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5)
                 RETURNING id, title, text, created_at, updated_at, user_id, 0",
                params![id, title, text, now, user_id],
                |row| post_from_row(row, 0),
            )?;
            Ok(row)
        })
    }

    /// Rewrites title and text, bumps `updated_at`, and returns the post with
    /// its current vote total.
    pub fn update_post(&self, id: &str, title: &str, text: &str) -> Result<PostRow> {
        let now = now_timestamp();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE posts SET title = ?1, text = ?2, updated_at = ?3 WHERE id = ?4",
                params![title, text, now, id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound);
            }
            let row = query_post_by_id(&tx, id)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Deletes a post; its votes go with it.
    pub fn delete_post(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(DbError::NotFound);
            }
            Ok(())
        })
    }

    // -- Votes --

    /// Records `user_id`'s vote on `post_id`, replacing any earlier vote by
    /// the same user. Atomic at the store: concurrent upserts for one pair
    /// resolve last-committed-wins.
    pub fn upsert_vote(&self, post_id: &str, user_id: &str, value: VoteValue) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO votes (user_id, post_id, vote) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id, post_id) DO UPDATE SET vote = excluded.vote",
                params![user_id, post_id, value.as_i64()],
            )?;
            Ok(())
        })
    }

    /// Deletes `user_id`'s vote on `post_id`. Removing a vote that was never
    /// cast is not an error; the return value tells whether a row existed.
    pub fn remove_vote(&self, post_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM votes WHERE user_id = ?1 AND post_id = ?2",
                params![user_id, post_id],
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn get_votes_for_post(&self, post_id: &str) -> Result<Vec<VoteRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id, post_id, vote FROM votes WHERE post_id = ?1")?;
            let rows = stmt
                .query_map([post_id], |row| {
                    Ok(VoteRow {
                        user_id: row.get(0)?,
                        post_id: row.get(1)?,
                        vote: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_post_by_id(conn: &Connection, id: &str) -> Result<PostRow> {
    let sql = format!(
        "SELECT {POST_COLUMNS}
         FROM posts p
         LEFT JOIN votes v ON p.id = v.post_id
         WHERE p.id = ?1
         GROUP BY p.id"
    );
    Ok(conn.query_row(&sql, [id], |row| post_from_row(row, 0))?)
}

fn post_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(base)?,
        title: row.get(base + 1)?,
        text: row.get(base + 2)?,
        created_at: row.get(base + 3)?,
        updated_at: row.get(base + 4)?,
        user_id: row.get(base + 5)?,
        vote_count: row.get(base + 6)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// RFC 3339 with microseconds, so text ordering matches time ordering.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
