/// Release records and their sync marks
///
/// The release itself is stored as JSON; the marks live in their own columns so
/// the sweeper can query them and every transition is one UPDATE.

use crate::error::{Error, Result};
use crate::model::{Release, SyncMarks};
use crate::store::Store;
use serde::Deserialize;
use sqlx::{sqlite::SqliteRow, Row};

/// A release as seen by the privileged read path
#[derive(Debug, Clone, PartialEq)]
pub struct MarkedRelease {
    pub release: Release,
    pub marks: SyncMarks,
}

/// Sort order for release listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseSort {
    NameAsc,
    NameDesc,
    CreatedAtAsc,
    #[default]
    CreatedAtDesc,
}

impl ReleaseSort {
    fn order_by(self) -> &'static str {
        match self {
            Self::NameAsc => "name ASC",
            Self::NameDesc => "name DESC",
            Self::CreatedAtAsc => "created_at ASC",
            Self::CreatedAtDesc => "created_at DESC",
        }
    }
}

/// Filter / paging for [`Store::list_releases`]
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseQuery {
    #[serde(default)]
    pub design_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub sort: ReleaseSort,
}

fn default_limit() -> i64 {
    100
}

impl Default for ReleaseQuery {
    fn default() -> Self {
        Self {
            design_id: None,
            limit: default_limit(),
            offset: 0,
            sort: ReleaseSort::default(),
        }
    }
}

impl Store {
    /// Insert or replace a release together with its marks
    pub async fn save_release(&self, release: &Release, marks: SyncMarks) -> Result<()> {
        let definition = serde_json::to_string(release)?;

        sqlx::query(
            r#"
            INSERT INTO releases (id, design_id, name, created_at, definition, marked_at, marked_unfinished, marked_deleted)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                design_id = excluded.design_id,
                name = excluded.name,
                created_at = excluded.created_at,
                definition = excluded.definition,
                marked_at = excluded.marked_at,
                marked_unfinished = excluded.marked_unfinished,
                marked_deleted = excluded.marked_deleted
            "#,
        )
        .bind(&release.id)
        .bind(&release.design_id)
        .bind(&release.name)
        .bind(release.created_at)
        .bind(&definition)
        .bind(marks.marked_at())
        .bind(marks.is_unfinished())
        .bind(marks.is_deleted())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace the marks of an existing release
    pub async fn set_release_marks(&self, id: &str, marks: SyncMarks) -> Result<()> {
        let result = sqlx::query(
            "UPDATE releases SET marked_at = ?, marked_unfinished = ?, marked_deleted = ? WHERE id = ?",
        )
        .bind(marks.marked_at())
        .bind(marks.is_unfinished())
        .bind(marks.is_deleted())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("release", id));
        }
        Ok(())
    }

    /// Record (or clear) the last definition-level failure of a release
    pub async fn set_release_error(&self, id: &str, message: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE releases SET definition = json_set(definition, '$.last_error', ?) WHERE id = ?")
            .bind(message)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Release by id, hidden while marked as deleted
    pub async fn get_release(&self, id: &str) -> Result<Release> {
        let row = sqlx::query("SELECT definition FROM releases WHERE id = ? AND marked_deleted = 0")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("release", id))?;

        let definition: String = row.try_get("definition")?;
        Ok(serde_json::from_str(&definition)?)
    }

    /// Privileged read: release by id regardless of marks
    pub async fn get_release_any(&self, id: &str) -> Result<MarkedRelease> {
        let row = sqlx::query(
            "SELECT definition, marked_at, marked_unfinished, marked_deleted FROM releases WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("release", id))?;

        marked_release(&row)
    }

    /// Visible releases, filtered and paged
    pub async fn list_releases(&self, query: &ReleaseQuery) -> Result<Vec<Release>> {
        let sql = format!(
            "SELECT definition FROM releases WHERE marked_deleted = 0 {} ORDER BY {} LIMIT ? OFFSET ?",
            if query.design_id.is_some() { "AND design_id = ?" } else { "" },
            query.sort.order_by()
        );

        let mut q = sqlx::query(&sql);
        if let Some(design_id) = &query.design_id {
            q = q.bind(design_id);
        }
        let rows = q
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        let mut releases = Vec::with_capacity(rows.len());
        for row in rows {
            let definition: String = row.try_get("definition")?;
            releases.push(serde_json::from_str(&definition)?);
        }
        Ok(releases)
    }

    /// Newest committed release of a design, if any
    pub async fn latest_committed_release(&self, design_id: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT id FROM releases
            WHERE design_id = ? AND marked_unfinished = 0 AND marked_deleted = 0
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(design_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.try_get("id")).transpose().map_err(Into::into)
    }

    /// Privileged read of all marked releases: (to delete, unfinished)
    pub async fn get_marked_releases(&self) -> Result<(Vec<MarkedRelease>, Vec<MarkedRelease>)> {
        let rows = sqlx::query(
            r#"
            SELECT definition, marked_at, marked_unfinished, marked_deleted FROM releases
            WHERE marked_unfinished = 1 OR marked_deleted = 1
            ORDER BY marked_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut to_delete = Vec::new();
        let mut unfinished = Vec::new();
        for row in rows {
            let marked = marked_release(&row)?;
            if marked.marks.is_deleted() {
                to_delete.push(marked);
            } else {
                unfinished.push(marked);
            }
        }
        Ok((to_delete, unfinished))
    }

    /// Remove a release record; absent records are not an error
    pub async fn delete_release(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM releases WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn marked_release(row: &SqliteRow) -> Result<MarkedRelease> {
    let definition: String = row.try_get("definition")?;
    Ok(MarkedRelease {
        release: serde_json::from_str(&definition)?,
        marks: SyncMarks::from_stored(
            row.try_get("marked_at")?,
            row.try_get("marked_unfinished")?,
            row.try_get("marked_deleted")?,
        ),
    })
}
