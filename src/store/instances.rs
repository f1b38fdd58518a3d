/// Instance records and maintenance aliases
///
/// `running_maintenance_ids` is a JSON array column. Aliases are appended and
/// removed with single UPDATE statements so concurrent maintenance starts on the
/// same instance never overwrite each other.

use crate::error::{Error, Result};
use crate::model::Instance;
use crate::store::Store;
use sqlx::{sqlite::SqliteRow, Row};

const INSTANCE_COLUMNS: &str = "id, user_id, design_id, release_id, new_release_id, name, description, ready, error, parameters, running_maintenance_ids";

impl Store {
    /// Insert or fully replace an instance
    pub async fn save_instance(&self, instance: &Instance) -> Result<()> {
        let parameters = serde_json::to_string(&instance.parameters)?;
        let maintenance_ids = serde_json::to_string(&instance.running_maintenance_ids)?;

        sqlx::query(
            r#"
            INSERT INTO instances (id, user_id, design_id, release_id, new_release_id, name, description, ready, error, parameters, running_maintenance_ids)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                design_id = excluded.design_id,
                release_id = excluded.release_id,
                new_release_id = excluded.new_release_id,
                name = excluded.name,
                description = excluded.description,
                ready = excluded.ready,
                error = excluded.error,
                parameters = excluded.parameters,
                running_maintenance_ids = excluded.running_maintenance_ids
            "#,
        )
        .bind(&instance.id)
        .bind(&instance.user_id)
        .bind(&instance.design_id)
        .bind(&instance.release_id)
        .bind(&instance.new_release_id)
        .bind(&instance.name)
        .bind(&instance.description)
        .bind(instance.ready)
        .bind(&instance.error)
        .bind(&parameters)
        .bind(&maintenance_ids)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Instance by its own id or by any of its running maintenance ids
    pub async fn get_instance(&self, id_or_alias: &str) -> Result<Instance> {
        let sql = format!(
            r#"
            SELECT {} FROM instances
            WHERE id = ?
               OR EXISTS (SELECT 1 FROM json_each(instances.running_maintenance_ids) WHERE json_each.value = ?)
            ORDER BY CASE WHEN id = ? THEN 0 ELSE 1 END
            LIMIT 1
            "#,
            INSTANCE_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(id_or_alias)
            .bind(id_or_alias)
            .bind(id_or_alias)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("instance", id_or_alias))?;

        instance_from_row(&row)
    }

    /// Instances with at least one running maintenance procedure
    pub async fn list_instances_in_maintenance(&self) -> Result<Vec<Instance>> {
        let sql = format!(
            "SELECT {} FROM instances WHERE json_array_length(running_maintenance_ids) > 0",
            INSTANCE_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(instance_from_row).collect()
    }

    /// Number of instances that still run on a release
    pub async fn count_instances_for_release(&self, release_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM instances WHERE release_id = ?")
            .bind(release_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    /// Point instances of a design at a newer release
    pub async fn set_new_release_id(&self, design_id: &str, release_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE instances SET new_release_id = ? WHERE design_id = ? AND release_id != ?",
        )
        .bind(release_id)
        .bind(design_id)
        .bind(release_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_instance_ready(&self, id: &str, ready: bool, error: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE instances SET ready = ?, error = ? WHERE id = ?")
            .bind(ready)
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("instance", id));
        }
        Ok(())
    }

    /// Append a maintenance alias to an instance
    pub async fn append_maintenance_id(&self, instance_id: &str, maintenance_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE instances SET running_maintenance_ids = json_insert(running_maintenance_ids, '$[#]', ?) WHERE id = ?",
        )
        .bind(maintenance_id)
        .bind(instance_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("instance", instance_id));
        }
        Ok(())
    }

    /// Drop a maintenance alias from whichever instance holds it
    ///
    /// Returns false when no instance carried the alias.
    pub async fn remove_maintenance_id(&self, maintenance_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE instances SET running_maintenance_ids = (
                SELECT json_group_array(json_each.value)
                FROM json_each(instances.running_maintenance_ids)
                WHERE json_each.value != ?
            )
            WHERE EXISTS (
                SELECT 1 FROM json_each(instances.running_maintenance_ids) WHERE json_each.value = ?
            )
            "#,
        )
        .bind(maintenance_id)
        .bind(maintenance_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove an instance record; absent records are not an error
    pub async fn delete_instance(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM instances WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn instance_from_row(row: &SqliteRow) -> Result<Instance> {
    let parameters: String = row.try_get("parameters")?;
    let maintenance_ids: String = row.try_get("running_maintenance_ids")?;

    Ok(Instance {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        design_id: row.try_get("design_id")?,
        release_id: row.try_get("release_id")?,
        new_release_id: row.try_get("new_release_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        ready: row.try_get("ready")?,
        error: row.try_get("error")?,
        parameters: serde_json::from_str(&parameters)?,
        running_maintenance_ids: serde_json::from_str(&maintenance_ids)?,
    })
}
