/// Variable records, keyed by (instance_id, user_id, name)

use crate::error::Result;
use crate::model::Variable;
use crate::store::Store;
use sqlx::{sqlite::SqliteRow, Row};

impl Store {
    pub async fn save_variable(&self, variable: &Variable) -> Result<()> {
        let value = serde_json::to_string(&variable.value)?;

        sqlx::query(
            r#"
            INSERT INTO variables (instance_id, user_id, name, value)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(instance_id, user_id, name) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(&variable.instance_id)
        .bind(&variable.user_id)
        .bind(&variable.name)
        .bind(&value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_variables(&self, instance_id: &str) -> Result<Vec<Variable>> {
        let rows = sqlx::query("SELECT * FROM variables WHERE instance_id = ? ORDER BY name")
            .bind(instance_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(variable_from_row).collect()
    }

    /// One page of all variables, in key order
    pub async fn list_all_variables(&self, limit: i64, offset: i64) -> Result<Vec<Variable>> {
        let rows = sqlx::query(
            "SELECT * FROM variables ORDER BY instance_id, user_id, name LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(variable_from_row).collect()
    }

    pub async fn delete_variable(&self, variable: &Variable) -> Result<()> {
        sqlx::query("DELETE FROM variables WHERE instance_id = ? AND user_id = ? AND name = ?")
            .bind(&variable.instance_id)
            .bind(&variable.user_id)
            .bind(&variable.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_variables_by_instance(&self, instance_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM variables WHERE instance_id = ?")
            .bind(instance_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn variable_from_row(row: &SqliteRow) -> Result<Variable> {
    let value: String = row.try_get("value")?;
    Ok(Variable {
        instance_id: row.try_get("instance_id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        value: serde_json::from_str(&value)?,
    })
}
