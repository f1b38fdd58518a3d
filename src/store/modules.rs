/// Module records
///
/// Modules are written in batches by workflow tasks. A batch of more than one
/// module is written in a single transaction; a single module is a plain upsert.

use crate::error::Result;
use crate::model::Module;
use crate::store::Store;
use sqlx::{sqlite::SqliteRow, Row, Sqlite};

const UPSERT_MODULE: &str = r#"
    INSERT INTO modules (id, user_id, instance_id, design_id, release_id, module_type, module_data, delete_info)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        user_id = excluded.user_id,
        instance_id = excluded.instance_id,
        design_id = excluded.design_id,
        release_id = excluded.release_id,
        module_type = excluded.module_type,
        module_data = excluded.module_data,
        delete_info = excluded.delete_info
"#;

impl Store {
    /// Insert or replace modules
    pub async fn save_modules(&self, modules: &[Module]) -> Result<()> {
        match modules {
            [] => Ok(()),
            [module] => {
                upsert_module(module, &self.pool).await?;
                Ok(())
            }
            many => {
                let mut tx = self.pool.begin().await?;
                for module in many {
                    upsert_module(module, &mut *tx).await?;
                }
                tx.commit().await?;
                Ok(())
            }
        }
    }

    /// One page of all modules, ordered by id
    pub async fn list_modules(&self, limit: i64, offset: i64) -> Result<Vec<Module>> {
        let rows = sqlx::query("SELECT * FROM modules ORDER BY id LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(module_from_row).collect()
    }

    pub async fn list_modules_by_instance(&self, instance_id: &str) -> Result<Vec<Module>> {
        let rows = sqlx::query("SELECT * FROM modules WHERE instance_id = ? ORDER BY id")
            .bind(instance_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(module_from_row).collect()
    }

    pub async fn delete_module(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM modules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn upsert_module<'e, E>(module: &Module, executor: E) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let module_data = serde_json::to_string(&module.module_data)?;
    let delete_info = module
        .delete_info
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(UPSERT_MODULE)
        .bind(&module.id)
        .bind(&module.user_id)
        .bind(&module.instance_id)
        .bind(&module.design_id)
        .bind(&module.release_id)
        .bind(&module.module_type)
        .bind(module_data)
        .bind(delete_info)
        .execute(executor)
        .await?;
    Ok(())
}

fn module_from_row(row: &SqliteRow) -> Result<Module> {
    let module_data: String = row.try_get("module_data")?;
    let delete_info: Option<String> = row.try_get("delete_info")?;

    Ok(Module {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        instance_id: row.try_get("instance_id")?,
        design_id: row.try_get("design_id")?,
        release_id: row.try_get("release_id")?,
        module_type: row.try_get("module_type")?,
        module_data: serde_json::from_str(&module_data)?,
        delete_info: delete_info.map(|raw| serde_json::from_str(&raw)).transpose()?,
    })
}
