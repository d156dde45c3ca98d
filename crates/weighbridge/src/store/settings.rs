//! Per-tenant engine settings, read at the moment of use so changes take
//! effect immediately. Tenants without a row get the defaults.

use sqlx::{Row, SqliteConnection};

use super::{StoreError, TenantStore, TenantTx};
use crate::workflows::orders::domain::{EngineSettings, MatchMode, TenantId};

impl TenantStore {
    pub async fn engine_settings(&self) -> Result<EngineSettings, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_settings(&mut conn, &self.tenant).await
    }

    /// Create or replace this tenant's settings row.
    pub async fn put_engine_settings(&self, settings: &EngineSettings) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tenant_settings (tenant_id, tolerance_grams, match_mode, visual_prompt_template)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(tenant_id) DO UPDATE SET
                tolerance_grams = excluded.tolerance_grams,
                match_mode = excluded.match_mode,
                visual_prompt_template = excluded.visual_prompt_template
            "#,
        )
        .bind(&self.tenant.0)
        .bind(settings.tolerance_grams)
        .bind(settings.match_mode.label())
        .bind(settings.visual_prompt_template.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl TenantTx {
    pub(crate) async fn engine_settings(&mut self) -> Result<EngineSettings, StoreError> {
        fetch_settings(&mut self.tx, &self.tenant).await
    }
}

async fn fetch_settings(
    conn: &mut SqliteConnection,
    tenant: &TenantId,
) -> Result<EngineSettings, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT tolerance_grams, match_mode, visual_prompt_template
        FROM tenant_settings
        WHERE tenant_id = ?
        "#,
    )
    .bind(&tenant.0)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(EngineSettings::default());
    };

    let match_mode: String = row.get("match_mode");

    Ok(EngineSettings {
        tolerance_grams: row.get("tolerance_grams"),
        match_mode: MatchMode::parse(&match_mode)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown match mode '{match_mode}'")))?,
        visual_prompt_template: row.get("visual_prompt_template"),
    })
}
