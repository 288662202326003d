//! Persistence for permission settings, over a `permission_setting` table
//! keyed by `(target_type, target_key, domain)`.

use qcp_common::{EmployeeNumber, QcpError};
use sqlx::Row;

use crate::setting::{PermissionDomain, Setting, SettingValue, TargetType};

fn domain_db_str(domain: PermissionDomain) -> &'static str {
    match domain {
        PermissionDomain::ModelWhitelist => "MODEL_WHITELIST",
        PermissionDomain::StarCheck => "STAR_CHECK",
        PermissionDomain::QuotaCheck => "QUOTA_CHECK",
    }
}

fn domain_from_db_str(s: &str) -> Result<PermissionDomain, QcpError> {
    match s {
        "MODEL_WHITELIST" => Ok(PermissionDomain::ModelWhitelist),
        "STAR_CHECK" => Ok(PermissionDomain::StarCheck),
        "QUOTA_CHECK" => Ok(PermissionDomain::QuotaCheck),
        other => Err(QcpError::Internal(format!("unknown permission domain: {other}"))),
    }
}

#[trait_variant::make(SettingRepository: Send)]
pub trait LocalSettingRepository {
    async fn find_user_setting(
        &self,
        employee_number: &EmployeeNumber,
        domain: PermissionDomain,
    ) -> Result<Option<Setting>, QcpError>;

    async fn find_department_setting(
        &self,
        department: &str,
        domain: PermissionDomain,
    ) -> Result<Option<Setting>, QcpError>;

    async fn upsert_setting(&self, setting: &Setting) -> Result<(), QcpError>;

    async fn delete_setting(&self, target: &TargetType, domain: PermissionDomain) -> Result<(), QcpError>;
}

/// PostgreSQL implementation. `target_type` is `'user'` or `'department'`;
/// `target_key` is the employee number or department segment name.
pub struct PgSettingRepository {
    pool: sqlx::PgPool,
}

impl PgSettingRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    fn row_to_setting(row: &sqlx::postgres::PgRow) -> Result<Setting, QcpError> {
        let target_type: String = row.get("target_type");
        let target_key: String = row.get("target_key");
        let target = match target_type.as_str() {
            "user" => TargetType::User(EmployeeNumber::new(target_key)?),
            "department" => TargetType::Department(target_key),
            other => return Err(QcpError::Internal(format!("unknown target type: {other}"))),
        };
        let domain = domain_from_db_str(&row.get::<String, _>("domain"))?;
        let value_json: serde_json::Value = row.get("value");
        let value: SettingValue =
            serde_json::from_value(value_json).map_err(|e| QcpError::Internal(e.to_string()))?;
        Ok(Setting {
            id: row.get("id"),
            target,
            domain,
            value,
            updated_at: row.get("updated_at"),
        })
    }
}

impl SettingRepository for PgSettingRepository {
    async fn find_user_setting(
        &self,
        employee_number: &EmployeeNumber,
        domain: PermissionDomain,
    ) -> Result<Option<Setting>, QcpError> {
        let row = sqlx::query(
            r#"
            SELECT id, target_type, target_key, domain, value, updated_at
            FROM permission_setting
            WHERE target_type = 'user' AND target_key = $1 AND domain = $2
            "#,
        )
        .bind(employee_number.as_str())
        .bind(domain_db_str(domain))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_setting).transpose()
    }

    async fn find_department_setting(
        &self,
        department: &str,
        domain: PermissionDomain,
    ) -> Result<Option<Setting>, QcpError> {
        let row = sqlx::query(
            r#"
            SELECT id, target_type, target_key, domain, value, updated_at
            FROM permission_setting
            WHERE target_type = 'department' AND target_key = $1 AND domain = $2
            "#,
        )
        .bind(department)
        .bind(domain_db_str(domain))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_setting).transpose()
    }

    async fn upsert_setting(&self, setting: &Setting) -> Result<(), QcpError> {
        let (target_type, target_key) = match &setting.target {
            TargetType::User(employee_number) => ("user", employee_number.as_str().to_string()),
            TargetType::Department(name) => ("department", name.clone()),
        };
        let value_json =
            serde_json::to_value(&setting.value).map_err(|e| QcpError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO permission_setting (id, target_type, target_key, domain, value, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (target_type, target_key, domain) DO UPDATE
            SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(setting.id)
        .bind(target_type)
        .bind(target_key)
        .bind(domain_db_str(setting.domain))
        .bind(value_json)
        .bind(setting.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_setting(&self, target: &TargetType, domain: PermissionDomain) -> Result<(), QcpError> {
        let (target_type, target_key) = match target {
            TargetType::User(employee_number) => ("user", employee_number.as_str().to_string()),
            TargetType::Department(name) => ("department", name.clone()),
        };
        sqlx::query(
            "DELETE FROM permission_setting WHERE target_type = $1 AND target_key = $2 AND domain = $3",
        )
        .bind(target_type)
        .bind(target_key)
        .bind(domain_db_str(domain))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
