//! Employee/department store and the user-id ↔ employee-number indirection
//! (`spec.md` §4.2, "Identifier indirection").
//!
//! Permission settings are keyed by employee number because they come from
//! the HR sync ingester (an external collaborator, `spec.md` §1); the
//! gateway and the rest of this control plane identify users by an
//! external UUID. This module is the only place that bridges the two.

use chrono::{DateTime, Utc};
use qcp_common::{DepartmentPath, EmployeeNumber, QcpError, UserId};
use serde::{Deserialize, Serialize};

/// An employee's current department assignment, as synced from HR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeDepartment {
    pub employee_number: EmployeeNumber,
    pub user_id: UserId,
    pub department_path: DepartmentPath,
    pub synced_at: DateTime<Utc>,
}

#[trait_variant::make(EmployeeRepository: Send)]
pub trait LocalEmployeeRepository {
    async fn find_by_employee_number(
        &self,
        employee_number: &EmployeeNumber,
    ) -> Result<Option<EmployeeDepartment>, QcpError>;

    async fn find_by_user_id(&self, user_id: UserId) -> Result<Option<EmployeeDepartment>, QcpError>;

    /// Upsert a row, as the HR sync ingester would call on each sync pass.
    async fn upsert(&self, record: &EmployeeDepartment) -> Result<(), QcpError>;
}

/// PostgreSQL implementation over an `employee_department` table keyed by
/// `employee_number`, unique on `user_id`.
pub struct PgEmployeeRepository {
    pool: sqlx::PgPool,
}

impl PgEmployeeRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<EmployeeDepartment, QcpError> {
        use sqlx::Row;
        let employee_number: String = row.get("employee_number");
        let user_id: uuid::Uuid = row.get("user_id");
        let department_path: String = row.get("department_path");
        Ok(EmployeeDepartment {
            employee_number: EmployeeNumber::new(employee_number)?,
            user_id: UserId::from_uuid(user_id),
            department_path: DepartmentPath::parse(&department_path)?,
            synced_at: row.get("synced_at"),
        })
    }
}

impl EmployeeRepository for PgEmployeeRepository {
    async fn find_by_employee_number(
        &self,
        employee_number: &EmployeeNumber,
    ) -> Result<Option<EmployeeDepartment>, QcpError> {
        let row = sqlx::query(
            "SELECT employee_number, user_id, department_path, synced_at FROM employee_department WHERE employee_number = $1",
        )
        .bind(employee_number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn find_by_user_id(&self, user_id: UserId) -> Result<Option<EmployeeDepartment>, QcpError> {
        let row = sqlx::query(
            "SELECT employee_number, user_id, department_path, synced_at FROM employee_department WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn upsert(&self, record: &EmployeeDepartment) -> Result<(), QcpError> {
        sqlx::query(
            r#"
            INSERT INTO employee_department (employee_number, user_id, department_path, synced_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (employee_number) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                department_path = EXCLUDED.department_path,
                synced_at = EXCLUDED.synced_at
            "#,
        )
        .bind(record.employee_number.as_str())
        .bind(record.user_id.as_uuid())
        .bind(record.department_path.to_comma_joined())
        .bind(record.synced_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
