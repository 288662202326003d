//! Shared in-memory test doubles for the control-plane integration suite.
//!
//! Every repository double wraps its backing store in `Arc<Mutex<..>>` and
//! derives `Clone`, so a test can hand one clone to a service and keep
//! another to inspect state the service mutated — the same role
//! `qcp-ledger`'s and `qcp-permissions`' own unit-test fakes play, just
//! shared rather than single-owner since a scenario here often wires more
//! than one service against the same backing store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use qcp_common::{EmployeeNumber, QcpError, StrategyId, UserId, VoucherNonce};
use qcp_ledger::{LedgerRepository, MonthlyQuotaUsage, QuotaAudit, QuotaRecord, QuotaStatus};
use qcp_permissions::{EmployeeDepartment, EmployeeRepository, PermissionDomain, Setting, SettingRepository, TargetType};
use qcp_strategy::{ExecuteRepository, QuotaExecute, QuotaStrategy, StrategyRepository};

#[derive(Clone, Default)]
pub struct InMemoryLedgerRepo {
    records: Arc<Mutex<Vec<QuotaRecord>>>,
    audits: Arc<Mutex<Vec<QuotaAudit>>>,
    redeemed: Arc<Mutex<HashSet<uuid::Uuid>>>,
    monthly_usage: Arc<Mutex<Vec<MonthlyQuotaUsage>>>,
}

impl InMemoryLedgerRepo {
    pub fn seeded(records: Vec<QuotaRecord>) -> Self {
        Self { records: Arc::new(Mutex::new(records)), ..Default::default() }
    }

    pub fn all_records(&self) -> Vec<QuotaRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn all_audits(&self) -> Vec<QuotaAudit> {
        self.audits.lock().unwrap().clone()
    }

    pub fn all_monthly_usage(&self) -> Vec<MonthlyQuotaUsage> {
        self.monthly_usage.lock().unwrap().clone()
    }
}

impl LedgerRepository for InMemoryLedgerRepo {
    async fn list_active_records(&self, user_id: UserId) -> Result<Vec<QuotaRecord>, QcpError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id && r.status == QuotaStatus::Active)
            .cloned()
            .collect())
    }

    async fn list_expirable(&self, as_of: DateTime<Utc>, limit: i64) -> Result<Vec<QuotaRecord>, QcpError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == QuotaStatus::Active && r.expires_at <= as_of)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn insert_record(&self, record: &QuotaRecord) -> Result<(), QcpError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn update_record(&self, record: &QuotaRecord) -> Result<(), QcpError> {
        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
            *existing = record.clone();
        }
        Ok(())
    }

    async fn insert_audit(&self, audit: &QuotaAudit) -> Result<(), QcpError> {
        self.audits.lock().unwrap().push(audit.clone());
        Ok(())
    }

    async fn list_audit(&self, user_id: UserId, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Vec<QuotaAudit>, QcpError> {
        Ok(self.audits.lock().unwrap().iter().filter(|a| a.user_id == user_id).cloned().collect())
    }

    async fn try_mark_voucher_redeemed(
        &self,
        nonce: VoucherNonce,
        _issuing_user_id: UserId,
        _redeeming_user_id: UserId,
    ) -> Result<bool, QcpError> {
        Ok(self.redeemed.lock().unwrap().insert(*nonce.as_uuid()))
    }

    async fn try_insert_monthly_usage(&self, usage: &MonthlyQuotaUsage) -> Result<bool, QcpError> {
        let mut rows = self.monthly_usage.lock().unwrap();
        if rows.iter().any(|r| r.user_id == usage.user_id && r.year_month == usage.year_month) {
            return Ok(false);
        }
        rows.push(usage.clone());
        Ok(true)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryEmployeeRepo {
    rows: Arc<Mutex<HashMap<UserId, EmployeeDepartment>>>,
}

impl InMemoryEmployeeRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmployeeRepository for InMemoryEmployeeRepo {
    async fn find_by_employee_number(&self, employee_number: &EmployeeNumber) -> Result<Option<EmployeeDepartment>, QcpError> {
        Ok(self.rows.lock().unwrap().values().find(|e| &e.employee_number == employee_number).cloned())
    }

    async fn find_by_user_id(&self, user_id: UserId) -> Result<Option<EmployeeDepartment>, QcpError> {
        Ok(self.rows.lock().unwrap().get(&user_id).cloned())
    }

    async fn upsert(&self, record: &EmployeeDepartment) -> Result<(), QcpError> {
        self.rows.lock().unwrap().insert(record.user_id, record.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySettingRepo {
    rows: Arc<Mutex<Vec<Setting>>>,
}

impl InMemorySettingRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingRepository for InMemorySettingRepo {
    async fn find_user_setting(&self, employee_number: &EmployeeNumber, domain: PermissionDomain) -> Result<Option<Setting>, QcpError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.domain == domain && s.target == TargetType::User(employee_number.clone()))
            .cloned())
    }

    async fn find_department_setting(&self, department: &str, domain: PermissionDomain) -> Result<Option<Setting>, QcpError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.domain == domain && s.target == TargetType::Department(department.to_string()))
            .cloned())
    }

    async fn upsert_setting(&self, setting: &Setting) -> Result<(), QcpError> {
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|s| !(s.domain == setting.domain && s.target == setting.target));
        rows.push(setting.clone());
        Ok(())
    }

    async fn delete_setting(&self, target: &TargetType, domain: PermissionDomain) -> Result<(), QcpError> {
        self.rows.lock().unwrap().retain(|s| !(&s.target == target && s.domain == domain));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStrategyRepo {
    rows: Arc<Mutex<HashMap<StrategyId, QuotaStrategy>>>,
}

impl InMemoryStrategyRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StrategyRepository for InMemoryStrategyRepo {
    async fn insert(&self, strategy: &QuotaStrategy) -> Result<(), QcpError> {
        self.rows.lock().unwrap().insert(strategy.id, strategy.clone());
        Ok(())
    }

    async fn update(&self, strategy: &QuotaStrategy) -> Result<(), QcpError> {
        self.rows.lock().unwrap().insert(strategy.id, strategy.clone());
        Ok(())
    }

    async fn find(&self, id: StrategyId) -> Result<Option<QuotaStrategy>, QcpError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn list_enabled(&self) -> Result<Vec<QuotaStrategy>, QcpError> {
        Ok(self.rows.lock().unwrap().values().filter(|s| s.is_enabled()).cloned().collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryExecuteRepo {
    claimed: Arc<Mutex<HashSet<(StrategyId, UserId, String)>>>,
    records: Arc<Mutex<Vec<QuotaExecute>>>,
}

impl InMemoryExecuteRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_records(&self) -> Vec<QuotaExecute> {
        self.records.lock().unwrap().clone()
    }
}

impl ExecuteRepository for InMemoryExecuteRepo {
    async fn try_claim(&self, strategy_id: StrategyId, user_id: UserId, period_key: &str) -> Result<bool, QcpError> {
        Ok(self.claimed.lock().unwrap().insert((strategy_id, user_id, period_key.to_string())))
    }

    async fn record(&self, execute: &QuotaExecute) -> Result<(), QcpError> {
        self.records.lock().unwrap().push(execute.clone());
        Ok(())
    }

    async fn find(&self, strategy_id: StrategyId, user_id: UserId, period_key: &str) -> Result<Option<QuotaExecute>, QcpError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.strategy_id == strategy_id && e.user_id == user_id && e.period_key == period_key)
            .cloned())
    }
}

pub fn test_voucher_config() -> qcp_common::VoucherConfig {
    qcp_common::VoucherConfig {
        hmac_secret: secrecy::SecretString::from("integration-test-secret".to_string()),
        ttl_seconds: 3600,
    }
}
