//! Layered effective-value resolution (`spec.md` §4.2).
//!
//! For a given user and domain: a user-level setting wins if one exists and
//! its value is non-empty; absent that, department settings are checked
//! leaf-to-root and the first non-empty match wins; absent any non-empty
//! setting at all, the domain's default applies. An empty value ("not
//! configured") never shadows a parent's non-empty one. This is the same
//! shape as a layered policy decision (deny/allow escalating through scopes
//! until one applies), just generalized from a three-way verdict to an
//! arbitrary per-domain value.

use qcp_common::{QcpError, QcpResult, UserId};

use crate::employee::EmployeeRepository;
use crate::repository::SettingRepository;
use crate::setting::{PermissionDomain, SettingValue, TargetType};

/// The resolved value for one user/domain pair, plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSetting {
    pub domain: PermissionDomain,
    pub value: SettingValue,
    pub source: Option<TargetType>,
}

/// Resolve the effective value of `domain` for `user_id`.
///
/// Returns `QcpError::NotFound` only if the caller needs the employee
/// record to exist and it doesn't; resolution itself never fails for a
/// user with no settings anywhere in the chain — it falls through to the
/// domain default (see `DESIGN.md`, Open Question 3, for the `belong-to`-
/// adjacent case of an employee record with no department path, which
/// cannot occur here since `DepartmentPath` is non-empty by construction).
pub async fn resolve<S, E>(
    settings: &S,
    employees: &E,
    user_id: UserId,
    domain: PermissionDomain,
) -> QcpResult<EffectiveSetting>
where
    S: SettingRepository,
    E: EmployeeRepository,
{
    let Some(employee) = employees.find_by_user_id(user_id).await? else {
        // Not present in the HR sync: no employee number to key a
        // user-level setting on, and no department path to walk.
        return Ok(EffectiveSetting {
            domain,
            value: SettingValue::domain_default(domain),
            source: None,
        });
    };

    if let Some(setting) = settings.find_user_setting(&employee.employee_number, domain).await? {
        if !setting.value.is_empty() {
            return Ok(EffectiveSetting {
                domain,
                value: setting.value,
                source: Some(setting.target),
            });
        }
    }

    for segment in employee.department_path.leaf_to_root() {
        if let Some(setting) = settings.find_department_setting(segment, domain).await? {
            if !setting.value.is_empty() {
                return Ok(EffectiveSetting {
                    domain,
                    value: setting.value,
                    source: Some(setting.target),
                });
            }
        }
    }

    Ok(EffectiveSetting {
        domain,
        value: SettingValue::domain_default(domain),
        source: None,
    })
}

/// Resolve all three domains for a user in one pass.
pub async fn resolve_all<S, E>(
    settings: &S,
    employees: &E,
    user_id: UserId,
) -> QcpResult<Vec<EffectiveSetting>>
where
    S: SettingRepository,
    E: EmployeeRepository,
{
    let mut out = Vec::with_capacity(PermissionDomain::ALL.len());
    for domain in PermissionDomain::ALL {
        out.push(resolve(settings, employees, user_id, domain).await?);
    }
    Ok(out)
}

/// Require the employee record to exist; used by admin-facing callers
/// that need the employee number, not just the resolved value.
pub async fn require_employee<E: EmployeeRepository>(
    employees: &E,
    user_id: UserId,
) -> QcpResult<crate::employee::EmployeeDepartment> {
    employees
        .find_by_user_id(user_id)
        .await?
        .ok_or_else(|| QcpError::NotFound { kind: "employee", id: user_id.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::employee::EmployeeDepartment;
    use crate::setting::Setting;
    use chrono::Utc;
    use qcp_common::{DepartmentPath, EmployeeNumber};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeEmployees(HashMap<UserId, EmployeeDepartment>);

    impl EmployeeRepository for FakeEmployees {
        async fn find_by_employee_number(
            &self,
            employee_number: &EmployeeNumber,
        ) -> Result<Option<EmployeeDepartment>, QcpError> {
            Ok(self.0.values().find(|e| &e.employee_number == employee_number).cloned())
        }

        async fn find_by_user_id(&self, user_id: UserId) -> Result<Option<EmployeeDepartment>, QcpError> {
            Ok(self.0.get(&user_id).cloned())
        }

        async fn upsert(&self, _record: &EmployeeDepartment) -> Result<(), QcpError> {
            unimplemented!("not exercised by resolver tests")
        }
    }

    struct FakeSettings(Mutex<Vec<Setting>>);

    impl SettingRepository for FakeSettings {
        async fn find_user_setting(
            &self,
            employee_number: &EmployeeNumber,
            domain: PermissionDomain,
        ) -> Result<Option<Setting>, QcpError> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.domain == domain && s.target == TargetType::User(employee_number.clone()))
                .cloned())
        }

        async fn find_department_setting(
            &self,
            department: &str,
            domain: PermissionDomain,
        ) -> Result<Option<Setting>, QcpError> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.domain == domain && s.target == TargetType::Department(department.to_string()))
                .cloned())
        }

        async fn upsert_setting(&self, setting: &Setting) -> Result<(), QcpError> {
            self.0.lock().unwrap().push(setting.clone());
            Ok(())
        }

        async fn delete_setting(&self, _target: &TargetType, _domain: PermissionDomain) -> Result<(), QcpError> {
            Ok(())
        }
    }

    fn employee(user_id: UserId, employee_number: &str, path: &str) -> EmployeeDepartment {
        EmployeeDepartment {
            employee_number: EmployeeNumber::new(employee_number).unwrap(),
            user_id,
            department_path: DepartmentPath::parse(path).unwrap(),
            synced_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn user_level_setting_wins_over_department() {
        let user = UserId::new();
        let employees = FakeEmployees(HashMap::from([(user, employee(user, "E1", "Root,Eng,Team"))]));
        let settings = FakeSettings(Mutex::new(vec![
            Setting::new(
                TargetType::User(EmployeeNumber::new("E1").unwrap()),
                PermissionDomain::StarCheck,
                SettingValue::Flag(true),
            )
            .unwrap(),
            Setting::new(
                TargetType::Department("Team".to_string()),
                PermissionDomain::StarCheck,
                SettingValue::Flag(false),
            )
            .unwrap(),
        ]));

        let effective = resolve(&settings, &employees, user, PermissionDomain::StarCheck).await.unwrap();
        assert_eq!(effective.value, SettingValue::Flag(true));
    }

    #[tokio::test]
    async fn department_resolution_walks_leaf_to_root() {
        let user = UserId::new();
        let employees = FakeEmployees(HashMap::from([(user, employee(user, "E1", "Root,Eng,Team"))]));
        let settings = FakeSettings(Mutex::new(vec![Setting::new(
            TargetType::Department("Eng".to_string()),
            PermissionDomain::QuotaCheck,
            SettingValue::Flag(true),
        )
        .unwrap()]));

        let effective = resolve(&settings, &employees, user, PermissionDomain::QuotaCheck).await.unwrap();
        assert_eq!(effective.value, SettingValue::Flag(true));
        assert_eq!(effective.source, Some(TargetType::Department("Eng".to_string())));
    }

    #[tokio::test]
    async fn empty_user_level_whitelist_falls_through_to_department() {
        let user = UserId::new();
        let employees = FakeEmployees(HashMap::from([(user, employee(user, "E1", "Root,Eng,Team"))]));
        let settings = FakeSettings(Mutex::new(vec![
            Setting::new(
                TargetType::Department("Eng".to_string()),
                PermissionDomain::ModelWhitelist,
                SettingValue::ModelWhitelist(vec!["gpt-4".to_string(), "claude-3".to_string()]),
            )
            .unwrap(),
            Setting::new(
                TargetType::User(EmployeeNumber::new("E1").unwrap()),
                PermissionDomain::ModelWhitelist,
                SettingValue::ModelWhitelist(Vec::new()),
            )
            .unwrap(),
        ]));

        let effective = resolve(&settings, &employees, user, PermissionDomain::ModelWhitelist).await.unwrap();
        assert_eq!(
            effective.value,
            SettingValue::ModelWhitelist(vec!["gpt-4".to_string(), "claude-3".to_string()])
        );
        assert_eq!(effective.source, Some(TargetType::Department("Eng".to_string())));
    }

    #[tokio::test]
    async fn falls_back_to_domain_default_when_nothing_set() {
        let user = UserId::new();
        let employees = FakeEmployees(HashMap::from([(user, employee(user, "E1", "Root"))]));
        let settings = FakeSettings(Mutex::new(vec![]));

        let effective = resolve(&settings, &employees, user, PermissionDomain::ModelWhitelist).await.unwrap();
        assert_eq!(effective.value, SettingValue::ModelWhitelist(Vec::new()));
        assert_eq!(effective.source, None);
    }

    #[tokio::test]
    async fn unknown_employee_falls_back_to_default() {
        let user = UserId::new();
        let employees = FakeEmployees(HashMap::new());
        let settings = FakeSettings(Mutex::new(vec![]));

        let effective = resolve(&settings, &employees, user, PermissionDomain::StarCheck).await.unwrap();
        assert_eq!(effective.value, SettingValue::Flag(false));
    }
}
