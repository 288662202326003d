//! Property-based tests for layered permission resolution.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use proptest::prelude::*;
use qcp_common::{DepartmentPath, EmployeeNumber, QcpError, UserId};
use qcp_permissions::{resolver, EmployeeDepartment, EmployeeRepository, PermissionDomain, Setting, SettingRepository, SettingValue, TargetType};

struct FakeEmployees(HashMap<UserId, EmployeeDepartment>);

impl EmployeeRepository for FakeEmployees {
    async fn find_by_employee_number(&self, employee_number: &EmployeeNumber) -> Result<Option<EmployeeDepartment>, QcpError> {
        Ok(self.0.values().find(|e| &e.employee_number == employee_number).cloned())
    }

    async fn find_by_user_id(&self, user_id: UserId) -> Result<Option<EmployeeDepartment>, QcpError> {
        Ok(self.0.get(&user_id).cloned())
    }

    async fn upsert(&self, _record: &EmployeeDepartment) -> Result<(), QcpError> {
        unimplemented!("not exercised by this property test")
    }
}

struct FakeSettings(Mutex<Vec<Setting>>);

impl SettingRepository for FakeSettings {
    async fn find_user_setting(&self, _employee_number: &EmployeeNumber, _domain: PermissionDomain) -> Result<Option<Setting>, QcpError> {
        Ok(None)
    }

    async fn find_department_setting(&self, department: &str, domain: PermissionDomain) -> Result<Option<Setting>, QcpError> {
        Ok(self.0.lock().unwrap().iter().find(|s| s.domain == domain && s.target == TargetType::Department(department.to_string())).cloned())
    }

    async fn upsert_setting(&self, setting: &Setting) -> Result<(), QcpError> {
        self.0.lock().unwrap().push(setting.clone());
        Ok(())
    }

    async fn delete_setting(&self, _target: &TargetType, _domain: PermissionDomain) -> Result<(), QcpError> {
        unimplemented!("not exercised by this property test")
    }
}

fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_-]{0,10}"
}

proptest! {
    #[test]
    fn prop_resolution_picks_nearest_ancestor_with_a_setting(
        segments in prop::collection::vec(segment(), 1..6),
        setting_depth in 0usize..6,
    ) {
        tokio::runtime::Runtime::new().unwrap().block_on(async move {
            let setting_depth = setting_depth.min(segments.len() - 1);
            let department_path = DepartmentPath::parse(&segments.join(",")).unwrap();

            let user = UserId::new();
            let employee_number = EmployeeNumber::new("E1").unwrap();
            let employees = FakeEmployees(HashMap::from([(
                user,
                EmployeeDepartment { employee_number, user_id: user, department_path, synced_at: Utc::now() },
            )]));

            let settings = FakeSettings(Mutex::new(Vec::new()));
            let target_department = segments[setting_depth].clone();
            settings
                .upsert_setting(
                    &Setting::new(
                        TargetType::Department(target_department.clone()),
                        PermissionDomain::StarCheck,
                        SettingValue::Flag(true),
                    )
                    .unwrap(),
                )
                .await
                .unwrap();

            let effective = resolver::resolve(&settings, &employees, user, PermissionDomain::StarCheck).await.unwrap();

            // Exactly one department in the chain carries a setting; the
            // leaf-to-root walk must find it regardless of its depth.
            prop_assert_eq!(effective.source, Some(TargetType::Department(target_department)));
            prop_assert_eq!(effective.value, SettingValue::Flag(true));
        });
    }

    #[test]
    fn prop_no_setting_anywhere_falls_back_to_domain_default(segments in prop::collection::vec(segment(), 1..6)) {
        tokio::runtime::Runtime::new().unwrap().block_on(async move {
            let department_path = DepartmentPath::parse(&segments.join(",")).unwrap();
            let user = UserId::new();
            let employee_number = EmployeeNumber::new("E2").unwrap();
            let employees = FakeEmployees(HashMap::from([(
                user,
                EmployeeDepartment { employee_number, user_id: user, department_path, synced_at: Utc::now() },
            )]));
            let settings = FakeSettings(Mutex::new(Vec::new()));

            let effective = resolver::resolve(&settings, &employees, user, PermissionDomain::QuotaCheck).await.unwrap();
            prop_assert_eq!(effective.source, None);
            prop_assert_eq!(effective.value, SettingValue::domain_default(PermissionDomain::QuotaCheck));
        });
    }
}
