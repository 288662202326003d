//! `PermissionService`: the façade the rest of the control plane calls into
//! for permission reads/writes (`spec.md` §4.2).

use qcp_common::{GatewayClient, QcpResult, UserId};

use crate::employee::EmployeeRepository;
use crate::notifier::PermissionNotifier;
use crate::repository::SettingRepository;
use crate::resolver::{self, EffectiveSetting};
use crate::setting::{PermissionDomain, Setting, SettingValue, TargetType};

pub struct PermissionService<S: SettingRepository, E: EmployeeRepository, G: GatewayClient> {
    settings: S,
    employees: E,
    notifier: PermissionNotifier<G>,
}

impl<S: SettingRepository, E: EmployeeRepository, G: GatewayClient> PermissionService<S, E, G> {
    pub fn new(settings: S, employees: E, gateway: G) -> Self {
        Self { settings, employees, notifier: PermissionNotifier::new(gateway) }
    }

    /// Resolve every domain's effective value for a user.
    pub async fn get_effective(&self, user_id: UserId) -> QcpResult<Vec<EffectiveSetting>> {
        resolver::resolve_all(&self.settings, &self.employees, user_id).await
    }

    /// Write a setting, then re-resolve and push only what changed for
    /// every user the write could affect.
    ///
    /// For a user-level target that is exactly one user. For a department
    /// target, this only recomputes the single employee passed in
    /// `affected_user_id` — a full department-wide recompute (every
    /// employee under that department) is the HR sync ingester's
    /// responsibility to trigger, since it is the component that already
    /// knows department membership in bulk (`spec.md` §1).
    pub async fn set_setting(
        &self,
        target: TargetType,
        domain: PermissionDomain,
        value: SettingValue,
        affected_user_id: UserId,
    ) -> QcpResult<()> {
        let previous = resolver::resolve(&self.settings, &self.employees, affected_user_id, domain).await?;

        let setting = Setting::new(target, domain, value)?;
        self.settings.upsert_setting(&setting).await?;

        let employee = resolver::require_employee(&self.employees, affected_user_id).await?;
        let current = resolver::resolve(&self.settings, &self.employees, affected_user_id, domain).await?;

        self.notifier
            .notify_diff(&employee.employee_number, &[previous], &[current])
            .await?;
        Ok(())
    }

    /// Re-resolve and push every domain for a user unconditionally, e.g.
    /// right after an HR sync moves them to a new department.
    pub async fn resync_user(&self, user_id: UserId) -> QcpResult<usize> {
        let employee = resolver::require_employee(&self.employees, user_id).await?;
        let current = resolver::resolve_all(&self.settings, &self.employees, user_id).await?;
        self.notifier.notify_all(&employee.employee_number, &current).await
    }
}
