//! Delta-only gateway notification (`spec.md` §4.2, "Notifier").
//!
//! The gateway is only called for a domain whose effective value actually
//! changed since the last resolution; re-resolving a user who has no
//! settings anywhere must not produce gateway traffic every time.

use qcp_common::{EmployeeNumber, GatewayClient, QcpResult};

use crate::resolver::EffectiveSetting;
use crate::setting::{PermissionDomain, SettingValue};

pub struct PermissionNotifier<G: GatewayClient> {
    gateway: G,
}

impl<G: GatewayClient> PermissionNotifier<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    /// Push only the domains whose value in `current` differs from
    /// `previous` (matched by domain; a domain missing from `previous` is
    /// treated as changed). Returns how many gateway calls were made.
    pub async fn notify_diff(
        &self,
        employee_number: &EmployeeNumber,
        previous: &[EffectiveSetting],
        current: &[EffectiveSetting],
    ) -> QcpResult<usize> {
        let mut pushed = 0;
        for next in current {
            let changed = match previous.iter().find(|p| p.domain == next.domain) {
                Some(prev) => prev.value != next.value,
                None => true,
            };
            if !changed {
                continue;
            }
            self.push_one(employee_number, next).await?;
            pushed += 1;
        }
        Ok(pushed)
    }

    /// Push every domain unconditionally, e.g. for a first-time resolution
    /// or a manual resync.
    pub async fn notify_all(&self, employee_number: &EmployeeNumber, current: &[EffectiveSetting]) -> QcpResult<usize> {
        for setting in current {
            self.push_one(employee_number, setting).await?;
        }
        Ok(current.len())
    }

    async fn push_one(&self, employee_number: &EmployeeNumber, setting: &EffectiveSetting) -> QcpResult<()> {
        match (&setting.value, setting.domain) {
            (SettingValue::ModelWhitelist(models), PermissionDomain::ModelWhitelist) => {
                if models.is_empty() {
                    self.gateway.delete_model_whitelist(employee_number.as_str()).await
                } else {
                    self.gateway.set_model_whitelist(employee_number.as_str(), models).await
                }
            }
            (SettingValue::Flag(enabled), PermissionDomain::StarCheck) => {
                self.gateway.set_star_check(employee_number.as_str(), *enabled).await
            }
            (SettingValue::Flag(enabled), PermissionDomain::QuotaCheck) => {
                self.gateway.set_quota_check(employee_number.as_str(), *enabled).await
            }
            _ => unreachable!("SettingValue is constructed to always match its own domain"),
        }
    }
}
