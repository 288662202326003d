//! # qcp-permissions
//!
//! Permission Store, Resolver, and Notifier (`spec.md` §4.2): layered
//! effective-value resolution across three domains, and delta-only
//! notification of the downstream gateway.

pub mod employee;
pub mod notifier;
pub mod repository;
pub mod resolver;
pub mod service;
pub mod setting;

pub use employee::{EmployeeDepartment, EmployeeRepository, PgEmployeeRepository};
pub use notifier::PermissionNotifier;
pub use repository::{PgSettingRepository, SettingRepository};
pub use resolver::EffectiveSetting;
pub use service::PermissionService;
pub use setting::{PermissionDomain, Setting, SettingValue, TargetType};
