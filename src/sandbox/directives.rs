//! Translation of a [`SandboxConfig`] into an ordered list of sandbox directives.
//!
//! The order is significant: the runtime applies directives top to bottom, so
//! later per-service settings override the global ones set before them.

use tracing::debug;

use crate::error::Result;
use crate::sandbox::permissions::{SandboxConfig, WhitelistItem};

/// A per-service control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlField {
    Enabled,
    SandboxMode,
    StrictSandbox,
}

impl ControlField {
    /// Property name of the field on the runtime's service object.
    pub fn property(self) -> &'static str {
        match self {
            ControlField::Enabled => "enabled",
            ControlField::SandboxMode => "sandboxMode",
            ControlField::StrictSandbox => "strictSandbox",
        }
    }
}

/// One instruction to the sandbox runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    EnableSandbox,
    SetStrictSandbox(bool),
    SetCleanupPolicy(bool),
    SetWhitelist(Vec<WhitelistItem>),
    SetServiceControl {
        service: String,
        field: ControlField,
        value: bool,
    },
    ResetMethodWhitelist {
        service: String,
    },
    AddMethodWhitelist {
        service: String,
        method: String,
    },
    /// Trash every file created during the session. Runs after the caller's script.
    TrashSessionFiles,
}

/// Directives to place before and after the caller's script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectivePlan {
    pub preamble: Vec<Directive>,
    pub trailer: Option<Directive>,
}

impl DirectivePlan {
    /// Validate `config` and build its directives.
    ///
    /// Nothing is produced when validation fails.
    pub fn build(config: &SandboxConfig) -> Result<Self> {
        config.validate()?;

        let mut preamble = Vec::new();

        if config.sandbox_enabled {
            preamble.push(Directive::EnableSandbox);
            if let Some(strict) = config.strict_sandbox {
                preamble.push(Directive::SetStrictSandbox(strict));
            }
            if let Some(cleanup) = config.cleanup_on_exit {
                preamble.push(Directive::SetCleanupPolicy(cleanup));
            }
        } else if config.strict_sandbox.is_some() || config.cleanup_on_exit.is_some() {
            debug!("sandbox disabled, ignoring strictSandbox and cleanup settings");
        }

        if !config.whitelist.is_empty() {
            preamble.push(Directive::SetWhitelist(config.whitelist.clone()));
        }

        for (service, control) in config.service_controls.iter() {
            let fields = [
                (ControlField::Enabled, control.enabled),
                (ControlField::SandboxMode, control.sandbox_mode),
                (ControlField::StrictSandbox, control.strict_sandbox),
            ];
            for (field, value) in fields {
                if let Some(value) = value {
                    preamble.push(Directive::SetServiceControl {
                        service: service.clone(),
                        field,
                        value,
                    });
                }
            }
        }

        for (service, methods) in config.method_whitelists.iter() {
            preamble.push(Directive::ResetMethodWhitelist {
                service: service.clone(),
            });
            preamble.extend(methods.iter().map(|method| Directive::AddMethodWhitelist {
                service: service.clone(),
                method: method.clone(),
            }));
        }

        let trailer = config.sandbox_enabled.then_some(Directive::TrashSessionFiles);

        Ok(Self { preamble, trailer })
    }

    /// Number of directives, trailer included.
    pub fn len(&self) -> usize {
        self.preamble.len() + usize::from(self.trailer.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::permissions::ServiceControl;

    #[test]
    fn test_default_config_directives() {
        let plan = DirectivePlan::build(&SandboxConfig::default()).unwrap();
        assert_eq!(plan.preamble, vec![Directive::EnableSandbox]);
        assert_eq!(plan.trailer, Some(Directive::TrashSessionFiles));
    }

    #[test]
    fn test_sandbox_disabled_has_no_trailer() {
        let config = SandboxConfig {
            sandbox_enabled: false,
            strict_sandbox: Some(true),
            cleanup_on_exit: Some(false),
            ..Default::default()
        };
        let plan = DirectivePlan::build(&config).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_whitelist_with_sandbox_disabled_fails() {
        let config = SandboxConfig {
            sandbox_enabled: false,
            whitelist: vec![WhitelistItem::new("abc")],
            ..Default::default()
        };
        let err = DirectivePlan::build(&config).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_full_ordering() {
        let mut config = SandboxConfig {
            strict_sandbox: Some(false),
            cleanup_on_exit: Some(true),
            whitelist: vec![WhitelistItem::new("file-1").read(true)],
            ..Default::default()
        };
        config.service_controls.apply(
            "DriveApp",
            ServiceControl {
                strict_sandbox: Some(true),
                enabled: Some(true),
                ..Default::default()
            },
        );
        config.method_whitelists.set("DriveApp", ["getFiles", "getFolders"]);

        let plan = DirectivePlan::build(&config).unwrap();
        let drive = || "DriveApp".to_string();
        assert_eq!(
            plan.preamble,
            vec![
                Directive::EnableSandbox,
                Directive::SetStrictSandbox(false),
                Directive::SetCleanupPolicy(true),
                Directive::SetWhitelist(vec![WhitelistItem::new("file-1").read(true)]),
                Directive::SetServiceControl {
                    service: drive(),
                    field: ControlField::Enabled,
                    value: true,
                },
                Directive::SetServiceControl {
                    service: drive(),
                    field: ControlField::StrictSandbox,
                    value: true,
                },
                Directive::ResetMethodWhitelist { service: drive() },
                Directive::AddMethodWhitelist {
                    service: drive(),
                    method: "getFiles".to_string(),
                },
                Directive::AddMethodWhitelist {
                    service: drive(),
                    method: "getFolders".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_empty_method_list_still_resets() {
        let mut config = SandboxConfig::default();
        config.method_whitelists.set("GmailApp", Vec::<String>::new());

        let plan = DirectivePlan::build(&config).unwrap();
        assert_eq!(
            plan.preamble.last(),
            Some(&Directive::ResetMethodWhitelist {
                service: "GmailApp".to_string()
            })
        );
    }

    #[test]
    fn test_services_follow_insertion_order() {
        let mut config = SandboxConfig::default();
        for service in ["SpreadsheetApp", "DriveApp", "CalendarApp"] {
            config.service_controls.apply(
                service,
                ServiceControl {
                    enabled: Some(false),
                    ..Default::default()
                },
            );
        }

        let plan = DirectivePlan::build(&config).unwrap();
        let services: Vec<&str> = plan
            .preamble
            .iter()
            .filter_map(|d| match d {
                Directive::SetServiceControl { service, .. } => Some(service.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(services, ["SpreadsheetApp", "DriveApp", "CalendarApp"]);
    }
}
