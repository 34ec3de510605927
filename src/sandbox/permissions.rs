//! Permission model: whitelist items, per-service controls and method whitelists.
//!
//! Every optional flag stays `None` until the caller sets it. Downstream,
//! `None` means "emit no directive" and is distinct from `Some(false)`.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, SandboxError};

/// A resource (Drive file id) the script may access, with optional grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistItem {
    /// Resource identifier.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trash: Option<bool>,
}

impl WhitelistItem {
    /// Create an item with no explicit grants.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            read: None,
            write: None,
            trash: None,
        }
    }

    pub fn read(mut self, allow: bool) -> Self {
        self.read = Some(allow);
        self
    }

    pub fn write(mut self, allow: bool) -> Self {
        self.write = Some(allow);
        self
    }

    pub fn trash(mut self, allow: bool) -> Self {
        self.trash = Some(allow);
        self
    }
}

/// Per-service override of the global sandbox behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_sandbox: Option<bool>,
}

impl ServiceControl {
    /// Overlay `later` on top of `self`, field by field.
    pub fn merge(&mut self, later: ServiceControl) {
        self.enabled = later.enabled.or(self.enabled);
        self.sandbox_mode = later.sandbox_mode.or(self.sandbox_mode);
        self.strict_sandbox = later.strict_sandbox.or(self.strict_sandbox);
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.sandbox_mode.is_none() && self.strict_sandbox.is_none()
    }
}

/// Service controls keyed by service name, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ServiceControls(IndexMap<String, ServiceControl>);

impl ServiceControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a control block to a service.
    ///
    /// A repeated service keeps its original position and has only the
    /// fields set in `control` overridden.
    pub fn apply(&mut self, service: impl Into<String>, control: ServiceControl) {
        let service = service.into();
        match self.0.get_mut(&service) {
            Some(existing) => existing.merge(control),
            None => {
                self.0.insert(service, control);
            }
        }
    }

    pub fn get(&self, service: &str) -> Option<&ServiceControl> {
        self.0.get(service)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ServiceControl)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for ServiceControls {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ControlsVisitor;

        impl<'de> Visitor<'de> for ControlsVisitor {
            type Value = ServiceControls;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of service names to control blocks")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut controls = ServiceControls::new();
                while let Some((service, control)) = map.next_entry::<String, ServiceControl>()? {
                    controls.apply(service, control);
                }
                Ok(controls)
            }
        }

        deserializer.deserialize_map(ControlsVisitor)
    }
}

/// Allowed method names per service, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodWhitelists(IndexMap<String, Vec<String>>);

impl MethodWhitelists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whitelist for a service (reset-then-add).
    pub fn set<I, S>(&mut self, service: impl Into<String>, methods: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(service.into(), methods.into_iter().map(Into::into).collect());
    }

    pub fn get(&self, service: &str) -> Option<&[String]> {
        self.0.get(service).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The full permission configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub sandbox_enabled: bool,
    pub strict_sandbox: Option<bool>,
    pub cleanup_on_exit: Option<bool>,
    pub whitelist: Vec<WhitelistItem>,
    pub service_controls: ServiceControls,
    pub method_whitelists: MethodWhitelists,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            sandbox_enabled: true,
            strict_sandbox: None,
            cleanup_on_exit: None,
            whitelist: Vec::new(),
            service_controls: ServiceControls::new(),
            method_whitelists: MethodWhitelists::new(),
        }
    }
}

impl SandboxConfig {
    /// Check the cross-field constraints of the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.sandbox_enabled && !self.whitelist.is_empty() {
            return Err(SandboxError::Config(
                "a whitelist cannot be used when the sandbox is disabled".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.whitelist.len());
        for item in &self.whitelist {
            if item.id.trim().is_empty() {
                return Err(SandboxError::Config(
                    "whitelist item id must not be blank".to_string(),
                ));
            }
            if !seen.insert(item.id.as_str()) {
                return Err(SandboxError::Config(format!(
                    "duplicate whitelist id: {}",
                    item.id
                )));
            }
        }

        for (service, _) in self.service_controls.iter() {
            validate_service_name(service)?;
        }
        for (service, methods) in self.method_whitelists.iter() {
            validate_service_name(service)?;
            if methods.iter().any(|m| m.trim().is_empty()) {
                return Err(SandboxError::Config(format!(
                    "method whitelist for {service} contains a blank method name"
                )));
            }
        }

        Ok(())
    }
}

/// Service names are rendered as property names, so they must be identifiers.
fn validate_service_name(service: &str) -> Result<()> {
    let mut chars = service.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_' || first == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(SandboxError::Config(format!(
            "invalid service name: {service:?}"
        )))
    }
}
