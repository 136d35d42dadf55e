use std::fmt;

use crate::value::Value;

/// Reserved parameter name recognized as the tenant id slot.
pub const TENANT_ID_ARG: &str = "tenantid";

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is_tenant_id(&self) -> bool {
        self.name == TENANT_ID_ARG
    }
}

/// A compiled database command: text plus positional parameters.
///
/// The parameter at index `i` is bound to placeholder `$i+1` of the text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub text: String,
    pub parameters: Vec<Parameter>,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn tenant_parameter(&self) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.is_tenant_id())
    }

    /// Overwrites the reserved tenant slot, if the command has one.
    ///
    /// Returns `false` and leaves the command untouched when there is no
    /// slot (single tenant mode).
    pub fn set_tenant_id(&mut self, tenant_id: &str) -> bool {
        match self.parameters.iter_mut().find(|p| p.is_tenant_id()) {
            Some(parameter) => {
                parameter.value = Value::Text(tenant_id.to_owned());
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// An ordered set of independently parameterized commands sent together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Binds the tenant id of the first command only.
    ///
    /// Tenancy is fixed per physical batch: sub-commands after the first keep
    /// whatever their tenant slot held when compiled, so batches mixing
    /// tenants are not supported.
    pub fn set_tenant_id(&mut self, tenant_id: &str) -> bool {
        match self.commands.first_mut() {
            Some(command) => command.set_tenant_id(tenant_id),
            None => false,
        }
    }

    pub fn text(&self) -> String {
        self.commands
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(";\n")
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
