use crate::{
    command::{Batch, Command, Parameter, TENANT_ID_ARG},
    value::Value,
};

/// Something that can write itself into a [`CommandBuilder`].
pub trait Statement {
    fn configure(&self, builder: &mut CommandBuilder);
}

impl<S: Statement + ?Sized> Statement for &S {
    fn configure(&self, builder: &mut CommandBuilder) {
        (**self).configure(builder)
    }
}

impl<S: Statement + ?Sized> Statement for Box<S> {
    fn configure(&self, builder: &mut CommandBuilder) {
        (**self).configure(builder)
    }
}

/// Accumulates command text and parameters, keeping `$n` placeholders in
/// step with parameter positions.
#[derive(Debug, Default)]
pub struct CommandBuilder {
    text: String,
    parameters: Vec<Parameter>,
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sql: impl AsRef<str>) -> &mut Self {
        self.text.push_str(sql.as_ref());
        self
    }

    /// Adds a parameter and writes its placeholder at the end of the text.
    pub fn append_parameter(&mut self, value: impl Into<Value>) -> &mut Self {
        let placeholder = self.add_parameter(value);
        self.text.push_str(&placeholder);
        self
    }

    /// Adds a parameter without writing it, returning its placeholder.
    pub fn add_parameter(&mut self, value: impl Into<Value>) -> String {
        let name = format!("p{}", self.parameters.len());
        self.add_named_parameter(name, value)
    }

    pub fn add_named_parameter(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> String {
        self.parameters.push(Parameter::new(name, value));
        format!("${}", self.parameters.len())
    }

    /// Writes the reserved tenant slot, reusing it when already present.
    pub fn append_tenant_parameter(&mut self) -> &mut Self {
        let position = match self.parameters.iter().position(|p| p.is_tenant_id()) {
            Some(index) => index + 1,
            None => {
                self.parameters.push(Parameter::new(TENANT_ID_ARG, Value::Null));
                self.parameters.len()
            }
        };

        self.text.push_str(&format!("${position}"));
        self
    }

    pub fn sql(&self) -> &str {
        &self.text
    }

    pub fn build(self) -> Command {
        Command {
            text: self.text,
            parameters: self.parameters,
        }
    }
}

/// Compiles one statement and binds the tenant slot, if any.
pub fn compile<S: Statement + ?Sized>(statement: &S, tenant_id: &str) -> Command {
    let mut builder = CommandBuilder::new();
    statement.configure(&mut builder);

    let mut command = builder.build();

    if !command.set_tenant_id(tenant_id) {
        tracing::trace!(sql = %command.text, "compiled command without tenant slot");
    }

    command
}

/// Compiles each statement into its own sub-command.
///
/// Only the first sub-command gets the tenant id, see [`Batch::set_tenant_id`].
pub fn compile_batch<'a, S, I>(statements: I, tenant_id: &str) -> Batch
where
    S: Statement + ?Sized + 'a,
    I: IntoIterator<Item = &'a S>,
{
    let mut batch = Batch::new();

    for statement in statements {
        let mut builder = CommandBuilder::new();
        statement.configure(&mut builder);
        batch.push(builder.build());
    }

    batch.set_tenant_id(tenant_id);

    batch
}
