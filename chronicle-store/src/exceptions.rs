use crate::{
    error::{ChronicleError, ConflictReason},
    logger::StatementRef,
};

/// SQLSTATE codes the default rules look for.
pub mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FEATURE_NOT_SUPPORTED: &str = "0A000";
    pub const SERIALIZATION_FAILURE: &str = "40001";
}

/// What the session knew about the call that failed.
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    pub statement: Option<StatementRef<'a>>,
    pub tenant_id: &'a str,
}

type Predicate = Box<dyn Fn(&sqlx::Error) -> bool + Send + Sync>;
type Factory = Box<dyn Fn(sqlx::Error, &FailureContext<'_>) -> ChronicleError + Send + Sync>;

pub struct TransformRule {
    name: String,
    predicate: Predicate,
    factory: Factory,
}

impl TransformRule {
    pub fn new<P, F>(name: impl Into<String>, predicate: P, factory: F) -> Self
    where
        P: Fn(&sqlx::Error) -> bool + Send + Sync + 'static,
        F: Fn(sqlx::Error, &FailureContext<'_>) -> ChronicleError + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            factory: Box::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, error: &sqlx::Error) -> bool {
        (self.predicate)(error)
    }
}

/// Ordered rules turning driver failures into [`ChronicleError`]s.
///
/// The first matching rule wins. A failure no rule matches comes back as
/// [`ChronicleError::Driver`] with the statement attached.
#[derive(Default)]
pub struct ExceptionTransforms {
    rules: Vec<TransformRule>,
}

impl ExceptionTransforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built in rules, in evaluation order:
    ///
    /// 1. unique violation on `version_constraint`: stream version conflict
    /// 2. feature not supported: [`ChronicleError::CommandNotSupported`]
    /// 3. serialization failure: concurrent update conflict
    /// 4. any other database or connection failure: [`ChronicleError::CommandExecution`]
    pub fn with_defaults(version_constraint: impl Into<String>) -> Self {
        let version_constraint = version_constraint.into();
        let mut transforms = Self::new();

        transforms.push(TransformRule::new(
            "stream-version-conflict",
            move |error| {
                has_code(error, sqlstate::UNIQUE_VIOLATION)
                    && constraint(error) == Some(version_constraint.as_str())
            },
            |error, context| ChronicleError::WriteConflict {
                reason: ConflictReason::StreamVersion,
                statement: context.statement.map(StatementRef::to_failed),
                source: Some(error),
            },
        ));

        transforms.push(TransformRule::new(
            "command-not-supported",
            |error| has_code(error, sqlstate::FEATURE_NOT_SUPPORTED),
            |error, context| ChronicleError::CommandNotSupported {
                statement: context.statement.map(StatementRef::to_failed),
                source: error,
            },
        ));

        transforms.push(TransformRule::new(
            "serialization-failure",
            |error| has_code(error, sqlstate::SERIALIZATION_FAILURE),
            |error, context| ChronicleError::WriteConflict {
                reason: ConflictReason::Serialization,
                statement: context.statement.map(StatementRef::to_failed),
                source: Some(error),
            },
        ));

        transforms.push(TransformRule::new(
            "command-execution",
            |error| {
                matches!(
                    error,
                    sqlx::Error::Database(_)
                        | sqlx::Error::Io(_)
                        | sqlx::Error::Tls(_)
                        | sqlx::Error::Protocol(_)
                        | sqlx::Error::PoolTimedOut
                )
            },
            |error, context| ChronicleError::CommandExecution {
                command: context
                    .statement
                    .map(|statement| statement.text())
                    .unwrap_or_default(),
                tenant_id: context.tenant_id.to_owned(),
                statement: context.statement.map(StatementRef::to_failed),
                source: error,
            },
        ));

        transforms
    }

    /// Appends a rule, evaluated after every rule already present.
    pub fn push(&mut self, rule: TransformRule) {
        self.rules.push(rule);
    }

    /// Puts a rule ahead of every other rule.
    pub fn push_front(&mut self, rule: TransformRule) {
        self.rules.insert(0, rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(TransformRule::name).collect()
    }

    pub fn transform(&self, error: sqlx::Error, context: FailureContext<'_>) -> ChronicleError {
        match self.rules.iter().find(|rule| rule.matches(&error)) {
            Some(rule) => {
                tracing::debug!(rule = rule.name(), error = %error, "transforming failure");
                (rule.factory)(error, &context)
            }
            None => ChronicleError::Driver {
                statement: context.statement.map(StatementRef::to_failed),
                source: error,
            },
        }
    }
}

fn has_code(error: &sqlx::Error, code: &str) -> bool {
    match error {
        sqlx::Error::Database(error) => error.code().as_deref() == Some(code),
        _ => false,
    }
}

fn constraint(error: &sqlx::Error) -> Option<&str> {
    match error {
        sqlx::Error::Database(error) => error.constraint(),
        _ => None,
    }
}
