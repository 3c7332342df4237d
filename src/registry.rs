//! Command registry
//!
//! Maps command names to the driver operations they trigger. A registry is
//! filled once per device session by its drivers and then shared read-only
//! by every step of the run.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::common::error::{OperationError, RegistryError};

/// Parameter-count contract of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many parameters
    Exact(usize),
    /// This many or more
    AtLeast(usize),
    /// No constraint
    Any,
}

impl Arity {
    /// Check whether a parameter count satisfies this contract
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == *n,
            Arity::AtLeast(n) => count >= *n,
            Arity::Any => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

type Handler = dyn Fn(&[i64]) -> Result<(), OperationError> + Send + Sync;

/// An invocable driver operation with its arity contract
#[derive(Clone)]
pub struct Operation {
    name: String,
    arity: Arity,
    handler: Arc<Handler>,
}

impl Operation {
    /// Wrap a handler under a command name
    pub fn new<F>(name: impl Into<String>, arity: Arity, handler: F) -> Self
    where
        F: Fn(&[i64]) -> Result<(), OperationError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Validate the parameter count, then run the handler
    pub fn invoke(&self, params: &[i64]) -> Result<(), OperationError> {
        if !self.arity.accepts(params.len()) {
            return Err(OperationError::ArityMismatch {
                command: self.name.clone(),
                expected: self.arity,
                got: params.len(),
            });
        }
        (self.handler)(params)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Registered entry: the operation and the driver that provided it
#[derive(Debug, Clone)]
struct Entry {
    owner: String,
    operation: Operation,
}

/// Listing row for a registered command
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommandInfo {
    pub name: String,
    pub arity: String,
    pub driver: String,
}

/// Name-keyed table of driver operations
#[derive(Debug, Default)]
pub struct CommandRegistry {
    entries: HashMap<String, Entry>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation on behalf of a driver
    ///
    /// Drivers must use disjoint command names; a second registration of the
    /// same name is rejected.
    pub fn register(&mut self, owner: &str, operation: Operation) -> Result<(), RegistryError> {
        if let Some(existing) = self.entries.get(operation.name()) {
            return Err(RegistryError::DuplicateCommand {
                name: operation.name().to_string(),
                owner: existing.owner.clone(),
            });
        }

        tracing::trace!(command = operation.name(), driver = owner, "Registered command");
        self.entries.insert(
            operation.name().to_string(),
            Entry {
                owner: owner.to_string(),
                operation,
            },
        );
        Ok(())
    }

    /// Look up a command by exact, case-sensitive name
    pub fn resolve(&self, name: &str) -> Result<&Operation, RegistryError> {
        self.entries
            .get(name)
            .map(|e| &e.operation)
            .ok_or_else(|| RegistryError::UnknownCommand(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered commands, sorted by name
    pub fn commands(&self) -> Vec<CommandInfo> {
        let mut list: Vec<CommandInfo> = self
            .entries
            .iter()
            .map(|(name, entry)| CommandInfo {
                name: name.clone(),
                arity: entry.operation.arity().to_string(),
                driver: entry.owner.clone(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }
}
