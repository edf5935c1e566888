//! Error types used by the stackvisor runtime.
//!
//! Errors are split by concern:
//!
//! - [`SecretError`]: provisioning or loading the shared JWT secret.
//! - [`GraphError`]: building the dependency graph (duplicates, unknown names, cycles).
//! - [`DescriptorError`]: loading and validating the deployment descriptor.
//! - [`RuntimeError`]: faults raised while the supervisor drives services.
//! - [`ProcessError`]: spawning and signalling a single child process.
//!
//! [`Error`] unifies them for the binary and maps each to a process exit code:
//! configuration faults exit with `2`, runtime faults with `1`.
//!
//! Every enum provides `as_label()`: a short, stable snake_case label for logs.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Exit code for configuration faults (cycles, unknown dependencies, bad descriptor, bad secret).
pub const EXIT_CONFIG_FAULT: u8 = 2;
/// Exit code for runtime faults (dependency timeout, failed service, spawn failure).
pub const EXIT_RUNTIME_FAULT: u8 = 1;

/// # Errors produced while provisioning the shared secret.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SecretError {
    /// The secret file could not be read, written or renamed.
    #[error("secret file {path}: {source}")]
    Io {
        /// Path of the secret file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The existing secret file does not hold a valid hex secret of the required length.
    #[error("malformed secret in {path}: {reason}")]
    Malformed {
        /// Path of the secret file.
        path: PathBuf,
        /// What is wrong with the content.
        reason: String,
    },
}

impl SecretError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SecretError::Io { .. } => "secret_io",
            SecretError::Malformed { .. } => "secret_malformed",
        }
    }
}

/// # Errors produced while resolving service dependencies.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two services share the same name.
    #[error("service '{name}' is declared more than once")]
    DuplicateService {
        /// The duplicated name.
        name: String,
    },

    /// A `depends_on` entry references a name that is not declared.
    #[error("service '{service}' depends on undeclared service '{missing}'")]
    UnknownDependency {
        /// Service declaring the dependency.
        service: String,
        /// The undeclared dependency name.
        missing: String,
    },

    /// The dependency edges form a cycle.
    #[error("dependency cycle: {}", participants.join(" -> "))]
    Cycle {
        /// Services on the cycle, in traversal order.
        participants: Vec<String>,
    },
}

impl GraphError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            GraphError::DuplicateService { .. } => "graph_duplicate_service",
            GraphError::UnknownDependency { .. } => "graph_unknown_dependency",
            GraphError::Cycle { .. } => "graph_cycle",
        }
    }
}

/// # Errors produced while loading the deployment descriptor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DescriptorError {
    /// Error from the figment configuration layer (syntax, types, missing fields).
    #[error("descriptor error: {0}")]
    Figment(Box<figment::Error>),

    /// The descriptor file does not exist.
    #[error("descriptor file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The descriptor parsed but is semantically invalid.
    #[error("invalid service '{service}': {reason}")]
    Invalid {
        /// Offending service (or `deployment` for top-level fields).
        service: String,
        /// What is wrong.
        reason: String,
    },
}

impl From<figment::Error> for DescriptorError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl DescriptorError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DescriptorError::Figment(_) => "descriptor_parse",
            DescriptorError::FileNotFound(_) => "descriptor_not_found",
            DescriptorError::Invalid { .. } => "descriptor_invalid",
        }
    }
}

/// # Errors produced by the supervisor while driving a deployment.
///
/// Any of these raised by [`Supervisor::start`](crate::Supervisor::start) has already
/// triggered a reverse-order teardown of whatever was started.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A dependency did not become healthy within the configured timeout.
    #[error("service '{service}' timed out after {timeout:?} waiting for '{dependency}' to become healthy")]
    DependencyTimeout {
        /// Service that was waiting.
        service: String,
        /// Dependency that never became healthy.
        dependency: String,
        /// The configured dependency timeout.
        timeout: Duration,
    },

    /// A dependency reached a terminal state while a dependent was waiting for it.
    #[error("service '{service}' cannot start: dependency '{dependency}' failed")]
    DependencyFailed {
        /// Service that was waiting.
        service: String,
        /// Dependency that failed or stopped.
        dependency: String,
    },

    /// The service process could not be spawned.
    #[error("failed to spawn service '{service}': {reason}")]
    SpawnFailed {
        /// Service name.
        service: String,
        /// Spawn failure details.
        reason: String,
    },

    /// A service ended in the `Failed` state while the deployment was running.
    #[error("service '{service}' failed")]
    ServiceFailed {
        /// Service name.
        service: String,
    },

    /// Startup was aborted by a deployment-level cancellation.
    #[error("deployment startup cancelled")]
    Cancelled,

    /// Some monitors did not finish within the shutdown grace period.
    #[error("shutdown grace {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Services whose monitors did not exit in time.
        stuck: Vec<String>,
    },

    /// I/O failure outside a single service (runtime dir, pid file, signals).
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use stackvisor::RuntimeError;
    ///
    /// let err = RuntimeError::Cancelled;
    /// assert_eq!(err.as_label(), "runtime_cancelled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::DependencyTimeout { .. } => "runtime_dependency_timeout",
            RuntimeError::DependencyFailed { .. } => "runtime_dependency_failed",
            RuntimeError::SpawnFailed { .. } => "runtime_spawn_failed",
            RuntimeError::ServiceFailed { .. } => "runtime_service_failed",
            RuntimeError::Cancelled => "runtime_cancelled",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Io { .. } => "runtime_io",
        }
    }
}

/// # Errors produced while launching or signalling one child process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The executable could not be started.
    #[error("spawn '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An argument or environment template could not be expanded.
    #[error("{0}")]
    Template(String),

    /// A mount could not be prepared on the host.
    #[error("mount {}: {reason}", host.display())]
    Mount {
        /// Host side of the mount.
        host: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Delivering a signal to the child failed.
    #[error("signal pid {pid}: {reason}")]
    Signal {
        /// Target process id.
        pid: u32,
        /// Failure details.
        reason: String,
    },

    /// Waiting on the child failed.
    #[error("wait: {0}")]
    Wait(#[source] std::io::Error),
}

/// Top-level error for the binary: wraps every concern and maps it to an exit code.
#[derive(Error, Debug)]
pub enum Error {
    /// Descriptor could not be loaded.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    /// Dependency graph is invalid.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Secret could not be provisioned.
    #[error(transparent)]
    Secret(#[from] SecretError),
    /// Runtime fault.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    /// True for faults detected before any process is spawned.
    ///
    /// A secret I/O failure (e.g. unwritable directory) is an environment problem,
    /// only malformed existing content counts as configuration.
    pub fn is_config_fault(&self) -> bool {
        match self {
            Error::Descriptor(_) | Error::Graph(_) => true,
            Error::Secret(SecretError::Malformed { .. }) => true,
            Error::Secret(_) | Error::Runtime(_) => false,
        }
    }

    /// Process exit code: `2` for configuration faults, `1` otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.is_config_fault() {
            EXIT_CONFIG_FAULT
        } else {
            EXIT_RUNTIME_FAULT
        }
    }

    /// Returns the label of the wrapped error.
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::Descriptor(e) => e.as_label(),
            Error::Graph(e) => e.as_label(),
            Error::Secret(e) => e.as_label(),
            Error::Runtime(e) => e.as_label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_faults_are_configuration_faults() {
        let err = Error::from(GraphError::Cycle {
            participants: vec!["a".into(), "b".into()],
        });
        assert!(err.is_config_fault());
        assert_eq!(err.exit_code(), EXIT_CONFIG_FAULT);
        assert_eq!(err.to_string(), "dependency cycle: a -> b");
    }

    #[test]
    fn runtime_faults_exit_with_one() {
        let err = Error::from(RuntimeError::DependencyTimeout {
            service: "beacon".into(),
            dependency: "execution".into(),
            timeout: Duration::from_secs(1),
        });
        assert!(!err.is_config_fault());
        assert_eq!(err.exit_code(), EXIT_RUNTIME_FAULT);
        assert_eq!(err.as_label(), "runtime_dependency_timeout");
    }

    #[test]
    fn malformed_secret_is_configuration_but_io_is_not() {
        let malformed = Error::from(SecretError::Malformed {
            path: "jwt.hex".into(),
            reason: "odd length".into(),
        });
        let io = Error::from(SecretError::Io {
            path: "jwt.hex".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert_eq!(malformed.exit_code(), EXIT_CONFIG_FAULT);
        assert_eq!(io.exit_code(), EXIT_RUNTIME_FAULT);
    }
}
