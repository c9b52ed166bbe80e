use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};

/// Crate-wide result type.
///
/// Defaults to the crate's own [Error]; execution paths that wrap backend
/// failures carry the cause inside [Reason::Execution].
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug)]
pub struct Error {
    pub reason: Reason,
    pub help: Option<String>,
}

/// What went wrong. One variant per distinguishable failure class, so callers
/// can match on the class without parsing messages.
#[derive(Debug)]
pub enum Reason {
    /// A referenced column is absent, duplicated or of the wrong type.
    Column { message: String },
    /// The target engine does not support an operation or expression.
    Engine { engine: String, message: String },
    /// A structural invariant of the relation tree would be violated.
    Invariant { message: String },
    /// An engine backend failed while executing; wraps the underlying cause.
    Execution {
        engine: String,
        source: anyhow::Error,
    },
    /// A syntactically valid operation the engine has declared it cannot
    /// realize (e.g. a join in the iteration engine).
    NotImplemented { engine: String, operation: String },
}

impl Error {
    pub fn new(reason: Reason) -> Self {
        Error { reason, help: None }
    }

    pub fn column<S: Into<String>>(message: S) -> Self {
        Error::new(Reason::Column {
            message: message.into(),
        })
    }

    pub fn engine<S: Into<String>>(engine: &str, message: S) -> Self {
        Error::new(Reason::Engine {
            engine: engine.to_string(),
            message: message.into(),
        })
    }

    pub fn invariant<S: Into<String>>(message: S) -> Self {
        Error::new(Reason::Invariant {
            message: message.into(),
        })
    }

    pub fn execution(engine: &str, source: anyhow::Error) -> Self {
        Error::new(Reason::Execution {
            engine: engine.to_string(),
            source,
        })
    }

    pub fn not_implemented(engine: &str, operation: &str) -> Self {
        Error::new(Reason::NotImplemented {
            engine: engine.to_string(),
            operation: operation.to_string(),
        })
    }

    pub fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl Reason {
    fn message(&self) -> String {
        match self {
            Reason::Column { message } => message.clone(),
            Reason::Engine { engine, message } => format!("engine `{engine}`: {message}"),
            Reason::Invariant { message } => message.clone(),
            Reason::Execution { engine, source } => {
                format!("execution failed on engine `{engine}`: {source}")
            }
            Reason::NotImplemented { engine, operation } => {
                format!("engine `{engine}` cannot realize `{operation}`")
            }
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason.message())?;
        if let Some(help) = &self.help {
            write!(f, "\n↪ Hint: {help}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.reason {
            Reason::Execution { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

pub trait WithErrorInfo {
    fn with_help<S: Into<String>>(self, help: S) -> Self;
}

impl<T> WithErrorInfo for Result<T, Error> {
    fn with_help<S: Into<String>>(self, help: S) -> Self {
        self.map_err(|e| e.with_help(help))
    }
}
