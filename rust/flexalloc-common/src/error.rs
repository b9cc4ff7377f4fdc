use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_alignment(alignment: usize) -> Error {
        Error(ErrorKind::InvalidAlignment { alignment }.into())
    }

    pub fn resource_exhausted(requested: usize) -> Error {
        Error(ErrorKind::ResourceExhausted { requested }.into())
    }

    /// Returns `true` if the operation failed because the system could not
    /// provide the requested memory.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self.kind(), ErrorKind::ResourceExhausted { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("alignment {alignment} is not a power of two")]
    InvalidAlignment { alignment: usize },

    #[error("unable to allocate {requested} bytes")]
    ResourceExhausted { requested: usize },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
