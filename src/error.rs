use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("tried to execute a script before the execution client was ready")]
    ClientNotReady,
    #[error("tried to execute before {0} was ready")]
    NotReady(&'static str),
    #[error("controller has shut down")]
    Closed,
    #[error("invalid argument '{0}': expected NAME=VALUE")]
    InvalidArgument(String),
    #[error("config parse failed: {0}")]
    Config(#[source] serde_json::Error),
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
