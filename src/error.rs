use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Datahub RPC error: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("Datahub transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Datahub returned status {code}: {message}")]
    DatahubStatus { code: i32, message: String },

    #[error("Datahub response carried no status")]
    MissingStatus,

    #[error("invalid quantity {0:?}")]
    Quantity(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Reconcile error: {0}")]
    Reconcile(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

/// Crate-wide result, defaulting to [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn reconcile(msg: impl Into<String>) -> Self {
        Self::Reconcile(msg.into())
    }
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Maps a kube 404 into `Ok(None)`, every other error is propagated.
pub fn not_found_as_none<T>(res: std::result::Result<T, kube::Error>) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}
