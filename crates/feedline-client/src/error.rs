use feedline_shared::ServiceError;
use thiserror::Error;

/// Errors surfaced by the client core. None of them is fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The action needs a signed-in user.
    #[error("You must be logged in")]
    NotSignedIn,

    /// Sign-up / sign-in / sign-out rejected; shown inline on the form.
    #[error("{0}")]
    Auth(String),

    /// Comment text was empty after trimming.
    #[error("Comment cannot be empty")]
    EmptyComment,

    /// Post with neither text nor image.
    #[error("Please add some text or an image to your post")]
    EmptyPost,

    /// No thread is open to comment on.
    #[error("No post selected")]
    NoThreadOpen,

    /// The upload handshake failed; the enclosing save was aborted.
    #[error("Image upload failed")]
    UploadFailed,

    /// Caller input could not be interpreted.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backend misconfiguration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

pub type ClientResult<T> = Result<T, ClientError>;
