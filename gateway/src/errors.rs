use http::StatusCode;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Why a single inbound request was not served.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Not Found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Request body too large")]
    BodyTooLarge,

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("{0}")]
    InvalidBody(String),

    #[error("Invalid token")]
    Unauthorized,

    #[error(transparent)]
    Courier(#[from] courier::Error),
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        use courier::ErrorKind;

        match self {
            RequestError::NotFound => StatusCode::NOT_FOUND,
            RequestError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RequestError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RequestError::BodyRead(_) => StatusCode::BAD_REQUEST,
            RequestError::InvalidBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RequestError::Unauthorized => StatusCode::UNAUTHORIZED,
            RequestError::Courier(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Remote => StatusCode::BAD_GATEWAY,
            },
        }
    }
}
