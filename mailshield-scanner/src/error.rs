use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanFailure {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Risk service returned status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid response body: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Client setup failed: {0}")]
    ClientBuild(String),
}

pub type Result<T> = std::result::Result<T, ScanFailure>;
