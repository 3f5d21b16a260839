use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuctioneerError {
    #[error("Invalid cell endpoint: {0}")]
    InvalidCellEndpoint(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cell returned status {status} from {operation}")]
    UnexpectedStatus {
        operation: &'static str,
        status: u16,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AuctioneerError>;
