use std::fmt;

#[derive(Debug)]
pub enum CardlinkError {
    Network(reqwest::Error),
    Http { status: u16, url: String },
    Json(serde_json::Error),
    Cache(String),
    Config(String),
    Io(std::io::Error),
}

impl fmt::Display for CardlinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardlinkError::Network(e) => write!(f, "Network error: {}", e),
            CardlinkError::Http { status, url } => {
                write!(f, "HTTP {} while fetching {}", status, url)
            }
            CardlinkError::Json(e) => write!(f, "JSON parsing error: {}", e),
            CardlinkError::Cache(e) => write!(f, "Cache error: {}", e),
            CardlinkError::Config(e) => write!(f, "Configuration error: {}", e),
            CardlinkError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for CardlinkError {}

impl From<reqwest::Error> for CardlinkError {
    fn from(err: reqwest::Error) -> Self {
        CardlinkError::Network(err)
    }
}

impl From<serde_json::Error> for CardlinkError {
    fn from(err: serde_json::Error) -> Self {
        CardlinkError::Json(err)
    }
}

impl From<std::io::Error> for CardlinkError {
    fn from(err: std::io::Error) -> Self {
        CardlinkError::Io(err)
    }
}
