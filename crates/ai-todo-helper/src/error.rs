use std::fmt;

#[derive(Debug)]
pub struct Error {
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self { msg: msg.into() }
    }

    pub fn context(self, what: &str) -> Self {
        Self::msg(format!("{what}: {}", self.msg))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<crate::gateway::ApiError> for Error {
    fn from(err: crate::gateway::ApiError) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
