//! Domain error types.

/// Top-level error type for vectrader.
#[derive(Debug, thiserror::Error)]
pub enum VectraderError {
    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("strategy {strategy} requires {expected}")]
    InstrumentMismatch { strategy: String, expected: String },

    #[error("no data for {code} on {exchange}")]
    NoData { code: String, exchange: String },

    #[error("bars for {code} are not strictly increasing at index {index}")]
    UnorderedBars { code: String, index: usize },

    #[error("series {left} and {right} do not share a timeline: {reason}")]
    MisalignedSeries {
        left: String,
        right: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VectraderError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        VectraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&VectraderError> for std::process::ExitCode {
    fn from(err: &VectraderError) -> Self {
        let code: u8 = match err {
            VectraderError::Io(_) => 1,
            VectraderError::ConfigParse { .. }
            | VectraderError::ConfigMissing { .. }
            | VectraderError::ConfigInvalid { .. } => 2,
            VectraderError::Data { .. } => 3,
            VectraderError::UnknownStrategy { .. }
            | VectraderError::InstrumentMismatch { .. } => 4,
            VectraderError::NoData { .. }
            | VectraderError::UnorderedBars { .. }
            | VectraderError::MisalignedSeries { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
