use std::fmt;

#[derive(Debug)]
pub enum CrosswalkError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad pair, duplicate round id, etc.).
    ConfigValidation(String),
    /// A system referenced by the pair or an attachment does not exist.
    UnknownSystem(String),
    /// A round names an attribute nobody can supply.
    UnknownAttribute { round: String, attribute: String },
    /// Missing required column in input data.
    MissingColumn { system: String, column: String },
    /// A round key is absent from one side's loaded schema.
    MissingAttribute { system: String, round: String, attribute: String },
    /// The fuzzy region attribute is absent from one side's loaded schema.
    MissingRegion { system: String, attribute: String },
    /// Identifiers must be unique within a system.
    DuplicateId { system: String, id: String },
    /// IO error (file read, CSV decode, etc.).
    Io(String),
}

impl CrosswalkError {
    /// Schema errors are the ones raised against loaded data rather than the config text.
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            Self::MissingColumn { .. }
                | Self::MissingAttribute { .. }
                | Self::MissingRegion { .. }
                | Self::DuplicateId { .. }
        )
    }
}

impl fmt::Display for CrosswalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::UnknownSystem(system) => write!(f, "unknown system: {system}"),
            Self::UnknownAttribute { round, attribute } => {
                write!(f, "round '{round}': unknown attribute '{attribute}'")
            }
            Self::MissingColumn { system, column } => {
                write!(f, "system '{system}': missing column '{column}'")
            }
            Self::MissingAttribute { system, round, attribute } => {
                write!(
                    f,
                    "round '{round}': attribute '{attribute}' is not present in system '{system}'"
                )
            }
            Self::MissingRegion { system, attribute } => {
                write!(f, "fuzzy region '{attribute}' is not present in system '{system}'")
            }
            Self::DuplicateId { system, id } => {
                write!(f, "system '{system}': duplicate identifier '{id}'")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for CrosswalkError {}
