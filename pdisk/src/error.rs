use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdiskError {
    #[error("Configuration file ({0}) is missing.")]
    ConfigMissing(String),
    #[error("Error opening configuration file ({file}): {e}")]
    ConfigRead { file: String, e: std::io::Error },
    #[error("Invalid configuration file ({file}): {e}")]
    ConfigParse { file: String, e: serde_yml::Error },
    #[error("Section '{section}' or required attribute '{key}' missing")]
    MissingKey { section: String, key: String },
    #[error("Invalid value specified for '{key}' (section {section})")]
    InvalidValue { section: String, key: String },
    #[error("Unsupported iSCSI proxy variant '{0}' (supported variants: netapp)")]
    UnsupportedBackend(String),

    #[error("Internal error: LUN action '{0}' unknown")]
    UnknownAction(String),
    #[error("Internal error: action '{0}' unknown")]
    UnknownSubAction(String),
    #[error("Internal error: no value for placeholder '{placeholder}' in '{action}' command")]
    UnresolvedPlaceholder { action: String, placeholder: String },

    #[error("Action '{action}' not implemented by SCSI back-end type '{backend}'")]
    NotImplemented { action: String, backend: String },

    #[error("Insufficient argument provided for action '{action}' ({required} required)")]
    InsufficientArgs { action: String, required: usize },
    #[error("Invalid LUN size '{0}' (expected a number of gigabytes)")]
    InvalidSize(String),

    #[error("Failed to execute {action} action: {e}")]
    Spawn { action: String, e: std::io::Error },
    #[error(
        "An error occured during {action} action (error={code}). Command output:\n<<<<<<<<<<\n{output}\n>>>>>>>>>>"
    )]
    CommandFailed {
        action: String,
        code: String,
        output: String,
    },
    #[error("{action} action did not complete within {secs}s and was killed")]
    Timeout { action: String, secs: u64 },
}
