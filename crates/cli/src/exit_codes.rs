//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: batch jobs rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 2       | Universal        | CLI usage error (bad args)               |
//! | 60-69   | crosswalk        | Config, schema and runtime failures      |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `crosswalk_exit_code` or the command that raises it

use crosswalk_linkage::CrosswalkError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments clap could not catch (e.g. `--threads 0`).
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Crosswalk (60-69)
// =============================================================================

/// Config file does not parse or fails validation.
pub const EXIT_XWALK_INVALID_CONFIG: u8 = 60;

/// Input data does not fit the config: missing column or attribute,
/// duplicate identifier.
pub const EXIT_XWALK_SCHEMA: u8 = 61;

/// File IO, CSV decoding, output writing.
pub const EXIT_XWALK_RUNTIME: u8 = 62;

/// Map an engine error to its exit code.
pub fn crosswalk_exit_code(err: &CrosswalkError) -> u8 {
    match err {
        CrosswalkError::ConfigParse(_)
        | CrosswalkError::ConfigValidation(_)
        | CrosswalkError::UnknownSystem(_)
        | CrosswalkError::UnknownAttribute { .. } => EXIT_XWALK_INVALID_CONFIG,
        CrosswalkError::MissingColumn { .. }
        | CrosswalkError::MissingAttribute { .. }
        | CrosswalkError::MissingRegion { .. }
        | CrosswalkError::DuplicateId { .. } => EXIT_XWALK_SCHEMA,
        CrosswalkError::Io(_) => EXIT_XWALK_RUNTIME,
    }
}
