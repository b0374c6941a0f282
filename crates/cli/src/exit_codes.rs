//! Exit code registry for the `ledgercheck` binary.
//!
//! | Range | Meaning                                   |
//! |-------|-------------------------------------------|
//! | 0     | Success                                   |
//! | 1-2   | Generic errors (runtime, usage)           |
//! | 3-5   | Boundary failures (config, input, output) |
//! | 6     | Reconciliation findings (`--strict-exit`) |
//!
//! Scripts wrapping the CLI should treat 6 as "ran fine, data disagrees" and
//! everything from 1 to 5 as "did not produce a trustworthy result".

// =============================================================================
// Success
// =============================================================================

/// Command completed; evidence written.
pub const EXIT_SUCCESS: u8 = 0;

// =============================================================================
// Generic (1-2)
// =============================================================================

/// Unexpected runtime error.
pub const EXIT_ERROR: u8 = 1;

/// Bad flags or flag combination.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Boundary (3-5)
// =============================================================================

/// Registry or settings file could not be parsed or failed validation.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// An input table could not be read, decoded, or lacks its key column.
pub const EXIT_INPUT: u8 = 4;

/// The evidence table or report could not be written.
pub const EXIT_OUTPUT: u8 = 5;

// =============================================================================
// Findings (6)
// =============================================================================

/// Run completed but at least one cell is not clean. Only with `--strict-exit`.
pub const EXIT_FINDINGS: u8 = 6;
