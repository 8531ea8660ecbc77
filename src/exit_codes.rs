/// Process exit codes.
pub mod exit {
    pub const SUCCESS: i32 = 0;
    /// At least one operation failed; the rest were applied.
    pub const PARTIAL_FAILURE: i32 = 1;
    /// The request itself was refused, e.g. undoing an unknown transaction.
    pub const USAGE_FAILURE: i32 = 2;
    pub const CANCELLED: i32 = 3;
}
