//! Type-safe script argument contracts.
//!
//! Shell scripts installed into containers take positional arguments. Each
//! script has a struct implementing [`ScriptArgs`]; the struct is the single
//! source of truth for argument order, so a reordered or missing argument is
//! a compile error instead of a misbehaving script on a remote host.

/// Typed arguments for one script template.
///
/// # Invariants
///
/// - `to_cli_args()` returns arguments in exactly the order the script reads
///   `$1`, `$2`, ...
/// - `script()` is the full template text installed verbatim.
pub trait ScriptArgs {
    /// Positional arguments, in order.
    fn to_cli_args(&self) -> Vec<String>;

    /// File name the script is installed under (e.g. `format.sh`).
    fn script_name(&self) -> &'static str;

    /// Script template text.
    fn script(&self) -> &'static str;

    /// Full argv for running the installed script at `path` with bash.
    fn command_line(&self, path: &str) -> Vec<String> {
        let mut argv = vec!["/bin/bash".to_string(), path.to_string()];
        argv.extend(self.to_cli_args());
        argv
    }
}
