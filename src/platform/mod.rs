/// Platform-specific operations abstracted behind a common interface.
/// Each OS provides its own `NativePlatform` so call sites stay free of
/// `#[cfg]` blocks.
pub trait Platform {
    /// Shell used for ad hoc command strings (e.g. `"sh"` / `"bash"`).
    fn default_shell() -> &'static str;

    /// Build a **tokio** `Command` that runs an inline shell string.
    fn shell_inline(command: &str) -> tokio::process::Command;

    /// Program name for a package manager, e.g. `npm` vs `npm.cmd`.
    fn package_manager_program(manager: &str) -> String;
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
