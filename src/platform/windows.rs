use super::Platform;

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn default_shell() -> &'static str {
        "bash"
    }

    fn shell_inline(command: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(Self::default_shell());
        cmd.arg("-c").arg(command);
        cmd
    }

    fn package_manager_program(manager: &str) -> String {
        // Node-based managers ship as .cmd shims on Windows.
        match manager {
            "npm" | "yarn" | "pnpm" => format!("{}.cmd", manager),
            other => other.to_string(),
        }
    }
}
