use super::Platform;

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn default_shell() -> &'static str {
        "sh"
    }

    fn shell_inline(command: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(Self::default_shell());
        cmd.arg("-c").arg(command);
        cmd
    }

    fn package_manager_program(manager: &str) -> String {
        manager.to_string()
    }
}
