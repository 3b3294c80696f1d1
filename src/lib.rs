use zed_extension_api::{self as zed, LanguageServerId, Result};

const SERVER_ID: &str = "krl-lsp";

struct KrlExtension;

impl zed::Extension for KrlExtension {
    fn new() -> Self {
        Self
    }

    fn language_server_command(
        &mut self,
        language_server_id: &LanguageServerId,
        worktree: &zed::Worktree,
    ) -> Result<zed::Command> {
        if language_server_id.as_ref() != SERVER_ID {
            return Err(format!(
                "Unknown language server: {}",
                language_server_id.as_ref()
            ));
        }

        let command = worktree.which(SERVER_ID).ok_or_else(|| {
            format!("{SERVER_ID} not found on PATH; install it with `cargo install --path language-server`")
        })?;

        Ok(zed::Command {
            command,
            args: vec![],
            env: worktree.shell_env(),
        })
    }
}

zed::register_extension!(KrlExtension);
