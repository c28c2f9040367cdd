//! Built-in slash commands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::{info, warn};

use crate::model::{Codebase, CommandDef, Conversation};
use crate::store::{CodebaseStore, ConversationStore, SessionStore};
use crate::sync::KeyedLocks;

use super::parse::{self, ParsedCommand};
use super::{CommandError, CommandHandler, CommandResult};

/// Where `/clone` and auto-loading look for prompt commands inside a repository.
const COMMANDS_DIR: &str = ".claude/commands";

const HELP_TEXT: &str = "\
Available commands:

/help - Show this message
/status - Show conversation and session state
/getcwd - Show the working directory
/setcwd <path> - Change the working directory (resets the session)
/clone <url> - Clone a repository and link it to this conversation
/repos - List registered codebases
/commands - List commands of the linked codebase
/command-set <name> <path> [text] - Register a command file
/load-commands <folder> - Register every .md file in a folder
/command-invoke <name> [args...] - Run a registered command
/reset - Start a fresh assistant session

Anything else is sent to the assistant.";

/// The built-in command set, backed by the conversation, session and codebase
/// stores.
pub struct BuiltinCommands {
    conversations: Arc<dyn ConversationStore>,
    sessions: Arc<dyn SessionStore>,
    codebases: Arc<dyn CodebaseStore>,
    /// Root under which `/clone` places repositories (`<workspace>/repos`).
    workspace: PathBuf,
    /// Serializes read-modify-write of one codebase record. A codebase is
    /// shared by every conversation linked to it.
    codebase_writes: KeyedLocks,
}

impl BuiltinCommands {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        sessions: Arc<dyn SessionStore>,
        codebases: Arc<dyn CodebaseStore>,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            conversations,
            sessions,
            codebases,
            workspace: workspace.into(),
            codebase_writes: KeyedLocks::new(),
        }
    }

    fn repos_dir(&self) -> PathBuf {
        self.workspace.join("repos")
    }

    async fn linked_codebase(
        &self,
        conversation: &Conversation,
    ) -> Result<Option<Codebase>, CommandError> {
        match &conversation.codebase_id {
            Some(id) => Ok(self.codebases.get(id).await?),
            None => Ok(None),
        }
    }

    /// Merge `commands` into the stored codebase under its write lock.
    ///
    /// The record is re-read after the lock is taken, so registrations made
    /// from other conversations in the meantime are kept.
    async fn register_commands(
        &self,
        codebase_id: &str,
        commands: BTreeMap<String, CommandDef>,
    ) -> Result<bool, CommandError> {
        let lock = self.codebase_writes.get(codebase_id);
        let _guard = lock.lock().await;

        let Some(mut codebase) = self.codebases.get(codebase_id).await? else {
            return Ok(false);
        };
        codebase.commands.extend(commands);
        self.codebases.save(&codebase).await?;
        Ok(true)
    }

    /// Conversation cwd, else the codebase default, else the workspace.
    fn working_dir(&self, conversation: &Conversation, codebase: Option<&Codebase>) -> PathBuf {
        conversation
            .cwd
            .clone()
            .or_else(|| codebase.map(|c| c.default_cwd.clone()))
            .unwrap_or_else(|| self.workspace.clone())
    }

    // ========================================================================
    // Informational
    // ========================================================================

    async fn status(&self, conversation: &Conversation) -> Result<CommandResult, CommandError> {
        let codebase = self.linked_codebase(conversation).await?;
        let session = self.sessions.active(&conversation.id).await?;

        let codebase_line = codebase
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "none".to_string());
        let cwd_line = conversation
            .cwd
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not set".to_string());
        let session_line = match session {
            Some(s) if s.assistant_session_id.is_some() => format!("{} (resumable)", s.id),
            Some(s) => format!("{} (new)", s.id),
            None => "none".to_string(),
        };

        Ok(CommandResult::ok(format!(
            "Platform: {}\nAssistant: {}\nCodebase: {}\nWorking directory: {}\nSession: {}",
            conversation.platform,
            conversation.assistant_type,
            codebase_line,
            cwd_line,
            session_line,
        )))
    }

    fn getcwd(&self, conversation: &Conversation) -> CommandResult {
        match &conversation.cwd {
            Some(cwd) => CommandResult::ok(format!("Working directory: {}", cwd.display())),
            None => CommandResult::ok("Working directory: not set"),
        }
    }

    async fn repos(&self, conversation: &Conversation) -> Result<CommandResult, CommandError> {
        let codebases = self.codebases.list().await?;
        if codebases.is_empty() {
            return Ok(CommandResult::ok(
                "No codebases registered. Use /clone <url> to add one.",
            ));
        }

        let mut lines = vec!["Codebases:".to_string()];
        for codebase in codebases {
            let linked = conversation.codebase_id.as_deref() == Some(codebase.id.as_str());
            lines.push(format!(
                "{} {} ({})",
                if linked { "*" } else { "-" },
                codebase.name,
                codebase.default_cwd.display()
            ));
        }
        Ok(CommandResult::ok(lines.join("\n")))
    }

    async fn commands(&self, conversation: &Conversation) -> Result<CommandResult, CommandError> {
        let Some(codebase) = self.linked_codebase(conversation).await? else {
            return Ok(no_codebase());
        };
        if codebase.commands.is_empty() {
            return Ok(CommandResult::ok(format!(
                "No commands registered for {}.",
                codebase.name
            )));
        }

        let mut lines = vec![format!("Commands for {}:", codebase.name)];
        for (name, def) in &codebase.commands {
            match &def.description {
                Some(description) => lines.push(format!("- {name}: {description} ({})", def.path)),
                None => lines.push(format!("- {name} ({})", def.path)),
            }
        }
        Ok(CommandResult::ok(lines.join("\n")))
    }

    // ========================================================================
    // State-changing
    // ========================================================================

    async fn setcwd(
        &self,
        conversation: &Conversation,
        args: &[String],
    ) -> Result<CommandResult, CommandError> {
        let Some(raw) = args.first() else {
            return Ok(CommandResult::failed("Usage: /setcwd <path>"));
        };

        let codebase = self.linked_codebase(conversation).await?;
        let target = resolve_against(&self.working_dir(conversation, codebase.as_ref()), raw);

        let is_dir = fs::metadata(&target)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Ok(CommandResult::failed(format!(
                "Not a directory: {}",
                target.display()
            )));
        }

        let mut updated = conversation.clone();
        updated.cwd = Some(target.clone());
        updated.touch();
        self.conversations.save(&updated).await?;
        let reset = self.sessions.deactivate_active(&conversation.id).await?;

        info!(
            conversation_id = %conversation.id,
            cwd = %target.display(),
            "Working directory changed"
        );
        Ok(CommandResult::modified(format!(
            "Working directory set to {}{}",
            target.display(),
            if reset.is_some() { "\nSession reset." } else { "" }
        )))
    }

    async fn clone_repo(
        &self,
        conversation: &Conversation,
        args: &[String],
    ) -> Result<CommandResult, CommandError> {
        let Some(raw_url) = args.first() else {
            return Ok(CommandResult::failed("Usage: /clone <url>"));
        };
        let url = expand_repo_url(raw_url);
        let Some(name) = repo_name(&url) else {
            return Ok(CommandResult::failed(format!(
                "Cannot derive a repository name from {raw_url}"
            )));
        };

        let mut lines = Vec::new();
        let codebase = match self.codebases.find_by_name(&name).await? {
            Some(existing) => {
                lines.push(format!(
                    "Codebase {} already registered at {}",
                    existing.name,
                    existing.default_cwd.display()
                ));
                existing
            }
            None => {
                let target = self.repos_dir().join(&name);
                if fs::metadata(&target).await.is_ok() {
                    lines.push(format!("Using existing checkout at {}", target.display()));
                } else {
                    if let Err(message) = git_clone(&url, &target).await {
                        return Ok(CommandResult::failed(format!("Clone failed: {message}")));
                    }
                    lines.push(format!("Cloned {url} to {}", target.display()));
                }

                let mut codebase = Codebase::new(&name, &target);
                codebase.repository_url = Some(url.clone());
                let loaded = load_command_files(&target, COMMANDS_DIR).await?;
                if !loaded.is_empty() {
                    lines.push(format!(
                        "Loaded {} command(s): {}",
                        loaded.len(),
                        loaded.keys().cloned().collect::<Vec<_>>().join(", ")
                    ));
                }
                codebase.commands.extend(loaded);
                self.codebases.save(&codebase).await?;
                codebase
            }
        };

        let mut updated = conversation.clone();
        updated.codebase_id = Some(codebase.id.clone());
        updated.cwd = Some(codebase.default_cwd.clone());
        updated.touch();
        self.conversations.save(&updated).await?;
        if self.sessions.deactivate_active(&conversation.id).await?.is_some() {
            lines.push("Session reset.".to_string());
        }

        info!(
            conversation_id = %conversation.id,
            codebase = %codebase.name,
            "Codebase linked"
        );
        Ok(CommandResult::modified(lines.join("\n")))
    }

    async fn command_set(
        &self,
        conversation: &Conversation,
        args: &[String],
    ) -> Result<CommandResult, CommandError> {
        let (Some(name), Some(rel_path)) = (args.first(), args.get(1)) else {
            return Ok(CommandResult::failed(
                "Usage: /command-set <name> <path> [text]",
            ));
        };
        let Some(codebase) = self.linked_codebase(conversation).await? else {
            return Ok(no_codebase());
        };

        let text = args[2..].join(" ");
        if !text.is_empty() {
            let file = self
                .working_dir(conversation, Some(&codebase))
                .join(rel_path);
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&file, text.as_bytes()).await?;
        }

        let def = BTreeMap::from([(name.clone(), CommandDef::new(rel_path.clone()))]);
        if !self.register_commands(&codebase.id, def).await? {
            return Ok(no_codebase());
        }

        Ok(CommandResult::modified(format!(
            "Command {name} registered ({rel_path})"
        )))
    }

    async fn load_commands(
        &self,
        conversation: &Conversation,
        args: &[String],
    ) -> Result<CommandResult, CommandError> {
        let Some(folder) = args.first() else {
            return Ok(CommandResult::failed("Usage: /load-commands <folder>"));
        };
        let Some(codebase) = self.linked_codebase(conversation).await? else {
            return Ok(no_codebase());
        };

        let root = self.working_dir(conversation, Some(&codebase));
        if !fs::metadata(root.join(folder))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Ok(CommandResult::failed(format!(
                "Not a directory: {}",
                root.join(folder).display()
            )));
        }

        let loaded = load_command_files(&root, folder).await?;
        if loaded.is_empty() {
            return Ok(CommandResult::ok(format!("No .md files found in {folder}")));
        }
        let names = loaded.keys().cloned().collect::<Vec<_>>().join(", ");
        let count = loaded.len();
        if !self.register_commands(&codebase.id, loaded).await? {
            return Ok(no_codebase());
        }

        Ok(CommandResult::modified(format!(
            "Loaded {count} command(s): {names}"
        )))
    }

    async fn reset(&self, conversation: &Conversation) -> Result<CommandResult, CommandError> {
        match self.sessions.deactivate_active(&conversation.id).await? {
            Some(session) => {
                info!(
                    conversation_id = %conversation.id,
                    session_id = %session.id,
                    "Session reset by user"
                );
                Ok(CommandResult::modified(
                    "Session reset. Send a message to start a new session.",
                ))
            }
            None => Ok(CommandResult::ok("No active session to reset.")),
        }
    }
}

#[async_trait]
impl CommandHandler for BuiltinCommands {
    async fn handle(
        &self,
        conversation: &Conversation,
        text: &str,
    ) -> Result<CommandResult, CommandError> {
        let Some(ParsedCommand { name, args }) = parse::parse_command(text) else {
            return Ok(CommandResult::failed("Not a command. Type /help for usage."));
        };

        match name.as_str() {
            "help" => Ok(CommandResult::ok(HELP_TEXT)),
            "status" => self.status(conversation).await,
            "getcwd" => Ok(self.getcwd(conversation)),
            "setcwd" => self.setcwd(conversation, &args).await,
            "clone" => self.clone_repo(conversation, &args).await,
            "repos" => self.repos(conversation).await,
            "commands" => self.commands(conversation).await,
            "command-set" => self.command_set(conversation, &args).await,
            "load-commands" => self.load_commands(conversation, &args).await,
            "reset" => self.reset(conversation).await,
            other => Ok(CommandResult::failed(format!(
                "Unknown command: /{other}\nType /help to see available commands."
            ))),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn no_codebase() -> CommandResult {
    CommandResult::failed("No codebase configured. Use /clone <url> first.")
}

fn resolve_against(base: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// `owner/repo` shorthand expands to a GitHub HTTPS URL. Everything else
/// (full URLs, scp-style `git@host:...`, local paths) is used as given.
fn expand_repo_url(raw: &str) -> String {
    let raw = raw.trim();
    let is_shorthand = !raw.contains("://")
        && !raw.contains('@')
        && !raw.starts_with('/')
        && !raw.starts_with('.')
        && raw.matches('/').count() == 1
        && !raw.ends_with('/');
    if is_shorthand {
        format!("https://github.com/{raw}.git")
    } else {
        raw.to_string()
    }
}

/// Last path segment of a repository URL, without `.git`.
fn repo_name(url: &str) -> Option<String> {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

async fn git_clone(url: &str, target: &Path) -> Result<(), String> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    let output = Command::new("git")
        .arg("clone")
        .arg(url)
        .arg(target)
        .output()
        .await
        .map_err(|e| format!("could not run git: {e}"))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(url = %url, error = %stderr, "git clone failed");
        Err(stderr)
    }
}

/// Register every `*.md` file in `<root>/<folder>` under its file stem.
///
/// Paths are stored relative to `root`. A missing folder yields nothing.
async fn load_command_files(
    root: &Path,
    folder: &str,
) -> Result<BTreeMap<String, CommandDef>, CommandError> {
    let mut commands = BTreeMap::new();
    let dir = root.join(folder);

    let mut entries = match fs::read_dir(&dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(commands),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "md") {
            continue;
        }
        let (Some(stem), Some(file_name)) = (path.file_stem(), path.file_name()) else {
            continue;
        };
        let rel = Path::new(folder).join(file_name);
        commands.insert(
            stem.to_string_lossy().to_string(),
            CommandDef::new(rel.to_string_lossy().to_string()),
        );
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::model::Session;
    use crate::store::file::{FileCodebaseStore, FileConversationStore, FileSessionStore};

    struct Fixture {
        _tmp: TempDir,
        root: PathBuf,
        conversations: Arc<FileConversationStore>,
        sessions: Arc<FileSessionStore>,
        codebases: Arc<FileCodebaseStore>,
        commands: BuiltinCommands,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let conversations = Arc::new(FileConversationStore::new(root.join("data/conversations")));
        let sessions = Arc::new(FileSessionStore::new(root.join("data/sessions")));
        let codebases = Arc::new(FileCodebaseStore::new(root.join("data/codebases")));
        let commands = BuiltinCommands::new(
            conversations.clone(),
            sessions.clone(),
            codebases.clone(),
            root.join("workspace"),
        );
        Fixture {
            _tmp: tmp,
            root,
            conversations,
            sessions,
            codebases,
            commands,
        }
    }

    impl Fixture {
        async fn conversation(&self) -> Conversation {
            self.conversations
                .get_or_create("test", "chat-1", "claude")
                .await
                .unwrap()
        }

        async fn reload(&self) -> Conversation {
            self.conversations.get("test", "chat-1").await.unwrap().unwrap()
        }

        /// Register a codebase rooted at `<tmp>/repo` and link it.
        async fn linked(&self) -> Conversation {
            let repo = self.root.join("repo");
            std::fs::create_dir_all(&repo).unwrap();
            let codebase = Codebase::new("repo", &repo);
            self.codebases.save(&codebase).await.unwrap();

            let mut conversation = self.conversation().await;
            conversation.codebase_id = Some(codebase.id);
            self.conversations.save(&conversation).await.unwrap();
            conversation
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    #[test]
    fn shorthand_expands_to_github() {
        assert_eq!(
            expand_repo_url("acme/widget"),
            "https://github.com/acme/widget.git"
        );
        assert_eq!(
            expand_repo_url("git@github.com:acme/widget.git"),
            "git@github.com:acme/widget.git"
        );
        assert_eq!(expand_repo_url("/srv/git/widget"), "/srv/git/widget");
    }

    #[test]
    fn repo_name_strips_git_suffix() {
        assert_eq!(
            repo_name("https://github.com/acme/widget.git").as_deref(),
            Some("widget")
        );
        assert_eq!(
            repo_name("git@github.com:acme/widget.git").as_deref(),
            Some("widget")
        );
        assert_eq!(repo_name("/srv/git/gadget/").as_deref(), Some("gadget"));
        assert_eq!(repo_name("https://host/"), Some("host".to_string()));
        assert_eq!(repo_name(""), None);
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn help_lists_commands() {
        let fx = fixture();
        let result = fx.commands.handle(&fx.conversation().await, "/help").await.unwrap();
        assert!(result.success);
        assert!(result.message.contains("/command-invoke"));
        assert!(!result.modified);
    }

    #[tokio::test]
    async fn unknown_command_fails_with_hint() {
        let fx = fixture();
        let result = fx.commands.handle(&fx.conversation().await, "/frobnicate").await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("/help"));
    }

    #[tokio::test]
    async fn getcwd_reports_not_set() {
        let fx = fixture();
        let result = fx.commands.handle(&fx.conversation().await, "/getcwd").await.unwrap();
        assert_eq!(result.message, "Working directory: not set");
    }

    #[tokio::test]
    async fn setcwd_updates_conversation_and_resets_session() {
        let fx = fixture();
        let conversation = fx.conversation().await;
        fx.sessions
            .save(&Session::new(&conversation.id, None, "claude"))
            .await
            .unwrap();
        let dir = fx.root.join("elsewhere");
        std::fs::create_dir_all(&dir).unwrap();

        let text = format!("/setcwd {}", dir.display());
        let result = fx.commands.handle(&conversation, &text).await.unwrap();

        assert!(result.success, "{}", result.message);
        assert!(result.modified);
        assert!(result.message.contains("Session reset"));
        assert_eq!(fx.reload().await.cwd, Some(dir));
        assert!(fx.sessions.active(&conversation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn setcwd_rejects_missing_directory() {
        let fx = fixture();
        let conversation = fx.conversation().await;
        let text = format!("/setcwd {}", fx.root.join("nope").display());

        let result = fx.commands.handle(&conversation, &text).await.unwrap();
        assert!(!result.success);
        assert!(fx.reload().await.cwd.is_none());
    }

    #[tokio::test]
    async fn setcwd_without_argument_shows_usage() {
        let fx = fixture();
        let result = fx.commands.handle(&fx.conversation().await, "/setcwd").await.unwrap();
        assert_eq!(result, CommandResult::failed("Usage: /setcwd <path>"));
    }

    #[tokio::test]
    async fn reset_deactivates_active_session() {
        let fx = fixture();
        let conversation = fx.conversation().await;
        fx.sessions
            .save(&Session::new(&conversation.id, None, "claude"))
            .await
            .unwrap();

        let result = fx.commands.handle(&conversation, "/reset").await.unwrap();
        assert!(result.modified);
        assert!(fx.sessions.active(&conversation.id).await.unwrap().is_none());

        let again = fx.commands.handle(&conversation, "/reset").await.unwrap();
        assert!(!again.modified);
        assert_eq!(again.message, "No active session to reset.");
    }

    #[tokio::test]
    async fn status_shows_session_resumability() {
        let fx = fixture();
        let conversation = fx.linked().await;
        let mut session = Session::new(&conversation.id, None, "claude");
        session.assistant_session_id = Some("tok".to_string());
        fx.sessions.save(&session).await.unwrap();

        let result = fx.commands.handle(&conversation, "/status").await.unwrap();
        assert!(result.message.contains("Codebase: repo"));
        assert!(result.message.contains(&format!("{} (resumable)", session.id)));
    }

    #[tokio::test]
    async fn commands_require_a_codebase() {
        let fx = fixture();
        let result = fx.commands.handle(&fx.conversation().await, "/commands").await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("/clone"));
    }

    #[tokio::test]
    async fn command_set_writes_file_and_registers() {
        let fx = fixture();
        let conversation = fx.linked().await;

        let result = fx
            .commands
            .handle(
                &conversation,
                r#"/command-set greet prompts/greet.md "Say hello to $1""#,
            )
            .await
            .unwrap();
        assert!(result.success, "{}", result.message);

        let written = std::fs::read_to_string(fx.root.join("repo/prompts/greet.md")).unwrap();
        assert_eq!(written, "Say hello to $1");

        let listing = fx.commands.handle(&conversation, "/commands").await.unwrap();
        assert!(listing.message.contains("greet (prompts/greet.md)"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_on_a_shared_codebase_are_all_kept() {
        let fx = fixture();
        let first = fx.linked().await;
        let mut second = fx
            .conversations
            .get_or_create("test", "chat-2", "claude")
            .await
            .unwrap();
        second.codebase_id = first.codebase_id.clone();
        fx.conversations.save(&second).await.unwrap();

        let texts: Vec<_> = (0..16)
            .map(|i| format!("/command-set cmd-{i} prompts/cmd-{i}.md"))
            .collect();
        let results = futures::future::join_all(texts.iter().enumerate().map(|(i, text)| {
            let conversation = if i % 2 == 0 { &first } else { &second };
            fx.commands.handle(conversation, text)
        }))
        .await;
        assert!(results.into_iter().all(|r| r.unwrap().success));

        let codebase = fx
            .codebases
            .get(first.codebase_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(codebase.commands.len(), 16);
        assert!(codebase.commands.contains_key("cmd-15"));
    }

    #[tokio::test]
    async fn load_commands_registers_markdown_files() {
        let fx = fixture();
        let conversation = fx.linked().await;
        let folder = fx.root.join("repo/.claude/commands");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("plan-feature.md"), "Plan $ARGUMENTS").unwrap();
        std::fs::write(folder.join("execute.md"), "Execute the plan").unwrap();
        std::fs::write(folder.join("notes.txt"), "ignored").unwrap();

        let result = fx
            .commands
            .handle(&conversation, "/load-commands .claude/commands")
            .await
            .unwrap();
        assert_eq!(result.message, "Loaded 2 command(s): execute, plan-feature");

        let codebase = fx
            .codebases
            .get(conversation.codebase_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            codebase.commands["plan-feature"].path,
            Path::new(".claude/commands")
                .join("plan-feature.md")
                .to_string_lossy()
        );
    }

    #[tokio::test]
    async fn clone_reuses_registered_codebase() {
        let fx = fixture();
        let repo = fx.root.join("existing");
        std::fs::create_dir_all(&repo).unwrap();
        let codebase = Codebase::new("widget", &repo);
        fx.codebases.save(&codebase).await.unwrap();

        let conversation = fx.conversation().await;
        let result = fx
            .commands
            .handle(&conversation, "clone acme/widget")
            .await
            .unwrap();
        assert!(result.success, "{}", result.message);
        assert!(result.message.contains("already registered"));

        let reloaded = fx.reload().await;
        assert_eq!(reloaded.codebase_id, Some(codebase.id));
        assert_eq!(reloaded.cwd, Some(repo));
    }

    #[tokio::test]
    async fn clone_adopts_existing_checkout_and_loads_commands() {
        let fx = fixture();
        let checkout = fx.root.join("workspace/repos/gadget");
        std::fs::create_dir_all(checkout.join(COMMANDS_DIR)).unwrap();
        std::fs::write(checkout.join(COMMANDS_DIR).join("review.md"), "Review").unwrap();

        let conversation = fx.conversation().await;
        let result = fx
            .commands
            .handle(&conversation, "/clone https://example.com/acme/gadget.git")
            .await
            .unwrap();
        assert!(result.success, "{}", result.message);
        assert!(result.message.contains("Loaded 1 command(s): review"));

        let codebase = fx.codebases.find_by_name("gadget").await.unwrap().unwrap();
        assert_eq!(codebase.default_cwd, checkout);
        assert!(codebase.commands.contains_key("review"));
        assert_eq!(fx.reload().await.codebase_id, Some(codebase.id));
    }

    #[tokio::test]
    async fn repos_marks_linked_codebase() {
        let fx = fixture();
        let conversation = fx.linked().await;
        fx.codebases
            .save(&Codebase::new("other", "/srv/other"))
            .await
            .unwrap();

        let result = fx.commands.handle(&conversation, "/repos").await.unwrap();
        assert!(result.message.contains("* repo"));
        assert!(result.message.contains("- other"));
    }
}
