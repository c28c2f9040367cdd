//! Claude Code CLI backend.
//!
//! Each query spawns `claude -p --output-format stream-json --verbose`, writes
//! the prompt to stdin and turns stdout (one JSON object per line) into
//! [`MessageChunk`]s. The child is owned by the returned stream and killed when
//! the stream is dropped.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, warn};

use super::{AssistantClient, AssistantError, ChunkStream, MessageChunk};

/// How to launch the CLI.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    pub command: String,
    /// Extra arguments appended after the stream-json flags.
    pub args: Vec<String>,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClaudeCliClient {
    config: ClaudeCliConfig,
}

impl ClaudeCliClient {
    pub fn new(config: ClaudeCliConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, cwd: &Path, resume: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(["-p", "--output-format", "stream-json", "--verbose"]);
        if let Some(token) = resume {
            cmd.args(["--resume", token]);
        }
        cmd.args(&self.config.args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AssistantClient for ClaudeCliClient {
    async fn query(
        &self,
        prompt: &str,
        cwd: &Path,
        resume: Option<&str>,
    ) -> Result<ChunkStream, AssistantError> {
        debug!(
            cwd = %cwd.display(),
            resume = resume.unwrap_or("-"),
            prompt_len = prompt.len(),
            "Spawning assistant CLI"
        );

        let mut child = self
            .build_command(cwd, resume)
            .spawn()
            .map_err(|source| AssistantError::Spawn {
                command: self.config.command.clone(),
                source,
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            AssistantError::Io(std::io::Error::other("assistant stdin was not piped"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            AssistantError::Io(std::io::Error::other("assistant stdout was not piped"))
        })?;

        stdin.write_all(prompt.as_bytes()).await?;
        stdin.shutdown().await?;
        drop(stdin);

        let state = CliStream {
            lines: LinesStream::new(BufReader::new(stdout).lines()),
            pending: VecDeque::new(),
            child,
            saw_result: false,
            finished: false,
        };

        Ok(Box::pin(futures::stream::unfold(state, next_chunk)))
    }
}

// ============================================================================
// Stream state
// ============================================================================

struct CliStream {
    lines: LinesStream<BufReader<ChildStdout>>,
    pending: VecDeque<MessageChunk>,
    child: Child,
    saw_result: bool,
    finished: bool,
}

async fn next_chunk(
    mut state: CliStream,
) -> Option<(Result<MessageChunk, AssistantError>, CliStream)> {
    loop {
        if let Some(chunk) = state.pending.pop_front() {
            if matches!(chunk, MessageChunk::Result { .. }) {
                state.saw_result = true;
            }
            return Some((Ok(chunk), state));
        }
        if state.finished {
            return None;
        }

        match state.lines.next().await {
            Some(Ok(line)) => state.pending.extend(parse_line(&line)),
            Some(Err(e)) => {
                state.finished = true;
                return Some((Err(AssistantError::Io(e)), state));
            }
            None => {
                state.finished = true;
                let status = match state.child.wait().await {
                    Ok(status) => status,
                    Err(e) => return Some((Err(AssistantError::Io(e)), state)),
                };
                if !status.success() && !state.saw_result {
                    return Some((
                        Err(AssistantError::Exited {
                            status: status.to_string(),
                        }),
                        state,
                    ));
                }
                return None;
            }
        }
    }
}

// ============================================================================
// stream-json parsing
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CliLine {
    System {
        #[serde(default)]
        subtype: Option<String>,
    },
    Assistant {
        message: CliMessage,
    },
    Result {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        subtype: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct CliMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Other,
}

/// Map one stdout line to zero or more chunks. Malformed lines yield nothing.
fn parse_line(line: &str) -> Vec<MessageChunk> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let parsed = match serde_json::from_str::<CliLine>(trimmed) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "Skipping malformed assistant output line");
            return Vec::new();
        }
    };

    match parsed {
        CliLine::System { subtype } => vec![MessageChunk::System {
            content: subtype.unwrap_or_else(|| "system".to_string()),
        }],
        CliLine::Assistant { message } => message
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.is_empty() => {
                    Some(MessageChunk::Assistant { content: text })
                }
                ContentBlock::ToolUse { name, input } => Some(MessageChunk::Tool { name, input }),
                ContentBlock::Thinking { thinking } if !thinking.is_empty() => {
                    Some(MessageChunk::Thinking { content: thinking })
                }
                _ => None,
            })
            .collect(),
        CliLine::Result {
            session_id,
            is_error,
            subtype,
        } => {
            if is_error {
                warn!(
                    subtype = subtype.as_deref().unwrap_or("unknown"),
                    "Assistant run ended with an error result"
                );
            }
            vec![MessageChunk::Result { session_id }]
        }
        CliLine::Other => Vec::new(),
    }
}
