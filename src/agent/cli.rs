//! Agent runtime backed by the `claude` CLI in print mode.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::mcp::write_mcp_config;
use super::runtime::{AgentRequest, AgentRuntime, AgentTranscript, RuntimeError};
use super::stream::parse_stream;
use crate::config::AgentConfig;

/// Longest stderr excerpt carried in an exit error
const STDERR_EXCERPT: usize = 500;

/// Tools the CLI provides without any MCP server. Those a policy does not
/// authorize are passed as `--disallowedTools`, which holds even when
/// permission prompts are skipped.
const BUILTIN_TOOLS: &[&str] = &[
    "Bash",
    "Edit",
    "Glob",
    "Grep",
    "LS",
    "MultiEdit",
    "NotebookEdit",
    "NotebookRead",
    "Read",
    "Task",
    "TodoWrite",
    "WebFetch",
    "WebSearch",
    "Write",
];

pub struct ClaudeCliRuntime {
    config: AgentConfig,
    project_dir: PathBuf,
    state_dir: PathBuf,
}

impl ClaudeCliRuntime {
    pub fn new(config: AgentConfig, project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let state_dir = project_dir.join(".telos");
        Self {
            config,
            project_dir,
            state_dir,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// Command-line arguments for one invocation (the prompt goes on stdin).
    pub fn build_args(&self, request: &AgentRequest, system_prompt_file: &Path, mcp_config: &Path) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--append-system-prompt-file".to_string(),
            system_prompt_file.display().to_string(),
            "--mcp-config".to_string(),
            mcp_config.display().to_string(),
            "--strict-mcp-config".to_string(),
            "--allowedTools".to_string(),
            request.policy.tools().join(","),
        ];
        let denied: Vec<&str> = BUILTIN_TOOLS
            .iter()
            .copied()
            .filter(|tool| !request.policy.authorize(tool))
            .collect();
        if !denied.is_empty() {
            args.push("--disallowedTools".to_string());
            args.push(denied.join(","));
        }
        args.extend([
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--model".to_string(),
            request.model.clone().unwrap_or_else(|| self.config.model.clone()),
            "--no-session-persistence".to_string(),
        ]);
        args.extend(self.config.extra_args.iter().cloned());
        if self.config.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args
    }

    fn write_system_prompt(&self, request: &AgentRequest) -> Result<PathBuf, RuntimeError> {
        let dir = self.state_dir.join("prompts");
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.md", request.identity));
        fs::write(&path, &request.system_prompt)?;
        Ok(path)
    }
}

fn excerpt(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let mut end = max;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[async_trait]
impl AgentRuntime for ClaudeCliRuntime {
    async fn run(&self, request: AgentRequest) -> Result<AgentTranscript, RuntimeError> {
        let prompt_file = self.write_system_prompt(&request)?;
        let mcp_file = write_mcp_config(request.identity, &self.config.mcp, &self.project_dir, &self.state_dir)
            .map_err(|e| RuntimeError::Unavailable(format!("cannot write MCP config: {}", e)))?;
        let args = self.build_args(&request, &prompt_file, &mcp_file);

        log::info!(
            "Invoking {} as {} in {}",
            self.config.command,
            request.identity,
            request.working_dir.display()
        );
        log::debug!("args: {:?}", args);

        let mut child = Command::new(&self.config.command)
            .args(&args)
            .current_dir(&request.working_dir)
            .env_remove("CLAUDECODE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    RuntimeError::Unavailable(format!("'{}' not found on PATH", self.config.command))
                }
                _ => RuntimeError::Spawn(e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let instructions = request.instructions.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(instructions.as_bytes()).await {
                    log::warn!("Failed to write instructions to agent stdin: {}", e);
                }
            });
        }

        let timeout = self.timeout();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => return Err(RuntimeError::Timeout(timeout)),
        };

        if !output.status.success() {
            return Err(RuntimeError::Exit {
                code: output.status.code(),
                stderr: excerpt(&String::from_utf8_lossy(&output.stderr), STDERR_EXCERPT),
            });
        }

        let mut transcript = parse_stream(&String::from_utf8_lossy(&output.stdout))?;
        for call in &mut transcript.tool_calls {
            call.refused = !request.policy.authorize(&call.name);
        }
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{CapabilityPolicy, SubagentIdentity};

    fn request(dir: &Path) -> AgentRequest {
        AgentRequest {
            identity: SubagentIdentity::Reviewer,
            system_prompt: "review".into(),
            instructions: "check it".into(),
            policy: CapabilityPolicy::default_for(SubagentIdentity::Reviewer),
            model: None,
            working_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_build_args() {
        let runtime = ClaudeCliRuntime::new(AgentConfig::default(), "/p");
        let args = runtime.build_args(&request(Path::new("/p")), Path::new("/p/s.md"), Path::new("/p/m.json"));

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[0], "-p");
        assert_eq!(args[pos("--allowedTools") + 1], "Read,Glob,Grep,mcp__reviewer__approve,mcp__reviewer__deny");
        let denied: Vec<&str> = args[pos("--disallowedTools") + 1].split(',').collect();
        for tool in ["Bash", "Edit", "Write", "WebFetch", "Task"] {
            assert!(denied.contains(&tool), "{}", tool);
        }
        for tool in ["Read", "Glob", "Grep"] {
            assert!(!denied.contains(&tool), "{}", tool);
        }
        assert_eq!(args[pos("--output-format") + 1], "stream-json");
        assert_eq!(args[pos("--model") + 1], "opus");
        assert!(args.contains(&"--strict-mcp-config".to_string()));
        assert_eq!(args.last().unwrap(), "--dangerously-skip-permissions");
    }

    #[test]
    fn test_coder_has_only_unlisted_builtins_disallowed() {
        let runtime = ClaudeCliRuntime::new(AgentConfig::default(), "/p");
        let mut req = request(Path::new("/p"));
        req.identity = SubagentIdentity::Coder;
        req.policy = CapabilityPolicy::default_for(SubagentIdentity::Coder);
        let args = runtime.build_args(&req, Path::new("/p/s.md"), Path::new("/p/m.json"));

        let pos = args.iter().position(|a| a == "--disallowedTools").unwrap();
        let denied: Vec<&str> = args[pos + 1].split(',').collect();
        assert!(denied.contains(&"WebSearch"));
        assert!(!denied.contains(&"Bash"));
        assert!(!denied.contains(&"Write"));
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        assert_eq!(excerpt("  short  ", 10), "short");
        assert_eq!(excerpt("ééééé", 3), "é...");
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AgentConfig {
            command: "telos-no-such-agent-binary".into(),
            ..Default::default()
        };
        let runtime = ClaudeCliRuntime::new(config, dir.path());
        let err = runtime.run(request(dir.path())).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_from_fake_agent() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-agent.sh");
        fs::write(
            &script,
            "#!/bin/sh\ncat > /dev/null\necho '{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"tool_use\",\"id\":\"a\",\"name\":\"Bash\",\"input\":{}}]}}'\necho '{\"type\":\"result\",\"is_error\":false,\"result\":\"done\"}'\n",
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let config = AgentConfig {
            command: script.display().to_string(),
            ..Default::default()
        };
        let runtime = ClaudeCliRuntime::new(config, dir.path());
        let transcript = runtime.run(request(dir.path())).await.unwrap();
        assert_eq!(transcript.output, "done");
        assert!(transcript.tool_calls[0].refused);
    }
}
