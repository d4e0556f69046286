//! MCP server configuration generated per invocation.
//!
//! Each identity gets only the servers its policy can reach, written as a
//! `{"mcpServers": {...}}` document for `--mcp-config`.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::identity::SubagentIdentity;
use crate::config::McpServerConfig;
use crate::error::Result;

/// Build the MCP config document for an identity.
pub fn mcp_config_for(
    identity: SubagentIdentity,
    servers: &BTreeMap<String, McpServerConfig>,
    project_dir: &Path,
) -> Value {
    let mut out = Map::new();
    for name in identity.mcp_servers() {
        let Some(server) = servers.get(*name) else {
            log::warn!("No MCP server '{}' configured for {}", name, identity);
            continue;
        };

        let mut env = server.env.clone();
        match *name {
            "gemini-context" => {
                env.entry("CONTEXT_DIR".to_string())
                    .or_insert_with(|| project_dir.display().to_string());
            }
            "reviewer" => {
                env.entry("VERDICT_PATH".to_string())
                    .or_insert_with(|| project_dir.join("verdict.json").display().to_string());
            }
            _ => {}
        }

        out.insert(
            name.to_string(),
            json!({
                "command": server.command,
                "args": server.args,
                "env": env,
            }),
        );
    }
    json!({ "mcpServers": out })
}

/// Write the config under `<state_dir>/mcp-<identity>.json` and return its path.
pub fn write_mcp_config(
    identity: SubagentIdentity,
    servers: &BTreeMap<String, McpServerConfig>,
    project_dir: &Path,
    state_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(state_dir)?;
    let path = state_dir.join(format!("mcp-{}.json", identity));
    let doc = mcp_config_for(identity, servers, project_dir);
    fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;

    #[test]
    fn test_reviewer_gets_only_reviewer_server() {
        let servers = AgentConfig::default().mcp;
        let doc = mcp_config_for(SubagentIdentity::Reviewer, &servers, Path::new("/p"));
        let names: Vec<&String> = doc["mcpServers"].as_object().unwrap().keys().collect();
        assert_eq!(names, vec!["reviewer"]);
        assert_eq!(doc["mcpServers"]["reviewer"]["env"]["VERDICT_PATH"], "/p/verdict.json");
    }

    #[test]
    fn test_coder_gets_context_server() {
        let servers = AgentConfig::default().mcp;
        let doc = mcp_config_for(SubagentIdentity::Coder, &servers, Path::new("/p"));
        assert_eq!(doc["mcpServers"]["gemini-context"]["env"]["CONTEXT_DIR"], "/p");
        assert!(doc["mcpServers"].get("reviewer").is_none());
    }

    #[test]
    fn test_unconfigured_server_is_skipped() {
        let doc = mcp_config_for(SubagentIdentity::Marketing, &BTreeMap::new(), Path::new("/p"));
        assert!(doc["mcpServers"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_write_mcp_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_mcp_config(
            SubagentIdentity::Crm,
            &AgentConfig::default().mcp,
            dir.path(),
            &dir.path().join(".telos"),
        )
        .unwrap();
        assert!(path.ends_with(".telos/mcp-crm.json"));
        let doc: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(doc["mcpServers"]["twenty-crm"]["command"], "npx");
    }
}
