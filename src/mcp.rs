//! MCP (Model Context Protocol) server — exposes the broker as an MCP tool
//! server.
//!
//! AI agents connect via stdio and drive the full tool surface: authorized
//! SSH command execution, the remediation workflow, diagnostics, Ansible
//! wrappers, and policy introspection. Implements JSON-RPC 2.0 with the
//! MCP protocol surface: `initialize`, `tools/list`, `tools/call`,
//! `notifications/initialized`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_derive::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::actions::ActionManager;
use crate::ansible;
use crate::audit::{AuditLog, EventType, LogLevel, Status};
use crate::catalog::Catalog;
use crate::classify::RiskLevel;
use crate::diagnostics::{Diagnostics, JournalFilter};
use crate::error::{Error, Result};
use crate::executor::CommandExecutor;
use crate::learning::LearningStore;
use crate::transport::SshBroker;

// ---------------------------------------------------------------------------
// JSON-RPC types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

// ---------------------------------------------------------------------------
// MCP protocol types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    server_info: ServerInfo,
}

#[derive(Debug, Serialize)]
struct ServerCapabilities {
    tools: ToolsCapability,
}

#[derive(Debug, Serialize)]
struct ToolsCapability {}

#[derive(Debug, Serialize)]
struct ServerInfo {
    name: String,
    version: String,
}

#[derive(Debug, Serialize)]
struct ToolDefinition {
    name: String,
    description: String,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct ToolsListResult {
    tools: Vec<ToolDefinition>,
}

#[derive(Debug, Serialize)]
struct ToolCallResult {
    content: Vec<ToolContent>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    is_error: bool,
}

#[derive(Debug, Serialize)]
struct ToolContent {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

/// Build a JSON-schema object from `(name, type, description)` property
/// rows plus the required subset.
fn object_schema(props: &[(&str, &str, &str)], required: &[&str]) -> Value {
    let mut properties = serde_json::Map::new();
    for (name, kind, description) in props {
        properties.insert(
            (*name).to_string(),
            json!({ "type": kind, "description": description }),
        );
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

// ---------------------------------------------------------------------------
// McpServer
// ---------------------------------------------------------------------------

/// The MCP server. Holds explicit handles to every subsystem; construction
/// order (catalog → classifier → learning → engine → broker → facades)
/// lives with the caller.
pub struct McpServer {
    executor: Arc<CommandExecutor>,
    actions: Arc<ActionManager>,
    diagnostics: Arc<Diagnostics>,
    learning: Arc<LearningStore>,
    catalog: Arc<Catalog>,
    broker: Arc<SshBroker>,
    audit: Arc<AuditLog>,
    session_id: String,
}

impl McpServer {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        executor: Arc<CommandExecutor>,
        actions: Arc<ActionManager>,
        diagnostics: Arc<Diagnostics>,
        learning: Arc<LearningStore>,
        catalog: Arc<Catalog>,
        broker: Arc<SshBroker>,
        audit: Arc<AuditLog>,
        session_id: String,
    ) -> Self {
        Self {
            executor,
            actions,
            diagnostics,
            learning,
            catalog,
            broker,
            audit,
            session_id,
        }
    }

    /// Run the stdio JSON-RPC loop. Reads requests from stdin, writes
    /// responses to stdout, one JSON object per line.
    ///
    /// # Errors
    /// Returns an error if stdin/stdout operations fail.
    pub async fn run_stdio(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut lines = stdin.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                let json = serde_json::to_string(&response)?;
                stdout.write_all(json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        self.broker.close_all().await;
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse {
                    jsonrpc: "2.0".into(),
                    id: None,
                    result: None,
                    error: Some(JsonRpcError {
                        code: -32700,
                        message: format!("Parse error: {e}"),
                    }),
                });
            }
        };
        self.handle_request(&request).await
    }

    async fn handle_request(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request)),
            "notifications/initialized" => None, // notification, no response
            "tools/list" => Some(self.handle_tools_list(request)),
            "tools/call" => Some(self.handle_tools_call(request).await),
            _ => Some(JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: request.id.clone(),
                result: None,
                error: Some(JsonRpcError {
                    code: -32601,
                    message: format!("Method not found: {}", request.method),
                }),
            }),
        }
    }

    fn handle_initialize(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let result = InitializeResult {
            protocol_version: "2024-11-05".into(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {},
            },
            server_info: ServerInfo {
                name: "fleetgate".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };
        JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: request.id.clone(),
            result: serde_json::to_value(result).ok(),
            error: None,
        }
    }

    fn handle_tools_list(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: request.id.clone(),
            result: serde_json::to_value(ToolsListResult {
                tools: tool_definitions(),
            })
            .ok(),
            error: None,
        }
    }

    async fn handle_tools_call(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let params = request.params.as_ref().and_then(|p| p.as_object());
        let tool_name = params
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("");
        let arguments = params
            .and_then(|p| p.get("arguments"))
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        let result = self.dispatch_tool(tool_name, &arguments).await;

        let (event, status, level) = match &result {
            Ok(_) => (EventType::ToolSuccess, Status::Success, LogLevel::Info),
            Err(_) => (EventType::ToolError, Status::Failure, LogLevel::Warning),
        };
        self.audit.event(
            event,
            status,
            json!({
                "tool": tool_name,
                "session_id": self.session_id,
                "error": result.as_ref().err().map(ToString::to_string),
            }),
            level,
        );

        match result {
            Ok(text) => JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: request.id.clone(),
                result: serde_json::to_value(ToolCallResult {
                    content: vec![ToolContent {
                        content_type: "text".into(),
                        text,
                    }],
                    is_error: false,
                })
                .ok(),
                error: None,
            },
            Err(e) => JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: request.id.clone(),
                result: serde_json::to_value(ToolCallResult {
                    content: vec![ToolContent {
                        content_type: "text".into(),
                        text: format!("Error: {e}"),
                    }],
                    is_error: true,
                })
                .ok(),
                error: None,
            },
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn dispatch_tool(&self, tool_name: &str, args: &Value) -> Result<String> {
        match tool_name {
            // --- SSH command operations ------------------------------------
            "execute_ssh_command" => {
                let response = self
                    .executor
                    .execute(
                        str_arg(args, "host")?,
                        str_arg(args, "command")?,
                        bool_arg(args, "force_approval", false),
                    )
                    .await?;
                pretty(&response)
            }
            "approve_command" => {
                let response = self.executor.approve(str_arg(args, "approval_id")?).await?;
                pretty(&response)
            }
            "list_pending_approvals" => pretty(&json!({
                "pending": self.executor.pending(),
            })),
            "show_command_whitelist" => pretty(&self.executor.whitelist()),

            // --- Remediation actions ---------------------------------------
            "propose_remote_execution" => pretty(&self.actions.propose(
                str_arg(args, "action")?,
                str_arg(args, "host")?,
                str_arg(args, "rationale")?,
                bool_arg(args, "auto_approve", false),
            )),
            "approve_remote_execution" => pretty(&self.actions.approve(
                str_arg(args, "action_id")?,
                args.get("approved").and_then(Value::as_bool).ok_or_else(|| {
                    Error::Mcp("Missing 'approved' parameter".into())
                })?,
                opt_str(args, "approver").unwrap_or("human"),
            )),
            "execute_remote_execution" => {
                let outcome = self.actions.execute(str_arg(args, "action_id")?).await?;
                pretty(&outcome)
            }
            "list_pending_actions" => pretty(&json!({
                "pending": self.actions.list_pending(),
            })),

            // --- Introspection ---------------------------------------------
            "analyze_command" => pretty(&self.executor.analyze(str_arg(args, "command")?)),
            "get_learning_suggestions" => {
                let min_count = opt_u64(args, "min_count").unwrap_or(5);
                let min_age_hours = opt_u64(args, "min_age_hours").unwrap_or(24) as i64;
                pretty(&json!({
                    "suggestions": self.learning.suggestions(min_count, min_age_hours, RiskLevel::Low),
                }))
            }
            "get_learning_stats" => pretty(&self.learning.summary()),
            "list_command_plugins" => {
                let plugins: Vec<Value> = self
                    .catalog
                    .plugins()
                    .iter()
                    .map(|p| {
                        json!({
                            "name": p.name,
                            "category": p.category,
                            "description": p.description,
                            "command_count": p.commands.len(),
                        })
                    })
                    .collect();
                pretty(&json!({ "plugins": plugins }))
            }
            "get_plugin_details" => {
                let name = str_arg(args, "name")?;
                let plugin = self
                    .catalog
                    .plugin(name)
                    .ok_or_else(|| Error::Policy(format!("unknown plugin '{name}'")))?;
                pretty(&plugin.summary())
            }
            "search_commands" => {
                let query = str_arg(args, "query")?;
                let hits: Vec<Value> = self
                    .catalog
                    .search(query)
                    .into_iter()
                    .map(|(key, plugin, spec)| {
                        json!({
                            "command": key,
                            "plugin": plugin.name,
                            "risk": spec.risk,
                            "level": spec.level,
                            "description": spec.description,
                        })
                    })
                    .collect();
                pretty(&json!({ "query": query, "results": hits }))
            }
            "get_current_auth_mode" => pretty(&json!({
                "auth_mode": self.broker.auth_mode(),
                "pooled_connections": self.broker.pooled_connections().await,
            })),

            // --- Diagnostics ------------------------------------------------
            "get_system_info" => self.diagnostics.system_info(str_arg(args, "host")?).await,
            "get_cpu_info" => self.diagnostics.cpu_info(str_arg(args, "host")?).await,
            "get_memory_info" => self.diagnostics.memory_info(str_arg(args, "host")?).await,
            "get_disk_usage" => self.diagnostics.disk_usage(str_arg(args, "host")?).await,
            "get_block_devices" => self.diagnostics.block_devices(str_arg(args, "host")?).await,
            "list_services" => self.diagnostics.list_services(str_arg(args, "host")?).await,
            "get_service_status" => {
                self.diagnostics
                    .service_status(str_arg(args, "host")?, str_arg(args, "service")?)
                    .await
            }
            "get_service_logs" => {
                self.diagnostics
                    .service_logs(
                        str_arg(args, "host")?,
                        str_arg(args, "service")?,
                        opt_u32(args, "lines"),
                    )
                    .await
            }
            "check_service_health" => {
                self.diagnostics
                    .service_health(str_arg(args, "host")?, str_arg(args, "service")?)
                    .await
            }
            "get_network_interfaces" => {
                self.diagnostics
                    .network_interfaces(str_arg(args, "host")?)
                    .await
            }
            "get_routing_table" => self.diagnostics.routing_table(str_arg(args, "host")?).await,
            "get_listening_ports" => {
                self.diagnostics
                    .listening_ports(str_arg(args, "host")?)
                    .await
            }
            "get_active_connections" => {
                self.diagnostics
                    .active_connections(str_arg(args, "host")?)
                    .await
            }
            "get_dns_config" => self.diagnostics.dns_config(str_arg(args, "host")?).await,
            "ping_host" => {
                self.diagnostics
                    .ping(
                        str_arg(args, "host")?,
                        str_arg(args, "target")?,
                        opt_u32(args, "count").unwrap_or(4),
                    )
                    .await
            }
            "get_journal_logs" => {
                let filter = JournalFilter {
                    lines: opt_u32(args, "lines"),
                    priority: opt_str(args, "priority").map(String::from),
                    since: opt_str(args, "since").map(String::from),
                    unit: opt_str(args, "unit").map(String::from),
                };
                self.diagnostics
                    .journal_logs(str_arg(args, "host")?, &filter)
                    .await
            }
            "read_log_file" => {
                self.diagnostics
                    .read_log_file(
                        str_arg(args, "host")?,
                        str_arg(args, "path")?,
                        opt_u32(args, "lines"),
                    )
                    .await
            }
            "search_logs" => {
                self.diagnostics
                    .search_logs(
                        str_arg(args, "host")?,
                        str_arg(args, "pattern")?,
                        opt_str(args, "log_path"),
                        opt_u32(args, "lines").unwrap_or(50),
                        opt_u32(args, "context").unwrap_or(2),
                    )
                    .await
            }
            "analyze_errors" => {
                self.diagnostics
                    .analyze_errors(
                        str_arg(args, "host")?,
                        opt_str(args, "service"),
                        opt_str(args, "since").unwrap_or("-1h"),
                    )
                    .await
            }

            // --- Ansible ----------------------------------------------------
            "run_ansible_playbook" => {
                let extra_vars = extra_vars_arg(args)?;
                let response = ansible::run_playbook(
                    &self.executor,
                    str_arg(args, "host")?,
                    str_arg(args, "playbook_path")?,
                    opt_str(args, "inventory").unwrap_or("localhost,"),
                    bool_arg(args, "check_mode", true),
                    extra_vars.as_ref(),
                    bool_arg(args, "force_approval", false),
                )
                .await?;
                pretty(&response)
            }
            "check_ansible_playbook" => {
                let extra_vars = extra_vars_arg(args)?;
                let response = ansible::check_playbook(
                    &self.executor,
                    str_arg(args, "host")?,
                    str_arg(args, "playbook_path")?,
                    opt_str(args, "inventory").unwrap_or("localhost,"),
                    extra_vars.as_ref(),
                )
                .await?;
                pretty(&response)
            }
            "list_ansible_playbooks" => {
                let response = ansible::list_playbooks(
                    &self.executor,
                    str_arg(args, "host")?,
                    opt_str(args, "playbooks_dir").unwrap_or(ansible::DEFAULT_PLAYBOOKS_DIR),
                )
                .await?;
                pretty(&response)
            }
            "show_ansible_inventory" => {
                let response = ansible::show_inventory(
                    &self.executor,
                    str_arg(args, "host")?,
                    opt_str(args, "inventory_path").unwrap_or(ansible::DEFAULT_INVENTORY_PATH),
                )
                .await?;
                pretty(&response)
            }

            _ => Err(Error::Mcp(format!("Unknown tool: {tool_name}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn str_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Mcp(format!("Missing '{name}' parameter")))
}

fn opt_str<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

fn opt_u64(args: &Value, name: &str) -> Option<u64> {
    args.get(name).and_then(Value::as_u64)
}

fn opt_u32(args: &Value, name: &str) -> Option<u32> {
    opt_u64(args, name).map(|v| v as u32)
}

fn bool_arg(args: &Value, name: &str, default: bool) -> bool {
    args.get(name).and_then(Value::as_bool).unwrap_or(default)
}

fn extra_vars_arg(args: &Value) -> Result<Option<BTreeMap<String, String>>> {
    match args.get("extra_vars") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let map: BTreeMap<String, Value> = serde_json::from_value(value.clone())
                .map_err(|_| Error::Mcp("'extra_vars' must be an object".into()))?;
            Ok(Some(
                map.into_iter()
                    .map(|(k, v)| {
                        let rendered = match v {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, rendered)
                    })
                    .collect(),
            ))
        }
    }
}

fn pretty<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_lines)]
fn tool_definitions() -> Vec<ToolDefinition> {
    let host = ("host", "string", "Target host name or address");
    let service = ("service", "string", "Systemd service name, with or without .service");
    let lines = ("lines", "integer", "Number of log lines");

    let tool = |name: &str, description: &str, schema: Value| ToolDefinition {
        name: name.into(),
        description: description.into(),
        input_schema: schema,
    };

    vec![
        // SSH command operations
        tool(
            "execute_ssh_command",
            "Execute a shell command on a host under the authorization policy. \
             Read-only commands run immediately; state-changing commands return \
             an approval id; dangerous commands are refused.",
            object_schema(
                &[
                    host,
                    ("command", "string", "The shell command to execute"),
                    ("force_approval", "boolean", "Bypass the manual-approval step (audited as a security event)"),
                ],
                &["host", "command"],
            ),
        ),
        tool(
            "approve_command",
            "Approve and execute a pending command by its approval id.",
            object_schema(
                &[("approval_id", "string", "Approval id from execute_ssh_command")],
                &["approval_id"],
            ),
        ),
        tool(
            "list_pending_approvals",
            "List commands awaiting human approval.",
            object_schema(&[], &[]),
        ),
        tool(
            "show_command_whitelist",
            "Show the command whitelist grouped by authorization level.",
            object_schema(&[], &[]),
        ),
        // Remediation actions
        tool(
            "propose_remote_execution",
            "Propose a named remediation action (bounded catalog) for human \
             validation. Auto-approval is honored only for LOW-impact actions.",
            object_schema(
                &[
                    ("action", "string", "Action name from the remediation catalog"),
                    host,
                    ("rationale", "string", "Why this action is needed"),
                    ("auto_approve", "boolean", "Auto-approve if the action is LOW impact"),
                ],
                &["action", "host", "rationale"],
            ),
        ),
        tool(
            "approve_remote_execution",
            "Approve or reject a proposed remediation action.",
            object_schema(
                &[
                    ("action_id", "string", "Action id from propose_remote_execution"),
                    ("approved", "boolean", "true to approve, false to reject"),
                    ("approver", "string", "Identifier of the approver"),
                ],
                &["action_id", "approved"],
            ),
        ),
        tool(
            "execute_remote_execution",
            "Execute an approved remediation action via the executor channel.",
            object_schema(
                &[("action_id", "string", "Action id from propose_remote_execution")],
                &["action_id"],
            ),
        ),
        tool(
            "list_pending_actions",
            "List remediation actions that are not yet terminal.",
            object_schema(&[], &[]),
        ),
        // Introspection
        tool(
            "analyze_command",
            "Classify a command: risk level, category, suggested authorization.",
            object_schema(
                &[("command", "string", "The command to analyze")],
                &["command"],
            ),
        ),
        tool(
            "get_learning_suggestions",
            "Ranked whitelist-extension suggestions from denied-command history.",
            object_schema(
                &[
                    ("min_count", "integer", "Minimum denial count (default 5)"),
                    ("min_age_hours", "integer", "Minimum hours since first denial (default 24)"),
                ],
                &[],
            ),
        ),
        tool(
            "get_learning_stats",
            "Aggregate statistics of the denied-command history.",
            object_schema(&[], &[]),
        ),
        tool(
            "list_command_plugins",
            "List command-family plugins in the policy catalog.",
            object_schema(&[], &[]),
        ),
        tool(
            "get_plugin_details",
            "Full specification list of one catalog plugin.",
            object_schema(&[("name", "string", "Plugin name")], &["name"]),
        ),
        tool(
            "search_commands",
            "Search catalog commands by name, description, or rationale.",
            object_schema(&[("query", "string", "Search query")], &["query"]),
        ),
        tool(
            "get_current_auth_mode",
            "Report the detected SSH authentication mode (agent/direct/none).",
            object_schema(&[], &[]),
        ),
        // Diagnostics
        tool(
            "get_system_info",
            "OS, kernel, uptime, load, and hostname (read-only).",
            object_schema(&[host], &["host"]),
        ),
        tool(
            "get_cpu_info",
            "CPU model, cores, and load (read-only).",
            object_schema(&[host], &["host"]),
        ),
        tool(
            "get_memory_info",
            "RAM and swap usage (read-only).",
            object_schema(&[host], &["host"]),
        ),
        tool(
            "get_disk_usage",
            "Disk usage for real filesystems (read-only).",
            object_schema(&[host], &["host"]),
        ),
        tool(
            "get_block_devices",
            "Block devices with sizes and mount points (read-only).",
            object_schema(&[host], &["host"]),
        ),
        tool(
            "list_services",
            "All systemd services and their states (read-only).",
            object_schema(&[host], &["host"]),
        ),
        tool(
            "get_service_status",
            "Detailed status of one service (read-only).",
            object_schema(&[host, service], &["host", "service"]),
        ),
        tool(
            "get_service_logs",
            "Recent journal lines for one service (read-only).",
            object_schema(&[host, service, lines], &["host", "service"]),
        ),
        tool(
            "check_service_health",
            "Health report: state, PID, memory, recent errors (read-only).",
            object_schema(&[host, service], &["host", "service"]),
        ),
        tool(
            "get_network_interfaces",
            "Interface configuration (read-only).",
            object_schema(&[host], &["host"]),
        ),
        tool(
            "get_routing_table",
            "Kernel routing table (read-only).",
            object_schema(&[host], &["host"]),
        ),
        tool(
            "get_listening_ports",
            "Listening sockets with owning processes (read-only).",
            object_schema(&[host], &["host"]),
        ),
        tool(
            "get_active_connections",
            "Established connections (read-only).",
            object_schema(&[host], &["host"]),
        ),
        tool(
            "get_dns_config",
            "Resolver configuration (read-only).",
            object_schema(&[host], &["host"]),
        ),
        tool(
            "ping_host",
            "ICMP reachability probe from a fleet host (read-only).",
            object_schema(
                &[
                    host,
                    ("target", "string", "Destination to ping"),
                    ("count", "integer", "Packet count (default 4)"),
                ],
                &["host", "target"],
            ),
        ),
        tool(
            "get_journal_logs",
            "Journal lines with optional priority/since/unit filters (read-only).",
            object_schema(
                &[
                    host,
                    lines,
                    ("priority", "string", "Priority filter (e.g. err)"),
                    ("since", "string", "Time filter (relative or absolute)"),
                    ("unit", "string", "Unit filter"),
                ],
                &["host"],
            ),
        ),
        tool(
            "read_log_file",
            "Tail a log file; the path must match the allowlist (read-only).",
            object_schema(
                &[host, ("path", "string", "Absolute log file path"), lines],
                &["host", "path"],
            ),
        ),
        tool(
            "search_logs",
            "Search a log file or the journal for a pattern (read-only).",
            object_schema(
                &[
                    host,
                    ("pattern", "string", "Regex pattern"),
                    ("log_path", "string", "Log file path; omit to search the journal"),
                    lines,
                    ("context", "integer", "Context lines around matches (default 2)"),
                ],
                &["host", "pattern"],
            ),
        ),
        tool(
            "analyze_errors",
            "Error-priority journal summary over a time window (read-only).",
            object_schema(
                &[
                    host,
                    ("service", "string", "Limit to one service"),
                    ("since", "string", "Time window (default -1h)"),
                ],
                &["host"],
            ),
        ),
        // Ansible
        tool(
            "run_ansible_playbook",
            "Run an Ansible playbook. Check mode is AUTO; apply mode requires approval.",
            object_schema(
                &[
                    host,
                    ("playbook_path", "string", "Playbook path on the remote host"),
                    ("inventory", "string", "Inventory (default localhost,)"),
                    ("check_mode", "boolean", "Dry-run mode (default true)"),
                    ("extra_vars", "object", "Extra variables passed to ansible-playbook"),
                    ("force_approval", "boolean", "Bypass approval for apply mode (audited)"),
                ],
                &["host", "playbook_path"],
            ),
        ),
        tool(
            "check_ansible_playbook",
            "Run an Ansible playbook in check mode (always auto-approved).",
            object_schema(
                &[
                    host,
                    ("playbook_path", "string", "Playbook path on the remote host"),
                    ("inventory", "string", "Inventory (default localhost,)"),
                    ("extra_vars", "object", "Extra variables"),
                ],
                &["host", "playbook_path"],
            ),
        ),
        tool(
            "list_ansible_playbooks",
            "List playbook files on the remote host.",
            object_schema(
                &[host, ("playbooks_dir", "string", "Playbook directory")],
                &["host"],
            ),
        ),
        tool(
            "show_ansible_inventory",
            "Show the Ansible inventory on the remote host.",
            object_schema(
                &[host, ("inventory_path", "string", "Inventory directory")],
                &["host"],
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorize::AuthorizationEngine;
    use crate::classify::Classifier;
    use crate::config::Settings;
    use crate::env::MockEnvironment;
    use crate::transport::{MockConnector, SshAuthMode};
    use crate::whitelist;

    struct Fixture {
        server: McpServer,
        connector: Arc<MockConnector>,
        _temp: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let mut env = MockEnvironment::default();
        env.env_vars.insert("USER".into(), "mcp-reader".into());
        let settings = Arc::new(Settings::from_env(&env).unwrap());
        let audit = Arc::new(AuditLog::new(None));
        let temp = tempfile::tempdir().unwrap();

        let catalog = Arc::new(Catalog::builtin().unwrap());
        let classifier = Arc::new(Classifier::new(Arc::clone(&catalog)));
        let learning = Arc::new(LearningStore::new(
            temp.path().join("stats.json"),
            Arc::clone(&classifier),
        ));
        let engine = Arc::new(AuthorizationEngine::new(
            whitelist::default_rules(),
            Arc::clone(&learning),
        ));
        let connector = Arc::new(MockConnector::new());
        let broker = Arc::new(SshBroker::with_connector(
            Arc::clone(&settings),
            Arc::clone(&audit),
            SshAuthMode::Agent,
            Box::new(Arc::clone(&connector)),
        ));
        let executor = Arc::new(CommandExecutor::new(
            Arc::clone(&settings),
            Arc::clone(&classifier),
            engine,
            Arc::clone(&broker),
            Arc::clone(&audit),
        ));
        let actions = Arc::new(ActionManager::new(
            Arc::clone(&settings),
            Arc::clone(&broker),
            Arc::clone(&audit),
        ));
        let diagnostics = Arc::new(Diagnostics::new(
            Arc::clone(&settings),
            Arc::clone(&broker),
        ));

        Fixture {
            server: McpServer::new(
                executor,
                actions,
                diagnostics,
                learning,
                catalog,
                broker,
                audit,
                "test-session".into(),
            ),
            connector,
            _temp: temp,
        }
    }

    fn make_request(id: i64, method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(Value::Number(id.into())),
            method: method.into(),
            params,
        }
    }

    fn call(name: &str, arguments: Value) -> JsonRpcRequest {
        make_request(
            1,
            "tools/call",
            Some(json!({ "name": name, "arguments": arguments })),
        )
    }

    fn text_of(response: &JsonRpcResponse) -> Value {
        let result = response.result.as_ref().unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap_or(Value::String(text.to_string()))
    }

    #[tokio::test]
    async fn test_initialize() {
        let f = fixture();
        let response = f
            .server
            .handle_request(&make_request(1, "initialize", None))
            .await
            .unwrap();
        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "fleetgate");
    }

    #[tokio::test]
    async fn test_notification_returns_none() {
        let f = fixture();
        let request = make_request(0, "notifications/initialized", None);
        assert!(f.server.handle_request(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let f = fixture();
        let response = f
            .server
            .handle_request(&make_request(7, "unknown/method", None))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_malformed_json_line() {
        let f = fixture();
        let response = f.server.handle_line("not valid json").await.unwrap();
        assert_eq!(response.error.unwrap().code, -32700);
    }

    #[tokio::test]
    async fn test_tools_list_covers_surface() {
        let f = fixture();
        let response = f
            .server
            .handle_request(&make_request(2, "tools/list", None))
            .await
            .unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        for expected in [
            "execute_ssh_command",
            "approve_command",
            "list_pending_approvals",
            "show_command_whitelist",
            "propose_remote_execution",
            "approve_remote_execution",
            "execute_remote_execution",
            "list_pending_actions",
            "analyze_command",
            "get_learning_suggestions",
            "get_learning_stats",
            "list_command_plugins",
            "get_plugin_details",
            "search_commands",
            "get_current_auth_mode",
            "get_system_info",
            "get_journal_logs",
            "read_log_file",
            "run_ansible_playbook",
            "show_ansible_inventory",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
    }

    #[tokio::test]
    async fn test_execute_auto_command_via_tool() {
        let f = fixture();
        let response = f
            .server
            .handle_request(&call(
                "execute_ssh_command",
                json!({ "host": "coreos-11", "command": "systemctl status unbound" }),
            ))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert_eq!(payload["status"], "executed");
        assert_eq!(payload["ssh_user"], "mcp-reader");
    }

    #[tokio::test]
    async fn test_manual_lifecycle_via_tools() {
        let f = fixture();

        let response = f
            .server
            .handle_request(&call(
                "execute_ssh_command",
                json!({ "host": "coreos-11", "command": "systemctl restart unbound" }),
            ))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert_eq!(payload["status"], "approval_required");
        let approval_id = payload["approval_id"].as_str().unwrap().to_string();

        let response = f
            .server
            .handle_request(&call("list_pending_approvals", json!({})))
            .await
            .unwrap();
        let listing = text_of(&response);
        assert_eq!(listing["pending"].as_array().unwrap().len(), 1);

        let response = f
            .server
            .handle_request(&call(
                "approve_command",
                json!({ "approval_id": approval_id }),
            ))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert_eq!(payload["status"], "executed");

        let response = f
            .server
            .handle_request(&call("list_pending_approvals", json!({})))
            .await
            .unwrap();
        let listing = text_of(&response);
        assert!(listing["pending"].as_array().unwrap().is_empty());

        assert_eq!(
            f.connector.executed_commands(),
            vec!["exec-runner@coreos-11 systemctl restart unbound"]
        );
    }

    #[tokio::test]
    async fn test_blocked_command_via_tool() {
        let f = fixture();
        let response = f
            .server
            .handle_request(&call(
                "execute_ssh_command",
                json!({ "host": "coreos-11", "command": "rm -rf /var" }),
            ))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert_eq!(payload["status"], "blocked");
        assert_eq!(payload["risk_level"], "CRITICAL");
        assert_eq!(payload["category"], "destructive");
        assert_eq!(payload["recommendation"], "BLOCK_PERMANENTLY");
    }

    #[tokio::test]
    async fn test_remediation_auto_approve_via_tools() {
        let f = fixture();
        let response = f
            .server
            .handle_request(&call(
                "propose_remote_execution",
                json!({
                    "action": "flush_dns_cache",
                    "host": "coreos-11",
                    "rationale": "smoke test",
                    "auto_approve": true,
                }),
            ))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert_eq!(payload["status"], "auto_approved");
        assert_eq!(payload["action"]["approved_by"], "auto");
        let action_id = payload["action"]["id"].as_str().unwrap().to_string();

        let response = f
            .server
            .handle_request(&call(
                "execute_remote_execution",
                json!({ "action_id": action_id }),
            ))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert_eq!(payload["status"], "completed");

        // Entry removed after completion.
        let response = f
            .server
            .handle_request(&call("list_pending_actions", json!({})))
            .await
            .unwrap();
        let listing = text_of(&response);
        assert!(listing["pending"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remediation_medium_impact_not_auto_approved() {
        let f = fixture();
        let response = f
            .server
            .handle_request(&call(
                "propose_remote_execution",
                json!({
                    "action": "restart_container",
                    "host": "coreos-11",
                    "rationale": "smoke test",
                    "auto_approve": true,
                }),
            ))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert_eq!(payload["status"], "proposed");
        assert_eq!(payload["action"]["status"], "proposed");
    }

    #[tokio::test]
    async fn test_missing_parameter_is_tool_error() {
        let f = fixture();
        let response = f
            .server
            .handle_request(&call("execute_ssh_command", json!({ "host": "coreos-11" })))
            .await
            .unwrap();
        assert!(response.error.is_none()); // Tool errors are returned as content
        let result = response.result.unwrap();
        assert!(result["isError"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let f = fixture();
        let response = f
            .server
            .handle_request(&call("nonexistent_tool", json!({})))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert!(result["isError"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn test_plugin_introspection_tools() {
        let f = fixture();
        let response = f
            .server
            .handle_request(&call("list_command_plugins", json!({})))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert_eq!(payload["plugins"].as_array().unwrap().len(), 8);

        let response = f
            .server
            .handle_request(&call("get_plugin_details", json!({ "name": "monitoring" })))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert_eq!(payload["name"], "monitoring");
        assert!(payload["command_count"].as_u64().unwrap() >= 10);

        let response = f
            .server
            .handle_request(&call("search_commands", json!({ "query": "bandwidth" })))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert!(!payload["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_learning_tools_after_denials() {
        let f = fixture();
        for _ in 0..3 {
            f.server
                .handle_request(&call(
                    "execute_ssh_command",
                    json!({ "host": "coreos-11", "command": "frobnicate --widgets" }),
                ))
                .await
                .unwrap();
        }

        let response = f
            .server
            .handle_request(&call("get_learning_stats", json!({})))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert_eq!(payload["total_unique_commands"], 1);
        assert_eq!(payload["total_block_attempts"], 3);

        // UNKNOWN risk: no suggestions even at volume.
        let response = f
            .server
            .handle_request(&call(
                "get_learning_suggestions",
                json!({ "min_count": 1, "min_age_hours": 0 }),
            ))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert!(payload["suggestions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auth_mode_tool() {
        let f = fixture();
        let response = f
            .server
            .handle_request(&call("get_current_auth_mode", json!({})))
            .await
            .unwrap();
        let payload = text_of(&response);
        assert_eq!(payload["auth_mode"], "agent");
    }

    #[tokio::test]
    async fn test_diagnostics_via_tool_uses_reader() {
        let f = fixture();
        f.server
            .handle_request(&call("get_dns_config", json!({ "host": "coreos-11" })))
            .await
            .unwrap();
        assert_eq!(
            f.connector.executed_commands(),
            vec!["mcp-reader@coreos-11 cat /etc/resolv.conf"]
        );
    }
}
