use std::sync::Arc;

use anyhow::Result;
use clap::{ArgMatches, Command};
use fleetgate::actions::ActionManager;
use fleetgate::audit::AuditLog;
use fleetgate::authorize::AuthorizationEngine;
use fleetgate::catalog::Catalog;
use fleetgate::classify::Classifier;
use fleetgate::diagnostics::Diagnostics;
use fleetgate::env::RealEnvironment;
use fleetgate::executor::CommandExecutor;
use fleetgate::mcp::McpServer;
use fleetgate::transport::SshBroker;
use fleetgate::{whitelist, Settings};

pub fn command() -> Command {
    Command::new("serve")
        .about("Start the MCP (Model Context Protocol) server over stdio")
        .long_about(
            "Start a JSON-RPC 2.0 server over stdio exposing the broker's tool \
            surface: authorized SSH command execution, remediation actions, \
            diagnostics, Ansible wrappers, and policy introspection.\n\n\
            Configure in an MCP client:\n\
            {\"mcpServers\": {\"fleetgate\": {\"command\": \"fleetgate\", \"args\": [\"serve\"]}}}",
        )
}

pub fn run(_matches: &ArgMatches, settings: &Arc<Settings>) -> Result<fleetgate::CmdExit> {
    let env = RealEnvironment;
    let session_id = uuid::Uuid::new_v4().to_string();
    tracing::info!("starting fleetgate MCP server (session: {session_id})");

    // Explicit wiring, leaves first: catalog → classifier → learning →
    // engine → broker → facades → server.
    let audit = Arc::new(AuditLog::new(settings.log_dir.as_deref()));
    let catalog = Arc::new(Catalog::builtin()?);
    let classifier = Arc::new(Classifier::new(Arc::clone(&catalog)));
    let learning = super::learning_store(settings)?;

    let rules = match &settings.whitelist_path {
        Some(path) => whitelist::parse_whitelist(&std::fs::read_to_string(path)?)?,
        None => whitelist::default_rules(),
    };
    let engine = Arc::new(AuthorizationEngine::new(rules, Arc::clone(&learning)));

    let broker = Arc::new(SshBroker::new(
        Arc::clone(settings),
        Arc::clone(&audit),
        &env,
    ));
    let executor = Arc::new(CommandExecutor::new(
        Arc::clone(settings),
        Arc::clone(&classifier),
        Arc::clone(&engine),
        Arc::clone(&broker),
        Arc::clone(&audit),
    ));
    let actions = Arc::new(ActionManager::new(
        Arc::clone(settings),
        Arc::clone(&broker),
        Arc::clone(&audit),
    ));
    let diagnostics = Arc::new(Diagnostics::new(
        Arc::clone(settings),
        Arc::clone(&broker),
    ));

    let server = McpServer::new(
        executor,
        actions,
        diagnostics,
        learning,
        catalog,
        broker,
        audit,
        session_id,
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.run_stdio())?;

    Ok(fleetgate::CmdExit {
        code: exitcode::OK,
        message: None,
    })
}
