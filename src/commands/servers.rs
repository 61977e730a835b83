//! Servers command implementation.

use anyhow::Result;
use futures::future::join_all;
use serde::Serialize;

use super::Context;
use crate::config::{Server, ServerType};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerRow {
    id: String,
    name: String,
    #[serde(rename = "type")]
    server_type: ServerType,
    target: String,
    enabled: bool,
    is_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reachable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn target(server: &Server) -> String {
    match server.server_type {
        ServerType::Local => "this host".to_string(),
        ServerType::Ssh => format!("{}@{}:{}", server.ssh_user, server.host, server.port),
        ServerType::Agent => server.agent_url.clone(),
    }
}

/// Run the servers command
pub async fn run(ctx: &Context, check: bool) -> Result<()> {
    let (settings, manager) = if check {
        let (s, m) = ctx.manager().await?;
        (s, Some(m))
    } else {
        (ctx.settings()?, None)
    };

    let mut rows: Vec<ServerRow> = settings
        .servers
        .iter()
        .map(|s| ServerRow {
            id: s.id.clone(),
            name: s.display_name().to_string(),
            server_type: s.server_type,
            target: target(s),
            enabled: s.enabled,
            is_default: s.is_default,
            reachable: None,
            error: None,
        })
        .collect();

    if let Some(manager) = manager {
        let connectors = manager.connectors();
        let probes = join_all(connectors.iter().map(|c| async move {
            (c.server().id.clone(), c.get_jail_infos().await)
        }))
        .await;
        for (id, result) in probes {
            if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
                row.reachable = Some(result.is_ok());
                row.error = result.err().map(|e| e.to_string());
            }
        }
    }

    ctx.emit(&rows, |rows| {
        println!();
        println!("{:<16} {:<6} {:<36} STATUS", "ID", "TYPE", "TARGET");
        for row in rows {
            let mut status = if row.enabled { "enabled" } else { "disabled" }.to_string();
            if row.is_default {
                status.push_str(", default");
            }
            match (row.reachable, &row.error) {
                (Some(true), _) => status.push_str(", [OK]"),
                (Some(false), Some(e)) => status.push_str(&format!(", [FAIL] {}", e)),
                _ => {}
            }
            println!(
                "{:<16} {:<6} {:<36} {}",
                row.id,
                row.server_type.to_string(),
                row.target,
                status
            );
        }
        println!();
    })
}
