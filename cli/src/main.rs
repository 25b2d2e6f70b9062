//! Lumen CLI - binary entry point.
//!
//! # Architecture
//!
//! The CLI wires `lumen-config` (settings), `lumen-client` (transport), and
//! `lumen-engine` (session machine + stream runtime) into a small command
//! surface:
//!
//! ```text
//! lumen login <email>                       interactive login
//! lumen logout                              clear the session
//! lumen whoami                              show the reconciled identity
//! lumen dsar submit <type> <email> [note]   file a privacy request
//! lumen dsar status <ticket-id>             check one ticket
//! lumen dsar list                           list visible tickets
//! lumen billing                             credit status
//! lumen setup status|providers|templates    inspect the setup wizard
//! lumen setup apply <provider> [key] [tpl]  validate + complete setup
//! lumen use <agent-id>                      pick the agent to talk to
//! lumen history                             selected agent's conversation
//! lumen send <message...>                   submit a message
//! lumen watch                               follow the reasoning stream
//! ```
//!
//! Every command except `login` restores the session first (env token,
//! native injection, persisted token - in that order). Logs go to stderr via
//! `RUST_LOG`; command output goes to stdout.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use lumen_client::dsar::{DsarRequestType, DsarSubmission};
use lumen_client::setup::SetupSubmission;
use lumen_client::{ApiClient, ClientError, spawn_reasoning_stream};
use lumen_config::Config;
use lumen_engine::{
    RedirectDecision, SessionMachine, SessionPhase, SessionRoute, SessionStore, TaskAggregator,
    is_degraded, spawn_batcher,
};
use lumen_types::{AgentId, SessionIdentity, TaskSnapshot, TicketId};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!("Usage: lumen <command>");
    println!();
    println!("Commands:");
    println!("  login <email>                        log in and persist the session");
    println!("  logout                               clear the session");
    println!("  whoami                               show the current identity");
    println!("  dsar submit <type> <email> [note]    file a privacy request");
    println!("  dsar status <ticket-id>              check one ticket");
    println!("  dsar list                            list visible tickets");
    println!("  billing                              show credit status");
    println!("  setup status|providers|templates     inspect the setup wizard");
    println!("  setup apply <provider> [key] [tpl]   validate and complete setup");
    println!("  use <agent-id>                       pick the agent to talk to");
    println!("  history                              show the selected agent's conversation");
    println!("  send <message...>                    submit a message to the selected agent");
    println!("  watch                                follow the reasoning stream");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        print_usage();
        return Ok(());
    };

    let config = Config::load().context("failed to load configuration")?;
    let store = lumen_config::data_dir().map(|dir| SessionStore::new(&dir));
    let mut machine = SessionMachine::new(config.session.clone(), store)
        .with_env_token(config.env_token.clone());
    let client = ApiClient::new(config.api.clone())?;

    match command {
        "login" => cmd_login(&mut machine, &client, &args[1..]).await,
        "logout" => cmd_logout(&mut machine, &client).await,
        "whoami" => cmd_whoami(&mut machine, &client).await,
        "dsar" => cmd_dsar(&mut machine, &client, &args[1..]).await,
        "billing" => cmd_billing(&mut machine, &client).await,
        "setup" => cmd_setup(&mut machine, &client, &args[1..]).await,
        "use" => cmd_use(&mut machine, &client, &args[1..]).await,
        "history" => cmd_history(&mut machine, &client).await,
        "send" => cmd_send(&mut machine, &client, &args[1..]).await,
        "watch" => cmd_watch(&config, &mut machine, &client).await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => bail!("unknown command {other:?}; run `lumen help`"),
    }
}

/// Restore the session and return a client carrying the reconciled token.
async fn authenticated(
    machine: &mut SessionMachine,
    client: &ApiClient,
) -> Result<(ApiClient, SessionIdentity)> {
    machine.restore(client, SessionRoute::Protected, None).await;
    match machine.phase() {
        SessionPhase::Authenticated(identity) => Ok((
            client.clone().with_token(identity.token.clone()),
            identity.clone(),
        )),
        _ => bail!("not logged in; run `lumen login <email>`"),
    }
}

/// Map a setup-gate failure onto the guarded redirect; other errors pass
/// through unchanged.
fn handle_setup_gate(machine: &mut SessionMachine, error: ClientError) -> anyhow::Error {
    if matches!(error, ClientError::SetupRequired) {
        machine.observe_error(&error);
        if machine.observe_setup_required(SessionRoute::Protected, Utc::now())
            == RedirectDecision::Proceed
        {
            return anyhow::anyhow!("setup is not complete; run `lumen setup status`");
        }
        return anyhow::anyhow!("setup is not complete (redirect suppressed by loop guard)");
    }
    machine.observe_error(&error);
    error.into()
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var("LUMEN_PASSWORD") {
        return Ok(password);
    }
    eprint!("Password: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

async fn cmd_login(machine: &mut SessionMachine, client: &ApiClient, args: &[String]) -> Result<()> {
    let Some(email) = args.first() else {
        bail!("usage: lumen login <email>");
    };
    let password = read_password()?;

    let response = client.auth().login(email, &password).await?;
    let identity = SessionIdentity {
        user_id: response.user.user_id.clone(),
        role: response.user.role,
        permissions: response.user.permissions.clone(),
        token: response.token,
    };
    machine.login_succeeded(identity);

    println!("Logged in as {} ({})", response.user.email, response.user.role.as_str());
    Ok(())
}

async fn cmd_logout(machine: &mut SessionMachine, client: &ApiClient) -> Result<()> {
    machine.restore(client, SessionRoute::Protected, None).await;
    if let SessionPhase::Authenticated(identity) = machine.phase() {
        let authed = client.clone().with_token(identity.token.clone());
        if let Err(e) = authed.auth().logout().await {
            // Local logout proceeds regardless; the token may already be dead.
            tracing::warn!(error = %e, "Remote logout failed");
        }
    }
    machine.logout();
    println!("Logged out.");
    Ok(())
}

async fn cmd_whoami(machine: &mut SessionMachine, client: &ApiClient) -> Result<()> {
    let (_, identity) = authenticated(machine, client).await?;
    if is_degraded(&identity) {
        println!(
            "{} (degraded session: identity could not be fetched, token retained)",
            identity.user_id
        );
    } else {
        println!("{} ({})", identity.user_id, identity.role.as_str());
        for permission in &identity.permissions {
            println!("  - {permission}");
        }
    }
    Ok(())
}

async fn cmd_dsar(machine: &mut SessionMachine, client: &ApiClient, args: &[String]) -> Result<()> {
    let (authed, _) = authenticated(machine, client).await?;

    match args.first().map(String::as_str) {
        Some("submit") => {
            let (kind, email) = match (args.get(1), args.get(2)) {
                (Some(kind), Some(email)) => (kind, email),
                _ => bail!("usage: lumen dsar submit <access|deletion|correction|portability> <email> [note]"),
            };
            let Some(request_type) = DsarRequestType::parse(kind) else {
                bail!("unknown DSAR type {kind:?}");
            };
            let ticket = authed
                .dsar()
                .submit(&DsarSubmission {
                    request_type,
                    email: email.clone(),
                    details: args.get(3).cloned(),
                })
                .await?;
            println!("Filed {} request: ticket {} ({})", request_type.as_str(), ticket.ticket_id, ticket.status);
        }
        Some("status") => {
            let Some(id) = args.get(1) else {
                bail!("usage: lumen dsar status <ticket-id>");
            };
            let ticket = authed.dsar().check_status(&TicketId::new(id.clone())).await?;
            println!("{}: {} ({} for {})", ticket.ticket_id, ticket.status, ticket.request_type.as_str(), ticket.email);
        }
        Some("list") => {
            let tickets = authed.dsar().list().await?;
            if tickets.is_empty() {
                println!("No DSAR tickets.");
            }
            for ticket in tickets {
                println!("{}: {} ({})", ticket.ticket_id, ticket.status, ticket.request_type.as_str());
            }
        }
        _ => bail!("usage: lumen dsar <submit|status|list>"),
    }
    Ok(())
}

async fn cmd_billing(machine: &mut SessionMachine, client: &ApiClient) -> Result<()> {
    let (authed, _) = authenticated(machine, client).await?;
    let status = authed.billing().credit_status().await?;
    println!(
        "{} of {} credits remaining on the {} plan",
        status.credits_remaining, status.monthly_allowance, status.plan
    );
    if let Some(renews_at) = status.renews_at {
        println!("Renews at {renews_at}");
    }
    Ok(())
}

async fn cmd_setup(machine: &mut SessionMachine, client: &ApiClient, args: &[String]) -> Result<()> {
    let (authed, _) = authenticated(machine, client).await?;

    match args.first().map(String::as_str) {
        Some("status") => {
            let status = authed.setup().status().await?;
            if status.required {
                println!("Setup required. Completed steps: {:?}", status.completed_steps);
            } else {
                println!("Setup complete.");
                machine.setup_completed();
            }
        }
        Some("providers") => {
            for provider in authed.setup().providers().await? {
                let key_note = if provider.requires_api_key { " (needs API key)" } else { "" };
                println!("{}: {}{}", provider.id, provider.name, key_note);
            }
        }
        Some("templates") => {
            for template in authed.setup().templates().await? {
                println!(
                    "{}: {} - {}",
                    template.id,
                    template.name,
                    template.description.as_deref().unwrap_or("")
                );
            }
        }
        Some("apply") => {
            let Some(provider_id) = args.get(1) else {
                bail!("usage: lumen setup apply <provider-id> [api-key] [template-id]");
            };
            let submission = SetupSubmission {
                provider_id: provider_id.clone(),
                api_key: args.get(2).cloned(),
                template_id: args.get(3).cloned(),
            };

            let report = authed.setup().validate(&submission).await?;
            if !report.valid {
                for issue in &report.issues {
                    println!("issue: {issue}");
                }
                bail!("setup submission is not valid");
            }

            let status = authed.setup().complete(&submission).await?;
            machine.setup_completed();
            println!("Setup complete (steps: {:?})", status.completed_steps);
        }
        _ => bail!("usage: lumen setup <status|providers|templates|apply>"),
    }
    Ok(())
}

async fn cmd_use(machine: &mut SessionMachine, client: &ApiClient, args: &[String]) -> Result<()> {
    let (authed, _) = authenticated(machine, client).await?;
    let Some(agent_id) = args.first() else {
        bail!("usage: lumen use <agent-id>");
    };

    let profile = authed.agents().identity(&AgentId::new(agent_id.clone())).await?;
    println!(
        "Talking to {} ({})",
        profile.name,
        profile.description.as_deref().unwrap_or("no description")
    );
    machine.select_agent(lumen_engine::SelectedAgent {
        id: profile.agent_id,
        name: profile.name,
    });
    Ok(())
}

async fn cmd_history(machine: &mut SessionMachine, client: &ApiClient) -> Result<()> {
    let (authed, _) = authenticated(machine, client).await?;
    let Some(agent) = machine.selected_agent().cloned() else {
        bail!("no agent selected; run `lumen use <agent-id>`");
    };

    let entries = authed.agents().history(&agent.id).await?;
    if entries.is_empty() {
        println!("No history with {} yet.", agent.name);
    }
    for entry in entries {
        println!("[{}] {}: {}", entry.created_at, entry.role, entry.content);
    }
    Ok(())
}

async fn cmd_send(machine: &mut SessionMachine, client: &ApiClient, args: &[String]) -> Result<()> {
    let (authed, _) = authenticated(machine, client).await?;
    let Some(agent) = machine.selected_agent().cloned() else {
        bail!("no agent selected; run `lumen use <agent-id>`");
    };
    if args.is_empty() {
        bail!("usage: lumen send <message...>");
    }
    let message = args.join(" ");

    match authed
        .agents()
        .submit_message(&agent.id, &message, None)
        .await
    {
        Ok(receipt) => {
            println!("Accepted as message {}", receipt.message_id);
            if let Some(task_id) = receipt.task_id {
                println!("Reasoning task: {task_id} (follow with `lumen watch`)");
            }
            Ok(())
        }
        Err(e) => Err(handle_setup_gate(machine, e)),
    }
}

async fn cmd_watch(
    config: &Config,
    machine: &mut SessionMachine,
    client: &ApiClient,
) -> Result<()> {
    let (authed, _) = authenticated(machine, client).await?;

    let (record_tx, mut batch_rx) = spawn_batcher(config.stream.batch_debounce());
    let handle = spawn_reasoning_stream(authed, record_tx);
    let mut aggregator = TaskAggregator::new(config.stream.clone());
    let mut last = aggregator.snapshot();

    println!("Watching the reasoning stream (Ctrl-C to stop)...");
    loop {
        tokio::select! {
            maybe = batch_rx.recv() => match maybe {
                Some(batch) => {
                    let snapshot = aggregator.apply(&batch);
                    if snapshot != last {
                        render(&snapshot);
                        last = snapshot;
                    }
                }
                None => {
                    println!("Stream closed; re-run `lumen watch` to reconnect.");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                handle.abort();
                break;
            }
        }
    }
    handle.finished().await;
    Ok(())
}

fn render(snapshot: &TaskSnapshot) {
    println!("-- {} task(s) --", snapshot.len());
    for task in snapshot.tasks_by_first_seen() {
        let mark = if task.completed() { "done" } else { " ..." };
        println!(
            "[{mark}] {} {}",
            task.task_id(),
            task.description().unwrap_or("(no description yet)")
        );
        for thought in task.thoughts() {
            let latest = thought
                .latest_stage()
                .map_or("-", lumen_types::Stage::as_str);
            println!(
                "       {} ({} stage(s), latest: {latest})",
                thought.thought_id(),
                thought.stage_count()
            );
        }
    }
}
