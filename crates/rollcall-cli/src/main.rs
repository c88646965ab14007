use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rollcall_core::{EventPatch, NewEvent, Resolution, Role};

// `#[zbus::proxy]` generates `AttendanceProxy` (async) and a blocking twin;
// only the async one is used.
#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn status(&self) -> zbus::Result<String>;
    async fn provision_admin(&self, name: &str) -> zbus::Result<String>;
    async fn register(&self, name: &str, role: &str) -> zbus::Result<String>;
    async fn whoami(&self, caller: &str) -> zbus::Result<String>;
    async fn assign_role(&self, caller: &str, identity: &str, role: &str) -> zbus::Result<String>;
    async fn enroll(
        &self,
        caller: &str,
        person: &str,
        display_name: &str,
        image: Vec<u8>,
    ) -> zbus::Result<String>;
    async fn add_person(&self, caller: &str, person: &str, display_name: &str)
        -> zbus::Result<String>;
    async fn list_people(&self, caller: &str) -> zbus::Result<String>;
    async fn clear_references(&self, caller: &str, person: &str) -> zbus::Result<String>;
    async fn remove_person(&self, caller: &str, person: &str) -> zbus::Result<()>;
    async fn submit_request(&self, caller: &str) -> zbus::Result<String>;
    async fn resolve_request(
        &self,
        caller: &str,
        request: &str,
        resolution: &str,
    ) -> zbus::Result<String>;
    async fn pending_requests(&self, caller: &str) -> zbus::Result<String>;
    async fn request_history(&self, caller: &str, identity: &str) -> zbus::Result<String>;
    async fn create_event(&self, caller: &str, event: &str) -> zbus::Result<String>;
    async fn edit_event(&self, caller: &str, event: &str, patch: &str) -> zbus::Result<String>;
    async fn delete_event(&self, caller: &str, event: &str) -> zbus::Result<String>;
    async fn purge_event(&self, caller: &str, event: &str) -> zbus::Result<()>;
    async fn share_event(&self, caller: &str, event: &str, coordinator: &str)
        -> zbus::Result<String>;
    async fn unshare_event(&self, caller: &str, event: &str, coordinator: &str)
        -> zbus::Result<String>;
    async fn list_events(&self, caller: &str) -> zbus::Result<String>;
    async fn observe(&self, caller: &str, event: &str, image: Vec<u8>) -> zbus::Result<String>;
    async fn observe_group(&self, caller: &str, event: &str, image: Vec<u8>)
        -> zbus::Result<String>;
    async fn mark_manual(
        &self,
        caller: &str,
        event: &str,
        person: &str,
        notes: &str,
    ) -> zbus::Result<String>;
    async fn records(&self, caller: &str, event: &str) -> zbus::Result<String>;
    async fn summary(&self, caller: &str, event: &str) -> zbus::Result<String>;
    async fn my_attendance(&self, caller: &str) -> zbus::Result<String>;
    async fn notifications(&self, caller: &str) -> zbus::Result<String>;
    async fn mark_notifications_read(&self, caller: &str) -> zbus::Result<u32>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    /// Identity id to act as (falls back to $ROLLCALL_IDENTITY)
    #[arg(long = "as", global = true, value_name = "IDENTITY")]
    identity: Option<String>,

    /// Talk to a daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// Create the single administrator account
    ProvisionAdmin { name: String },
    /// Register a new identity (requires approval before use)
    Register {
        name: String,
        /// "user" or "coordinator"
        #[arg(long, default_value = "user")]
        role: Role,
    },
    /// Show the calling identity and its approval state
    Whoami,
    /// Change the role of an identity (admin only)
    AssignRole { identity: String, role: Role },
    /// Enroll a reference face for a person (admin only)
    Enroll {
        person: String,
        #[arg(long)]
        name: String,
        /// Detection payload or image handed to the daemon's embedder
        #[arg(long)]
        face: PathBuf,
    },
    /// Add a person without a reference face (admin only)
    AddPerson {
        person: String,
        #[arg(long)]
        name: String,
    },
    /// List enrolled people and their reference counts (admin only)
    People,
    /// Forget every reference face of a person (admin only)
    ClearFaces { person: String },
    /// Remove a person without attendance records (admin only)
    RemovePerson { person: String },
    /// Submit an access request for the calling identity
    Apply,
    /// Approve or reject an access request (admin only)
    Resolve {
        request: String,
        /// "approve" or "reject"
        resolution: Resolution,
    },
    /// List pending access requests (admin only)
    Pending,
    /// Show access requests of the calling identity, or of another one (admin only)
    History { identity: Option<String> },
    /// Manage events
    #[command(subcommand)]
    Event(EventCommand),
    /// Submit a captured face for an event
    Observe {
        event: String,
        #[arg(long)]
        image: PathBuf,
        /// Decide every face in the image instead of exactly one
        #[arg(long)]
        group: bool,
    },
    /// Mark a person present manually (admin only)
    Mark {
        event: String,
        person: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// List attendance records of an event
    Records { event: String },
    /// Show attendance totals of an event
    Summary { event: String },
    /// Show the calling identity's own attendance
    Mine,
    /// Show notifications
    Notifications {
        /// Mark every notification read afterwards
        #[arg(long)]
        mark_read: bool,
    },
}

#[derive(Subcommand)]
enum EventCommand {
    /// Create an event (admin only)
    Create {
        #[arg(long)]
        name: String,
        /// RFC 3339 start time
        #[arg(long)]
        start: DateTime<Utc>,
        /// RFC 3339 end time
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(long, default_value = "")]
        venue: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Edit an event (admin only)
    Edit {
        event: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        #[arg(long)]
        end: Option<DateTime<Utc>>,
        #[arg(long)]
        venue: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete an event; events with attendance are closed instead
    Delete { event: String },
    /// Permanently delete an event without attendance
    Purge { event: String },
    /// Let a coordinator view the event's records
    Share { event: String, coordinator: String },
    /// Revoke a coordinator's view of the event
    Unshare { event: String, coordinator: String },
    /// List visible events
    List,
}

fn caller(cli: &Cli) -> Result<String> {
    match cli.identity.clone().or_else(|| std::env::var("ROLLCALL_IDENTITY").ok()) {
        Some(id) => Ok(id),
        None => bail!("no identity given: pass --as <IDENTITY> or set ROLLCALL_IDENTITY"),
    }
}

fn read_file(path: &PathBuf) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Pretty-print a JSON reply, passing anything else through.
fn print_json(reply: &str) {
    match serde_json::from_str::<serde_json::Value>(reply) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{reply}"),
        },
        Err(_) => println!("{reply}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let builder = if cli.session {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let conn = builder
        .method_timeout(Duration::from_secs(30))
        .build()
        .await
        .context("failed to connect to D-Bus")?;
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("rollcalld is not reachable")?;

    let reply = match &cli.command {
        Commands::Status => proxy.status().await?,
        Commands::ProvisionAdmin { name } => proxy.provision_admin(name).await?,
        Commands::Register { name, role } => proxy.register(name, role.as_str()).await?,
        Commands::Whoami => proxy.whoami(&caller(&cli)?).await?,
        Commands::AssignRole { identity, role } => {
            proxy
                .assign_role(&caller(&cli)?, identity, role.as_str())
                .await?
        }
        Commands::Enroll { person, name, face } => {
            let image = read_file(face)?;
            proxy.enroll(&caller(&cli)?, person, name, image).await?
        }
        Commands::AddPerson { person, name } => {
            proxy.add_person(&caller(&cli)?, person, name).await?
        }
        Commands::People => proxy.list_people(&caller(&cli)?).await?,
        Commands::ClearFaces { person } => {
            proxy.clear_references(&caller(&cli)?, person).await?
        }
        Commands::RemovePerson { person } => {
            proxy.remove_person(&caller(&cli)?, person).await?;
            "{\"outcome\":\"removed\"}".to_string()
        }
        Commands::Apply => proxy.submit_request(&caller(&cli)?).await?,
        Commands::Resolve {
            request,
            resolution,
        } => {
            let resolution = match resolution {
                Resolution::Approve => "approve",
                Resolution::Reject => "reject",
            };
            proxy
                .resolve_request(&caller(&cli)?, request, resolution)
                .await?
        }
        Commands::Pending => proxy.pending_requests(&caller(&cli)?).await?,
        Commands::History { identity } => {
            proxy
                .request_history(&caller(&cli)?, identity.as_deref().unwrap_or(""))
                .await?
        }
        Commands::Event(command) => event_command(&proxy, &caller(&cli)?, command).await?,
        Commands::Observe {
            event,
            image,
            group,
        } => {
            let image = read_file(image)?;
            if *group {
                proxy.observe_group(&caller(&cli)?, event, image).await?
            } else {
                proxy.observe(&caller(&cli)?, event, image).await?
            }
        }
        Commands::Mark {
            event,
            person,
            notes,
        } => proxy.mark_manual(&caller(&cli)?, event, person, notes).await?,
        Commands::Records { event } => proxy.records(&caller(&cli)?, event).await?,
        Commands::Summary { event } => proxy.summary(&caller(&cli)?, event).await?,
        Commands::Mine => proxy.my_attendance(&caller(&cli)?).await?,
        Commands::Notifications { mark_read } => {
            let identity = caller(&cli)?;
            let feed = proxy.notifications(&identity).await?;
            if *mark_read {
                let changed = proxy.mark_notifications_read(&identity).await?;
                tracing::debug!(changed, "notifications marked read");
            }
            feed
        }
    };

    print_json(&reply);
    Ok(())
}

async fn event_command(
    proxy: &AttendanceProxy<'_>,
    caller: &str,
    command: &EventCommand,
) -> Result<String> {
    Ok(match command {
        EventCommand::Create {
            name,
            start,
            end,
            venue,
            description,
        } => {
            let new = NewEvent {
                name: name.clone(),
                description: description.clone(),
                venue: venue.clone(),
                starts_at: *start,
                ends_at: *end,
            };
            proxy
                .create_event(caller, &serde_json::to_string(&new)?)
                .await?
        }
        EventCommand::Edit {
            event,
            name,
            start,
            end,
            venue,
            description,
        } => {
            let patch = EventPatch {
                name: name.clone(),
                description: description.clone(),
                venue: venue.clone(),
                starts_at: *start,
                ends_at: *end,
            };
            proxy
                .edit_event(caller, event, &serde_json::to_string(&patch)?)
                .await?
        }
        EventCommand::Delete { event } => proxy.delete_event(caller, event).await?,
        EventCommand::Purge { event } => {
            proxy.purge_event(caller, event).await?;
            "{\"outcome\":\"purged\"}".to_string()
        }
        EventCommand::Share { event, coordinator } => {
            proxy.share_event(caller, event, coordinator).await?
        }
        EventCommand::Unshare { event, coordinator } => {
            proxy.unshare_event(caller, event, coordinator).await?
        }
        EventCommand::List => proxy.list_events(caller).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resolve_and_global_identity() {
        let cli = Cli::try_parse_from(["rollcall", "resolve", "abc", "approved", "--as", "me"])
            .unwrap();
        assert_eq!(cli.identity.as_deref(), Some("me"));
        assert!(matches!(
            cli.command,
            Commands::Resolve {
                resolution: Resolution::Approve,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_event_create_times() {
        let cli = Cli::try_parse_from([
            "rollcall",
            "event",
            "create",
            "--name",
            "Workshop1",
            "--start",
            "2026-03-01T09:00:00Z",
            "--end",
            "2026-03-01T12:00:00Z",
        ])
        .unwrap();
        match cli.command {
            Commands::Event(EventCommand::Create { start, end, .. }) => assert!(start < end),
            _ => panic!("expected event create"),
        }
    }

    #[test]
    fn test_parse_people_management() {
        let cli = Cli::try_parse_from(["rollcall", "remove-person", "abc"]).unwrap();
        assert!(matches!(cli.command, Commands::RemovePerson { person } if person == "abc"));

        let cli = Cli::try_parse_from(["rollcall", "history"]).unwrap();
        assert!(matches!(cli.command, Commands::History { identity: None }));
        let cli = Cli::try_parse_from(["rollcall", "history", "bob"]).unwrap();
        assert!(matches!(cli.command, Commands::History { identity: Some(_) }));
    }

    #[test]
    fn test_register_rejects_unknown_role() {
        assert!(Cli::try_parse_from(["rollcall", "register", "bob", "--role", "root"]).is_err());
    }
}
