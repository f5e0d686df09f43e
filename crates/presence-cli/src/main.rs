use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

// `#[zbus::proxy]` generates `AttendanceProxy` (async) and `AttendanceProxyBlocking`.
#[zbus::proxy(
    interface = "org.presence.Attendance1",
    default_service = "org.presence.Attendance1",
    default_path = "/org/presence/Attendance1"
)]
trait Attendance {
    async fn list_persons(&self) -> zbus::Result<String>;
    async fn get_person(&self, id: &str) -> zbus::Result<String>;
    async fn search_persons(&self, query: &str) -> zbus::Result<String>;
    async fn enroll_person(
        &self,
        profile_json: &str,
        file_name: &str,
        image: &[u8],
    ) -> zbus::Result<String>;
    async fn update_person(&self, id: &str, patch_json: &str) -> zbus::Result<String>;
    async fn remove_person(&self, id: &str) -> zbus::Result<String>;
    async fn remove_person_by_name(&self, name: &str) -> zbus::Result<String>;
    async fn recognize(&self, image: &[u8]) -> zbus::Result<String>;
    async fn check_in(&self, image: &[u8]) -> zbus::Result<String>;
    async fn record_attendance(&self, person_id: &str, date: &str, time: &str)
        -> zbus::Result<String>;
    async fn list_attendance(&self, filter_json: &str) -> zbus::Result<String>;
    async fn person_attendance(&self, id: &str) -> zbus::Result<String>;
    async fn list_absences(&self) -> zbus::Result<String>;
    async fn set_absence_reason(&self, person_id: &str, reason: &str) -> zbus::Result<String>;
    async fn generate_absences(&self) -> zbus::Result<String>;
    async fn reencode_all(&self) -> zbus::Result<String>;
    async fn stats(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "presence", about = "Face-matched attendance CLI", version)]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person from a photo showing exactly one face
    Enroll {
        /// Photo (jpg, jpeg or png)
        image: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(long, default_value = "")]
        position: String,
        #[arg(long, default_value = "")]
        department: String,
        /// Enroll as inactive (excluded from absences)
        #[arg(long)]
        inactive: bool,
    },
    /// List enrolled persons
    List,
    /// Show one person and their attendance history
    Show { id: String },
    /// Search by name, email, position or department
    Search { query: String },
    /// Update profile fields
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Remove a person by id, or by name with --name
    Remove {
        target: String,
        /// Treat TARGET as a name (fails if several persons share it)
        #[arg(long)]
        name: bool,
    },
    /// Identify the face in a photo without recording attendance
    Recognize { image: PathBuf },
    /// Identify the face in a photo and record attendance
    CheckIn { image: PathBuf },
    /// Record attendance manually
    Record {
        person_id: String,
        /// YYYY-MM-DD, default today
        #[arg(long, default_value = "")]
        date: String,
        /// HH:MM:SS, default now
        #[arg(long, default_value = "")]
        time: String,
    },
    /// List attendance records
    Attendance {
        #[arg(long)]
        person: Option<String>,
        /// First date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
    /// Show the current absence snapshot
    Absences,
    /// Attach a reason to an absence
    Reason { person_id: String, reason: String },
    /// Recompute today's absences now
    GenerateAbsences,
    /// Rebuild every face embedding from the stored photos
    Reencode,
    /// Roster and attendance counters
    Stats,
    /// Show daemon status
    Status,
}

fn read_image(path: &Path) -> Result<(String, Vec<u8>)> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("image path has no file name")?
        .to_string();
    Ok((file_name, bytes))
}

/// Print the envelope's payload; a failed envelope becomes an error.
fn render(raw: &str) -> Result<()> {
    let envelope: Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    if envelope["success"] != true {
        let kind = envelope["error"].as_str().unwrap_or("failure");
        let message = envelope["message"].as_str().unwrap_or("request failed");
        bail!("{kind}: {message}");
    }
    if let Some(message) = envelope["message"].as_str() {
        println!("{message}");
    }
    if let Some(total) = envelope["total"].as_u64() {
        eprintln!("{total} result(s)");
    }
    if let Some(data) = envelope.get("data") {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let builder = if cli.session {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let conn = builder
        .method_timeout(Duration::from_secs(60))
        .build()
        .await
        .context("failed to connect to D-Bus")?;
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("presenced is not reachable")?;

    let raw = match cli.command {
        Commands::Enroll {
            image,
            name,
            email,
            phone,
            position,
            department,
            inactive,
        } => {
            let (file_name, bytes) = read_image(&image)?;
            let profile = json!({
                "name": name,
                "email": email,
                "phone": phone,
                "position": position,
                "department": department,
                "active": !inactive,
            });
            tracing::debug!(file_name, bytes = bytes.len(), "enrolling");
            proxy
                .enroll_person(&profile.to_string(), &file_name, &bytes)
                .await?
        }
        Commands::List => proxy.list_persons().await?,
        Commands::Show { id } => proxy.person_attendance(&id).await?,
        Commands::Search { query } => proxy.search_persons(&query).await?,
        Commands::Update {
            id,
            name,
            email,
            phone,
            position,
            department,
            active,
        } => {
            let patch = json!({
                "name": name,
                "email": email,
                "phone": phone,
                "position": position,
                "department": department,
                "active": active,
            });
            proxy.update_person(&id, &patch.to_string()).await?
        }
        Commands::Remove { target, name } => {
            if name {
                proxy.remove_person_by_name(&target).await?
            } else {
                proxy.remove_person(&target).await?
            }
        }
        Commands::Recognize { image } => {
            let (_, bytes) = read_image(&image)?;
            proxy.recognize(&bytes).await?
        }
        Commands::CheckIn { image } => {
            let (_, bytes) = read_image(&image)?;
            proxy.check_in(&bytes).await?
        }
        Commands::Record {
            person_id,
            date,
            time,
        } => proxy.record_attendance(&person_id, &date, &time).await?,
        Commands::Attendance { person, from, to } => {
            let filter = json!({ "person_id": person, "date_from": from, "date_to": to });
            proxy.list_attendance(&filter.to_string()).await?
        }
        Commands::Absences => proxy.list_absences().await?,
        Commands::Reason { person_id, reason } => {
            proxy.set_absence_reason(&person_id, &reason).await?
        }
        Commands::GenerateAbsences => proxy.generate_absences().await?,
        Commands::Reencode => proxy.reencode_all().await?,
        Commands::Stats => proxy.stats().await?,
        Commands::Status => proxy.status().await?,
    };

    render(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_remove_by_name_flag() {
        let cli = Cli::parse_from(["presence", "--session", "remove", "Ada", "--name"]);
        assert!(cli.session);
        assert!(matches!(cli.command, Commands::Remove { name: true, .. }));
    }

    #[test]
    fn test_render_failure_is_error() {
        let err = render(r#"{"success":false,"error":"not_found","message":"no person p9"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "not_found: no person p9");
        assert!(render(r#"{"success":true,"data":[],"total":0}"#).is_ok());
        assert!(render("not json").is_err());
    }
}
