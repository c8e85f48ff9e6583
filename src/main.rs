use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::info;

use scout_graduation::{
    get_events_for_entity, get_member, init_config, insert_curriculum, load_config,
    load_curriculum_csv, load_members_csv, load_progress_csv, load_snapshot, open_database,
    review_progress, setup_database, submit_progress, update_config, upsert_members, Config,
    EligibilityEntry, Rank, ReviewDecision, SubmitOutcome,
};

#[derive(Parser)]
#[command(name = "scout-graduation")]
#[command(about = "Rank progression and certificate issuance for a Penggalang troop")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "SCOUT_CONFIG", default_value = "scout.toml")]
    config: PathBuf,

    /// Database file (overrides config file)
    #[arg(long, env = "SCOUT_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and the numbering config
    Init {
        /// Certificate number pattern
        #[arg(long)]
        pattern: Option<String>,

        /// Parent series substituted for {INDUK}
        #[arg(long)]
        series: Option<String>,
    },

    /// Load members, curriculum and progress from CSV files
    Import {
        #[arg(long)]
        members: Option<PathBuf>,

        #[arg(long)]
        curriculum: Option<PathBuf>,

        #[arg(long)]
        progress: Option<PathBuf>,
    },

    /// Show who is ready to graduate
    Eligibility {
        /// Print the projection as JSON
        #[arg(long)]
        json: bool,
    },

    /// Graduate a member from their current rank
    Graduate {
        #[arg(long)]
        member: String,

        /// Rank being completed (the member's current rank)
        #[arg(long)]
        rank: String,

        /// Recorded in the audit trail
        #[arg(long, default_value = "system")]
        actor: String,
    },

    /// Approve or reject a pending progress record
    #[command(group(ArgGroup::new("decision").required(true).args(["approve", "reject"])))]
    Review {
        #[arg(long)]
        record: String,

        #[arg(long)]
        verifier: String,

        #[arg(long)]
        approve: bool,

        #[arg(long)]
        reject: bool,
    },

    /// Inspect or change certificate numbering
    Numbering {
        #[command(subcommand)]
        action: NumberingCommands,
    },

    /// Show a member's certificates and audit trail
    History {
        #[arg(long)]
        member: String,
    },
}

#[derive(Subcommand)]
enum NumberingCommands {
    Show,
    Set {
        #[arg(long)]
        pattern: Option<String>,

        /// Changing the series restarts numbering at 001
        #[arg(long)]
        series: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scout_graduation=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let db_path = cli.db.clone().unwrap_or_else(|| config.database.path.clone());

    match cli.command {
        Commands::Init { pattern, series } => {
            run_init(&config, &db_path, pattern.as_deref(), series.as_deref())
        }
        Commands::Import { members, curriculum, progress } => {
            let conn = open_existing(&config, &db_path)?;
            run_import(&conn, members.as_deref(), curriculum.as_deref(), progress.as_deref())
        }
        Commands::Eligibility { json } => {
            let conn = open_existing(&config, &db_path)?;
            run_eligibility(&conn, json)
        }
        Commands::Graduate { member, rank, actor } => {
            let mut conn = open_existing(&config, &db_path)?;
            let rank: Rank = rank.parse()?;
            let outcome = config.engine().graduate_as(&mut conn, &member, rank, &actor)?;

            println!("✓ {} graduated {} → {}", outcome.member_id, outcome.rank_completed, outcome.new_rank);
            println!("  Certificate: {}", outcome.certificate_number);
            println!("  Issued at:   {}", outcome.issued_at.to_rfc3339());
            Ok(())
        }
        Commands::Review { record, verifier, approve, .. } => {
            let conn = open_existing(&config, &db_path)?;
            let decision = if approve { ReviewDecision::Approve } else { ReviewDecision::Reject };
            let reviewed = review_progress(&conn, &record, &verifier, decision)?;

            println!(
                "✓ {} item {} ({}) for {} is now {}",
                reviewed.rank, reviewed.item_index, reviewed.category, reviewed.member_id, reviewed.status.as_str()
            );
            Ok(())
        }
        Commands::Numbering { action } => {
            let conn = open_existing(&config, &db_path)?;
            run_numbering(&conn, action)
        }
        Commands::History { member } => {
            let conn = open_existing(&config, &db_path)?;
            run_history(&conn, &member)
        }
    }
}

fn open_existing(config: &Config, db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        anyhow::bail!("Database not found at {:?}. Run `scout-graduation init` first.", db_path);
    }
    open_database(db_path, config.busy_timeout())
}

fn run_init(config: &Config, db_path: &Path, pattern: Option<&str>, series: Option<&str>) -> Result<()> {
    let conn = open_database(db_path, config.busy_timeout())?;
    setup_database(&conn)?;
    println!("✓ Database initialized with WAL mode: {:?}", db_path);

    let pattern = pattern.or(config.numbering.default_pattern.as_deref());
    let series = series.unwrap_or(&config.numbering.default_series);
    let numbering = init_config(&conn, pattern, series)?;
    println!("✓ Numbering pattern: {}", numbering.pattern);
    println!("✓ Parent series:     {}", display_series(&numbering.parent_series));
    println!("✓ Counter scope:     {:?}", config.numbering.counter_scope);
    Ok(())
}

fn run_import(
    conn: &Connection,
    members: Option<&Path>,
    curriculum: Option<&Path>,
    progress: Option<&Path>,
) -> Result<()> {
    if members.is_none() && curriculum.is_none() && progress.is_none() {
        anyhow::bail!("Nothing to import: pass --members, --curriculum or --progress");
    }

    if let Some(path) = members {
        let rows = load_members_csv(path)?;
        let count = upsert_members(conn, &rows)?;
        println!("✓ Imported {} members from {:?}", count, path);
    }

    if let Some(path) = curriculum {
        let items = load_curriculum_csv(path)?;
        let count = insert_curriculum(conn, &items)?;
        println!("✓ Imported {} curriculum items from {:?}", count, path);
    }

    if let Some(path) = progress {
        let records = load_progress_csv(path)?;
        let (mut created, mut skipped) = (0, 0);
        for record in &records {
            match submit_progress(conn, record)
                .with_context(|| format!("Progress for member {}", record.member_id))?
            {
                SubmitOutcome::Created | SubmitOutcome::Resubmitted => created += 1,
                SubmitOutcome::Duplicate => skipped += 1,
            }
        }
        println!("✓ Imported {} progress records from {:?}", created, path);
        if skipped > 0 {
            println!("✓ Duplicates skipped: {}", skipped);
        }
    }

    Ok(())
}

fn run_eligibility(conn: &Connection, json: bool) -> Result<()> {
    let report = load_snapshot(conn)?.report();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Ready to graduate ({})", report.ready.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for entry in &report.ready {
        print_entry(entry);
    }

    println!("\nIn progress ({})", report.in_progress.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for entry in &report.in_progress {
        print_entry(entry);
    }

    Ok(())
}

fn print_entry(entry: &EligibilityEntry) {
    println!("{}", entry_row(entry));
}

fn entry_row(entry: &EligibilityEntry) -> String {
    format!(
        "  {:<24} {:<10} → {:<10} {:>3}/{:<3} {}",
        entry.member_name,
        entry.current_rank,
        entry.target_rank,
        entry.completed_count,
        entry.required_count,
        entry.member_id
    )
}

fn run_numbering(conn: &Connection, action: NumberingCommands) -> Result<()> {
    let config = match action {
        NumberingCommands::Show => {
            load_config(conn)?.context("Numbering is not configured. Run `scout-graduation init` first.")?
        }
        NumberingCommands::Set { pattern, series } => {
            let updated = update_config(conn, pattern.as_deref(), series.as_deref())?;
            info!(pattern = %updated.pattern, series = %updated.parent_series, "Numbering config updated");
            println!("✓ Numbering config updated");
            updated
        }
    };

    println!("  Pattern:       {}", config.pattern);
    println!("  Parent series: {}", display_series(&config.parent_series));
    println!("  Last counter:  {}", config.last_counter);
    println!("  Updated at:    {}", config.updated_at.to_rfc3339());
    Ok(())
}

fn run_history(conn: &Connection, member_id: &str) -> Result<()> {
    let member = get_member(conn, member_id)?
        .with_context(|| format!("Member not found: {}", member_id))?;

    println!("{} ({}) - {}", member.name, member.id, member.rank);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if member.graduations.is_empty() {
        println!("  No certificates issued");
    }
    for (rank, record) in &member.graduations {
        println!(
            "  {:<10} {:<32} #{:<5} {}",
            rank,
            record.certificate_number,
            record.raw_counter,
            record.issued_at.to_rfc3339()
        );
    }

    let events = get_events_for_entity(conn, "member", member_id)?;
    if !events.is_empty() {
        println!("\nAudit trail");
        for event in events {
            println!("  {} {:<18} by {} {}", event.timestamp.to_rfc3339(), event.event_type, event.actor, event.data);
        }
    }

    Ok(())
}

fn display_series(series: &str) -> &str {
    if series.is_empty() { "(none)" } else { series }
}
