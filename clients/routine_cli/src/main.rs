mod client;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use client::CoreClient;
use routine_core::model::{ActivityLogEntry, RepeatKind, Routine, RoutineForm};
use routine_core::query::{format_days, format_time};
use routine_core::{Notification, Settings};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "routine", version, about = "Manage routines kept by routine_core")]
struct Cli {
    /// Core base URL, e.g. http://127.0.0.1:17610
    #[arg(long, global = true, default_value = "http://127.0.0.1:17610")]
    core_url: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List routines.
    List {
        /// Case-insensitive search over title and description.
        #[arg(short, long, default_value = "")]
        query: String,
        #[arg(long, value_enum, default_value_t = Filter::All)]
        filter: Filter,
        #[arg(long, value_enum, default_value_t = Sort::Next)]
        sort: Sort,
    },
    /// Create a routine.
    Add(FormArgs),
    /// Edit a routine. Omitted options keep their current value.
    Edit {
        id: String,
        #[command(flatten)]
        form: FormArgs,
    },
    /// Flip a routine between completed and pending.
    Toggle { id: String },
    /// Delete a routine and its comments.
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Show, add or remove comments.
    #[command(subcommand)]
    Comment(CommentCmd),
    /// Mark every routine as completed.
    CompleteAll,
    /// Delete every routine (the activity log is kept).
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Totals, completed today and the next scheduled routine.
    Summary,
    /// Routines per weekday.
    Report,
    /// Recent activity, newest first.
    Activity {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Write the whole record as JSON.
    Export {
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace the whole record with a previously exported file.
    Import { file: PathBuf },
    /// Turn reminders on or off.
    Notifications {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Show reminders as they come due.
    Watch {
        /// Poll interval (seconds).
        #[arg(long, default_value_t = 10)]
        poll_seconds: u64,
    },
}

#[derive(Subcommand, Debug)]
enum CommentCmd {
    /// List the comments of a routine.
    List { id: String },
    Add { id: String, text: String },
    Rm { id: String, comment_id: String },
}

#[derive(clap::Args, Debug, Default)]
struct FormArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// "HH:MM"; pass an empty string to unschedule.
    #[arg(long)]
    time: Option<String>,
    #[arg(long, value_enum)]
    repeat: Option<Repeat>,
    /// Comma separated weekday indices, 0 = Sunday, e.g. "1,2,3,4,5".
    #[arg(long, value_delimiter = ',')]
    days: Option<Vec<String>>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Filter {
    All,
    Today,
    Completed,
    Pending,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Sort {
    Name,
    Time,
    Next,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Repeat {
    None,
    Daily,
    Weekly,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl From<Repeat> for RepeatKind {
    fn from(r: Repeat) -> Self {
        match r {
            Repeat::None => RepeatKind::None,
            Repeat::Daily => RepeatKind::Daily,
            Repeat::Weekly => RepeatKind::Weekly,
        }
    }
}

#[derive(Deserialize)]
struct SummaryView {
    total_count: usize,
    completed_today_count: usize,
    next_routine_label: String,
}

#[derive(Deserialize)]
struct DayCount {
    label: String,
    count: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "routine_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let client = CoreClient::new(&cli.core_url)?;

    match cli.command {
        Cmd::List {
            query,
            filter,
            sort,
        } => {
            let (filter, sort) = (value_name(filter), value_name(sort));
            let params = [
                ("q", query.as_str()),
                ("filter", filter.as_str()),
                ("sort", sort.as_str()),
            ];
            let routines: Vec<Routine> = client.get_query("/routines", &params).await?;
            print_routines(&routines);
        }
        Cmd::Add(args) => {
            let form = args.into_form(None, RoutineForm::default());
            let out: Value = client.post("/routines", &form).await?;
            println!("created {}", out["id"].as_str().unwrap_or("?"));
        }
        Cmd::Edit { id, form } => {
            let routines: Vec<Routine> = client.get("/routines").await?;
            let current = routines
                .into_iter()
                .find(|r| r.id == id)
                .ok_or_else(|| anyhow::anyhow!("routine_not_found"))?;
            let base = RoutineForm {
                id: None,
                title: current.title,
                description: current.description,
                time: current.time,
                repeat: current.repeat,
                days: current.days,
            };
            let form = form.into_form(Some(id), base);
            let out: Value = client.post("/routines", &form).await?;
            println!("updated {}", out["id"].as_str().unwrap_or("?"));
        }
        Cmd::Toggle { id } => {
            let out: Value = client
                .post(&format!("/routines/{id}/toggle"), &json!({}))
                .await?;
            let done = out["concluded"].as_bool().unwrap_or(false);
            println!("{}", if done { "completed" } else { "reopened" });
        }
        Cmd::Delete { id, yes } => {
            if !yes && !confirm(&format!("Delete routine {id}?"))? {
                println!("cancelled");
                return Ok(());
            }
            let _: Value = client
                .post(&format!("/routines/{id}/delete"), &json!({ "confirmed": true }))
                .await?;
            println!("deleted {id}");
        }
        Cmd::Comment(CommentCmd::List { id }) => {
            let routines: Vec<Routine> = client.get("/routines").await?;
            let routine = routines
                .iter()
                .find(|r| r.id == id)
                .ok_or_else(|| anyhow::anyhow!("routine_not_found"))?;
            if routine.comments.is_empty() {
                println!("No comments.");
            }
            for c in &routine.comments {
                println!("{}  {}  {}", fmt_millis(c.time), c.id, c.text);
            }
        }
        Cmd::Comment(CommentCmd::Add { id, text }) => {
            let out: Value = client
                .post(&format!("/routines/{id}/comments"), &json!({ "text": text }))
                .await?;
            println!("comment {}", out["comment_id"].as_str().unwrap_or("?"));
        }
        Cmd::Comment(CommentCmd::Rm { id, comment_id }) => {
            let _: Value = client
                .delete(&format!("/routines/{id}/comments/{comment_id}"))
                .await?;
            println!("removed comment {comment_id}");
        }
        Cmd::CompleteAll => {
            let out: Value = client.post("/routines/complete_all", &json!({})).await?;
            println!("completed {}", out["count"].as_u64().unwrap_or(0));
        }
        Cmd::Clear { yes } => {
            if !yes && !confirm("Delete ALL routines?")? {
                println!("cancelled");
                return Ok(());
            }
            let out: Value = client
                .post("/routines/clear", &json!({ "confirmed": true }))
                .await?;
            println!("removed {}", out["removed"].as_u64().unwrap_or(0));
        }
        Cmd::Summary => {
            let s: SummaryView = client.get("/summary").await?;
            println!("Routines:        {}", s.total_count);
            println!("Completed today: {}", s.completed_today_count);
            println!("Next:            {}", s.next_routine_label);
        }
        Cmd::Report => {
            let days: Vec<DayCount> = client.get("/reports/by_day").await?;
            for d in days {
                println!("{}: {} routine(s)", d.label, d.count);
            }
        }
        Cmd::Activity { limit } => {
            let path = match limit {
                Some(n) => format!("/activities/recent?limit={n}"),
                None => "/activities/recent".to_string(),
            };
            let entries: Vec<ActivityLogEntry> = client.get(&path).await?;
            if entries.is_empty() {
                println!("No recent activity.");
            }
            for a in entries {
                println!("{} — {}", fmt_millis(a.time), a.text);
            }
        }
        Cmd::Export { out } => {
            let body = client.get_text("/export").await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, body)
                        .with_context(|| format!("write {}", path.display()))?;
                    info!("exported to {}", path.display());
                }
                None => println!("{body}"),
            }
        }
        Cmd::Import { file } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("read {}", file.display()))?;
            let out: Value = client.post_raw("/import", body).await?;
            println!(
                "imported {} routine(s), {} activity entries",
                out["routines"].as_u64().unwrap_or(0),
                out["activities"].as_u64().unwrap_or(0)
            );
        }
        Cmd::Notifications { state } => {
            let enabled = matches!(state, Toggle::On);
            let s: Settings = client
                .post("/settings", &json!({ "notifications_enabled": enabled }))
                .await?;
            println!(
                "notifications {}",
                if s.notifications_enabled { "on" } else { "off" }
            );
        }
        Cmd::Watch { poll_seconds } => watch(&client, poll_seconds).await,
    }
    Ok(())
}

impl FormArgs {
    /// Overlay the given options on `base`.
    fn into_form(self, id: Option<String>, base: RoutineForm) -> RoutineForm {
        RoutineForm {
            id,
            title: self.title.unwrap_or(base.title),
            description: self.description.unwrap_or(base.description),
            time: match self.time {
                Some(t) if t.trim().is_empty() => None,
                Some(t) => Some(t),
                None => base.time,
            },
            repeat: self.repeat.map(RepeatKind::from).unwrap_or(base.repeat),
            days: self
                .days
                .map(|d| d.into_iter().filter(|s| !s.trim().is_empty()).collect())
                .unwrap_or(base.days),
        }
    }
}

async fn watch(client: &CoreClient, poll_seconds: u64) {
    use tokio::time::{sleep, Duration};

    info!("watching for due routines every {poll_seconds}s");
    loop {
        match client.get::<Vec<Notification>>("/notifications").await {
            Ok(list) => {
                for n in list {
                    show_notification(&n);
                }
            }
            Err(e) => error!("notification poll failed: {e:#}"),
        }
        sleep(Duration::from_secs(poll_seconds.max(1))).await;
    }
}

fn show_notification(n: &Notification) {
    info!("Routine: {} {}", n.title, n.body);

    #[cfg(windows)]
    {
        use win_toast_notify::{Duration, Scenario, WinToastNotify};

        let title = format!("Routine: {}", n.title);
        let mut messages = vec![title.as_str()];
        if !n.body.trim().is_empty() {
            messages.push(n.body.as_str());
        }
        let _ = WinToastNotify::new()
            .set_duration(Duration::Long)
            .set_scenario(Scenario::Reminder)
            .set_title("Routine reminder")
            .set_messages(messages)
            .show();
    }
}

fn print_routines(routines: &[Routine]) {
    if routines.is_empty() {
        println!("No routines found.");
        return;
    }
    for r in routines {
        let mark = if r.concluded { "[x]" } else { "[ ]" };
        println!("{mark} {}  ({})", r.title, r.id);
        if !r.description.is_empty() {
            println!("    {}", r.description);
        }
        println!(
            "    Time: {} · Repeat: {} · Days: {} · Comments: {}",
            format_time(r.time.as_deref()),
            r.repeat.as_str(),
            format_days(&r.days),
            r.comments.len()
        );
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn fmt_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| "????-??-?? ??:??".to_string())
}

fn value_name<T: ValueEnum>(v: T) -> String {
    v.to_possible_value()
        .map(|p| p.get_name().to_string())
        .unwrap_or_default()
}
