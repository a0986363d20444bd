use clap::{Args, Subcommand, ValueEnum};
use mill_core::enums::AuditScope;

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the audit writer and reminder scanner until Ctrl-C
    Run(RunArgs),
    /// Run a single reminder scan and print its report
    Remind,
    /// List tasks with paging, search, filters, and a date range
    Tasks(TaskListArgs),
    /// Show the audit trail for an entity or an actor
    Audit(AuditArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Keep the reminder scanner off even if configuration enables it
    #[arg(long)]
    pub no_reminders: bool,
}

#[derive(Debug, Args)]
pub struct TaskListArgs {
    /// Substring to look for (case-insensitive)
    #[arg(long)]
    pub search: Option<String>,

    /// Fields to search (defaults to title and description)
    #[arg(long = "search-field")]
    pub search_fields: Vec<String>,

    /// Filter by status
    #[arg(long)]
    pub status: Option<String>,

    /// Filter by priority
    #[arg(long)]
    pub priority: Option<String>,

    /// Filter by assignee id
    #[arg(long)]
    pub assignee: Option<String>,

    /// Filter by creator id
    #[arg(long)]
    pub creator: Option<String>,

    /// Created on or after (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub start_date: Option<String>,

    /// Created on or before (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub end_date: Option<String>,

    /// Sort column
    #[arg(long)]
    pub sort_by: Option<String>,

    /// Sort direction: asc or desc
    #[arg(long)]
    pub order: Option<String>,

    #[arg(long)]
    pub page: Option<i64>,

    #[arg(long)]
    pub limit: Option<i64>,

    /// List soft-deleted tasks instead of live ones
    #[arg(long)]
    pub deleted: bool,
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    /// Kind of entity to show the trail for
    #[arg(long, value_enum, requires = "id", conflicts_with = "actor")]
    pub scope: Option<ScopeArg>,

    /// Entity id
    #[arg(long, requires = "scope")]
    pub id: Option<String>,

    /// Show everything one user did instead
    #[arg(long)]
    pub actor: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ScopeArg {
    Task,
    Comment,
    User,
}

impl From<ScopeArg> for AuditScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Task => Self::Task,
            ScopeArg::Comment => Self::Comment,
            ScopeArg::User => Self::User,
        }
    }
}
