use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Force-start an import run for one connection and wait for it to finish
    Import {
        #[arg(long, help = "Connection id")]
        connection: String,

        #[arg(long, help = "Print the run summary as JSON")]
        json: bool,
    },
    /// Remove or zero-stock products a connection's feed no longer carries
    Reconcile {
        #[command(flatten)]
        target: ReconcileTarget,

        #[arg(long, help = "Report stale products without changing anything")]
        dry_run: bool,

        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },
    /// Show the status of a run, or of a connection's active/latest run
    Status {
        #[command(flatten)]
        target: StatusTarget,

        #[arg(
            long,
            requires = "connection",
            help = "List the connection's last N runs instead of one"
        )]
        history: Option<usize>,

        #[arg(long, help = "Print the status as JSON")]
        json: bool,
    },
    /// Request cancellation of a running import
    Cancel {
        #[arg(long, help = "Run id to cancel")]
        run: String,
    },
    /// Probe a destination and report healthy/degraded/critical/down
    Health {
        #[arg(long, help = "Destination id")]
        destination: String,

        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },
    /// Run scheduled imports and reconciliation until interrupted
    Daemon,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct ReconcileTarget {
    #[arg(long, help = "Connection id to reconcile")]
    pub connection: Option<String>,

    #[arg(long, help = "Reconcile every configured connection")]
    pub all: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct StatusTarget {
    #[arg(long, help = "Run id to inspect")]
    pub run: Option<String>,

    #[arg(long, help = "Connection id whose active or latest run to inspect")]
    pub connection: Option<String>,
}
