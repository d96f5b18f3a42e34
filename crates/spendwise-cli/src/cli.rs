//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Spendwise - Turn receipts into categorized expenses and track budgets
#[derive(Parser)]
#[command(name = "spendwise")]
#[command(about = "Receipt-to-expense classification and budget tracking", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "spendwise.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set SPENDWISE_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// User id to act as
    #[arg(short, long, default_value = "local-dev", global = true)]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Manage users and organization membership
    Users {
        #[command(subcommand)]
        action: Option<UsersAction>,
    },

    /// Record, inspect and export expenses
    Expenses {
        #[command(subcommand)]
        action: Option<ExpensesAction>,
    },

    /// Classify a store (and optional item) into a spending category
    Classify {
        /// Store name as printed on the receipt
        store: String,

        /// Line item name
        #[arg(short, long)]
        item: Option<String>,

        /// Purchase amount
        #[arg(short, long)]
        amount: Option<f64>,
    },

    /// Manage budgets
    Budgets {
        #[command(subcommand)]
        action: Option<BudgetsAction>,
    },

    /// Upload and manage receipts
    Receipts {
        #[command(subcommand)]
        action: Option<ReceiptsAction>,
    },

    /// Read-only share links for your organization
    Share {
        #[command(subcommand)]
        action: Option<ShareAction>,
    },

    /// Retention sweeps and storage reports
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires an API key (SPENDWISE_API_KEYS) and
        /// an x-user-id header on every request.
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
pub enum UsersAction {
    /// Register or update a user
    Add {
        /// User id
        id: String,
        /// Email address
        #[arg(long)]
        email: Option<String>,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Organization to join
        #[arg(long)]
        org: Option<String>,
    },

    /// List users
    List,

    /// Set or clear a user's organization
    Org {
        /// User id
        id: String,
        /// Organization name (omit to leave the organization)
        organization: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ExpensesAction {
    /// Record an expense (auto-classified unless --category is given)
    Add {
        /// Store name
        store: String,
        /// Amount (must be positive)
        amount: f64,
        /// Purchase date (YYYY-MM-DD or "YYYY-MM-DD HH:MM:SS", default now)
        #[arg(long)]
        date: Option<String>,
        /// Category label or code (e.g., "식비" or "food")
        #[arg(short, long)]
        category: Option<String>,
        /// Line item name
        #[arg(short, long)]
        item: Option<String>,
        /// Free-form description
        #[arg(long)]
        description: Option<String>,
        /// Budget to link the expense to
        #[arg(long)]
        budget: Option<String>,
    },

    /// List expenses
    List {
        #[command(flatten)]
        filter: ExpenseFilterArgs,
        /// Maximum number of expenses
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show an expense
    Show {
        /// Expense id
        id: String,
    },

    /// Update an expense (setting a category marks it as manual)
    Update {
        /// Expense id
        id: String,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        amount: Option<f64>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        store: Option<String>,
        #[arg(short, long)]
        item: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Budget to link (empty string detaches)
        #[arg(long)]
        budget: Option<String>,
    },

    /// Delete an expense
    Delete {
        /// Expense id
        id: String,
    },

    /// Spending per category for a period (default: this month)
    Stats {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Include every member of this organization
        #[arg(long)]
        org: Option<String>,
    },

    /// Re-run automatic classification on an expense
    Reclassify {
        /// Expense id
        id: String,
    },

    /// Export expenses as CSV
    Export {
        #[command(flatten)]
        filter: ExpenseFilterArgs,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Filters shared by expense listing and export
#[derive(clap::Args, Debug, Default)]
pub struct ExpenseFilterArgs {
    /// Category label or code
    #[arg(short, long)]
    pub category: Option<String>,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<String>,
    /// End date (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<String>,
    /// Include every member of this organization
    #[arg(long)]
    pub org: Option<String>,
}

#[derive(Subcommand)]
pub enum BudgetsAction {
    /// Create a budget
    Add {
        /// Budget name
        name: String,
        /// Budget amount
        amount: f64,
        /// Category label or code ("전체" or omitted for every category)
        #[arg(short, long)]
        category: Option<String>,
        /// Share the budget with your organization
        #[arg(long)]
        org: Option<String>,
    },

    /// List budgets with spending
    List,

    /// Show a budget
    Show {
        /// Budget id
        id: String,
    },

    /// Delete a budget
    Delete {
        /// Budget id
        id: String,
    },

    /// Share all personal budgets with your organization
    Migrate,
}

#[derive(Subcommand)]
pub enum ShareAction {
    /// Issue a share link
    Create {
        /// Days until the link expires
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// List share links of your organization
    List,

    /// Revoke a share link
    Revoke {
        /// Share token
        token: String,
    },
}

#[derive(Subcommand)]
pub enum ReceiptsAction {
    /// Upload a receipt image: OCR, record expenses
    Upload {
        /// Image file
        file: PathBuf,
    },

    /// OCR a receipt image without storing anything
    Ocr {
        /// Image file
        file: PathBuf,
        /// Print the preview as JSON
        #[arg(long)]
        json: bool,
    },

    /// List receipts
    List {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Maximum number of receipts
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show a receipt with its expenses
    Show {
        /// Receipt id
        id: String,
    },

    /// Delete a receipt and its image
    Delete {
        /// Receipt id
        id: String,
        /// Also delete the expenses recorded from it
        #[arg(long)]
        with_expenses: bool,
    },
}

#[derive(Subcommand)]
pub enum AdminAction {
    /// Delete old receipts and their images
    Cleanup {
        /// Keep receipts newer than this many days (default from config)
        #[arg(long)]
        days: Option<i64>,
        /// Remove successful receipts as well as failed ones
        #[arg(long)]
        include_successful: bool,
        /// Report what would be removed without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete old failed receipts
    CleanupFailed {
        /// Age in days (default from config)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Show image storage usage
    Stats,

    /// Move old completed receipts to the archive
    Archive {
        /// Age in days (default from config)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Receipt counts and cleanup recommendation
    Summary,
}
