pub mod build;
pub mod check;
pub mod labels;
pub mod reconcile;
pub mod retrieve;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "medcrux",
    about = "Knowledge retrieval and BI-RADS consistency checks for ultrasound reports",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a knowledge base from axiom, concept and guideline documents
    Build {
        /// Source files or directories
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Output directory for the knowledge base
        #[arg(long)]
        out: PathBuf,
        /// Vocabulary file (defaults to $MEDCRUX_VOCABULARY or the built-in one)
        #[arg(long)]
        vocabulary: Option<PathBuf>,
    },
    /// Retrieve knowledge relevant to a query
    Retrieve {
        /// Free-text query, e.g. report text
        query: String,
        /// Knowledge base directory (defaults to $MEDCRUX_KB_DIR)
        #[arg(long)]
        kb: Option<PathBuf>,
        /// Print the prompt context block instead of JSON
        #[arg(long)]
        context: bool,
    },
    /// Check findings against the conditions registered for a label
    Check {
        /// Classification label claimed for the findings, e.g. 3
        #[arg(long)]
        label: String,
        /// Findings JSON file (reads stdin if omitted)
        #[arg(long)]
        findings: Option<PathBuf>,
        /// Condition table file (defaults to $MEDCRUX_CONDITIONS or the built-in one)
        #[arg(long)]
        conditions: Option<PathBuf>,
        /// Risk level of the primary assessment to escalate (Low, Medium, High)
        #[arg(long)]
        primary: Option<String>,
    },
    /// Extract the classification labels mentioned in a text
    Labels {
        /// Text to scan
        text: String,
    },
    /// Compare the labels of a report with independently derived ones
    Reconcile {
        /// Text carrying the report's labels
        #[arg(long)]
        report: String,
        /// Text carrying the derived labels
        #[arg(long)]
        derived: String,
    },
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
