//! CLI interface for Loadboard.
//!
//! Each subcommand is non-interactive: arguments in, structured output out.
//! Mutating commands print a short summary to stderr and the resulting board
//! as JSON on stdout, so they compose with `jq` and friends.
//!
//! The database is resolved from `--db`, `LOADBOARD_DB`, the config file, or
//! `~/.loadboard/board.sqlite`, in that order.

mod format;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::Level;

use crate::board::{Board, BoardError};
use crate::config::Config;
use crate::feed::{FeedError, OrderFeed};
use crate::model::{Order, OutfeedId};
use crate::resolve::{self, FEED_REQUIRED};
use crate::storage::Storage;

use format::{format_board, format_run, format_summary};

/// Loadboard: plan loads onto packing outfeeds and keep the board in step
/// with the order feed.
#[derive(Debug, Parser)]
#[command(name = "loadboard", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Board database file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r"Workflow: planning a load
  1. loadboard outfeed add 1 'Dock 1'
  2. loadboard load assign A 1045 1046
  3. loadboard load priorities A B
  4. loadboard plan 1045 STD-12 --outfeed 1
     → prints the tag (e.g. A001)
  5. loadboard outfeed status 1 RUNNING
  6. loadboard reconcile --feed-url http://erp.local/orders/active

Reordering:
  loadboard reorder --to 1 --moved A002 A002 A001
  loadboard reorder --from 1 --to 2 --moved A001 A001";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the whole board.
    State {
        /// Print JSON instead of the human-readable board.
        #[arg(long)]
        json: bool,
    },

    /// Reconcile the board against a fresh order-feed snapshot.
    ///
    /// Retires finished tags from running queues, releases delivered loads,
    /// and drops records whose orders left the feed. One transaction.
    Reconcile {
        /// Fetch the snapshot from this URL.
        #[arg(long, conflicts_with = "feed_file")]
        feed_url: Option<String>,

        /// Read a captured snapshot from disk instead of fetching it.
        #[arg(long)]
        feed_file: Option<PathBuf>,
    },

    /// Plan an order line onto outfeeds. Prints the tag.
    Plan {
        /// Marketer order id.
        order_id: u64,

        /// Product standard id.
        standard_id: String,

        /// Destination outfeed. Can be specified multiple times.
        #[arg(long = "outfeed", required = true)]
        outfeeds: Vec<OutfeedId>,

        /// Put the line at the front of each queue.
        #[arg(long)]
        high_priority: bool,
    },

    /// Remove a tag from one outfeed, or from every outfeed.
    Unplan {
        /// The tag to remove (e.g. A001).
        tag: String,

        /// Only remove it from this outfeed.
        #[arg(long)]
        outfeed: Option<OutfeedId>,
    },

    /// Rewrite a queue's order, optionally moving a tag between outfeeds.
    Reorder {
        /// Outfeed the moved tag comes from.
        #[arg(long)]
        from: Option<OutfeedId>,

        /// Outfeed whose queue is rewritten.
        #[arg(long)]
        to: OutfeedId,

        /// The tag being moved. Must appear in the new order.
        #[arg(long)]
        moved: String,

        /// The new order of the destination queue, front first.
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Manage outfeeds.
    Outfeed {
        #[command(subcommand)]
        command: OutfeedCommand,
    },

    /// Manage loads and their priorities.
    Load {
        #[command(subcommand)]
        command: LoadCommand,
    },

    /// Manage physical line assignments.
    Line {
        #[command(subcommand)]
        command: LineCommand,
    },

    /// List recent reconciliation runs, newest first.
    Runs {
        /// How many runs to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Print JSON instead of one line per run.
        #[arg(long)]
        json: bool,
    },

    /// Print the feed snapshot a run reconciled against, as JSON.
    Snapshot {
        /// Run id: full UUID or unambiguous prefix (e.g. `a3b`).
        run: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum OutfeedCommand {
    /// Register an outfeed.
    Add {
        id: OutfeedId,
        name: String,
    },

    /// Set an outfeed's status: RUNNING or PAUSED.
    Status {
        id: OutfeedId,
        status: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum LoadCommand {
    /// Assign orders to a load (letters and digits, e.g. A or B2).
    Assign {
        load: String,

        #[arg(required = true)]
        order_ids: Vec<u64>,
    },

    /// Replace the priority order. The first load is served first.
    Priorities { loads: Vec<String> },
}

#[derive(Debug, Subcommand)]
pub enum LineCommand {
    /// Replace the physical lines serving an order line. No lines clears it.
    Assign {
        order_id: u64,
        standard_id: String,
        lines: Vec<String>,
    },
}

impl Command {
    /// Default log level for this command, before `RUST_LOG` overrides.
    pub fn log_level(&self) -> Level {
        match self {
            Self::Reconcile { .. } => Level::INFO,
            _ => Level::WARN,
        }
    }
}

/// Stand-in feed for commands that never reconcile.
struct NoFeed;

impl OrderFeed for NoFeed {
    fn fetch(&self) -> Result<Vec<Order>, FeedError> {
        Err(FeedError::Unavailable(FEED_REQUIRED.to_string()))
    }
}

/// Run the CLI, returning an error message on failure.
pub fn run(cli: Cli, config: &Config) -> Result<(), String> {
    let db = resolve::resolve_database(cli.db.as_deref(), config)?;
    let storage = Storage::open(&db)
        .map_err(|e| format!("failed to open board at {}: {e}", db.display()))?;

    match cli.command {
        Command::Reconcile {
            feed_url,
            feed_file,
        } => {
            let feed = resolve::resolve_feed(feed_file.as_deref(), feed_url.as_deref(), config)?;
            let board = open_board(storage, feed.open(), config);
            let result = cmd_reconcile(&board);
            finish(board, result)
        }
        command => {
            let board = open_board(storage, NoFeed, config);
            let result = dispatch(&board, command);
            finish(board, result)
        }
    }
}

fn open_board<F: OrderFeed>(storage: Storage, feed: F, config: &Config) -> Board<F> {
    Board::new(storage, feed, config.done_policy).with_keep_runs(config.keep_runs)
}

fn finish<F: OrderFeed>(board: Board<F>, result: Result<(), String>) -> Result<(), String> {
    let closed = board
        .close()
        .map_err(|e| format!("failed to close board: {e}"));
    result.and(closed)
}

fn dispatch<F: OrderFeed>(board: &Board<F>, command: Command) -> Result<(), String> {
    match command {
        Command::State { json } => cmd_state(board, json),
        Command::Reconcile { .. } => cmd_reconcile(board),
        Command::Plan {
            order_id,
            standard_id,
            outfeeds,
            high_priority,
        } => {
            let outcome = board
                .plan_order(order_id, &standard_id, &outfeeds, high_priority)
                .map_err(|e| failed("plan", &e))?;
            eprintln!("Planned {order_id}/{standard_id} as {}", outcome.tag);
            print_json(&outcome)
        }
        Command::Unplan { tag, outfeed } => {
            let state = board
                .unplan_order(&tag, outfeed)
                .map_err(|e| failed("unplan", &e))?;
            match outfeed {
                Some(id) => eprintln!("Removed {tag} from outfeed {id}"),
                None => eprintln!("Removed {tag} from every outfeed"),
            }
            print_json(&state)
        }
        Command::Reorder {
            from,
            to,
            moved,
            tags,
        } => {
            let state = board
                .update_queue_order(from, to, &moved, &tags)
                .map_err(|e| failed("reorder", &e))?;
            eprintln!("Outfeed {to}: {}", tags.join(" → "));
            print_json(&state)
        }
        Command::Outfeed { command } => match command {
            OutfeedCommand::Add { id, name } => {
                let state = board
                    .register_outfeed(id, &name)
                    .map_err(|e| failed("register outfeed", &e))?;
                eprintln!("Registered outfeed {id} ({name})");
                print_json(&state)
            }
            OutfeedCommand::Status { id, status } => {
                let state = board
                    .set_outfeed_status(id, &status)
                    .map_err(|e| failed("set status", &e))?;
                eprintln!("Outfeed {id} is {status}");
                print_json(&state)
            }
        },
        Command::Load { command } => match command {
            LoadCommand::Assign { load, order_ids } => {
                let state = board
                    .assign_load(&load, &order_ids)
                    .map_err(|e| failed("assign load", &e))?;
                eprintln!("Assigned {} order(s) to load {load}", order_ids.len());
                print_json(&state)
            }
            LoadCommand::Priorities { loads } => {
                let state = board
                    .set_priorities(&loads)
                    .map_err(|e| failed("set priorities", &e))?;
                if loads.is_empty() {
                    eprintln!("Cleared priorities");
                } else {
                    eprintln!("Priorities: {}", loads.join(" > "));
                }
                print_json(&state)
            }
        },
        Command::Line { command } => match command {
            LineCommand::Assign {
                order_id,
                standard_id,
                lines,
            } => {
                let state = board
                    .assign_lines(order_id, &standard_id, &lines)
                    .map_err(|e| failed("assign lines", &e))?;
                if lines.is_empty() {
                    eprintln!("Cleared lines for {order_id}/{standard_id}");
                } else {
                    eprintln!("{order_id}/{standard_id} on {}", lines.join(", "));
                }
                print_json(&state)
            }
        },
        Command::Runs { limit, json } => cmd_runs(board, limit, json),
        Command::Snapshot { run } => {
            let (id, orders) = board
                .run_snapshot(&run)
                .map_err(|e| failed("load snapshot", &e))?;
            eprintln!("Run {id}: {} order(s)", orders.len());
            print_json(&orders)
        }
    }
}

fn cmd_state<F: OrderFeed>(board: &Board<F>, json: bool) -> Result<(), String> {
    let state = board.state().map_err(|e| failed("read board", &e))?;
    if json {
        return print_json(&state);
    }
    print!("{}", format_board(&state));
    Ok(())
}

fn cmd_reconcile<F: OrderFeed>(board: &Board<F>) -> Result<(), String> {
    let report = board.reconcile().map_err(|e| failed("reconcile", &e))?;
    eprintln!(
        "Reconciled {} order(s): {}",
        report.run.order_count,
        format_summary(&report.run.summary)
    );
    print_json(&report)
}

fn cmd_runs<F: OrderFeed>(board: &Board<F>, limit: usize, json: bool) -> Result<(), String> {
    let runs = board.runs(limit).map_err(|e| failed("list runs", &e))?;
    if json {
        return print_json(&runs);
    }
    if runs.is_empty() {
        println!("No runs");
        return Ok(());
    }
    for run in &runs {
        println!("{}", format_run(run));
    }
    Ok(())
}

fn failed(what: &str, e: &BoardError) -> String {
    format!("{what} failed: {e}")
}

fn print_json(value: &impl Serialize) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("failed to serialize output: {e}"))?;
    println!("{json}");
    Ok(())
}
