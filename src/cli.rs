//! Command-line surface: one binary, five subcommands.
//!
//! Every subcommand follows the same shape: spawn the stage(s) under a fresh
//! handler, wait for them on a side thread, and drain the error bus from the
//! calling thread. Draining while waiting matters: a stage emitting into a
//! saturated bus blocks until the consumer catches up.

use std::path::PathBuf;
use std::thread;

use anyhow::ensure;
use clap::{Parser, Subcommand};
use log::error;

use crate::run::Handler;
use crate::stages::{extract, map, optimize, translate};

#[derive(Parser, Debug)]
#[command(
    name = "colograph",
    about = "Renumber graph vertex keys so connected vertices colocate on disk",
    version
)]
pub struct Args {
    /// Worker threads for per-batch JSON parsing and line rewriting.
    #[arg(long, global = true, default_value_t = 32)]
    pub threads: usize,

    /// Dictionary entries accumulated before a mapping flush pass.
    #[arg(long, global = true, default_value_t = 4 * 1024 * 1024)]
    pub batch: usize,

    /// Log level filter (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract one vertex identifier per line from a JSON document stream.
    ExtractVertexes {
        /// File with input documents.
        #[arg(long = "in", required = true)]
        input: PathBuf,
        /// File with output vertex identifiers.
        #[arg(long, required = true)]
        out: PathBuf,
    },

    /// Extract endpoint identifier pairs from a JSON edge stream.
    ExtractEdges {
        /// File with input edges.
        #[arg(long = "in", required = true)]
        input: PathBuf,
        /// File with output endpoint identifiers.
        #[arg(long, required = true)]
        out: PathBuf,
    },

    /// Map string endpoints to dense integer indices.
    MapEdges {
        /// File with extracted vertex identifiers.
        #[arg(long, required = true)]
        vertexes: PathBuf,
        /// File with extracted edge endpoints.
        #[arg(long, required = true)]
        edges: PathBuf,
        /// First scratch file for the ping-pong rewrite passes.
        #[arg(long = "temp.a", required = true)]
        temp_a: PathBuf,
        /// Second scratch file for the ping-pong rewrite passes.
        #[arg(long = "temp.b", required = true)]
        temp_b: PathBuf,
        /// Output file of packed integer endpoints.
        #[arg(long, required = true)]
        out: PathBuf,
    },

    /// Compute the fixed-point weight table over the integer edges.
    Optimize {
        /// File with packed integer endpoints.
        #[arg(long = "in", required = true)]
        input: PathBuf,
        /// Output weight table.
        #[arg(long, required = true)]
        out: PathBuf,
    },

    /// Rewrite the original documents with their assigned weights.
    Translate {
        /// File with the optimized weight table.
        #[arg(long, required = true)]
        map: PathBuf,
        /// File with the original vertex documents.
        #[arg(long, required = true)]
        vertexes: PathBuf,
        /// Output file for rewritten vertex documents.
        #[arg(long = "vertexes-out", required = true)]
        vertexes_out: PathBuf,
        /// File with the original edge documents.
        #[arg(long, required = true)]
        edges: PathBuf,
        /// Output file for rewritten edge documents.
        #[arg(long = "edges-out", required = true)]
        edges_out: PathBuf,
        /// File with the pre-optimization edge map.
        #[arg(long = "edge-map", required = true)]
        edge_map: PathBuf,
    },
}

/// Run one subcommand to completion. Returns an error iff at least one
/// stage error was observed, after logging each of them.
pub fn run(args: Args) -> anyhow::Result<()> {
    let (handler, errors) = Handler::new();

    let stage = match args.command {
        Command::ExtractVertexes { input, out } => {
            extract::vertexes(&handler, &input, &out, args.threads)
        }
        Command::ExtractEdges { input, out } => {
            extract::edges(&handler, &input, &out, args.threads)
        }
        Command::MapEdges {
            vertexes,
            edges,
            temp_a,
            temp_b,
            out,
        } => map::run(
            &handler, &vertexes, &edges, &temp_a, &temp_b, &out, args.batch, args.threads,
        ),
        Command::Optimize { input, out } => optimize::run(&handler, &input, &out),
        Command::Translate {
            map,
            vertexes,
            vertexes_out,
            edges,
            edges_out,
            edge_map,
        } => translate::run(
            &handler,
            translate::Files {
                map,
                vertexes,
                vertexes_out,
                edges,
                edges_out,
                edge_map,
            },
            args.threads,
        ),
    };

    let waiter = thread::spawn(move || {
        stage.wait();
        handler.wait();
    });

    let mut failed = false;
    for err in errors {
        failed = true;
        error!("{err}");
    }
    if let Err(panic) = waiter.join() {
        std::panic::resume_unwind(panic);
    }

    ensure!(!failed, "pipeline run failed");
    Ok(())
}
