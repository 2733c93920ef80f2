//! Aquasolve - batch equilibrium calculations from the command line.
//!
//! Reads a system definition and a whitespace-separated data table (one row
//! per node, one column per input variable, `#` comment lines allowed),
//! solves every node in parallel and writes the requested output variables as
//! a table.
//!
//! # Usage
//!
//! ```bash
//! aquasolve chemistry.inp input.dat -o results.dat -j 8 --warm
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use aquasolve_core::{
    AquasolveError, Calculator, MemoryOption, Node, NodeProcessor, NodeType, Result, StopFlag,
};

/// Batch chemical-equilibrium solver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the system definition file
    #[arg(value_name = "SYSTEM_FILE")]
    system_file: PathBuf,

    /// Path to the node data table
    #[arg(value_name = "DATA_FILE")]
    data_file: PathBuf,

    /// Output table path
    #[arg(short, long, default_value = "output.dat")]
    output: PathBuf,

    /// Worker threads (0 = available hardware parallelism)
    #[arg(short = 'j', long, default_value_t = 0)]
    threads: i32,

    /// Seed each calculation from the previous successful result
    #[arg(short, long)]
    warm: bool,

    /// Output variables, comma separated (default: the calculator's globals)
    #[arg(long, value_delimiter = ',')]
    output_vars: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let calculator = Calculator::from_file(&args.system_file)?;

    let table = read_table(&args.data_file)?;
    log::info!(
        "{} data rows, {} input columns",
        table.rows.len(),
        table.columns.len()
    );

    let output_vars = if args.output_vars.is_empty() {
        calculator.global_variable_names()
    } else {
        args.output_vars.clone()
    };

    // node layout: input columns, requested outputs, calculator storage
    let mut node_type = NodeType::new();
    for name in &table.columns {
        node_type.add_variable(name, 0.0, false, "data file");
    }
    for name in &output_vars {
        node_type.add_variable(name, 0.0, false, "output");
    }
    node_type.use_global_variables_from_calculator(&calculator);
    let node_type = Arc::new(node_type);

    let input_indices = resolve(&node_type, table.columns.iter())?;
    let output_indices = resolve(&node_type, output_vars.iter())?;

    let mut nodes = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let mut node = Node::new(node_type.clone());
        for (i, value) in row.iter().enumerate() {
            node.set_value(input_indices[i], *value);
        }
        nodes.push(node);
    }

    let stop_flag = Arc::new(StopFlag::new());
    let processor = NodeProcessor::new(&calculator, args.threads, stop_flag, &nodes)?;
    let memory_option = if args.warm {
        MemoryOption::LastSuccessful
    } else {
        MemoryOption::NodeValues
    };

    let t0 = Instant::now();
    processor.process_nodes(&mut nodes, memory_option);
    let elapsed = t0.elapsed().as_secs_f64().max(1e-3);

    let mut report = format!(
        "{} nodes in {:.3} s ({:.0} nodes/s)",
        nodes.len(),
        elapsed,
        nodes.len() as f64 / elapsed
    );
    if let Some(iter_idx) = node_type.index("tot_nr_iter") {
        let total: f64 = nodes.iter().map(|n| n.get_value(iter_idx)).sum();
        report.push_str(&format!(", {} iterations total", total as u64));
    }
    log::info!("{}", report);

    write_table(&args.output, &output_vars, &output_indices, &nodes)?;
    log::info!("wrote {}", args.output.display());

    Ok(())
}

struct DataTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

fn read_table(path: &PathBuf) -> Result<DataTable> {
    let text = std::fs::read_to_string(path).map_err(|e| AquasolveError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let header = lines
        .next()
        .ok_or_else(|| AquasolveError::read("data file has no header line"))?;
    let columns: Vec<String> = header.split_whitespace().map(str::to_string).collect();

    let mut rows = Vec::new();
    for (nr, line) in lines.enumerate() {
        let mut row = Vec::with_capacity(columns.len());
        for field in line.split_whitespace() {
            let value = field.parse::<f64>().map_err(|_| {
                AquasolveError::read(format!("invalid number '{}' in data row {}", field, nr + 1))
            })?;
            row.push(value);
        }
        if row.len() != columns.len() {
            return Err(AquasolveError::read(format!(
                "data row {} has {} columns, expected {}",
                nr + 1,
                row.len(),
                columns.len()
            )));
        }
        rows.push(row);
    }

    Ok(DataTable { columns, rows })
}

fn resolve<'a>(
    node_type: &NodeType,
    names: impl Iterator<Item = &'a String>,
) -> Result<Vec<usize>> {
    names
        .map(|name| {
            node_type
                .index(name)
                .ok_or_else(|| AquasolveError::read(format!("no node slot for '{}'", name)))
        })
        .collect()
}

fn write_table(
    path: &PathBuf,
    names: &[String],
    indices: &[usize],
    nodes: &[Node],
) -> Result<()> {
    let mut out = String::new();
    for name in names {
        out.push_str(name);
        out.push('\t');
    }
    out.push('\n');
    for node in nodes {
        for &i in indices {
            out.push_str(&format!("{:.12e}\t", node.get_value(i)));
        }
        out.push('\n');
    }
    std::fs::write(path, out).map_err(|e| AquasolveError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}
