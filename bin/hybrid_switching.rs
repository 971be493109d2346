use std::f64::consts::PI;
use std::time::Instant;

use apex_hybrid::core::key::{DiscreteKey, symbol, symbol_key_formatter};
use apex_hybrid::factors::{DecisionTreeFactor, FactorAndConstant, GaussianMixtureFactor, HybridGaussianFactor};
use apex_hybrid::linalg::JacobianFactor;
use apex_hybrid::{HybridGaussianFactorGraph, HybridResult, KeyFormat, VectorValues, init_logger_with_level};
use clap::Parser;
use nalgebra::{dmatrix, dvector};
use tracing::{Level, info, warn};

#[derive(Parser)]
#[command(name = "hybrid_switching")]
#[command(about = "Build a 1D switching-chain model and assemble its per-mode Gaussian subproblems")]
struct Args {
    /// Number of continuous states x0..x(n-1)
    #[arg(short, long, default_value = "4")]
    steps: u64,

    /// Number of motion modes per transition; mode k moves the state by k units
    #[arg(short, long, default_value = "2")]
    modes: usize,

    /// Standard deviation of the motion model
    #[arg(long, default_value = "0.5")]
    sigma: f64,

    /// Prior probability of mode 0 at each transition
    #[arg(long, default_value = "0.7")]
    p_stay: f64,

    /// Print the assembled graph tree
    #[arg(short, long)]
    verbose: bool,
}

fn x(i: u64) -> u64 {
    symbol('x', i)
}

fn mode(i: u64, modes: usize) -> DiscreteKey {
    DiscreteKey::new(symbol('m', i), modes)
}

/// Prior on x0, one mixture per transition, one discrete prior per mode
fn build_switching_chain(args: &Args) -> HybridResult<HybridGaussianFactorGraph> {
    let mut graph = HybridGaussianFactorGraph::new();
    graph.push(HybridGaussianFactor::new(JacobianFactor::unary(
        x(0),
        dmatrix![1.0 / args.sigma],
        dvector![0.0],
    )?)?);

    let log_constant = -(args.sigma * (2.0 * PI).sqrt()).ln();
    let p_move = if args.modes > 1 {
        (1.0 - args.p_stay) / (args.modes - 1) as f64
    } else {
        0.0
    };

    for i in 1..args.steps {
        let m = mode(i, args.modes);
        let components = (0..args.modes)
            .map(|k| {
                JacobianFactor::binary(
                    x(i - 1),
                    dmatrix![-1.0 / args.sigma],
                    x(i),
                    dmatrix![1.0 / args.sigma],
                    dvector![k as f64 / args.sigma],
                )
                .map(|factor| FactorAndConstant::new(factor, log_constant))
            })
            .collect::<HybridResult<Vec<_>>>()?;
        graph.push(GaussianMixtureFactor::from_components(
            vec![x(i - 1), x(i)],
            vec![m],
            components,
        )?);

        let potentials = (0..args.modes)
            .map(|k| if k == 0 { args.p_stay } else { p_move })
            .collect();
        graph.push(DecisionTreeFactor::new(vec![m], potentials)?);
    }
    Ok(graph)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logger_with_level(if args.verbose { Level::DEBUG } else { Level::INFO });

    if args.steps < 2 || args.modes == 0 {
        warn!("Need at least 2 steps and 1 mode, got {} steps and {} modes", args.steps, args.modes);
        return Ok(());
    }

    let start = Instant::now();
    let graph = build_switching_chain(&args)?;
    info!("{}", graph.statistics());

    let tree = graph.assemble_graph_tree()?;
    info!(
        "Assembled graph tree in {:.2} ms: {} nodes, {} distinct subproblems, depth {}",
        start.elapsed().as_secs_f64() * 1000.0,
        tree.num_nodes(),
        tree.num_leaves(),
        tree.depth()
    );
    if args.verbose {
        println!("{}", tree.display(&symbol_key_formatter));
    }

    // Ground truth: move by one unit on every transition
    let truth: VectorValues = (0..args.steps).map(|i| (x(i), dvector![i as f64])).collect();
    let errors = graph.error_tree(&truth)?;
    let mut best: Option<(f64, String)> = None;
    errors.visit_with_assignment(|assignment, &error| {
        if best.as_ref().is_none_or(|(e, _)| error < *e) {
            let modes: Vec<String> = assignment
                .iter()
                .map(|(key, state)| format!("{}={}", symbol_key_formatter(*key), state))
                .collect();
            best = Some((error, modes.join(" ")));
        }
    });
    if let Some((error, modes)) = best {
        info!("Lowest continuous error {:.4} at modes [{}]", error, modes);
    }
    Ok(())
}
