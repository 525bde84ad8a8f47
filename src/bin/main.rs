//! QSVM Command Line Interface
//!
//! A command-line interface for training, evaluating, and using quantum-kernel
//! SVM classifiers on CSV data.

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{error, info};
use qsvm::core::{OptimizerConfig, Result, RunConfig, WorkingSetStrategy, DEFAULT_SEED};
use qsvm::kernel::{KernelSpec, DEFAULT_REPS};
use qsvm::persistence::SerializableModel;
use qsvm::{CsvDataset, Qsvm};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "qsvm")]
#[command(about = "Quantum-kernel support vector classification")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a new model and save it
    Train(TrainArgs),
    /// Train, test and optionally classify queries in one run
    Evaluate(EvaluateArgs),
    /// Make predictions using a trained model
    Predict(PredictArgs),
    /// Display model information
    Info(InfoArgs),
}

#[derive(Args, Debug)]
struct KernelArgs {
    /// Kernel function
    #[arg(long, default_value = "zz")]
    kernel: CliKernel,

    /// Feature map repetitions (zz kernel)
    #[arg(long, default_value_t = DEFAULT_REPS)]
    reps: usize,

    /// Estimate fidelities from this many shots instead of exactly (zz kernel)
    #[arg(long)]
    shots: Option<usize>,

    /// RBF width parameter
    #[arg(long, default_value = "1.0")]
    gamma: f64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum CliKernel {
    /// Second-order ZZ feature map state fidelity
    #[value(name = "zz")]
    Zz,
    /// Normalized inner product
    #[value(name = "linear")]
    Linear,
    /// Gaussian radial basis function
    #[value(name = "rbf")]
    Rbf,
}

impl KernelArgs {
    fn to_spec(&self) -> Result<KernelSpec> {
        let spec = match self.kernel {
            CliKernel::Zz => KernelSpec::ZzFeatureMap {
                reps: self.reps,
                shots: self.shots,
            },
            CliKernel::Linear => KernelSpec::Linear,
            CliKernel::Rbf => KernelSpec::Rbf { gamma: self.gamma },
        };
        spec.validate()?;
        Ok(spec)
    }
}

#[derive(Args, Debug)]
struct SolverArgs {
    /// Regularization parameter C
    #[arg(short = 'C', long, default_value = "1.0")]
    c: f64,

    /// Convergence tolerance
    #[arg(short, long, default_value = "0.001")]
    epsilon: f64,

    /// Maximum iterations per class pair
    #[arg(long, default_value = "100000")]
    max_iterations: usize,

    /// Working set selection strategy
    #[arg(long, default_value = "second-order")]
    working_set_strategy: CliWorkingSetStrategy,

    /// Seed for sampled kernel estimates
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Abort the run after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliWorkingSetStrategy {
    /// Second-order partner selection (libsvm style, default)
    #[value(name = "second-order")]
    SecondOrder,
    /// Maximal violating pair, first-order only
    #[value(name = "max-violating-pair")]
    MaximalViolatingPair,
}

impl From<CliWorkingSetStrategy> for WorkingSetStrategy {
    fn from(cli_strategy: CliWorkingSetStrategy) -> Self {
        match cli_strategy {
            CliWorkingSetStrategy::SecondOrder => WorkingSetStrategy::SecondOrder,
            CliWorkingSetStrategy::MaximalViolatingPair => WorkingSetStrategy::MaximalViolatingPair,
        }
    }
}

impl SolverArgs {
    fn to_config(&self) -> RunConfig {
        RunConfig {
            optimizer: OptimizerConfig {
                c: self.c,
                epsilon: self.epsilon,
                max_iterations: self.max_iterations,
                working_set_strategy: self.working_set_strategy.into(),
            },
            seed: self.seed,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Args)]
struct TrainArgs {
    /// Training data file (CSV, class name in the last column)
    #[arg(long)]
    data: PathBuf,

    /// Output model file
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    kernel: KernelArgs,

    #[command(flatten)]
    solver: SolverArgs,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Training data file
    #[arg(long)]
    train: PathBuf,

    /// Test data file
    #[arg(long)]
    test: PathBuf,

    /// Unlabelled vectors to classify after evaluation
    #[arg(long)]
    query: Option<PathBuf>,

    #[command(flatten)]
    kernel: KernelArgs,

    #[command(flatten)]
    solver: SolverArgs,
}

#[derive(Args)]
struct PredictArgs {
    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,

    /// Input data file (feature columns only)
    #[arg(long)]
    data: PathBuf,

    /// Output predictions file (optional, prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct InfoArgs {
    /// Model file
    model: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Train(args) => train_command(args),
        Commands::Evaluate(args) => evaluate_command(args),
        Commands::Predict(args) => predict_command(args),
        Commands::Info(args) => info_command(args),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn build_classifier(kernel: &KernelArgs, solver: &SolverArgs) -> Result<Qsvm<KernelSpec>> {
    let spec = kernel.to_spec()?;
    info!("Kernel: {spec:?}");
    info!(
        "Parameters: C={}, epsilon={}, max_iter={}, seed={}",
        solver.c, solver.epsilon, solver.max_iterations, solver.seed
    );
    Ok(Qsvm::new()
        .with_kernel(spec)
        .with_config(solver.to_config()))
}

fn train_command(args: TrainArgs) -> Result<()> {
    info!("Training QSVM model...");
    info!("Data file: {:?}", args.data);

    let dataset = CsvDataset::from_file(&args.data)?.into_dataset()?;
    info!(
        "Loaded {} samples in {} classes",
        dataset.len(),
        dataset.class_names().count()
    );

    let qsvm = build_classifier(&args.kernel, &args.solver)?;
    let fitted = qsvm.fit(&dataset)?;
    info!("Training completed successfully");

    let model_info = fitted.info();
    info!("Pair models: {}", model_info.n_pairs);
    info!("Support vectors: {}", model_info.n_support_vectors);

    let serializable = SerializableModel::from_fitted(&fitted);
    serializable.save_to_file(&args.output)?;
    info!("Model saved to: {:?}", args.output);

    // Quick evaluation on training data
    let accuracy = fitted.evaluate(&dataset)?;
    info!("Training accuracy: {:.2}%", accuracy * 100.0);

    Ok(())
}

fn evaluate_command(args: EvaluateArgs) -> Result<()> {
    let training = CsvDataset::from_file(&args.train)?.into_dataset()?;
    let test = CsvDataset::from_file(&args.test)?.into_dataset()?;
    let queries = match &args.query {
        Some(path) => Some(CsvDataset::unlabeled_from_file(path)?.features()),
        None => None,
    };

    let qsvm = build_classifier(&args.kernel, &args.solver)?;
    let mut report = qsvm.run(&training, &test, queries.as_deref());

    println!("=== QSVM Run ===");
    print!("{report}");

    match report.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn predict_command(args: PredictArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let serializable_model = SerializableModel::load_from_file(&args.model)?;
    let model = serializable_model.to_fitted()?;

    info!("Loading prediction data from: {:?}", args.data);
    let points = CsvDataset::unlabeled_from_file(&args.data)?.features();

    info!(
        "Making predictions using model with {} support vectors",
        serializable_model.metadata.n_support_vectors
    );
    let predictions = model.predict(&points)?;

    // Output results
    if let Some(output_path) = args.output {
        let file = File::create(&output_path)?;
        let mut writer = BufWriter::new(file);
        write_predictions(&mut writer, &predictions)?;
        writer.flush()?;
        info!("Predictions saved to: {output_path:?}");
    } else {
        let stdout = std::io::stdout();
        write_predictions(&mut stdout.lock(), &predictions)?;
    }

    Ok(())
}

fn write_predictions<W: Write>(writer: &mut W, predictions: &[String]) -> Result<()> {
    writeln!(writer, "# Predictions for {} samples", predictions.len())?;
    writeln!(writer, "# Format: sample_index predicted_class")?;
    for (i, class) in predictions.iter().enumerate() {
        writeln!(writer, "{i} {class}")?;
    }
    Ok(())
}

fn info_command(args: InfoArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let serializable_model = SerializableModel::load_from_file(&args.model)?;

    serializable_model.print_summary();

    println!("\nPair Models:");
    for pair in &serializable_model.pairs {
        let name = |i: usize| {
            serializable_model
                .classes
                .get(i)
                .map_or("?", String::as_str)
        };
        println!(
            "  {} vs {}: {} support vectors, bias {:.6}",
            name(pair.pair.first),
            name(pair.pair.second),
            pair.model.n_support_vectors(),
            pair.model.bias()
        );
    }

    Ok(())
}
