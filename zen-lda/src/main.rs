use clap::Parser;
use log::info;
use std::path::PathBuf;
use zen_lda::checkpoint;
use zen_lda::config::{
    AccelMethod, InitStrategy, InputFormat, LdaAlgorithm, LdaConfig, PartStrategy,
};
use zen_lda::input::{load_corpus, CorpusOptions};
use zen_lda::output::ModelSink;
use zen_lda::Trainer;

/// Collapsed Gibbs sampling for LDA on a partitioned token graph
///
/// Reads a corpus (`raw` text, `bow` bags, or `semi` labeled bags),
/// samples topic assignments for the configured number of iterations,
/// and writes the term-topic model and doc-topic counts.
#[derive(Parser, Debug)]
#[command(version, about, long_about, term_width = 80)]
struct Cli {
    #[arg(long, required = true, help = "Number of topics K")]
    num_topics: usize,

    #[arg(long, default_value_t = 0.1, help = "Doc-topic prior alpha")]
    alpha: f64,

    #[arg(long, default_value_t = 0.01, help = "Term-topic prior beta")]
    beta: f64,

    #[arg(long = "alpha-as", default_value_t = 0.1, help = "Asymmetric-prior alphaAS")]
    alpha_as: f64,

    #[arg(long, required = true, help = "Total Gibbs iterations")]
    total_iter: usize,

    #[arg(long, required = true, help = "Number of edge partitions")]
    num_partitions: usize,

    #[arg(long, required = true, help = "Corpus file (.tsv or .tsv.gz)")]
    input_path: PathBuf,

    #[arg(long, required = true, help = "Output directory (must not exist)")]
    output_path: PathBuf,

    #[arg(long, default_value_t = 1.0, help = "Per-edge sampling probability per iteration")]
    sample_rate: f64,

    #[arg(long, default_value_t = 0, help = "Worker threads (0 = all cores)")]
    num_threads: usize,

    #[arg(long, value_enum, default_value_t = InputFormat::Bow, help = "Corpus layout")]
    input_format: InputFormat,

    #[arg(long, default_value_t = 1.0, help = "Keep-probability for repeats in semi format")]
    input_semi_rate: f64,

    #[arg(long, value_enum, default_value_t = LdaAlgorithm::ZenLda, help = "Sampler variant")]
    lda_algorithm: LdaAlgorithm,

    #[arg(long, value_enum, default_value_t = AccelMethod::Alias, help = "Term-distribution backing")]
    accel_method: AccelMethod,

    #[arg(long, value_enum, default_value_t = PartStrategy::Dbh, help = "Edge placement strategy")]
    part_strategy: PartStrategy,

    #[arg(long, value_enum, default_value_t = InitStrategy::Random, help = "Initial topic assignment")]
    init_strategy: InitStrategy,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    seed: u64,

    #[arg(long, default_value_t = 8, help = "MH moves per token (LightLDA)")]
    mh_steps: usize,

    #[arg(long, default_value_t = 3600, help = "Per-iteration watchdog in seconds")]
    task_timeout_secs: u64,

    #[arg(long, default_value_t = 0, help = "Checkpoint every n iterations (0 = never)")]
    chkpt_interval: usize,

    #[arg(long, help = "Checkpoint directory")]
    chkpt_dir: Option<PathBuf>,

    #[arg(long, help = "Resume from the checkpoint directory")]
    resume: bool,

    #[arg(long, help = "Evaluate perplexity every iteration")]
    calc_perplexity: bool,

    #[arg(long, default_value_t = 0, help = "Save the model every n iterations (0 = only at the end)")]
    save_interval: usize,

    #[arg(long, help = "Write the term matrix topic-major")]
    save_transposed: bool,

    #[arg(long, help = "Coalesce artifacts into one file each")]
    save_as_solid: bool,

    #[arg(long, help = "Do not treat the leading integer as a doc id")]
    ignore_doc_id: bool,

    #[arg(long, default_value_t = 0, help = "Label classes in semi format")]
    num_classes: usize,
}

const EXIT_USAGE: i32 = 1;
const EXIT_OUTPUT_EXISTS: i32 = 2;

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help/version requests are not usage errors
            let _ = e.print();
            let code = if e.use_stderr() { EXIT_USAGE } else { 0 };
            std::process::exit(code);
        }
    };

    if cli.output_path.exists() {
        eprintln!("output path {} already exists", cli.output_path.display());
        std::process::exit(EXIT_OUTPUT_EXISTS);
    }

    if let Err(e) = run(cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(EXIT_USAGE);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = LdaConfig {
        num_topics: cli.num_topics,
        alpha: cli.alpha,
        beta: cli.beta,
        alpha_as: cli.alpha_as,
        total_iter: cli.total_iter,
        num_partitions: cli.num_partitions,
        num_threads: cli.num_threads,
        seed: cli.seed,
        sample_rate: cli.sample_rate,
        algorithm: cli.lda_algorithm,
        accel: cli.accel_method,
        init: cli.init_strategy,
        part_strategy: cli.part_strategy,
        mh_steps: cli.mh_steps,
        task_timeout_secs: cli.task_timeout_secs,
        calc_perplexity: cli.calc_perplexity,
        save_interval: cli.save_interval,
        chkpt_interval: cli.chkpt_interval,
    };
    cfg.validate()?;

    if cfg.num_threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.num_threads)
            .build_global()?;
    }

    let opts = CorpusOptions {
        format: cli.input_format,
        ignore_doc_id: cli.ignore_doc_id,
        semi_rate: cli.input_semi_rate,
        num_classes: cli.num_classes,
    };

    let graph = if cli.resume {
        let dir = cli
            .chkpt_dir
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--resume requires --chkpt-dir"))?;
        checkpoint::load_checkpoint(dir, &cfg)?
    } else {
        load_corpus(&cli.input_path, &opts, &cfg)?
    };

    info!(
        "starting {:?} with K={}, {} iterations",
        cfg.algorithm, cfg.num_topics, cfg.total_iter
    );

    let sink = ModelSink {
        out_dir: cli.output_path.clone(),
        transposed: cli.save_transposed,
        solid: cli.save_as_solid,
    };

    let mut trainer = Trainer::new(cfg, graph)?;
    trainer.run(Some(&sink), cli.chkpt_dir.as_deref())?;
    Ok(())
}
