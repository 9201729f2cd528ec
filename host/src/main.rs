use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use host::{
    audit_batch, audit_case, collect_case_paths, golden_case, load_case, parse_seed, read_prices,
    seed_to_hex, write_json, GOLDEN_FRAMES, GOLDEN_SEED,
};
use solracer_core::constants::{FINISH_TOLERANCE_MS_DEFAULT, MAX_FRAMES_DEFAULT};
use solracer_core::{generate_track, PhysicsConfig, VerifierConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "racer-host")]
#[command(about = "Operator tools for deterministic race replay verification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Regenerate the track for a price chart and seed
    Track {
        /// JSON array of price samples
        #[arg(long)]
        prices: PathBuf,
        #[arg(long)]
        seed: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Re-verify one stored submission case
    Verify {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value_t = MAX_FRAMES_DEFAULT)]
        max_frames: u32,
        #[arg(long, default_value_t = FINISH_TOLERANCE_MS_DEFAULT)]
        tolerance_ms: u64,
    },
    /// Re-verify every case file under the given paths in parallel
    Audit {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, default_value_t = MAX_FRAMES_DEFAULT)]
        max_frames: u32,
        #[arg(long, default_value_t = FINISH_TOLERANCE_MS_DEFAULT)]
        tolerance_ms: u64,
        #[arg(long)]
        jobs: Option<usize>,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Record the reference full-throttle run on the flat course
    Golden {
        #[arg(long)]
        seed: Option<String>,
        #[arg(long, default_value_t = GOLDEN_FRAMES)]
        frames: usize,
        #[arg(long, default_value = "golden-wallet")]
        wallet: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the physics configuration and its digest
    Config,
}

fn verifier_config(max_frames: u32, tolerance_ms: u64) -> VerifierConfig {
    VerifierConfig {
        physics: PhysicsConfig::REFERENCE,
        finish_tolerance_ms: tolerance_ms,
        max_frames,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track {
            prices,
            seed,
            output,
        } => {
            let seed = parse_seed(&seed)?;
            let prices = read_prices(&prices)?;
            let samples = generate_track(&prices, seed).map_err(|err| anyhow!("{err}"))?;
            println!("seed={}", seed_to_hex(seed));
            println!("point_count={}", samples.len());
            if let Some(path) = output {
                write_json(&path, &samples)?;
                println!("track_out={}", path.display());
            }
        }
        Commands::Verify {
            input,
            max_frames,
            tolerance_ms,
        } => {
            let case = load_case(&input)?;
            let config = verifier_config(max_frames, tolerance_ms);
            let report = audit_case(&input.display().to_string(), &case, &config)?;

            println!("case={}", report.source);
            println!("wallet={}", report.wallet_address);
            println!("seed={}", seed_to_hex(report.seed));
            println!("frames={}", case.submission.input_trace.len());
            println!("claimed_finish_ms={}", report.claimed.finish_time_ms);
            println!("claimed_coins={}", report.claimed.coins_collected);
            match &report.verified {
                Some(verified) => {
                    println!("verified_finish_ms={}", verified.finish_time_ms);
                    println!("verified_coins={}", verified.coins_collected);
                }
                None => println!("verified=none"),
            }
            match report.verdict.reason() {
                None => println!("verdict=accepted"),
                Some(reason) => {
                    println!("verdict=rejected");
                    println!("reason={reason}");
                }
            }
        }
        Commands::Audit {
            inputs,
            max_frames,
            tolerance_ms,
            jobs,
            report,
        } => {
            let paths = collect_case_paths(&inputs)?;
            let config = verifier_config(max_frames, tolerance_ms);
            let reports = audit_batch(&paths, &config, jobs)?;

            for entry in &reports {
                let verdict = match entry.verdict.reason() {
                    None => "accepted".to_string(),
                    Some(reason) => format!("rejected:{reason}"),
                };
                println!("{} wallet={} verdict={verdict}", entry.source, entry.wallet_address);
            }
            let accepted = reports.iter().filter(|r| r.verdict.is_accepted()).count();
            println!("cases={} accepted={accepted}", reports.len());

            if let Some(path) = report {
                write_json(&path, &reports)
                    .with_context(|| format!("failed writing report {}", path.display()))?;
                println!("report_out={}", path.display());
            }
        }
        Commands::Golden {
            seed,
            frames,
            wallet,
            output,
        } => {
            let seed = match seed {
                Some(seed) => parse_seed(&seed)?,
                None => GOLDEN_SEED,
            };
            let case = golden_case(seed, frames, &wallet)?;
            println!("seed={}", seed_to_hex(seed));
            println!("frames={}", case.submission.input_trace.len());
            println!("finish_time_ms={}", case.submission.finish_time_ms);
            println!("coins_collected={}", case.submission.coins_collected);
            println!("input_hash={}", case.submission.input_hash);
            if let Some(path) = output {
                write_json(&path, &case)?;
                println!("case_out={}", path.display());
            }
        }
        Commands::Config => {
            let config = PhysicsConfig::REFERENCE;
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("failed to serialize config")?
            );
            println!("digest={}", config.digest());
        }
    }

    Ok(())
}
