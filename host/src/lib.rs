use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use solracer_core::constants::TRACK_SAMPLE_COUNT;
use solracer_core::{
    verify_submission, Course, InputFrame, InputTrace, LiveRace, PhysicsConfig, RaceOutcome,
    ResultSubmission, Track, Verdict, VerifierConfig,
};
use tracing::{debug, info};

/// Reference course for the golden run: 1000 level samples.
pub const GOLDEN_TRACK_SAMPLES: usize = TRACK_SAMPLE_COUNT;
pub const GOLDEN_SEED: u32 = 0x5EED_0001;
pub const GOLDEN_FRAMES: usize = 600;

/// A stored submission plus what is needed to rebuild its course.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditCase {
    pub seed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_samples: Option<Vec<f64>>,
    pub submission: ResultSubmission,
}

impl AuditCase {
    /// Explicit track samples win over a price chart.
    pub fn course(&self, config: &PhysicsConfig) -> Result<Course> {
        match (&self.track, &self.price_samples) {
            (Some(samples), _) => Ok(Course::new(
                Track::from_samples(samples.clone()),
                self.seed,
                config,
            )),
            (None, Some(prices)) => Course::generate(prices, self.seed, config)
                .map_err(|err| anyhow!("cannot rebuild course: {err}")),
            (None, None) => Err(anyhow!("case has neither track nor price_samples")),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditReport {
    pub source: String,
    pub wallet_address: String,
    pub seed: u32,
    pub claimed: RaceOutcome,
    pub verdict: Verdict,
    pub verified: Option<RaceOutcome>,
}

pub fn parse_seed(seed: &str) -> Result<u32> {
    let s = seed.trim();
    if s.is_empty() {
        return Err(anyhow!("empty seed"));
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).with_context(|| format!("invalid hex seed: {s}"))
    } else {
        s.parse::<u32>()
            .with_context(|| format!("invalid decimal seed: {s}"))
    }
}

pub fn seed_to_hex(seed: u32) -> String {
    format!("0x{seed:08x}")
}

pub fn read_prices(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed reading price file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("price file {} is not a JSON number array", path.display()))
}

pub fn load_case(path: &Path) -> Result<AuditCase> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed reading case {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed parsing case {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
    }
    let encoded = serde_json::to_vec_pretty(value).context("failed to serialize json")?;
    fs::write(path, encoded).with_context(|| format!("failed writing {}", path.display()))
}

pub fn audit_case(source: &str, case: &AuditCase, config: &VerifierConfig) -> Result<AuditReport> {
    let course = case.course(&config.physics)?;
    let claimed = case.submission.claim();
    let verification = verify_submission(&course, &case.submission.input_trace, &claimed, config);
    debug!(source, verdict = ?verification.verdict, "case audited");

    Ok(AuditReport {
        source: source.to_string(),
        wallet_address: case.submission.wallet_address.clone(),
        seed: case.seed,
        claimed,
        verdict: verification.verdict,
        verified: verification.verified,
    })
}

/// Expand directories into the `*.json` files they contain, sorted.
pub fn collect_case_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(input)
                .with_context(|| format!("failed listing {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
                .collect();
            found.sort();
            paths.extend(found);
        } else {
            paths.push(input.clone());
        }
    }
    if paths.is_empty() {
        return Err(anyhow!("no case files found"));
    }
    Ok(paths)
}

/// Re-verify every case in parallel. `jobs` pins the pool size.
pub fn audit_batch(
    paths: &[PathBuf],
    config: &VerifierConfig,
    jobs: Option<usize>,
) -> Result<Vec<AuditReport>> {
    if jobs == Some(0) {
        return Err(anyhow!("--jobs must be >= 1 when provided"));
    }

    let run_one = |path: &PathBuf| -> Result<AuditReport> {
        let case = load_case(path)?;
        audit_case(&path.display().to_string(), &case, config)
    };

    let results: Vec<Result<AuditReport>> = if let Some(jobs) = jobs {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("failed to build rayon threadpool")?;
        pool.install(|| paths.par_iter().map(run_one).collect())
    } else {
        paths.par_iter().map(run_one).collect()
    };

    let reports = results.into_iter().collect::<Result<Vec<_>>>()?;
    let accepted = reports
        .iter()
        .filter(|report| report.verdict.is_accepted())
        .count();
    info!(cases = reports.len(), accepted, "audit finished");
    Ok(reports)
}

/// Drive the reference flat course at full throttle through the live
/// recorder and package the result as a case file.
pub fn golden_case(seed: u32, frames: usize, wallet_address: &str) -> Result<AuditCase> {
    let config = PhysicsConfig::REFERENCE;
    let samples = vec![0.5; GOLDEN_TRACK_SAMPLES];
    let course = Course::new(Track::from_samples(samples.clone()), seed, &config);

    let mut live = LiveRace::start(&course, &config);
    for _ in 0..frames {
        live.tick(1.0, 0.0, 0.0);
    }
    let (trace, claim) = live.finish().map_err(|err| anyhow!("recorder failed: {err}"))?;
    let claim = claim.ok_or_else(|| anyhow!("{frames} frames are not enough to finish"))?;

    // Keep recording for the full frame budget so the file carries every frame.
    let trace = pad_trace(trace, frames, &config);
    let input_hash = trace.hash();

    Ok(AuditCase {
        seed,
        track: Some(samples),
        price_samples: None,
        submission: ResultSubmission {
            wallet_address: wallet_address.to_string(),
            finish_time_ms: claim.finish_time_ms,
            coins_collected: claim.coins_collected,
            input_hash,
            input_trace: trace,
        },
    })
}

fn pad_trace(trace: InputTrace, frames: usize, config: &PhysicsConfig) -> InputTrace {
    let mut padded = trace.frames().to_vec();
    while padded.len() < frames {
        padded.push(InputFrame {
            time: config.frame_time(padded.len()),
            accelerate: 1.0,
            brake: 0.0,
            rotate: 0.0,
        });
    }
    InputTrace::new(padded)
}
