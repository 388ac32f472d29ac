use std::path::{Path, PathBuf};
use std::process::exit;

use cortrack::{motp_mota, Result};
use log::info;

mod util;

use crate::util::read_sequence;

const DEFAULT_THRESHOLD: f64 = 0.5;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("usage: mot-eval <gt.txt> <hypotheses.txt> [iou-threshold]");
        exit(2);
    }

    let gt_path = PathBuf::from(&args[0]);
    let hyp_path = PathBuf::from(&args[1]);
    let threshold = match args.get(2) {
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                eprintln!("invalid iou threshold: {}", raw);
                exit(2);
            }
        },
        None => DEFAULT_THRESHOLD,
    };

    if let Err(err) = run(&gt_path, &hyp_path, threshold) {
        eprintln!("error: {}", err);
        exit(1);
    }
}

fn run(gt_path: &Path, hyp_path: &Path, threshold: f64) -> Result<()> {
    let mut ground_truth = read_sequence(gt_path)?;
    let mut hypotheses = read_sequence(hyp_path)?;

    // sequences of different length are scored over their common prefix
    if ground_truth.len() != hypotheses.len() {
        let common = ground_truth.len().min(hypotheses.len());
        info!(
            "truncating to {} common frames ({} ground truth, {} hypothesis)",
            common,
            ground_truth.len(),
            hypotheses.len()
        );
        ground_truth.truncate(common);
        hypotheses.truncate(common);
    }

    let summary = motp_mota(&ground_truth, &hypotheses, threshold)?;

    println!("{}", "=".repeat(40));
    println!("MOT evaluation (IoU threshold = {})", threshold);
    println!("{}", "=".repeat(40));
    println!("frames:           {}", ground_truth.len());
    println!("matches:          {}", summary.matches);
    println!("misses:           {}", summary.misses);
    println!("false positives:  {}", summary.false_positives);
    println!("mismatches:       {}", summary.mismatches);
    match summary.mota() {
        Some(mota) => println!("MOTA (accuracy):  {:.4}", mota),
        None => println!("MOTA (accuracy):  undefined (no ground-truth instances)"),
    }
    println!("MOTP (precision): {:.4}", summary.motp());
    println!("{}", "=".repeat(40));

    Ok(())
}
