//! Score command: compare predicted masks against ground truth.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use imgref::ImgVec;
use rayon::prelude::*;
use seg_eval::stats::mean;
use seg_eval::{ClassPolicy, ConfusionMatrix, IouReport, RunReport, SampleResult};

pub fn run(
    truth_dir: PathBuf,
    pred_dir: PathBuf,
    classes: usize,
    json: Option<PathBuf>,
    csv: Option<PathBuf>,
    clip: bool,
    verbose: bool,
) -> Result<()> {
    if classes == 0 {
        bail!("--classes must be at least 1");
    }
    let policy = if clip {
        ClassPolicy::Clip
    } else {
        ClassPolicy::Strict
    };

    let names = mask_names(&truth_dir)?;
    if names.is_empty() {
        bail!("no PNG masks found in {}", truth_dir.display());
    }
    if verbose {
        eprintln!("Scoring {} mask pairs", names.len());
    }

    // Per-pair matrices in parallel; matrix merging is commutative, so
    // the totals match sequential accumulation in any order.
    let per_sample: Vec<(String, ConfusionMatrix)> = names
        .par_iter()
        .map(|name| {
            let truth = load_mask(&truth_dir.join(name))?;
            let pred = load_mask(&pred_dir.join(name))
                .with_context(|| format!("no prediction paired with {name}"))?;
            let matrix = ConfusionMatrix::from_masks(truth.as_ref(), pred.as_ref(), classes, policy)
                .with_context(|| format!("scoring {name}"))?;
            Ok((name.clone(), matrix))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut total = ConfusionMatrix::new(classes);
    let mut scores = Vec::new();
    let mut details = Vec::with_capacity(per_sample.len());
    for (index, (name, matrix)) in per_sample.iter().enumerate() {
        let sample_iou = IouReport::from_matrix(matrix).mean_iou;
        total.merge(matrix);
        if let Some(score) = sample_iou {
            scores.push(score);
        }
        let running_mean_iou = IouReport::from_matrix(&total).mean_iou;
        let running_sample_mean_iou = if scores.is_empty() {
            None
        } else {
            Some(mean(&scores))
        };

        if verbose {
            eprintln!(
                "{name}: miou={} running={}",
                format_opt(sample_iou),
                format_opt(running_mean_iou)
            );
        }
        details.push(SampleResult {
            index,
            mean_iou: sample_iou,
            running_mean_iou,
            running_sample_mean_iou,
        });
    }

    let report = RunReport::from_accumulation(&total, details);
    print_report(&report, total.total());

    if let Some(path) = json {
        report
            .write_json(&path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = csv {
        report
            .write_csv(&path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

/// Sorted PNG file names in a directory.
fn mask_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Load a PNG class-index mask as a grayscale grid.
fn load_mask(path: &Path) -> Result<ImgVec<u8>> {
    let img = image::open(path)
        .with_context(|| format!("loading {}", path.display()))?
        .to_luma8();
    let (width, height) = img.dimensions();
    Ok(ImgVec::new(
        img.into_raw(),
        width as usize,
        height as usize,
    ))
}

fn print_report(report: &RunReport, pixels: u64) {
    println!(
        "Scored {} samples, {} classes, {} pixels",
        report.samples, report.n_class, pixels
    );
    println!("{:-<40}", "");
    println!("Per-class IoU:");
    for (class, iou) in report.per_class_iou.iter().enumerate() {
        match iou {
            Some(v) => println!("  class {class:>3}: {v:.4}"),
            None => println!("  class {class:>3}: absent"),
        }
    }
    println!("{:-<40}", "");
    println!("Mean IoU (cumulative):      {}", format_opt(report.mean_iou));
    println!(
        "Mean IoU (per-sample avg):  {}",
        format_opt(report.sample_mean_iou)
    );
}

fn format_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_string(), |v| format!("{v:.4}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_mask(path: &Path, values: &[u8], width: u32, height: u32) {
        let img = image::GrayImage::from_raw(width, height, values.to_vec()).unwrap();
        img.save(path).unwrap();
    }

    #[test]
    fn test_mask_names_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write_mask(&dir.path().join("b.png"), &[0], 1, 1);
        write_mask(&dir.path().join("a.png"), &[0], 1, 1);
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let names = mask_names(dir.path()).unwrap();
        assert_eq!(names, vec!["a.png", "b.png"]);
    }

    #[test]
    fn test_load_mask_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.png");
        write_mask(&path, &[0, 1, 2, 3], 2, 2);

        let mask = load_mask(&path).unwrap();
        assert_eq!(mask.width(), 2);
        assert_eq!(mask.height(), 2);
        assert_eq!(mask.buf(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_score_directories_end_to_end() {
        let truth_dir = tempfile::tempdir().unwrap();
        let pred_dir = tempfile::tempdir().unwrap();
        write_mask(&truth_dir.path().join("s.png"), &[0, 1, 1, 2], 2, 2);
        write_mask(&pred_dir.path().join("s.png"), &[0, 1, 2, 2], 2, 2);

        let json = truth_dir.path().join("report.json");
        run(
            truth_dir.path().to_path_buf(),
            pred_dir.path().to_path_buf(),
            3,
            Some(json.clone()),
            None,
            false,
            false,
        )
        .unwrap();

        let report: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(report.samples, 1);
        assert_eq!(report.per_class_iou[1], Some(0.5));
    }

    #[test]
    fn test_missing_prediction_fails() {
        let truth_dir = tempfile::tempdir().unwrap();
        let pred_dir = tempfile::tempdir().unwrap();
        write_mask(&truth_dir.path().join("s.png"), &[0], 1, 1);

        let result = run(
            truth_dir.path().to_path_buf(),
            pred_dir.path().to_path_buf(),
            2,
            None,
            None,
            false,
            false,
        );
        assert!(result.is_err());
    }
}
