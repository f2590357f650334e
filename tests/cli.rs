//! CLI test cases.
//!
//! These run the binary with `--driver echo`, which answers without a model
//! server, and `--no-docling`, so nothing outside the crate is needed. Tests
//! against a real GutenOCR server are marked `#[ignore]`.

use std::{fs, path::Path, process::Command};

use assert_cmd::prelude::*;
use image::{Rgb, RgbImage};
use predicates::prelude::*;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("gutenocr").unwrap()
}

/// Write a small solid-color PNG.
fn write_png(path: &Path) {
    RgbImage::from_pixel(8, 6, Rgb([255, 255, 255]))
        .save(path)
        .unwrap();
}

/// List the file names in a directory.
fn file_names(dir: &Path) -> Vec<String> {
    let mut names = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    names
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_capabilities_without_docling() {
    cmd()
        .args(["capabilities", "--driver", "echo", "--no-docling"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Docling Status: ❌ Disabled"))
        .stdout(predicate::str::contains("rootsautomation/GutenOCR-3B"))
        .stdout(predicate::str::contains(
            "PNG, JPG, JPEG, TIFF, BMP, GIF, WEBP, PDF",
        ));
}

#[test]
fn test_capabilities_json() {
    cmd()
        .args([
            "capabilities",
            "--driver",
            "echo",
            "--no-docling",
            "--model",
            "gutenocr-7b",
            "--cpu",
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#""gutenocr_model": "rootsautomation/GutenOCR-7B""#,
        ))
        .stdout(predicate::str::contains(r#""use_cpu": true"#));
}

#[test]
fn test_schema() {
    cmd()
        .args(["schema", "ProcessingResult"])
        .assert()
        .success()
        .stdout(predicate::str::contains("combined_text"));
}

#[test]
fn test_ocr_single_image() {
    let dir = tempfile::TempDir::new().unwrap();
    let image = dir.path().join("page.png");
    write_png(&image);
    cmd()
        .args(["ocr", "--driver", "echo", "--format", "LINES"])
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[image/png 8x6] Return line-by-line OCR as LINES with bounding boxes.",
        ))
        .stderr(predicate::str::contains("✓ Processing successful"));
}

#[test]
fn test_ocr_single_image_failure_is_reported() {
    let dir = tempfile::TempDir::new().unwrap();
    let image = dir.path().join("page.png");
    write_png(&image);
    cmd()
        .args(["ocr", "--driver", "echo", "--prompt", "FAIL please"])
        .arg(&image)
        .assert()
        .success()
        .stderr(predicate::str::contains("✗ Processing failed"));
}

#[test]
fn test_ocr_batch() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    fs::create_dir_all(input.join("nested")).unwrap();
    write_png(&input.join("a.png"));
    write_png(&input.join("nested/b.PNG"));
    fs::write(input.join("notes.txt"), "not an image").unwrap();
    fs::write(input.join("broken.jpg"), "not really a JPEG").unwrap();

    cmd()
        .args(["ocr", "--batch", "--driver", "echo", "--save-format", "txt"])
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stderr(predicate::str::contains("Processed: 3 images"))
        .stderr(predicate::str::contains("Success: 2 (66.67%)"));

    let names = file_names(&output);
    assert!(names.iter().any(|n| n.starts_with("ocr_results_") && n.ends_with(".txt")));
    assert!(names.iter().any(|n| n.starts_with("summary_report_")));
    assert!(names.iter().any(|n| n.starts_with("a_")));
    assert!(names.iter().any(|n| n.starts_with("b_")));
    assert!(names.iter().any(|n| n.starts_with("broken_")));
}

#[test]
fn test_ocr_batch_csv_with_failures() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    fs::create_dir_all(&input).unwrap();
    write_png(&input.join("a.png"));
    fs::write(input.join("b.jpg"), "not really a JPEG").unwrap();

    // Failed records carry an `error` field the first record lacks, so the
    // CSV can't be written. Everything else still is.
    cmd()
        .args(["ocr", "--batch", "--driver", "echo", "--save-format", "csv"])
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stderr(predicate::str::contains("✗ Error:"))
        .stderr(predicate::str::contains("not in the header"))
        .stderr(predicate::str::contains("Processed: 2 images"))
        .stderr(predicate::str::contains("Success: 1 (50.00%)"));

    let names = file_names(&output);
    assert!(!names.iter().any(|n| n.starts_with("ocr_results_")));
    assert!(names.iter().any(|n| n.starts_with("summary_report_")));
    assert!(names.iter().any(|n| n.starts_with("a_")));
    assert!(names.iter().any(|n| n.starts_with("b_")));
}

#[test]
fn test_ocr_batch_with_empty_input() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("input");
    cmd()
        .args(["ocr", "--batch", "--driver", "echo"])
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(dir.path().join("output"))
        .assert()
        .success()
        .stderr(predicate::str::contains("No images found in"));
    // The input directory is created for next time.
    assert!(input.is_dir());
}

#[test]
fn test_process_single_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let image = dir.path().join("scan.png");
    let output = dir.path().join("output");
    write_png(&image);
    cmd()
        .args(["process", "--driver", "echo", "--no-docling"])
        .arg(&image)
        .arg("--input")
        .arg(dir.path().join("input"))
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Mode: gutenocr_only"))
        .stdout(predicate::str::contains(
            "Return a layout-sensitive TEXT2D representation of the image.",
        ))
        .stderr(predicate::str::contains("✅ Processing complete!"));

    let names = file_names(&output);
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("docling_result_"));
}

#[test]
fn test_process_single_file_failure_is_saved() {
    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("scan.png");
    let output = dir.path().join("output");
    fs::write(&file, "garbage").unwrap();
    cmd()
        .args(["process", "--driver", "echo", "--no-docling"])
        .arg(&file)
        .arg("--input")
        .arg(dir.path().join("input"))
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stderr(predicate::str::contains("❌ Processing failed"))
        .stderr(predicate::str::contains("Output saved to:"));

    let names = file_names(&output);
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("docling_result_"));
    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.join(&names[0])).unwrap())
            .unwrap();
    assert_eq!(saved["success"], false);
    assert!(saved["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[test]
fn test_process_batch() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    fs::create_dir_all(&input).unwrap();
    write_png(&input.join("one.png"));
    fs::write(input.join("two.png"), "garbage").unwrap();

    cmd()
        .args(["process", "--batch", "--driver", "echo", "--no-docling"])
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stderr(predicate::str::contains("✅ one.png (gutenocr_only)"))
        .stderr(predicate::str::contains("❌ two.png (unknown)"));

    let names = file_names(&output);
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("combined_results_") && names[0].ends_with(".json"));
    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.join(&names[0])).unwrap())
            .unwrap();
    assert_eq!(saved.as_array().unwrap().len(), 2);
}

#[test]
#[ignore = "Needs a GutenOCR server at OPENAI_API_BASE"]
fn test_ocr_against_server() {
    let dir = tempfile::TempDir::new().unwrap();
    let image = dir.path().join("page.png");
    write_png(&image);
    cmd().arg("ocr").arg(&image).assert().success();
}
