use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn hci(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hci"))
        .env("RUST_LOG", "error")
        .args(args)
        .output()
        .expect("failed to run hci")
}

fn write_models(dir: &Path) -> Vec<String> {
    let mut args = Vec::new();
    for (flag, name) in [
        ("-D", "detector.cpb"),
        ("-M", "mean.cpb"),
        ("-R", "regressor.cpb"),
        ("-E", "eye.cpb"),
    ] {
        let path = dir.join(name);
        fs::write(&path, b"model").unwrap();
        args.push(flag.to_string());
        args.push(path.display().to_string());
    }
    args
}

#[test]
fn no_arguments_prints_help_and_succeeds() {
    let output = hci(&[]);
    assert!(output.status.success());
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(text.contains("Usage"));
    assert!(text.contains("--input"));
}

#[test]
fn missing_output_directory_fails_before_running() {
    let root = TempDir::new().unwrap();
    let input = root.path().join("frame.png");
    fs::write(&input, b"not really a png").unwrap();
    let output_dir = root.path().join("absent");

    let output = hci(&[
        "-i",
        input.to_str().unwrap(),
        "-o",
        output_dir.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!output_dir.exists());
}

#[test]
fn missing_input_fails_and_leaves_output_untouched() {
    let root = TempDir::new().unwrap();
    let output_dir = root.path().join("out");
    fs::create_dir(&output_dir).unwrap();

    let output = hci(&[
        "-i",
        root.path().join("missing.mov").to_str().unwrap(),
        "-o",
        output_dir.to_str().unwrap(),
        "-m",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(fs::read_dir(&output_dir).unwrap().count(), 0);
}

#[test]
fn missing_model_fails() {
    let root = TempDir::new().unwrap();
    let input = root.path().join("frames");
    fs::create_dir(&input).unwrap();
    let mut args = vec![
        "-i".to_string(),
        input.display().to_string(),
        "-o".to_string(),
        root.path().display().to_string(),
    ];
    let mut models = write_models(root.path());
    // Drop the eye model.
    models.truncate(6);
    args.extend(models);

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let output = hci(&args);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("eye model"));
}

#[test]
fn invalid_config_file_fails() {
    let root = TempDir::new().unwrap();
    let input = root.path().join("frames");
    fs::create_dir(&input).unwrap();
    let config = root.path().join("hci.toml");
    fs::write(&config, "[analysis]\nsmoothing = 2.0\n").unwrap();

    let mut args = vec![
        "-i".to_string(),
        input.display().to_string(),
        "-o".to_string(),
        root.path().display().to_string(),
        "--config".to_string(),
        config.display().to_string(),
    ];
    args.extend(write_models(root.path()));

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let output = hci(&args);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let output = hci(&["-i", "in", "-o", "out", "--bogus"]);
    assert_eq!(output.status.code(), Some(1));
}
