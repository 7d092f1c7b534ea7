use std::path::Path;
use std::process::Command;

fn run_command(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .arg("run")
        .arg("-q")
        .arg("--")
        .arg("--no-config")
        .args(args)
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);
    (stdout, stderr, code)
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("temp path is valid UTF-8")
}

#[test]
fn test_basic_arithmetic() {
    let (stdout, _, code) = run_command(&["-c", "1+2"]);
    assert_eq!(stdout.trim(), "3");
    assert_eq!(code, 0);
}

#[test]
fn test_leading_equals_is_optional() {
    let (stdout, _, code) = run_command(&["-c", "=2*(3+4)"]);
    assert_eq!(stdout.trim(), "14");
    assert_eq!(code, 0);
}

#[test]
fn test_builtin_function() {
    let (stdout, _, code) = run_command(&["-c", "POWER(2,10)"]);
    assert_eq!(stdout.trim(), "1024");
    assert_eq!(code, 0);
}

#[test]
fn test_boolean_result() {
    let (stdout, _, code) = run_command(&["-c", "2>1"]);
    assert_eq!(stdout.trim(), "TRUE");
    assert_eq!(code, 0);
}

#[test]
fn test_string_concatenation() {
    let (stdout, _, code) = run_command(&["-c", "CONCAT(\"a\", 1, TRUE)"]);
    assert_eq!(stdout.trim(), "a1TRUE");
    assert_eq!(code, 0);
}

#[test]
fn test_malformed_formula_is_error() {
    let (stdout, _, code) = run_command(&["-c", "=SUM("]);
    assert_eq!(stdout.trim(), "#ERROR");
    assert_eq!(code, 1);
}

#[test]
fn test_division_by_zero_is_error() {
    let (stdout, _, code) = run_command(&["-c", "1/0"]);
    assert_eq!(stdout.trim(), "#ERROR");
    assert_eq!(code, 1);
}

#[test]
fn test_unknown_function_is_error() {
    let (stdout, _, code) = run_command(&["-c", "NOPE(1)"]);
    assert_eq!(stdout.trim(), "#ERROR");
    assert_eq!(code, 1);
}

#[test]
fn test_empty_sheet_references_are_zero() {
    let (stdout, _, code) = run_command(&["-c", "A1+SUM(B1:B3)+5"]);
    assert_eq!(stdout.trim(), "5");
    assert_eq!(code, 0);
}

#[test]
fn test_command_against_csv() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("data.csv");
    std::fs::write(&csv, "1,label\n2,x\n3.5,y\n").unwrap();

    let (stdout, _, code) = run_command(&["--csv", path_arg(&csv), "-c", "SUM(A1:A3)"]);
    assert_eq!(stdout.trim(), "6.5");
    assert_eq!(code, 0);

    let (stdout, _, code) = run_command(&["--csv", path_arg(&csv), "-c", "CONCAT(B1, \"-\", B2)"]);
    assert_eq!(stdout.trim(), "label-x");
    assert_eq!(code, 0);
}

#[test]
fn test_csv_is_printed_without_command() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("data.csv");
    std::fs::write(&csv, "1,2\n,=A1+B1\n").unwrap();

    let (stdout, _, code) = run_command(&["--csv", path_arg(&csv)]);
    assert_eq!(stdout, "\"1\",\"2\"\n\"\",\"3\"\n");
    assert_eq!(code, 0);
}

#[test]
fn test_export_csv_and_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("data.csv");
    let out_csv = dir.path().join("out.csv");
    let out_json = dir.path().join("book.json");
    std::fs::write(&csv, "4,5\n").unwrap();

    let (_, _, code) = run_command(&["--csv", path_arg(&csv), "-o", path_arg(&out_csv)]);
    assert_eq!(code, 0);
    assert_eq!(std::fs::read_to_string(&out_csv).unwrap(), "\"4\",\"5\"\n");

    let (_, _, code) = run_command(&["--csv", path_arg(&csv), "-o", path_arg(&out_json)]);
    assert_eq!(code, 0);

    let (stdout, _, code) = run_command(&[path_arg(&out_json), "-c", "A1*B1"]);
    assert_eq!(stdout.trim(), "20");
    assert_eq!(code, 0);
}

#[test]
fn test_unsupported_output_extension() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.xlsx");
    let (_, stderr, code) = run_command(&["-o", path_arg(&out)]);
    assert!(stderr.contains("expected a .csv or .json file"));
    assert_eq!(code, 1);
}

#[test]
fn test_config_limits_apply() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "[limits]\nmax_formula_len = 4\n").unwrap();

    let (stdout, _, code) = run_command(&["--config", path_arg(&config), "-c", "1+2"]);
    assert_eq!(stdout.trim(), "3");
    assert_eq!(code, 0);

    let (stdout, _, code) = run_command(&["--config", path_arg(&config), "-c", "1+2+3"]);
    assert_eq!(stdout.trim(), "#ERROR");
    assert_eq!(code, 1);
}

#[test]
fn test_list_functions() {
    let (stdout, _, code) = run_command(&["--list-functions"]);
    assert!(stdout.lines().any(|line| line.starts_with("SUM ")));
    assert!(stdout.lines().any(|line| line.starts_with("NOW ")));
    assert_eq!(code, 0);
}

#[test]
fn test_unknown_option() {
    let (_, stderr, code) = run_command(&["--bogus"]);
    assert!(stderr.contains("Unknown option: --bogus"));
    assert_eq!(code, 1);
}

#[test]
fn test_missing_option_value() {
    let (_, stderr, code) = run_command(&["-c"]);
    assert!(stderr.contains("--command requires a formula"));
    assert_eq!(code, 1);
}
