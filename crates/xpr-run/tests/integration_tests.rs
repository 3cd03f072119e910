use assert_cmd::cargo;
use rstest::rstest;
use scopeguard::defer;
use std::io::Write;
use std::{fs::File, path::PathBuf};

pub fn create_file(name: &str, content: &str) -> PathBuf {
    let temp_file_path = std::env::temp_dir().join(name);
    let mut file = File::create(&temp_file_path).expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write to temp file");

    temp_file_path
}

#[rstest]
#[case::evaluate(vec!["1 + 2"], "3\n")]
#[case::var(vec!["--var", "x=3", "2 * x + 1"], "7\n")]
#[case::json_var(vec!["--var", r#"user={"name": "ada"}"#, "user.name"], "\"ada\"\n")]
#[case::text_output(vec!["-F", "text", "'a' || 'b'"], "ab\n")]
#[case::object_output(vec!["{b: 'x', a: [1, 2]}"], "{\"a\":[1,2],\"b\":\"x\"}\n")]
#[case::pretty(vec!["--pretty", "[1, 2]"], "[\n  1,\n  2\n]\n")]
#[case::undefined_is_null(vec!["undefined"], "null\n")]
#[case::case_expression(vec!["--var", "x=2", "case x when 1 then 'one' when 2 then 'two' end"], "\"two\"\n")]
#[case::ast(vec!["--ast", "1 + 2 * 3"], "1 2 3 * +\n")]
#[case::to_string(vec!["--to-string", "1+2*x"], "(1 + (2 * x))\n")]
#[case::to_js(vec!["--to-js", "x ^ 2"], "Math.pow(x, 2)\n")]
#[case::simplify(vec!["--simplify", "--var", "y=4", "x * (y * 2)"], "(x * 8)\n")]
#[case::variables(vec!["--variables", "x + y.z + max(x, 1)"], "[\"x\",\"y\"]\n")]
#[case::variables_with_members(vec!["--variables", "--with-members", "-F", "text", "x + y.z"], "x\ny.z\n")]
#[case::enable_conversion(vec!["--enable", "conversion", "'3.7' as 'int'"], "4\n")]
#[case::no_output(vec!["-F", "none", "1 + 2"], "")]
fn test_cli_commands(
    #[case] args: Vec<&str>,
    #[case] expected_output: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = cargo::cargo_bin_cmd!("xpr");
    let assert = cmd.args(args).assert();

    assert.success().code(0).stdout(expected_output.to_owned());

    Ok(())
}

#[rstest]
#[case::undefined_variable(vec!["q + 1"], "undefined variable: q")]
#[case::disabled_operator(vec!["--disable", "add", "1 + 2"], "operator \"+\" is disabled")]
#[case::member_access(vec!["--no-member-access", "--var", r#"a={"b": 1}"#, "a.b"], "member access is not permitted")]
#[case::parse_error(vec!["1 +"], "parse error")]
#[case::invalid_var(vec!["--var", "x", "x"], "expected NAME=JSON")]
fn test_cli_errors(#[case] args: Vec<&str>, #[case] message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = cargo::cargo_bin_cmd!("xpr");
    let output = cmd.args(args).output()?;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains(message));

    Ok(())
}

#[test]
fn test_cli_run_with_stdin() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = cargo::cargo_bin_cmd!("xpr");

    let assert = cmd.write_stdin("f(n) = n <= 1 ? 1 : n * f(n - 1);\nf(5)").assert();
    assert.success().code(0).stdout("120\n");

    Ok(())
}

#[test]
fn test_cli_run_with_files() -> Result<(), Box<dyn std::error::Error>> {
    let expression = create_file("test_cli_run_with_files.xpr", "x * y[2] + sqrt(z)");
    let bindings = create_file("test_cli_run_with_files.json", r#"{"x": 2, "y": [1, 2, 3], "z": 16}"#);
    let config = create_file("test_cli_run_with_files_config.json", r#"{"allowMemberAccess": false}"#);
    let (expression_clone, bindings_clone, config_clone) = (expression.clone(), bindings.clone(), config.clone());

    defer! {
        for path in [&expression_clone, &bindings_clone, &config_clone] {
            if path.exists() {
                std::fs::remove_file(path).expect("Failed to delete temp file");
            }
        }
    }

    let mut cmd = cargo::cargo_bin_cmd!("xpr");
    let assert = cmd
        .arg("--from-file")
        .arg("--bindings")
        .arg(bindings.to_string_lossy().to_string())
        .arg("--config")
        .arg(config.to_string_lossy().to_string())
        .arg(expression.to_string_lossy().to_string())
        .assert();

    assert.success().code(0).stdout("10\n");
    Ok(())
}

#[test]
fn test_cli_output_file() -> Result<(), Box<dyn std::error::Error>> {
    let output = std::env::temp_dir().join("test_cli_output_file.json");
    let output_clone = output.clone();

    defer! {
        if output_clone.exists() {
            std::fs::remove_file(&output_clone).expect("Failed to delete temp file");
        }
    }

    let mut cmd = cargo::cargo_bin_cmd!("xpr");
    cmd.arg("-o")
        .arg(output.to_string_lossy().to_string())
        .arg("map(sq, [1, 2, 3])");

    // `sq` is not defined, so nothing is written
    cmd.assert().failure();
    assert!(!output.exists());

    let mut cmd = cargo::cargo_bin_cmd!("xpr");
    cmd.arg("-o")
        .arg(output.to_string_lossy().to_string())
        .arg("sq(v) = v * v; map(sq, [1, 2, 3])")
        .assert()
        .success()
        .stdout("");

    assert_eq!(std::fs::read_to_string(&output)?, "[1,4,9]\n");
    Ok(())
}

#[test]
fn test_cli_check_command() -> Result<(), Box<dyn std::error::Error>> {
    let valid = create_file("test_cli_check_valid.xpr", "case when x then 1 end");
    let invalid = create_file("test_cli_check_invalid.xpr", "case x then 1 end");
    let (valid_clone, invalid_clone) = (valid.clone(), invalid.clone());

    defer! {
        for path in [&valid_clone, &invalid_clone] {
            if path.exists() {
                std::fs::remove_file(path).expect("Failed to delete temp file");
            }
        }
    }

    let mut cmd = cargo::cargo_bin_cmd!("xpr");
    cmd.arg("check")
        .arg(valid.to_string_lossy().to_string())
        .assert()
        .success()
        .stdout("");

    let mut cmd = cargo::cargo_bin_cmd!("xpr");
    let output = cmd
        .arg("check")
        .arg(valid.to_string_lossy().to_string())
        .arg(invalid.to_string_lossy().to_string())
        .output()?;

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("test_cli_check_invalid.xpr"));
    assert!(!stdout.contains("test_cli_check_valid.xpr"));

    Ok(())
}
