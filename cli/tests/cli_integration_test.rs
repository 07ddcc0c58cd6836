use std::fs;
use std::path::PathBuf;
use std::process::Command;

use irtrans_core::protocol::{DAIKIN_CHECKSUM_LEN, DAIKIN_HEADER, DAIKIN_PAYLOAD_LEN};

fn create_tmp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("irtrans-cli-{}", std::process::id()));
    fs::create_dir_all(&dir).ok();
    dir
}

fn run_irtrans(args: &[&str]) -> String {
    let output = Command::new(env!("CARGO_BIN_EXE_irtrans"))
        .args(args)
        .output()
        .expect("Failed to execute irtrans");

    String::from_utf8_lossy(&output.stderr).to_string() + &String::from_utf8_lossy(&output.stdout)
}

/// All-zero payload: every checksum group sums to zero.
fn all_zero_code() -> String {
    format!(
        "{}{}{}",
        DAIKIN_HEADER,
        "0".repeat(DAIKIN_PAYLOAD_LEN),
        "0".repeat(DAIKIN_CHECKSUM_LEN)
    )
}

#[test]
fn test_encode_decode_round_trip() {
    let dir = create_tmp_dir();
    let timing_file = dir.join("roundtrip.txt");
    let code = all_zero_code();

    let output = run_irtrans(&["encode", &code, timing_file.to_str().unwrap()]);
    assert!(
        output.contains("Encoded"),
        "Expected successful encoding but got: {output}"
    );
    assert!(timing_file.exists(), "Timing file was not created");

    // start sentinel + one line per symbol
    let lines = fs::read_to_string(&timing_file).unwrap().lines().count();
    assert_eq!(lines, code.len() + 1);

    let output = run_irtrans(&["decode", timing_file.to_str().unwrap()]);
    assert!(
        output.contains(&format!("Decoded code: {code}")),
        "Decode should recover the code but got: {output}"
    );
}

#[test]
fn test_encode_rejects_bad_symbol() {
    let dir = create_tmp_dir();
    let timing_file = dir.join("bad_symbol.txt");

    let output = run_irtrans(&["encode", "21X0", timing_file.to_str().unwrap()]);
    assert!(
        output.to_lowercase().contains("error"),
        "Expected an encode failure but got: {output}"
    );
    assert!(!timing_file.exists(), "No timing file should be written");
}

#[test]
fn test_decode_reports_failure_on_junk_timings() {
    let dir = create_tmp_dir();
    let timing_file = dir.join("junk.txt");
    fs::write(&timing_file, "9000 9000\n9000 9000\n9000 9000\n").unwrap();

    let output = run_irtrans(&["decode", timing_file.to_str().unwrap()]);
    assert!(
        output.contains("Decode failed"),
        "Expected a decode failure report but got: {output}"
    );
}
