use assert_cmd::cargo::cargo_bin_cmd;

#[test]
fn help_lists_both_subcommands() {
    let mut cmd = cargo_bin_cmd!("tapedeck");
    cmd.arg("--help");
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");

    assert!(stdout.contains("record"));
    assert!(stdout.contains("verify"));
}

#[test]
fn record_against_an_empty_root_exits_zero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("tapedeck");
    cmd.arg("record").arg("--root").arg(temp.path());
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("no script files found"));
}

#[test]
fn record_rejects_zero_concurrency() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("tapedeck");
    cmd.arg("record")
        .arg("--root")
        .arg(temp.path())
        .arg("--concurrency")
        .arg("0");
    cmd.assert().failure();
}

#[test]
fn verify_fails_fast_when_required_tools_are_missing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config_path = temp.path().join("tapedeck.toml");
    std::fs::write(
        &config_path,
        "[verify]\nprobe = \"tapedeck-missing-ffprobe\"\nocr = \"tapedeck-missing-tesseract\"\n",
    )
    .expect("write config");

    let mut cmd = cargo_bin_cmd!("tapedeck");
    cmd.arg("verify")
        .arg("--root")
        .arg(temp.path())
        .arg("--config")
        .arg(&config_path);
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("tapedeck-missing-tesseract"));
}

#[test]
fn unknown_flag_exits_nonzero() {
    let mut cmd = cargo_bin_cmd!("tapedeck");
    cmd.arg("record").arg("--headless");
    cmd.assert().failure();
}
