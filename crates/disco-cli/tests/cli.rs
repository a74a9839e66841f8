use std::fs;
use std::process::Command;
use std::sync::Arc;

use camino::Utf8Path;
use disco_cli::{load_config_from, parse_input, render, summary, ColorMode, DiscoConfig, Payload, RenderOptions};
use disco_core::{assemble, disassemble, CodeUnit, DisError, Value};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn guarded_return() -> CodeUnit {
    CodeUnit {
        name: "f".into(),
        filename: "guard.py".into(),
        argcount: 1,
        nlocals: 1,
        stacksize: 1,
        flags: 0x43,
        code: assemble(
            "LOAD_FAST 0
             POP_JUMP_IF_FALSE 10
             LOAD_FAST 0
             RETURN_VALUE
             LOAD_CONST 0
             RETURN_VALUE",
        )
        .unwrap(),
        consts: vec![Value::None],
        varnames: vec!["x".into()],
        lnotab: vec![(0, 1), (6, 1), (4, 1)],
        ..CodeUnit::default()
    }
}

#[test]
fn container_input_renders_like_the_core_listing() {
    let unit = guarded_return();
    let payload = parse_input(Utf8Path::new("f.disco"), disco_unit::to_bytes(&unit).unwrap(), false).unwrap();
    let out = render(&payload, &RenderOptions::default()).unwrap();
    assert_eq!(out, disassemble(&unit, None).unwrap());
}

#[test]
fn labels_and_lines_sections_follow_the_listing() {
    let payload = Payload::Unit(Arc::new(guarded_return()));
    let opts = RenderOptions { labels: true, lines: true, line_offset: 100, ..RenderOptions::default() };
    let out = render(&payload, &opts).unwrap();
    assert!(out.contains("102           0 LOAD_FAST"));
    assert!(out.ends_with("\nLine starts:\n     0 -> 102\n     6 -> 103\n    10 -> 104\n\nLabels: 10\n"));
}

#[test]
fn info_block_and_hidden_line_column() {
    let payload = Payload::Unit(Arc::new(guarded_return()));
    let out = render(&payload, &RenderOptions { info: true, lineno_width: 0, ..RenderOptions::default() }).unwrap();
    assert!(out.starts_with("Name:              f\n"));
    assert!(out.contains("\n    >>   10 LOAD_CONST               0 (None)\n"));
}

#[test]
fn json_records_are_an_array() {
    let payload = Payload::Unit(Arc::new(guarded_return()));
    let out = render(&payload, &RenderOptions { json: true, json_pretty: false, ..RenderOptions::default() }).unwrap();
    let records: serde_json::Value = serde_json::from_str(&out).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 6);
    assert_eq!(records[1]["opname"], "POP_JUMP_IF_FALSE");
    assert_eq!(records[4]["is_jump_target"], true);
}

#[test]
fn python_sources_and_bad_containers_are_rejected() {
    let err = parse_input(Utf8Path::new("mod.py"), b"x = 1\n".to_vec(), false).unwrap_err();
    assert_eq!(err.downcast_ref::<DisError>(), Some(&DisError::unsupported("str")));

    let err = parse_input(Utf8Path::new("f.disco"), b"nope".to_vec(), false).unwrap_err();
    assert!(format!("{err:#}").contains("f.disco"));
}

#[test]
fn summary_counts_instructions() {
    let payload = Payload::Raw(vec![100, 0, 0, 83]);
    let text = summary(Utf8Path::new("dir/code.bin"), &payload).unwrap();
    assert!(text.contains("code.bin"));
    assert!(text.contains("raw, bytes=4, instructions=2"));
}

#[test]
fn config_is_found_upward() {
    let root = tempdir().unwrap();
    let nested = root.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();
    fs::write(root.path().join("disco.toml"), "lineno_width = 5\ncolor = \"always\"\nshow_info = true\n").unwrap();

    let cfg = load_config_from(None, &nested).unwrap();
    assert_eq!(
        cfg,
        DiscoConfig { lineno_width: 5, color: Some(ColorMode::Always), json_pretty: true, show_info: true }
    );

    let explicit = root.path().join("other.toml");
    fs::write(&explicit, "json_pretty = false\n").unwrap();
    let cfg = load_config_from(Some(&explicit), &nested).unwrap();
    assert!(!cfg.json_pretty);
    assert_eq!(cfg.lineno_width, 3);
}

#[test]
fn binary_keeps_going_after_a_failed_input() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.disco");
    disco_unit::write_file(&good, &guarded_return()).unwrap();
    let missing = dir.path().join("missing.disco");

    let output = Command::new(env!("CARGO_BIN_EXE_disco"))
        .current_dir(dir.path())
        .env_remove("DISCO_LOG")
        .arg(&missing)
        .arg(&good)
        .args(["--labels", "--color", "never"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stdout.contains("RETURN_VALUE"));
    assert!(stdout.contains("Labels: 10"));
    assert!(stderr.contains("missing.disco"));
}

#[test]
fn binary_writes_into_out_dir() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("code.bin");
    fs::write(&input, [113, 0, 0]).unwrap();
    let out_dir = dir.path().join("out");

    let status = Command::new(env!("CARGO_BIN_EXE_disco"))
        .current_dir(dir.path())
        .arg(&input)
        .arg("--raw")
        .arg("--out-dir")
        .arg(&out_dir)
        .status()
        .unwrap();

    assert!(status.success());
    assert_eq!(fs::read_to_string(out_dir.join("code.dis.txt")).unwrap(), "    >>    0 JUMP_ABSOLUTE            0 (0)\n");
}
