// Command::cargo_bin is deprecated in recent assert_cmd releases but still works
#![allow(deprecated)]

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn component_compiler() -> Command {
    Command::cargo_bin("component-compiler").unwrap()
}

#[test]
fn test_compile_command_writes_module() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("src/hello_world");
    fs::create_dir_all(&source).unwrap();
    fs::write(
        source.join("index.esm"),
        "export default class HelloWorld extends HTMLElement {}\n",
    )
    .unwrap();

    component_compiler()
        .current_dir(dir.path())
        .args(["compile", "--source", "src/hello_world", "--destination", "out"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Compiled 1 module(s)"));

    let output = fs::read_to_string(dir.path().join("out/hello_world/index.js")).unwrap();
    assert!(output.ends_with("customElements.define('hello-world', HelloWorld)"));
}

#[test]
fn test_compile_command_reads_config() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("src/hello_world");
    fs::create_dir_all(&source).unwrap();
    fs::write(
        source.join("index.esm"),
        "import background from './assets/bg.png'\n\
         export default class HelloWorld extends HTMLElement {}\n",
    )
    .unwrap();
    fs::create_dir_all(source.join("assets")).unwrap();
    fs::write(source.join("assets/bg.png"), "png").unwrap();
    fs::write(dir.path().join("component.toml"), "[style]\nrebase_urls = true\n").unwrap();

    component_compiler()
        .current_dir(dir.path())
        .args([
            "compile",
            "-s",
            "src/hello_world",
            "-d",
            "out",
            "--prefix",
            "/static",
        ])
        .assert()
        .success();

    let output = fs::read_to_string(dir.path().join("out/hello_world/index.js")).unwrap();
    assert!(output.contains("const background = '/static/hello_world/assets/bg.png'"));
    assert!(dir.path().join("out/hello_world/assets/bg.png").is_file());
}

#[test]
fn test_compile_command_reports_missing_entry() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src/empty_component")).unwrap();

    component_compiler()
        .current_dir(dir.path())
        .args(["compile", "--source", "src/empty_component", "--destination", "out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is missing"));
}

#[test]
fn test_compile_command_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src/hello_world")).unwrap();
    fs::write(
        dir.path().join("component.toml"),
        "[compilers]\nvue = \"vue-compiler\"\n",
    )
    .unwrap();

    component_compiler()
        .current_dir(dir.path())
        .args(["compile", "--source", "src/hello_world", "--destination", "out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown compiler plugin 'vue-compiler'"));
}
