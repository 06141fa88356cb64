use mockito::{Matcher, Server};
use predicates::prelude::*;
use serde_json::{Value, json};

const API_KEY: &str = "test-key";

fn exa(server: &Server) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("exa-direct");
    cmd.env("EXA_API_KEY", API_KEY)
        .env("EXA_BASE_URL", server.url())
        .env_remove("RUST_LOG");
    cmd
}

fn offline() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("exa-direct");
    cmd.env("EXA_API_KEY", API_KEY)
        .env("EXA_BASE_URL", "http://127.0.0.1:9/")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_commands_and_global_flags() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("exa-direct");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("research"))
        .stdout(predicate::str::contains("find-similar"))
        .stdout(predicate::str::contains("--api-key"))
        .stdout(predicate::str::contains("--save"));
}

#[test]
fn research_poll_help_includes_interval_flags() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("exa-direct");
    cmd.args(["research", "poll", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--preset"))
        .stdout(predicate::str::contains("--interval"))
        .stdout(predicate::str::contains("--timeout"));
}

#[test]
fn missing_api_key_is_a_config_error() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("exa-direct");
    cmd.env_remove("EXA_API_KEY")
        .args(["research", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[config]"))
        .stderr(predicate::str::contains("EXA_API_KEY"));
}

#[test]
fn blank_instructions_fail_before_any_request() {
    offline()
        .args(["research", "start", "--instructions", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[invalid_request]"));
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() {
    offline()
        .env("RUST_LOG", "debug")
        .args(["research", "start", "--instructions", ""])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsed cli"));
}

#[test]
fn context_query_posts_json_and_prints_result() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/context")
        .match_header("x-api-key", API_KEY)
        .match_body(Matcher::PartialJson(json!({
            "query": "pandas groupby",
            "tokensNum": 512
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"requestId":"c_1","response":"df.groupby('k').sum()"}"#)
        .create();

    let output = exa(&server)
        .args(["context", "query", "--query", "pandas groupby", "--tokens-num", "512"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("json output");
    assert_eq!(value["requestId"], "c_1");
    mock.assert();
}

#[test]
fn research_get_not_found_reports_kind() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/research/v1/r_missing")
        .with_status(404)
        .with_body(r#"{"error":"research not found"}"#)
        .create();

    exa(&server)
        .args(["research", "get", "--id", "r_missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[not_found]"));
}

#[test]
fn research_poll_prints_the_finished_task() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/research/v1/r_1")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"researchId":"r_1","status":"completed","output":{"content":"done"}}"#)
        .create();

    exa(&server)
        .args(["research", "poll", "--id", "r_1", "--interval", "10ms", "--timeout", "5s"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status":"completed""#))
        .stdout(predicate::str::contains(r#""result":{"content":"done"}"#));
    mock.assert();
}

#[test]
fn research_stream_prints_one_json_line_per_event() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/research/v1/r_1")
        .match_query(Matcher::UrlEncoded("stream".into(), "true".into()))
        .match_header("accept", "text/event-stream")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            ": connected\n\n",
            "id: 1\ndata: {\"eventType\":\"plan-definition\",\"steps\":2}\n\n",
            "id: 2\nevent: output\ndata: {\"content\":\"final\"}\n\n",
        ))
        .create();

    let output = exa(&server)
        .args(["research", "stream", "--id", "r_1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let lines = String::from_utf8(output).expect("utf8");
    let events = lines
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("json line"))
        .collect::<Vec<_>>();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["kind"], "plan-definition");
    assert_eq!(events[0]["payload"]["steps"], 2);
    assert_eq!(events[1]["kind"], "output");
    assert_eq!(events[1]["payload"], json!({ "content": "final" }));
    mock.assert();
}

#[test]
fn answer_stream_json_lines_ends_with_done() {
    let mut server = Server::new();
    let _mock = server
        .mock("POST", "/answer")
        .match_body(Matcher::PartialJson(json!({ "query": "what is exa", "stream": true })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Exa is \"}}]}\n\n",
            "data: {\"content\":\"a search API.\"}\n\n",
            "data: {\"citations\":[{\"url\":\"https://exa.ai\"}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"content\":\"ignored\"}\n\n",
        ))
        .create();

    let output = exa(&server)
        .args(["answer", "--query", "what is exa", "--stream", "--json-lines"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let lines = String::from_utf8(output)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("json line"))
        .collect::<Vec<_>>();
    assert_eq!(
        lines,
        vec![
            json!({ "event": "chunk", "data": "Exa is " }),
            json!({ "event": "chunk", "data": "a search API." }),
            json!({ "event": "citations", "data": [{ "url": "https://exa.ai" }] }),
            json!({ "event": "done" }),
        ]
    );
}

#[test]
fn answer_stream_prints_plain_text_by_default() {
    let mut server = Server::new();
    let _mock = server
        .mock("POST", "/answer")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("data: {\"content\":\"Hello\"}\n\ndata: {\"content\":\", world\"}\n\ndata: [DONE]\n\n")
        .create();

    exa(&server)
        .args(["answer", "--query", "greet", "--stream"])
        .assert()
        .success()
        .stdout("Hello, world\n");
}

#[test]
fn save_writes_the_same_json_to_a_file() {
    let mut server = Server::new();
    let _mock = server
        .mock("POST", "/search")
        .match_body(Matcher::PartialJson(json!({ "query": "rust", "numResults": 1 })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"results":[{"url":"https://www.rust-lang.org"}]}"#)
        .create();

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("out.json");

    exa(&server)
        .args(["search", "--query", "rust", "--num-results", "1", "--pretty", "--save"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("https://www.rust-lang.org"));

    let saved: Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("saved file")).expect("json");
    assert_eq!(saved["results"][0]["url"], "https://www.rust-lang.org");
}

#[test]
fn research_start_reads_instructions_and_schema_from_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let instructions = dir.path().join("prompt.txt");
    let schema = dir.path().join("schema.json");
    std::fs::write(&instructions, "Compare vector databases").expect("write prompt");
    std::fs::write(&schema, r#"{"type":"object"}"#).expect("write schema");

    let mut server = Server::new();
    let mock = server
        .mock("POST", "/research/v1")
        .match_body(Matcher::Json(json!({
            "instructions": "Compare vector databases",
            "model": "exa-research",
            "outputSchema": { "type": "object" }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"researchId":"r_42","status":"running"}"#)
        .create();

    let output = exa(&server)
        .args(["research", "start", "--model", "balanced", "--instructions"])
        .arg(format!("@{}", instructions.display()))
        .arg("--schema")
        .arg(&schema)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let task: Value = serde_json::from_slice(&output).expect("json output");
    assert_eq!(task["id"], "r_42");
    assert_eq!(task["model"], "exa-research");
    mock.assert();
}

#[test]
fn invalid_schema_file_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema = dir.path().join("schema.json");
    std::fs::write(&schema, "{ not json").expect("write schema");

    offline()
        .args(["research", "start", "--instructions", "anything", "--schema"])
        .arg(&schema)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[invalid_request]"));
}
