use std::io::{self, Cursor, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use tether::error::{ObjectError, ObjectResult, ServerError};
use tether::object::{ObjectCatalog, RemoteObject};
use tether::output;
use tether::server::functions::FunctionCatalog;
use tether::server::{Server, ServerConfig, SessionOutcome};
use tether::wire::value::{ObjectSpec, WireValue};

#[derive(Clone)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Probe {
    label: String,
    hits: i64,
}

impl RemoteObject for Probe {
    fn type_tag(&self) -> &str {
        "Probe"
    }

    fn describe(&self) -> ObjectSpec {
        ObjectSpec::new("Probe")
            .with_field("label", WireValue::Str(self.label.clone()))
            .with_field("hits", WireValue::Int(self.hits))
    }
}

fn probe_factory(spec: &ObjectSpec) -> ObjectResult<Box<dyn RemoteObject>> {
    let label = match spec.field("label") {
        Some(value) => value
            .as_str()
            .map_err(|err| ObjectError::Construct {
                type_tag: spec.type_tag.clone(),
                detail: err.to_string(),
            })?
            .to_string(),
        None => String::new(),
    };
    let hits = match spec.field("hits") {
        Some(value) => value.as_int().map_err(|err| ObjectError::Construct {
            type_tag: spec.type_tag.clone(),
            detail: err.to_string(),
        })?,
        None => 0,
    };
    Ok(Box::new(Probe { label, hits }))
}

fn register_probe() {
    static REGISTER: std::sync::Once = std::sync::Once::new();
    REGISTER.call_once(|| {
        register_probe_once();
        FunctionCatalog::global().register("sum", |args| {
            let mut total = 0;
            for arg in args {
                total += arg.as_int().map_err(|err| ServerError::Function {
                    name: "sum".to_string(),
                    detail: err.to_string(),
                })?;
            }
            Ok(Some(WireValue::Int(total)))
        });
    });
}

fn register_probe_once() {
    let catalog = ObjectCatalog::global();
    catalog.register("Probe", probe_factory);
    catalog.register_method::<Probe, _>("Probe", "ping", |_probe, _args| Ok(Vec::new()));
    catalog.register_method::<Probe, _>("Probe", "state", |probe, _args| {
        Ok(vec![
            WireValue::Str(probe.label.clone()),
            WireValue::Int(probe.hits),
        ])
    });
    catalog.register_method::<Probe, _>("Probe", "poke", |probe, _args| {
        probe.hits += 1;
        Ok(vec![WireValue::Int(probe.hits)])
    });
    catalog.register_method::<Probe, _>("Probe", "fail", |_probe, _args| {
        Err(ObjectError::Method {
            method: "fail".to_string(),
            detail: "deliberate test failure".to_string(),
        })
    });
    catalog.register_method::<Probe, _>("Probe", "announce", |probe, _args| {
        output::hub().log(1, &format!("probe says {}", probe.label));
        Ok(Vec::new())
    });
}

fn run_session_with(config: ServerConfig, input: &[u8]) -> (SessionOutcome, Vec<u8>) {
    register_probe();
    let server = Server::new(config);
    let sink = Arc::new(Mutex::new(Vec::new()));
    let outcome = server
        .handle(Cursor::new(input.to_vec()), SharedSink(sink.clone()))
        .unwrap();
    let output = sink.lock().clone();
    (outcome, output)
}

fn run_session(input: &str) -> (SessionOutcome, String) {
    let config = ServerConfig {
        redirect_output: false,
        ..ServerConfig::default()
    };
    let (outcome, output) = run_session_with(config, input.as_bytes());
    (outcome, String::from_utf8(output).unwrap())
}

fn frames(output: &str) -> Vec<&str> {
    output
        .lines()
        .filter(|line| line.starts_with('!'))
        .collect()
}

#[test]
fn ping_replies_and_quit_stops_replying() {
    let (outcome, output) = run_session("!P!Q !P !P");
    assert_eq!(outcome, SessionOutcome::KeepServing);
    assert_eq!(frames(&output), vec!["!R 0"]);
}

#[test]
fn end_of_stream_ends_session_normally() {
    let (outcome, output) = run_session("");
    assert_eq!(outcome, SessionOutcome::KeepServing);
    assert!(output.is_empty());
}

#[test]
fn kill_requests_shutdown_without_reply() {
    let (outcome, output) = run_session("!K");
    assert_eq!(outcome, SessionOutcome::Shutdown);
    assert!(output.is_empty());
}

#[test]
fn garbage_between_commands_is_skipped() {
    let (_, output) = run_session("   junk here !P more junk !P");
    assert_eq!(frames(&output), vec!["!R 0", "!R 0"]);
}

#[test]
fn new_with_id_then_method_reports_state() {
    let (_, output) =
        run_session("!N 42 Probe(label = \"alpha\"; hits = 3) !M 42 \"state\" 0 !Q");
    assert_eq!(frames(&output), vec!["!R 0", "!R 2 \"alpha\" 3"]);
}

#[test]
fn insert_at_occupied_handle_replaces_object() {
    let (_, output) = run_session(
        "!N 7 Probe(label = \"first\") !N 7 Probe(label = \"second\") !M 7 \"state\" 0",
    );
    assert_eq!(
        frames(&output),
        vec!["!R 0", "!R 0", "!R 2 \"second\" 0"]
    );
}

#[test]
fn new_without_id_returns_distinct_fresh_handles() {
    let (_, output) = run_session("!O Probe() !O Probe() !O Probe()");
    let lines = frames(&output);
    assert_eq!(lines.len(), 3);

    let mut handles = Vec::new();
    for line in lines {
        let rest = line.strip_prefix("!R 1 ").unwrap();
        let handle: i64 = rest.trim().parse().unwrap();
        assert!((0..2_000_000_000).contains(&handle));
        handles.push(handle);
    }
    handles.sort_unstable();
    handles.dedup();
    assert_eq!(handles.len(), 3);
}

#[test]
fn delete_of_absent_handle_reports_error_and_session_survives() {
    let (_, output) = run_session("!D 99 !P");
    let lines = frames(&output);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("!E"));
    assert!(lines[0].contains("99"));
    assert_eq!(lines[1], "!R 0");
}

#[test]
fn method_on_absent_handle_reports_missing_object() {
    let (_, output) = run_session("!M 5 \"ping\" 0 !P");
    let lines = frames(&output);
    assert!(lines[0].starts_with("!E"));
    assert!(lines[0].contains("no object in table for handle 5"));
    assert_eq!(lines[1], "!R 0");
}

#[test]
fn clear_all_invalidates_previous_handles() {
    let (_, output) = run_session("!N 3 Probe() !Z !M 3 \"ping\" 0");
    let lines = frames(&output);
    assert_eq!(lines[0], "!R 0");
    assert_eq!(lines[1], "!R 0");
    assert!(lines[2].starts_with("!E"));
    assert!(lines[2].contains("handle 3"));
}

#[test]
fn unknown_command_tag_reports_error_and_session_survives() {
    let (_, output) = run_session("!X !P");
    let lines = frames(&output);
    assert!(lines[0].starts_with("!E"));
    assert!(lines[0].contains("'X'"));
    assert_eq!(lines[1], "!R 0");
}

#[test]
fn unknown_object_type_is_reported() {
    let (_, output) = run_session("!N 1 Mystery() !P");
    let lines = frames(&output);
    assert!(lines[0].starts_with("!E"));
    assert!(lines[0].contains("unknown object type 'Mystery'"));
    assert_eq!(lines[1], "!R 0");
}

#[test]
fn non_object_body_is_rejected() {
    let (_, output) = run_session("!N 1 17 !P");
    let lines = frames(&output);
    assert!(lines[0].starts_with("!E"));
    assert!(lines[0].contains("expected object"));
}

#[test]
fn method_failures_pass_their_message_through() {
    let (_, output) = run_session("!N 2 Probe() !M 2 \"fail\" 0 !M 2 \"ping\" 0");
    let lines = frames(&output);
    assert_eq!(lines[0], "!R 0");
    assert!(lines[1].starts_with("!E"));
    assert!(lines[1].contains("deliberate test failure"));
    assert_eq!(lines[2], "!R 0");
}

#[test]
fn unknown_method_names_the_type() {
    let (_, output) = run_session("!N 2 Probe() !M 2 \"launch\" 0");
    let lines = frames(&output);
    assert!(lines[1].contains("'Probe' has no method 'launch'"));
}

#[test]
fn help_writes_usage_without_reply_frame() {
    let (_, output) = run_session("!?");
    assert!(output.contains("Tether remote object server commands"));
    assert!(output.contains("copies-map"));
    assert!(frames(&output).iter().all(|line| !line.starts_with("!R")));
}

#[test]
fn revision_function_identifies_the_build() {
    let (_, output) = run_session("!F \"revision\" 0");
    let lines = frames(&output);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("!R 1 \"tether "));
}

#[test]
fn set_verbosity_and_implicit_storage_reply_empty() {
    let (_, output) = run_session("!F \"set_verbosity\" 1 1 !F \"implicit_storage\" 1 true");
    assert_eq!(frames(&output), vec!["!R 0", "!R 0"]);
}

#[test]
fn object_types_lists_registered_type_tags() {
    let (_, output) = run_session("!F \"object_types\" 0");
    let lines = frames(&output);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("!R 1 ["));
    assert!(lines[0].contains("\"Probe\""));
}

#[test]
fn registered_free_functions_are_reachable() {
    let (_, output) = run_session("!F \"sum\" 3 1 2 3");
    assert_eq!(frames(&output), vec!["!R 1 6"]);
}

#[test]
fn unknown_function_is_reported() {
    let (_, output) = run_session("!F \"bogus\" 0 !P");
    let lines = frames(&output);
    assert!(lines[0].starts_with("!E"));
    assert!(lines[0].contains("unknown free function 'bogus'"));
    assert_eq!(lines[1], "!R 0");
}

#[test]
fn builtin_arity_is_checked() {
    let (_, output) = run_session("!F \"cd\" 0");
    let lines = frames(&output);
    assert!(lines[0].starts_with("!E"));
    assert!(lines[0].contains("expected 1 argument(s), got 0"));
}

#[test]
fn cd_changes_the_working_directory() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().canonicalize().unwrap();
    let input = format!("!F \"cd\" 1 \"{}\"", path.display());
    let (_, output) = run_session(&input);
    assert_eq!(frames(&output), vec!["!R 0"]);
    assert_eq!(std::env::current_dir().unwrap(), path);
}

#[test]
fn binary_mode_switch_takes_effect_on_the_switching_reply() {
    let config = ServerConfig {
        redirect_output: false,
        ..ServerConfig::default()
    };
    let (_, output) = run_session_with(config, b"!F \"binary\" 0!P");

    let mut expected = Vec::new();
    for _ in 0..2 {
        expected.extend_from_slice(b"!R");
        expected.push(0x03);
        expected.extend_from_slice(&0i64.to_le_bytes());
        expected.push(b'\n');
    }
    assert_eq!(output, expected);
}

#[test]
fn load_reads_an_object_literal_from_a_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("probe.obj");
    std::fs::write(&path, "Probe(label = \"fromfile\"; hits = 1)\n").unwrap();

    let input = format!("!L 6 \"{}\" !M 6 \"state\" 0", path.display());
    let (_, output) = run_session(&input);
    assert_eq!(frames(&output), vec!["!R 0", "!R 2 \"fromfile\" 1"]);
}

#[test]
fn load_failure_is_reported_per_command() {
    let (_, output) = run_session("!L 6 \"/nonexistent/probe.obj\" !P");
    let lines = frames(&output);
    assert!(lines[0].starts_with("!E"));
    assert!(lines[0].contains("could not load object"));
    assert_eq!(lines[1], "!R 0");
}

#[test]
fn persistent_handles_support_backreferences_across_commands() {
    let (_, output) = run_session(
        "!N 10042 Probe(label = \"shared\") \
         !N 7 *10042; \
         !M 7 \"poke\" 0 \
         !M 10042 \"state\" 0",
    );
    assert_eq!(
        frames(&output),
        vec!["!R 0", "!R 0", "!R 1 1", "!R 2 \"shared\" 1"]
    );
}

#[test]
fn backreferences_below_the_persistent_threshold_do_not_survive() {
    let (_, output) = run_session("!N 42 Probe() !N 7 *42; !P");
    let lines = frames(&output);
    assert_eq!(lines[0], "!R 0");
    assert!(lines[1].starts_with("!E"));
    assert!(lines[1].contains("unknown object reference *42"));
    assert_eq!(lines[2], "!R 0");
}

#[test]
fn null_references_are_rejected() {
    let (_, output) = run_session("!N 7 *0; !P");
    let lines = frames(&output);
    assert!(lines[0].starts_with("!E"));
    assert!(lines[0].contains("null object reference"));
}

#[test]
fn negative_handles_are_out_of_range() {
    let (_, output) = run_session("!N -3 Probe() !P");
    let lines = frames(&output);
    assert!(lines[0].starts_with("!E"));
    assert!(lines[0].contains("not a valid object handle"));
}

#[test]
fn truncated_command_reports_error_then_session_ends() {
    let (outcome, output) = run_session("!N 5");
    let lines = frames(&output);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("!E"));
    assert!(lines[0].contains("unexpected end of stream"));
    assert_eq!(outcome, SessionOutcome::KeepServing);
}

#[test]
fn method_logs_are_forwarded_during_a_redirected_session() {
    let config = ServerConfig::default();
    let input = b"!N 1 Probe(label = \"beacon\") !M 1 \"announce\" 0 !Q";
    let (_, output) = run_session_with(config, input);
    let text = String::from_utf8(output).unwrap();

    let lines: Vec<&str> = frames(&text);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "!R 0");
    assert!(lines[1].starts_with("!L 1 "));
    assert!(lines[1].contains("probe says beacon"));
    assert_eq!(lines[2], "!R 0");
}
