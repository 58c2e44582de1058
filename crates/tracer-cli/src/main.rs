use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracer_core::CanonicalId;
use tracer_it::debugger::Session;
use tracer_it::flow::FlowTarget;
use tracer_it::{runtime_args, signature_mode, static_args};

#[derive(Parser)]
#[command(name = "tracer", version, author, about = "Interactive line-addressable execution tracer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the change-set analyser and persist its artifacts to the current directory.
    Csa {
        #[arg(long, help = "Repository root")]
        repo: PathBuf,
    },
    /// Locate every call site of a function.
    Csl {
        #[arg(long, help = "Repository root")]
        repo: PathBuf,
        #[arg(long = "function-id", help = "Canonical id of the function to locate")]
        function_id: String,
    },
    /// Run the interactive tracer: signature, extract-args, or interactive stepping.
    Trace(TraceArgs),
}

#[derive(clap::Args)]
struct TraceArgs {
    #[arg(long, help = "Repository root (absolute)")]
    repo: PathBuf,
    #[arg(long = "entry-full-id", help = "Canonical id of the function to run")]
    entry_full_id: String,
    #[arg(long = "args-json", default_value = "{\"args\":[],\"kwargs\":{}}", help = "{\"args\":[...],\"kwargs\":{...}}")]
    args_json: String,

    #[arg(long = "stop-line", help = "Line within the entry function to stop at")]
    stop_line: Option<usize>,
    #[arg(long = "stop-location", help = "\"func:N\" or \"<top-level>:N\"")]
    stop_location: Option<String>,
    #[arg(long = "stop-file", help = "Pin the initial target to this file")]
    stop_file: Option<String>,
    #[arg(long = "flow-name", default_value = "default")]
    flow_name: String,
    #[arg(long = "parent-file", help = "Caller's file, for extract-args on a callee defined elsewhere")]
    parent_file: Option<String>,

    #[arg(long = "get-signature", help = "Print the entry's signature and exit")]
    get_signature: bool,

    #[arg(long = "extract-call-args", help = "Resolve a call's argument bindings and exit")]
    extract_call_args: bool,
    #[arg(long = "call-line", help = "Line of the call to extract arguments from")]
    call_line: Option<usize>,
    #[arg(long, help = "JSON object of locals at the call site (static mode)")]
    locals: Option<String>,
    #[arg(long, help = "JSON object of globals at the call site (static mode)")]
    globals: Option<String>,
    #[arg(long = "calling-entry-full-id", help = "Caller's canonical id (runtime mode)")]
    calling_entry_full_id: Option<String>,
    #[arg(long = "calling-args-json", help = "Caller's own args_json (runtime mode)")]
    calling_args_json: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string())).init();

    let code = match cli.command {
        Commands::Csa { repo } => run_csa(&repo)?,
        Commands::Csl { repo, function_id } => run_csl(&repo, &function_id),
        Commands::Trace(args) => run_trace(args)?,
    };
    std::process::exit(code);
}

fn run_csa(repo: &PathBuf) -> Result<i32> {
    let analysis = match tracer_csa::analyze(repo) {
        Ok(analysis) => analysis,
        Err(e) => {
            print_error_stdout(&e.to_string());
            return Ok(1);
        }
    };
    let out_dir = std::env::current_dir().context("resolving current directory")?;
    tracer_csa::writers::write_artifacts(&out_dir, &analysis.functions, &analysis.call_graph, &analysis.roots)
        .context("writing CSA artifacts")?;
    println!("{}", serde_json::to_string(&analysis.roots).context("serializing roots")?);
    Ok(0)
}

fn run_csl(repo: &PathBuf, function_id: &str) -> i32 {
    let id: CanonicalId = match function_id.parse() {
        Ok(id) => id,
        Err(e) => {
            print_error_stdout(&format!("{e}"));
            return 1;
        }
    };
    match tracer_csl::locate(repo, id.path(), id.leaf()) {
        Ok(sites) => {
            println!("{}", serde_json::json!({"call_sites": sites, "count": sites.len()}));
            0
        }
        Err(e) => {
            print_error_stdout(&e.to_string());
            1
        }
    }
}

fn run_trace(args: TraceArgs) -> Result<i32> {
    let entry_id: CanonicalId = match args.entry_full_id.parse() {
        Ok(id) => id,
        Err(e) => {
            print_error_stdout(&format!("{e}"));
            return Ok(1);
        }
    };

    if args.get_signature {
        let payload = signature_mode::run(&args.repo, &entry_id);
        let is_error = payload.get("error").is_some();
        println!("{payload}");
        return Ok(if is_error { 1 } else { 0 });
    }

    if args.extract_call_args {
        return Ok(run_extract_call_args(&args, &entry_id));
    }

    run_interactive(args, entry_id)
}

fn run_extract_call_args(args: &TraceArgs, entry_id: &CanonicalId) -> i32 {
    let Some(call_line) = args.call_line else {
        print_error_stdout("extract-call-args requires --call-line");
        return 1;
    };

    let result = if let (Some(calling_id_raw), Some(calling_args_raw)) = (&args.calling_entry_full_id, &args.calling_args_json) {
        let caller_id: CanonicalId = match calling_id_raw.parse() {
            Ok(id) => id,
            Err(e) => {
                print_error_stdout(&format!("{e}"));
                return 1;
            }
        };
        let (caller_args, caller_kwargs) = match parse_args_json(calling_args_raw) {
            Ok(v) => v,
            Err(e) => {
                print_error_stdout(&e);
                return 1;
            }
        };
        runtime_args::extract(&args.repo, &caller_id, caller_args, caller_kwargs, call_line, entry_id)
    } else {
        let locals = match args.locals.as_deref().map(parse_object) {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                print_error_stdout(&e);
                return 1;
            }
            None => serde_json::Map::new(),
        };
        let globals = match args.globals.as_deref().map(parse_object) {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                print_error_stdout(&e);
                return 1;
            }
            None => serde_json::Map::new(),
        };
        static_args::extract(&args.repo, entry_id, call_line, locals, globals, args.parent_file.as_deref())
    };

    match result {
        Ok(extracted) => {
            println!("{}", serde_json::json!({"args": {"args": extracted.args, "kwargs": extracted.kwargs}}));
            0
        }
        // Unevaluable expression, missing required parameter, unknown caller
        // signature: argument-reconstruction failures, not resolution failures.
        Err(e) => {
            print_error_stdout(&e);
            0
        }
    }
}

fn run_interactive(args: TraceArgs, entry_id: CanonicalId) -> Result<i32> {
    let (call_args, call_kwargs) = match parse_args_json(&args.args_json) {
        Ok(v) => v,
        Err(e) => {
            print_error_stdout(&e);
            return Ok(1);
        }
    };

    let entry_function = entry_id.leaf().to_string();
    let initial_target = match build_initial_target(&args, &entry_function) {
        Ok(t) => t,
        Err(e) => {
            print_error_stdout(&e);
            return Ok(1);
        }
    };

    let entry_full_id = entry_id.to_string();
    let (mut session, payload) = match Session::start(
        args.repo.clone(),
        entry_id,
        call_args,
        call_kwargs,
        args.flow_name.clone(),
        args.args_json.clone(),
        initial_target,
    ) {
        Ok(v) => v,
        Err(e) => {
            emit_error_event(&args.flow_name, &entry_full_id, "", &e.message, &e.traceback);
            return Ok(1);
        }
    };
    emit_stderr(&payload)?;
    if payload.get("event").and_then(|e| e.as_str()) == Some("finished") {
        return Ok(0);
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading control stream request")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "0" {
            return Ok(0);
        }
        let Some(target) = parse_request(trimmed, &entry_function) else {
            print_error_stdout("malformed control stream request");
            return Ok(1);
        };
        match session.trace_to_target(target.clone()) {
            Ok(payload) => {
                emit_stderr(&payload)?;
                if payload.get("event").and_then(|e| e.as_str()) == Some("finished") {
                    return Ok(0);
                }
            }
            Err(e) => {
                emit_error_event(&args.flow_name, &entry_full_id, &target.label(), &e.message, &e.traceback);
                return Ok(1);
            }
        }
    }
    Ok(0)
}

fn build_initial_target(args: &TraceArgs, entry_function: &str) -> Result<FlowTarget, String> {
    if let Some(loc) = &args.stop_location {
        return parse_location(loc, entry_function, args.stop_file.clone());
    }
    if let Some(n) = args.stop_line {
        return Ok(FlowTarget { function: entry_function.to_string(), line: n, raw_location: format!("{entry_function}:{n}"), file: args.stop_file.clone() });
    }
    Err("trace requires --stop-line, --stop-location, --get-signature, or --extract-call-args".to_string())
}

fn parse_location(raw: &str, entry_function: &str, file: Option<String>) -> Result<FlowTarget, String> {
    let substituted = raw.replace("<top-level>", entry_function);
    let (func, line_str) = substituted.rsplit_once(':').ok_or_else(|| format!("malformed location: {raw}"))?;
    let line = line_str.parse::<usize>().map_err(|_| format!("malformed location: {raw}"))?;
    let function = if func.is_empty() { entry_function.to_string() } else { func.to_string() };
    Ok(FlowTarget { function, line, raw_location: substituted, file })
}

/// One control-stream request line (§6): a bare integer, or a JSON object
/// with `location` (taking precedence, with `<top-level>` substituted for
/// the entry's own function name) or `function`/`line`/`file`.
fn parse_request(line: &str, entry_function: &str) -> Option<FlowTarget> {
    if let Ok(n) = line.parse::<usize>() {
        return Some(FlowTarget { function: entry_function.to_string(), line: n, raw_location: format!("{entry_function}:{n}"), file: None });
    }
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    if let Some(loc) = value.get("location").and_then(|s| s.as_str()) {
        let file = value.get("file").and_then(|f| f.as_str()).map(|s| s.to_string());
        return parse_location(loc, entry_function, file).ok();
    }
    let function = value.get("function").and_then(|f| f.as_str()).unwrap_or(entry_function).to_string();
    let line = value.get("line").and_then(|l| l.as_u64())? as usize;
    let file = value.get("file").and_then(|f| f.as_str()).map(|s| s.to_string());
    Some(FlowTarget { function: function.clone(), line, raw_location: format!("{function}:{line}"), file })
}

fn parse_args_json(raw: &str) -> Result<(Vec<serde_json::Value>, serde_json::Map<String, serde_json::Value>), String> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let args = value.get("args").and_then(|a| a.as_array()).cloned().unwrap_or_default();
    let kwargs = value.get("kwargs").and_then(|k| k.as_object()).cloned().unwrap_or_default();
    Ok((args, kwargs))
}

fn parse_object(raw: &str) -> Result<serde_json::Map<String, serde_json::Value>, String> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    value.as_object().cloned().ok_or_else(|| "expected a JSON object".to_string())
}

fn emit_stderr(payload: &serde_json::Value) -> Result<()> {
    eprintln!("{payload}");
    io::stderr().flush().context("flushing control stream response")
}

fn emit_error_event(flow: &str, entry_full_id: &str, target_location: &str, message: &str, traceback: &[String]) {
    let payload = serde_json::json!({
        "event": "error",
        "error": message,
        "traceback": traceback.join("\n"),
        "flow": flow,
        "target_location": target_location,
        "entry_full_id": entry_full_id,
    });
    eprintln!("{payload}");
}

fn print_error_stdout(message: &str) {
    println!("{}", serde_json::json!({"error": message}));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_integer_request() {
        let target = parse_request("42", "main").unwrap();
        assert_eq!(target.function, "main");
        assert_eq!(target.line, 42);
    }

    #[test]
    fn parses_location_with_top_level_substitution() {
        let target = parse_location("<top-level>:7", "main", None).unwrap();
        assert_eq!(target.function, "main");
        assert_eq!(target.line, 7);
    }

    #[test]
    fn parses_json_request_with_explicit_function_and_file() {
        let target = parse_request(r#"{"function":"k","line":3,"file":"/b.py"}"#, "h").unwrap();
        assert_eq!(target.function, "k");
        assert_eq!(target.line, 3);
        assert_eq!(target.file.as_deref(), Some("/b.py"));
    }

    #[test]
    fn parses_args_json_shape() {
        let (args, kwargs) = parse_args_json(r#"{"args":[1,2],"kwargs":{"x":3}}"#).unwrap();
        assert_eq!(args, vec![serde_json::json!(1), serde_json::json!(2)]);
        assert_eq!(kwargs.get("x"), Some(&serde_json::json!(3)));
    }
}
