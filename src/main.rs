use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::any::Any;
use std::fs;
use std::process::ExitCode;
use std::thread;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tramlisp::ast::Expr;
use tramlisp::evaluator::Env;
use tramlisp::scheme::{ParseConfig, Reader};
use tramlisp::syntax::expand;
use tramlisp::{Error, EvalConfig, Evaluator, ParseErrorKind, Value};

/// Host stack for the interpreter thread. Non-tail calls nest on it, so it
/// must comfortably hold `--max-depth` frames.
const INTERPRETER_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Frame limit used by the binary; fits `INTERPRETER_STACK_SIZE`
const DEFAULT_MAX_DEPTH: usize = 10_000;

struct Options {
    files: Vec<String>,
    eval: EvalConfig,
    parse: ParseConfig,
}

impl Options {
    fn from_matches(matches: &ArgMatches) -> Self {
        Options {
            files: matches
                .get_many::<String>("files")
                .map(|files| files.cloned().collect())
                .unwrap_or_default(),
            eval: EvalConfig {
                tail_calls: !matches.get_flag("no-tail-calls"),
                max_call_depth: matches
                    .get_one::<usize>("max-depth")
                    .copied()
                    .unwrap_or(DEFAULT_MAX_DEPTH),
            },
            parse: ParseConfig {
                handle_comments: !matches.get_flag("no-comments"),
            },
        }
    }
}

fn command() -> Command {
    Command::new("tramlisp")
        .about("A small Scheme-like interpreter with proper tail calls")
        .arg(
            Arg::new("files")
                .value_name("FILE")
                .action(ArgAction::Append)
                .num_args(0..)
                .help("Source files to run in order; starts a REPL when none are given"),
        )
        .arg(
            Arg::new("no-tail-calls")
                .long("no-tail-calls")
                .action(ArgAction::SetTrue)
                .help("Give every call its own frame, tail calls included"),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help(format!(
                    "Maximum number of live procedure frames [default: {DEFAULT_MAX_DEPTH}]"
                )),
        )
        .arg(
            Arg::new("no-comments")
                .long("no-comments")
                .action(ArgAction::SetTrue)
                .help("Treat ';' as an ordinary character instead of a comment"),
        )
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let options = Options::from_matches(&command().get_matches());

    let interpreter = thread::Builder::new()
        .name("interpreter".to_owned())
        .stack_size(INTERPRETER_STACK_SIZE)
        .spawn(move || run(&options));

    match interpreter.map(thread::JoinHandle::join) {
        Ok(Ok(code)) => code,
        Ok(Err(panic_info)) => {
            eprintln!("The interpreter encountered an unexpected error and must exit.");
            eprintln!("Error: {}", panic_message(panic_info.as_ref()));
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Could not start the interpreter thread: {err}");
            ExitCode::FAILURE
        }
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic_info.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic_info.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "Unknown panic occurred"
    }
}

fn run(options: &Options) -> ExitCode {
    let mut evaluator = Evaluator::with_config(options.eval);
    info!(config = ?options.eval, "interpreter started");

    if options.files.is_empty() {
        return run_repl(&mut evaluator, options.parse);
    }

    for path in &options.files {
        if let Err(err) = run_file(&mut evaluator, path, options.parse) {
            warn!(path = %path, "stopping at first error");
            eprintln!("! {err}");
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

/// Expand and evaluate one raw expression
fn eval_raw(evaluator: &mut Evaluator, raw: &Expr) -> Result<Value, Error> {
    let expr = expand(raw)?;
    evaluator.eval(&expr)
}

fn print_result(value: &Value) {
    // define, set! and unmatched cond produce nothing to show
    if !value.is_nil() {
        println!("{value}");
    }
}

/// Evaluate every expression in a file, stopping at the first error
fn run_file(evaluator: &mut Evaluator, path: &str, config: ParseConfig) -> Result<(), String> {
    let source = fs::read_to_string(path).map_err(|err| format!("{path}: {err}"))?;
    info!(path = %path, "running file");

    for raw in Reader::new(&source, config) {
        let value = raw
            .and_then(|raw| eval_raw(evaluator, &raw))
            .map_err(|err| err.to_string())?;
        print_result(&value);
    }
    Ok(())
}

/// Parse a buffered entry; `None` means the entry is unfinished
fn read_entry(buffer: &str, config: ParseConfig) -> Option<Result<Vec<Expr>, Error>> {
    match Reader::new(buffer, config).collect::<Result<Vec<_>, _>>() {
        Err(Error::Parse(err)) if err.kind == ParseErrorKind::Incomplete => None,
        result => Some(result),
    }
}

fn run_repl(evaluator: &mut Evaluator, config: ParseConfig) -> ExitCode {
    println!("tramlisp: a small Scheme with proper tail calls");
    println!("Enter expressions like: (define sq (lambda (x) (* x x)))");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() {
            "tramlisp> "
        } else {
            "      ... "
        };

        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    // Handle special commands
                    match trimmed {
                        ":help" => {
                            let _ = rl.add_history_entry(trimmed);
                            print_help();
                            continue;
                        }
                        ":env" => {
                            let _ = rl.add_history_entry(trimmed);
                            print_environment(evaluator.root());
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                buffer.push_str(&line);
                buffer.push('\n');

                // Keep reading while a list is still open
                let Some(entry) = read_entry(&buffer, config) else {
                    continue;
                };
                let _ = rl.add_history_entry(buffer.trim_end());
                buffer.clear();

                match entry {
                    Ok(exprs) => {
                        for raw in &exprs {
                            match eval_raw(evaluator, raw) {
                                Ok(value) => print_result(&value),
                                Err(err) => {
                                    eprintln!("! {err}");
                                    break;
                                }
                            }
                        }
                    }
                    Err(err) => eprintln!("! {err}"),
                }
            }
            Err(ReadlineError::Interrupted) if !buffer.is_empty() => {
                // Abandon the unfinished entry
                buffer.clear();
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("! {err:?}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn print_help() {
    println!("tramlisp commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Abandon an unfinished entry, or exit");
    println!();
    println!("Special forms:");
    println!("  (define <id> <value>)      (set! <id> <value>)");
    println!("  (lambda (<id> ...) <body> ...)");
    println!("  (cond (<condition> <body> ...) ... (else <body> ...))");
    println!("  (quote <datum>) or '<datum>");
    println!();
    println!("Builtins:");
    println!("  Arithmetic: + - * / %");
    println!("  Comparison: = < <= > >=");
    println!("  Logic: && || !");
    println!("  Lists: cons car cdr list null? eq? equal?");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (define fact (lambda (n acc) (cond ((= n 0) acc) (else (fact (- n 1) (* n acc))))))");
    println!("  (fact 20 1)");
    println!();
}

fn print_environment(env: &Env) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate builtins from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Builtin(_) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Builtin procedures ({}):", builtins.len());
        // Print in columns for readability
        for row in builtins.chunks(4) {
            for name in row {
                print!("  {name:<15}");
            }
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
