//! Blocking Child - run a process and relay its I/O through a blocking handle.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use blocking_child::config::ConfigLoader;
use blocking_child::{BlockingChild, ChildEvent, ExitStatus, KillSignal, SpawnOptions, Stdin};

#[derive(Parser)]
#[command(
    name = "blocking-child",
    about = "Run a process and relay its I/O through a blocking handle",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command, relaying stdin, stdout and stderr.
    Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Working directory for the command.
    #[arg(long)]
    cwd: Option<PathBuf>,
    /// Extra environment variables (KEY=VALUE), on top of the inherited ones.
    #[arg(long = "env", value_parser = parse_env_var)]
    env: Vec<(String, String)>,
    /// Run the command through the platform shell.
    #[arg(long)]
    shell: bool,
    /// Signal the command after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Signal sent when the timeout fires.
    #[arg(long)]
    kill_signal: Option<String>,
    /// Print events as JSON lines instead of raw output.
    #[arg(long)]
    json: bool,
    /// Bridge config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Close the command's stdin immediately instead of forwarding ours.
    #[arg(long)]
    no_stdin: bool,
    /// The command and its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn parse_env_var(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Run(args) => run(args),
    };
    std::process::exit(code);
}

fn spawn_options(args: &RunArgs) -> SpawnOptions {
    let mut options = SpawnOptions::new().shell(args.shell);
    if let Some(ref dir) = args.cwd {
        options = options.cwd(dir);
    }
    if !args.env.is_empty() {
        let mut env = inherited_env();
        env.extend(args.env.iter().cloned());
        options = options.env(env);
    }
    if let Some(ms) = args.timeout_ms {
        options = options.timeout(Duration::from_millis(ms));
    }
    if let Some(ref signal) = args.kill_signal {
        options = options.kill_signal(KillSignal::parse(signal));
    }
    options
}

/// Our environment, minus anything that is not valid UTF-8.
fn inherited_env() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| {
            if let (Some(key), Some(value)) = (key.to_str(), value.to_str()) {
                return Some((key.to_string(), value.to_string()));
            }
            tracing::warn!(key = %key.to_string_lossy(), "Skipping non-UTF-8 environment variable");
            None
        })
        .collect()
}

fn run(args: RunArgs) -> i32 {
    let loader = args
        .config
        .clone()
        .map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let config = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    if let Some(ref signal) = args.kill_signal {
        if let Err(e) = KillSignal::parse(signal).validate() {
            eprintln!("error: {e}");
            return 1;
        }
    }

    let options = spawn_options(&args);
    let Some((program, rest)) = args.command.split_first() else {
        eprintln!("error: no command given");
        return 1;
    };

    tracing::info!(command = %program, args = ?rest, "Running command");
    let mut child = match BlockingChild::spawn_with_config(program, rest.to_vec(), options, config) {
        Ok(child) => child,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    if let Some(mut stdin) = child.take_stdin() {
        if args.no_stdin {
            stdin.close();
        } else {
            std::thread::spawn(move || forward_stdin(stdin));
        }
    }

    let mut printer = Printer::new(args.json);
    for event in &mut child {
        match event {
            Ok(ChildEvent::Stdout(data)) => printer.chunk("stdout", &data),
            Ok(ChildEvent::Stderr(data)) => printer.chunk("stderr", &data),
            Ok(ChildEvent::Exit(status)) => {
                printer.exit(&status);
                return exit_code(&status);
            }
            Err(e) => {
                printer.error(&e.to_string());
                return 1;
            }
        }
    }
    1
}

/// Copy our stdin into the child until EOF.
fn forward_stdin(mut sink: Stdin) {
    let mut buf = [0u8; 8192];
    let mut input = io::stdin().lock();
    loop {
        match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if sink.send(&buf[..n]).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }
    sink.close();
}

/// Shell convention: the code itself, or 128 + signal number.
fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code {
        return code;
    }
    status
        .signal
        .as_deref()
        .and_then(|name| KillSignal::parse(name).number())
        .map_or(1, |n| 128 + n)
}

/// Holds back a trailing partial UTF-8 sequence until the rest arrives.
#[derive(Debug, Default)]
struct Utf8Tail {
    pending: Vec<u8>,
}

impl Utf8Tail {
    /// Decode everything complete so far. Invalid bytes become U+FFFD.
    fn push(&mut self, data: &[u8]) -> String {
        self.pending.extend_from_slice(data);
        let keep = incomplete_suffix_len(&self.pending);
        let tail = self.pending.split_off(self.pending.len() - keep);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }

    /// Decode whatever is left, complete or not.
    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of a truncated (not invalid) UTF-8 sequence at the end of `bytes`.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(_) => return 0,
            Err(e) => match e.error_len() {
                None => return rest.len() - e.valid_up_to(),
                Some(len) => rest = &rest[e.valid_up_to() + len..],
            },
        }
    }
}

struct Printer {
    json: bool,
    stdout: Utf8Tail,
    stderr: Utf8Tail,
}

impl Printer {
    fn new(json: bool) -> Self {
        Self {
            json,
            stdout: Utf8Tail::default(),
            stderr: Utf8Tail::default(),
        }
    }

    fn tail(&mut self, stream: &str) -> &mut Utf8Tail {
        if stream == "stdout" {
            &mut self.stdout
        } else {
            &mut self.stderr
        }
    }

    fn chunk(&mut self, stream: &str, data: &[u8]) {
        if self.json {
            let text = self.tail(stream).push(data);
            Self::text(stream, &text);
            return;
        }
        let result = if stream == "stdout" {
            io::stdout().write_all(data).and_then(|()| io::stdout().flush())
        } else {
            io::stderr().write_all(data)
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, stream, "Failed to relay output");
        }
    }

    /// Emit any partial characters still held back.
    fn flush(&mut self) {
        if !self.json {
            return;
        }
        for stream in ["stdout", "stderr"] {
            let text = self.tail(stream).finish();
            Self::text(stream, &text);
        }
    }

    fn exit(&mut self, status: &ExitStatus) {
        tracing::info!(code = ?status.code, signal = ?status.signal, "Command exited");
        self.flush();
        if self.json {
            Self::line(&serde_json::json!({
                "type": "exit",
                "code": status.code,
                "signal": status.signal,
            }));
        }
    }

    fn error(&mut self, message: &str) {
        self.flush();
        if self.json {
            Self::line(&serde_json::json!({"type": "error", "message": message}));
        } else {
            eprintln!("error: {message}");
        }
    }

    fn text(stream: &str, text: &str) {
        if !text.is_empty() {
            Self::line(&serde_json::json!({"type": stream, "data": text}));
        }
    }

    fn line(value: &serde_json::Value) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{value}");
        let _ = out.flush();
    }
}
