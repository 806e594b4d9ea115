mod config;

use std::path::PathBuf;
use std::sync::Arc;

use childminder::{Child, Childminder};
use config::{RunnerConfig, DEFAULT_CONFIG_FILE};
use owo_colors::OwoColorize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

struct Args {
	file: PathBuf,
	color: bool,
}

#[tokio::main]
async fn main() {
	let args = match parse_args(std::env::args().skip(1).collect()) {
		Some(args) => args,
		None => return,
	};

	tracing_subscriber::fmt().with_writer(std::io::stderr).init();

	let config = match RunnerConfig::load(&args.file) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("error: {}", e);
			std::process::exit(1);
		}
	};
	if config.procs.is_empty() {
		eprintln!("error: no processes defined in {}", args.file.display());
		std::process::exit(1);
	}

	let base_dir = match args.file.parent() {
		Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
		_ => PathBuf::from("."),
	};

	let cm = Childminder::new();
	let mut named: Vec<(String, Arc<Child>)> = Vec::new();
	for entry in config.entries(&base_dir, args.color) {
		let shell_args = vec!["-c".to_string(), entry.command.clone()];
		match cm.create("sh", &shell_args, entry.options) {
			Ok(child) => named.push((entry.name, child)),
			Err(e) => {
				eprintln!("error: {}: {}", entry.name, e);
				let _ = cm.kill_all().await;
				std::process::exit(1);
			}
		}
	}

	tokio::select! {
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("interrupted, stopping all processes");
		}
		_ = control_loop(BufReader::new(tokio::io::stdin()), &named) => {}
	}

	if let Err(e) = cm.kill_all().await {
		eprintln!("error: {}", e);
		std::process::exit(1);
	}
}

fn parse_args(args: Vec<String>) -> Option<Args> {
	let mut parsed = Args {
		file: PathBuf::from(DEFAULT_CONFIG_FILE),
		color: true,
	};

	let mut iter = args.into_iter();
	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"help" | "--help" | "-h" => {
				print_usage();
				return None;
			}
			"version" | "--version" | "-V" => {
				println!("childminder {}", env!("CARGO_PKG_VERSION"));
				return None;
			}
			"-f" | "--file" => match iter.next() {
				Some(file) => parsed.file = PathBuf::from(file),
				None => {
					eprintln!("error: {} needs a file", arg);
					std::process::exit(1);
				}
			},
			"--no-color" => parsed.color = false,
			other => {
				eprintln!("unknown argument: {}", other);
				eprintln!("run 'childminder --help' for usage");
				std::process::exit(1);
			}
		}
	}
	Some(parsed)
}

fn print_usage() {
	eprintln!("{} {} — run processes with prefixed output", "childminder".bold(), env!("CARGO_PKG_VERSION"));
	eprintln!();
	eprintln!("usage: {} [-f FILE] [--no-color]", "childminder".bold());
	eprintln!();

	eprintln!("{}", "options".cyan().bold());
	eprintln!("  {} FILE      Process definitions (default: {})", "-f, --file".bold(), DEFAULT_CONFIG_FILE);
	eprintln!("  {}      Plain prefixes", "--no-color".bold());
	eprintln!();

	eprintln!("{}", "commands (stdin)".cyan().bold());
	eprintln!("  {} <name>             Start or restart a process", "start".bold());
	eprintln!("  {} <name>           Restart a process", "restart".bold());
	eprintln!("  {} <name>              Stop a process", "kill".bold());
	eprintln!("  {}                   Show process states", "status".bold());
	eprintln!("  {}                     Stop everything and exit", "quit".bold());
	eprintln!();
	eprintln!("Exits once every started process has exited.");
}

/// Reads commands from `input` until `quit` or until every process has
/// exited. On end of input, waits for every process to exit instead.
async fn control_loop<R>(input: R, named: &[(String, Arc<Child>)])
where
	R: AsyncBufRead + Unpin,
{
	let mut lines = input.lines();
	loop {
		let line = tokio::select! {
			line = lines.next_line() => match line {
				Ok(Some(line)) => line,
				Ok(None) | Err(_) => break,
			},
			_ = all_exited(named) => {
				tracing::info!("all processes exited");
				return;
			}
		};

		let mut words = line.split_whitespace();
		let (cmd, name) = (words.next(), words.next());
		let target = name.and_then(|n| named.iter().find(|(pname, _)| pname == n));

		let result = match (cmd, target) {
			(None, _) => Ok(()),
			(Some("quit" | "exit"), _) => return,
			(Some("status" | "st"), _) => {
				print_status(named);
				Ok(())
			}
			(Some("start"), Some((_, child))) => child.start_or_restart().await,
			(Some("restart"), Some((_, child))) => child.restart().await,
			(Some("kill" | "stop"), Some((_, child))) => child.kill().await,
			(Some("start" | "restart" | "kill" | "stop"), None) => {
				eprintln!("unknown process: {}", name.unwrap_or(""));
				Ok(())
			}
			(Some(other), _) => {
				eprintln!("unknown command: {}", other);
				Ok(())
			}
		};
		if let Err(e) = result {
			eprintln!("error: {}", e);
		}
	}

	for (_, child) in named {
		child.wait_for_exit().await;
	}
}

/// Resolves once every child has run and none is running. Never resolves
/// while a lazy child is still waiting for its first start.
async fn all_exited(named: &[(String, Arc<Child>)]) {
	loop {
		for (_, child) in named {
			child.wait_for_exit().await;
		}
		if named.iter().any(|(_, child)| !child.has_started()) {
			std::future::pending::<()>().await;
		}
		if named.iter().all(|(_, child)| !child.is_running()) {
			return;
		}
	}
}

fn print_status(named: &[(String, Arc<Child>)]) {
	let width = named.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
	for (name, child) in named {
		let state = match child.pid() {
			Some(pid) => format!("{} (pid {})", "running".green(), pid),
			None => match child.last_exit() {
				Some(status) => format!("{} (exit {})", "stopped".red(), status.code),
				None => "stopped".dimmed().to_string(),
			},
		};
		eprintln!("  {:width$}  {}", name, state, width = width);
	}
}
