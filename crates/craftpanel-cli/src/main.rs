mod config;
mod panel;
mod paths;
mod provision;
mod status;

use owo_colors::OwoColorize;
use std::future::Future;
use tracing_subscriber::EnvFilter;

fn main() {
	let args: Vec<String> = std::env::args().skip(1).collect();

	match args.first().map(|s| s.as_str()) {
		None | Some("serve") => cmd_serve(),
		Some("help" | "--help" | "-h") => print_usage(),
		Some("version" | "--version" | "-V") => println!("craftpanel {}", env!("CARGO_PKG_VERSION")),
		Some("status" | "st") => cmd_status(&args[1..]),
		Some("create") => cmd_create(&args[1..]),
		Some(other) => {
			eprintln!("{} unknown command '{}'", "error:".red().bold(), other);
			eprintln!();
			print_usage();
			std::process::exit(1);
		}
	}
}

fn print_usage() {
	eprintln!("{} {} - Minecraft server control panel", "craftpanel".bold(), env!("CARGO_PKG_VERSION"));
	eprintln!();
	eprintln!("usage: {} [command] [options]", "craftpanel".bold());
	eprintln!();

	eprintln!("{}", "panel".cyan().bold());
	eprintln!("  {}                       Run the HTTP control panel (default)", "serve".bold());
	eprintln!("  {} [--port N]           Show server state from a running panel", "status".bold());
	eprintln!();

	eprintln!("{}", "server".cyan().bold());
	eprintln!("  {} <version> <ram>      Provision a Paper server (RAM in GB)", "create".bold());
	eprintln!();

	eprintln!("{}", "config".cyan().bold());
	eprintln!("  {}", paths::config_path().display());
	eprintln!("  env: SERVER_DIR, PLUGIN_URL, RUST_LOG");
	eprintln!();
}

fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();
}

fn block_on<F: Future>(fut: F) -> F::Output {
	match tokio::runtime::Runtime::new() {
		Ok(rt) => rt.block_on(fut),
		Err(e) => {
			eprintln!("{} failed to start runtime: {}", "error:".red().bold(), e);
			std::process::exit(1);
		}
	}
}

fn cmd_serve() {
	init_tracing();
	let config = config::load_global_config();
	if let Err(e) = block_on(panel::run(config)) {
		tracing::error!("{}", e);
		std::process::exit(1);
	}
}

fn cmd_status(args: &[String]) {
	let mut port = config::load_global_config().http.port;
	let mut iter = args.iter();
	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"--port" | "-p" => match iter.next().and_then(|v| v.parse().ok()) {
				Some(p) => port = p,
				None => {
					eprintln!("usage: craftpanel status [--port N]");
					std::process::exit(1);
				}
			},
			other => {
				eprintln!("unknown option '{}'", other);
				std::process::exit(1);
			}
		}
	}

	match block_on(status::fetch_status(port)) {
		Ok(s) => status::render(&s),
		Err(e) => {
			eprintln!("{} {:#}", "error:".red().bold(), e);
			std::process::exit(1);
		}
	}
}

fn cmd_create(args: &[String]) {
	let (Some(version), Some(ram)) = (args.first(), args.get(1)) else {
		eprintln!("usage: craftpanel create <version> <ram>");
		std::process::exit(1);
	};
	let Ok(ram) = ram.trim().parse::<u32>() else {
		eprintln!("{} RAM must be a whole number of GB", "error:".red().bold());
		std::process::exit(1);
	};

	init_tracing();
	let config = config::load_global_config();
	let result = block_on(provision::create_server(
		&config.provision,
		&config.server.dir,
		version.trim(),
		ram,
	));
	match result {
		Ok(()) => eprintln!(
			"{} server created in {}",
			"ok".green().bold(),
			config.server.dir.display()
		),
		Err(e) => {
			eprintln!("{} {:#}", "error:".red().bold(), e);
			std::process::exit(1);
		}
	}
}
