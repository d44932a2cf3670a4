#[macro_use]
extern crate log;

use std::collections::HashMap;
use std::env;
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use argh::FromArgs;
use smb_client_core::engine::wire::WireEngine;
use smb_client_core::utils::fmt::{fmt_size, fmt_time_utc};
use smb_client_core::{ClientConfig, DirectoryEntry, SmbClient, DEFAULT_TIMEOUT};

#[derive(FromArgs)]
#[argh(description = "
list the root of a share and print the content of one of its files

every option falls back to the environment variables
HOST, PORT, SHARE, USER, PASSWORD and REMOTE_PATH")]
struct Args {
    #[argh(option, short = 'H', description = "server host")]
    host: Option<String>,
    #[argh(option, short = 'p', description = "server port (default 445)")]
    port: Option<u16>,
    #[argh(option, short = 's', description = "share name")]
    share: Option<String>,
    #[argh(option, short = 'u', description = "specify username")]
    username: Option<String>,
    #[argh(option, short = 'P', description = "specify password")]
    password: Option<String>,
    #[argh(option, short = 't', description = "per call timeout in seconds (default 30)")]
    timeout: Option<u64>,
    #[argh(positional, description = "path of the file to read, relative to the share")]
    path: Option<String>,
}

fn main() -> ExitCode {
    let _ = env_logger::builder().try_init();
    let args: Args = argh::from_env();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("smbcat: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = init_config(args)?;
    info!(
        "running against {} share {}",
        config.server_address(),
        config.get_share()
    );
    let output = SmbClient::new(config, WireEngine::default())
        .run_with(|entries| print_listing(&mut io::stdout().lock(), entries))?;
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&output.content)
        .and_then(|_| stdout.flush())
        .context("failed to write file content")?;
    Ok(())
}

fn init_config(args: Args) -> anyhow::Result<ClientConfig> {
    // options take precedence over the environment
    let overrides: HashMap<&str, String> = [
        ("HOST", args.host),
        ("PORT", args.port.map(|port| port.to_string())),
        ("SHARE", args.share),
        ("USER", args.username),
        ("PASSWORD", args.password),
        ("REMOTE_PATH", args.path),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.map(|value| (key, value)))
    .collect();
    let lookup = |key: &str| {
        overrides
            .get(key)
            .cloned()
            .or_else(|| env::var(key).ok())
            .filter(|value| !value.is_empty())
    };
    let mut config = ClientConfig::from_lookup(lookup)?;
    config.validate()?;
    if lookup("PASSWORD").is_none() {
        let password = read_secret_from_tty("Password: ").context("failed to read password")?;
        let credentials = config.get_credentials().clone().password(password);
        config = config.credentials(credentials);
    }
    let timeout = args.timeout.map(Duration::from_secs).unwrap_or(DEFAULT_TIMEOUT);
    Ok(config.timeout(Some(timeout)))
}

fn print_listing(out: &mut impl Write, entries: &[DirectoryEntry]) {
    for entry in entries {
        let _ = writeln!(
            out,
            "{} {:>10} {} {}",
            if entry.is_dir() { 'd' } else { '-' },
            fmt_size(entry.size),
            fmt_time_utc(entry.modified, "%Y-%m-%d %H:%M"),
            entry.name
        );
    }
    let _ = writeln!(out);
}

/// Read a secret from tty with customisable prompt
fn read_secret_from_tty(prompt: &str) -> io::Result<String> {
    rpassword::prompt_password(prompt)
}
