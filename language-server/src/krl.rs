mod actions;
mod analysis;
mod backend;
mod catalog;
mod classify;
mod cli;
mod collector;
mod completion;
mod config;
mod definition;
mod diagnostics;
mod folding;
mod formatter;
mod hierarchy;
mod hover;
mod lens;
mod messages;
mod outline;
mod patterns;
mod references;
mod resolver;
mod signature;
mod symbols;
mod text;
mod words;

use tower_lsp::{LspService, Server};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::backend::Backend;

const LOG_ENV: &str = "KRL_LSP_LOG";

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the protocol
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match cli::parse_args(&args) {
        Ok(Some(command)) => {
            if let Err(err) = cli::run(&command) {
                eprintln!("krl-lsp: {err:#}");
                std::process::exit(2);
            }
            return;
        }
        Ok(None) => {}
        Err(err) => {
            eprintln!("krl-lsp: {err:#}");
            std::process::exit(2);
        }
    }

    info!("starting KRL language server");
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
