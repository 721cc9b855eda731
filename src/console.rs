//! Line-oriented operator console.
//!
//! Reads commands from stdin and drives the catalog and the transfer server.
//! Every failure is printed and the loop keeps going.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::catalog::DownloadCatalog;
use crate::error::{Error, Result};
use crate::qr::render_qr;
use crate::server::{ServerStatus, StartedServer, StopOutcome, TransferServer};
use crate::utils::shutdown_signal;

pub const HELP: &str = "\
commands:
  add <path>     offer a file on the download page
  list           show the download list
  start [port]   start serving (restarts if already running)
  stop           stop serving
  restart        stop, then start on the same port
  status         show whether the server is running
  url            show the session URL and QR code again
  help           show this text
  quit           stop serving and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(PathBuf),
    List,
    Start(Option<u16>),
    Stop,
    Restart,
    Status,
    Url,
    Help,
    Quit,
}

impl Command {
    /// parse one input line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "add" if !rest.is_empty() => Command::Add(PathBuf::from(unquote(rest))),
            "list" | "ls" => Command::List,
            "start" if rest.is_empty() => Command::Start(None),
            "start" => Command::Start(Some(
                rest.parse()
                    .map_err(|_| Error::InvalidPort(rest.to_string()))?,
            )),
            "stop" => Command::Stop,
            "restart" => Command::Restart,
            "status" => Command::Status,
            "url" | "qr" => Command::Url,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => return Err(Error::UnknownCommand(line.to_string())),
        };
        Ok(Some(command))
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(s)
}

pub enum Outcome {
    Continue(String),
    Quit,
}

pub struct Console {
    server: Arc<TransferServer>,
    catalog: Arc<DownloadCatalog>,
    default_port: u16,
}

impl Console {
    pub fn new(server: Arc<TransferServer>, catalog: Arc<DownloadCatalog>, default_port: u16) -> Self {
        Self {
            server,
            catalog,
            default_port,
        }
    }

    pub async fn execute(&self, command: Command) -> Result<Outcome> {
        let reply = match command {
            Command::Add(path) => {
                let file = self.catalog.add_path(&path)?;
                let mut reply = format!("added {} ({} KB)", file.name, file.size_kb);
                if matches!(self.server.status(), ServerStatus::Running(_)) {
                    reply.push_str("\nrestart to point the QR code at the download list");
                }
                reply
            }
            Command::List => self.describe_catalog(),
            Command::Start(port) => {
                let started = self.server.start(port.unwrap_or(self.default_port)).await?;
                self.describe_start(&started)?
            }
            Command::Stop => match self.server.stop().await? {
                StopOutcome::Stopped => "server stopped".to_string(),
                StopOutcome::NothingRunning => "no server is running".to_string(),
            },
            Command::Restart => {
                let started = self.server.restart().await?;
                self.describe_start(&started)?
            }
            Command::Status => match self.server.status() {
                ServerStatus::Stopped => "stopped".to_string(),
                ServerStatus::Starting => "starting".to_string(),
                ServerStatus::Running(info) => format!("running on {} ({})", info.addr, info.url),
            },
            Command::Url => match self.server.status() {
                ServerStatus::Running(info) => self.describe_start(&info)?,
                _ => "no server is running".to_string(),
            },
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(Outcome::Quit),
        };
        Ok(Outcome::Continue(reply))
    }

    fn describe_catalog(&self) -> String {
        let files = self.catalog.list();
        if files.is_empty() {
            return "no files selected".to_string();
        }
        files
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{}. {} ({} KB, modified {})", i + 1, f.name, f.size_kb, f.modified))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn describe_start(&self, started: &StartedServer) -> Result<String> {
        let hint = if started.url.ends_with(crate::network::DOWNLOAD_PAGE_PATH) {
            "scan to open the download list"
        } else {
            "scan to open the upload page"
        };
        Ok(format!(
            "serving on {}\n{}\n{}\n{}",
            started.addr,
            started.url,
            render_qr(&started.url)?,
            hint
        ))
    }

    /// read commands until `quit`, end of input or a shutdown signal
    pub async fn run(&self) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        println!("{}", HELP);
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = &mut shutdown => break,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read console input: {}", e);
                    break;
                }
            };

            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            };

            match self.execute(command).await {
                Ok(Outcome::Continue(reply)) => println!("{}", reply),
                Ok(Outcome::Quit) => break,
                Err(e) => println!("error: {}", e),
            }
        }
    }
}
