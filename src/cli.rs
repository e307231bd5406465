use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay server, accepting TCP connections.
    Server(ServerArgs),
    /// Connect to a relay server and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address the server should bind to. Use port 0 for an
    /// ephemeral port.
    #[arg(long, default_value = "127.0.0.1:5002")]
    pub listen: SocketAddr,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Display name prefixed to outgoing chat text.
    #[arg(long)]
    pub name: String,

    /// Room to join on connect.
    #[arg(long)]
    pub room: String,

    /// Address of the relay server to connect to.
    #[arg(long, default_value = "127.0.0.1:5002")]
    pub server: SocketAddr,

    /// Directory where received files are saved.
    #[arg(long, default_value = "downloads")]
    pub downloads: PathBuf,
}
