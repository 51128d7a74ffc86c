//! Console commands and the queue that carries them to the main loop.
//!
//! Producers such as the stdin reader only enqueue; every command is
//! executed on the main loop between two frames.

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect { host: String, port: u16 },
    Disconnect,
    Chat(String),
    Name(String),
    ListServers,
    Quit,
}

impl Command {
    /// Parses a console line. Lines without a leading slash are chat.
    pub fn parse(line: &str, default_port: u16) -> Option<Command> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some(command) = line.strip_prefix('/') else {
            return Some(Command::Chat(line.to_string()));
        };

        let (verb, argument) = match command.split_once(char::is_whitespace) {
            Some((verb, argument)) => (verb, argument.trim()),
            None => (command, ""),
        };

        match (verb, argument) {
            ("connect", address) if !address.is_empty() => {
                let (host, port) = split_address(address, default_port);
                Some(Command::Connect { host, port })
            }
            ("disconnect", _) => Some(Command::Disconnect),
            ("name", name) if !name.is_empty() => Some(Command::Name(name.to_string())),
            ("servers", _) => Some(Command::ListServers),
            ("quit", _) | ("exit", _) => Some(Command::Quit),
            _ => None,
        }
    }
}

/// Splits `host[:port]`; bracketed IPv6 literals may carry a port as well.
pub fn split_address(address: &str, default_port: u16) -> (String, u16) {
    if let Some(rest) = address.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(default_port);
            return (host.to_string(), port);
        }
    }

    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (address.to_string(), default_port),
        },
        _ => (address.to_string(), default_port),
    }
}

pub type CommandSender = mpsc::UnboundedSender<Command>;

pub struct CommandBus {
    sender: CommandSender,
    receiver: mpsc::UnboundedReceiver<Command>,
}

impl CommandBus {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Everything enqueued since the last call, oldest first.
    pub fn drain(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Ok(command) = self.receiver.try_recv() {
            commands.push(command);
        }
        commands
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}
