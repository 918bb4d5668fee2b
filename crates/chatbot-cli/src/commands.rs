use anyhow::{Result, bail};

/// One line of terminal input.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    NewChat,
    List,
    Open(String),
    Delete(Vec<String>),
    Help,
    Quit,
    Prompt(String),
}

pub const HELP: &str = "\
Commands:
  /new            start a new chat
  /list           list saved chats, newest first
  /open <id>      show a saved chat and continue it
  /delete <id>... delete saved chats
  /help           show this help
  /quit           exit
Anything else is sent to the model.";

pub fn parse(line: &str) -> Result<Command> {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Command::Prompt(line.to_string()));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<String> = words.map(str::to_string).collect();

    let command = match name {
        "new" => Command::NewChat,
        "list" | "ls" => Command::List,
        "open" => match args.as_slice() {
            [id] => Command::Open(id.clone()),
            _ => bail!("usage: /open <id>"),
        },
        "delete" | "rm" => {
            if args.is_empty() {
                bail!("usage: /delete <id>...");
            }
            Command::Delete(args)
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => bail!("unknown command '/{other}', try /help"),
    };
    Ok(command)
}
