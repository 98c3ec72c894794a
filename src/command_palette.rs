// Command Palette Module for sqldash
//
// Holds every REPL command with its usage line and description. The REPL uses
// it for `:help`, for usage hints when arguments are missing and for
// suggestions when a command name is mistyped.

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
}

const fn command(name: &'static str, usage: &'static str, description: &'static str) -> Command {
    Command {
        name,
        usage,
        description,
    }
}

static COMMANDS: &[Command] = &[
    command("connect", ":connect <path>", "Open (or create) another database"),
    command("tables", ":tables", "List tables with row counts and primary keys"),
    command("describe", ":describe <table>", "Show the columns of a table"),
    command("init", ":init", "Create the sample food-delivery tables"),
    command("generate", ":generate [count]", "Insert synthetic rows into the sample tables"),
    command("read", ":read <table> [page]", "Show one page of rows"),
    command("get", ":get <table> <id>", "Show the row with the given primary key"),
    command("insert", ":insert <table> <json object>", "Insert a row"),
    command("update", ":update <table> <id> <json object>", "Update the row with the given primary key"),
    command("delete", ":delete <table> <id>", "Delete the row with the given primary key"),
    command(
        "create-table",
        ":create-table <table> <json columns | sql columns>",
        "Create a table",
    ),
    command(
        "add-column",
        ":add-column <table> <json columns | sql columns>",
        "Add columns to a table",
    ),
    command(
        "modify-column",
        ":modify-column <table> <json changes>",
        "Rename, retype or change nullability of columns",
    ),
    command("drop-column", ":drop-column <table> <column>", "Remove a column"),
    command("rename-table", ":rename-table <old> <new>", "Rename a table"),
    command("truncate", ":truncate <table>", "Delete every row of a table"),
    command("drop-table", ":drop-table <table>", "Drop a table"),
    command("form", ":form <table>", "Insert a row field by field"),
    command("insights", ":insights", "List the analytics catalog"),
    command(
        "insight",
        ":insight <number | name> [line|area|bar|histogram|scatter]",
        "Run an insight and chart its answer",
    ),
    command("next", ":next", "Run the next insight"),
    command("prev", ":prev", "Run the previous insight"),
    command("help", ":help", "List all available commands"),
    command("quit", ":quit", "Leave sqldash"),
];

#[derive(Debug, Clone)]
pub struct CommandPalette {
    commands: &'static [Command],
}

impl Default for CommandPalette {
    fn default() -> Self {
        CommandPalette::new()
    }
}

impl CommandPalette {
    pub fn new() -> Self {
        CommandPalette { commands: COMMANDS }
    }

    pub fn commands(&self) -> &[Command] {
        self.commands
    }

    /// Commands whose name or description contains `query` (case-insensitive).
    /// Names starting with the query come first.
    pub fn filter_commands(&self, query: &str) -> Vec<&Command> {
        let q = query.trim().trim_start_matches(':').to_lowercase();
        let mut matches: Vec<&Command> = self
            .commands
            .iter()
            .filter(|cmd| cmd.name.contains(&q) || cmd.description.to_lowercase().contains(&q))
            .collect();
        matches.sort_by_key(|cmd| !cmd.name.starts_with(&q));
        matches
    }

    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|cmd| cmd.name == name)
    }

    /// The `:help` listing.
    pub fn help_text(&self) -> String {
        let width = self.commands.iter().map(|c| c.usage.len()).max().unwrap_or(0);
        let mut output = String::from("Available commands:\n");
        for cmd in self.commands {
            output.push_str(&format!("  {:<w$}  {}\n", cmd.usage, cmd.description, w = width));
        }
        output.push_str("\nAnything not starting with ':' runs as a read-only SQL query.");
        output
    }
}
