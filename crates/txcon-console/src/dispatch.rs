//! Matching a line against the active menu.

use crate::registry::{CommandAction, CommandDescriptor, CommandRegistry, Menu, MenuId};
use std::fmt::Write as _;

/// Response to a line that matched nothing.
pub const NOT_FOUND: &str = "Command not found. Enter '?' for a list of commands.";

/// Lists the active menu.
pub const HELP_COMMAND: &str = "?";

/// Returns to the parent menu.
pub const PARENT_COMMAND: &str = "^";

/// A matched command and the text that followed it.
#[derive(Debug, Clone, Copy)]
pub struct CommandMatch<'a> {
    pub descriptor: &'a CommandDescriptor,
    /// Trimmed text after the command.
    pub remainder: &'a str,
}

/// The worker's decision for one line.
#[derive(Debug)]
pub enum Dispatch<'a> {
    /// Print the help listing of the active menu.
    Help,
    /// Run a handler.
    Invoke(CommandMatch<'a>),
    /// Switch to a sub-menu.
    Enter(MenuId),
    /// Switch back to the parent menu.
    Parent(MenuId),
    /// Print [`NOT_FOUND`].
    NotFound,
}

/// Find the command of `menu` that `line` starts with.
///
/// The longest matching command text wins; between identical texts the one
/// registered first wins. Matching is case-sensitive and does not require a
/// space after the command text.
pub fn match_command<'a>(menu: &'a Menu, line: &'a str) -> Option<CommandMatch<'a>> {
    let line = line.trim();
    let mut best: Option<&CommandDescriptor> = None;

    for descriptor in menu.commands() {
        let text = descriptor.command();
        if text.is_empty() || !line.starts_with(text) {
            continue;
        }
        if best.map_or(true, |b| text.len() > b.command().len()) {
            best = Some(descriptor);
        }
    }

    best.map(|descriptor| CommandMatch {
        descriptor,
        remainder: line[descriptor.command().len()..].trim(),
    })
}

/// Decide what to do with `line` while `menu` is active.
pub fn resolve<'a>(registry: &'a CommandRegistry, menu: MenuId, line: &'a str) -> Dispatch<'a> {
    let Some(active) = registry.menu(menu) else {
        return Dispatch::NotFound;
    };

    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed == HELP_COMMAND {
        return Dispatch::Help;
    }

    if let Some(found) = match_command(active, trimmed) {
        return match found.descriptor.action() {
            CommandAction::Callback(_) => Dispatch::Invoke(found),
            CommandAction::Menu(target) => Dispatch::Enter(target),
        };
    }

    match active.parent() {
        Some(parent) if trimmed == PARENT_COMMAND => Dispatch::Parent(parent),
        _ => Dispatch::NotFound,
    }
}

/// Help listing for `menu`: one line per command in registration order.
pub fn help_text(registry: &CommandRegistry, menu: MenuId) -> String {
    let Some(active) = registry.menu(menu) else {
        return String::new();
    };
    let parent = active.parent().and_then(|id| registry.menu(id));

    let width = active
        .commands()
        .iter()
        .map(|c| c.command().len())
        .chain(parent.map(|_| PARENT_COMMAND.len()))
        .max()
        .unwrap_or(0);

    let mut text = String::new();
    for command in active.commands() {
        let _ = writeln!(text, "  {:<width$}  {}", command.command(), command.help());
    }
    if let Some(parent) = parent {
        let _ = writeln!(text, "  {:<width$}  Return to {}", PARENT_COMMAND, parent.name());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CallbackArgs, RegistryBuilder};

    fn h1(_: &CallbackArgs<'_>) {}
    fn h2(_: &CallbackArgs<'_>) {}

    fn registry() -> (CommandRegistry, MenuId, MenuId) {
        let mut builder = RegistryBuilder::new();
        let root = builder.menu("#");
        let diag = builder.submenu(root, "diag");
        builder
            .command(root, "feature", "Feature summary", h2)
            .command(root, "feature status", "Feature status", h1)
            .command(root, "feature start", "Start the feature", h2)
            .enter(root, "diag", "Diagnostics", diag)
            .command(diag, "ping", "Ping", h1);
        (builder.build().unwrap(), root, diag)
    }

    fn invoked<'a>(dispatch: Dispatch<'a>) -> CommandMatch<'a> {
        match dispatch {
            Dispatch::Invoke(found) => found,
            other => panic!("expected invoke, got {:?}", other),
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        let (registry, root, _) = registry();

        let found = invoked(resolve(&registry, root, "feature status"));
        assert_eq!(found.descriptor.command(), "feature status");
        assert_eq!(found.remainder, "");

        let found = invoked(resolve(&registry, root, "feature start extra "));
        assert_eq!(found.descriptor.command(), "feature start");
        assert_eq!(found.remainder, "extra");

        let found = invoked(resolve(&registry, root, "feature stop"));
        assert_eq!(found.descriptor.command(), "feature");
        assert_eq!(found.remainder, "stop");
    }

    #[test]
    fn test_leading_whitespace_and_case() {
        let (registry, root, _) = registry();
        let found = invoked(resolve(&registry, root, "   feature status\t"));
        assert_eq!(found.descriptor.command(), "feature status");
        assert!(matches!(resolve(&registry, root, "Feature status"), Dispatch::NotFound));
    }

    #[test]
    fn test_first_registered_wins_on_tie() {
        let mut builder = RegistryBuilder::new();
        let root = builder.menu("#");
        builder.command(root, "go", "first", h1).command(root, "go", "second", h2);
        let registry = builder.build().unwrap();

        let found = invoked(resolve(&registry, root, "go"));
        assert_eq!(found.descriptor.help(), "first");
    }

    #[test]
    fn test_help_and_navigation() {
        let (registry, root, diag) = registry();
        assert!(matches!(resolve(&registry, root, ""), Dispatch::Help));
        assert!(matches!(resolve(&registry, root, " ? "), Dispatch::Help));
        assert!(matches!(resolve(&registry, root, "diag"), Dispatch::Enter(id) if id == diag));
        assert!(matches!(resolve(&registry, diag, "^"), Dispatch::Parent(id) if id == root));
        // No parent at the root, and no fallthrough from a sub-menu.
        assert!(matches!(resolve(&registry, root, "^"), Dispatch::NotFound));
        assert!(matches!(resolve(&registry, diag, "feature status"), Dispatch::NotFound));
    }

    #[test]
    fn test_help_listing() {
        let (registry, root, diag) = registry();
        let text = help_text(&registry, root);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "  feature         Feature summary",
                "  feature status  Feature status",
                "  feature start   Start the feature",
                "  diag            Diagnostics",
            ]
        );

        assert_eq!(help_text(&registry, diag), "  ping  Ping\n  ^     Return to #\n");
    }
}
