//! Command descriptors, menus and the registry that owns them.
//!
//! A registry is built once with a [`RegistryBuilder`] before the worker
//! starts and is immutable afterwards, so the worker and any number of
//! observers can share it through an `Arc` without locking.

use crate::{ConsoleError, ConsoleResult};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use txcon_comms::{CommsInstance, CommsWriter, Timeout};

static NEXT_BUILDER_ID: AtomicU32 = AtomicU32::new(1);

/// Command handler. Runs on the worker thread and may block.
pub type Callback = fn(&CallbackArgs<'_>);

/// Identifies a menu inside the registry that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MenuId {
    builder: u32,
    index: u32,
}

/// What happens when a command matches.
#[derive(Clone, Copy)]
pub enum CommandAction {
    /// Invoke a handler.
    Callback(Callback),
    /// Make another menu the active one.
    Menu(MenuId),
}

impl fmt::Debug for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandAction::Callback(_) => f.write_str("Callback"),
            CommandAction::Menu(id) => f.debug_tuple("Menu").field(id).finish(),
        }
    }
}

/// One entry of a menu.
#[derive(Clone)]
pub struct CommandDescriptor {
    command: String,
    help: String,
    action: CommandAction,
    context: Option<Arc<dyn Any + Send + Sync>>,
}

impl CommandDescriptor {
    /// Text the operator types, matched case-sensitively as a prefix.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn action(&self) -> CommandAction {
        self.action
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("command", &self.command)
            .field("help", &self.help)
            .field("action", &self.action)
            .field("context", &self.context.is_some())
            .finish()
    }
}

/// A named, ordered list of commands.
#[derive(Debug, Clone)]
pub struct Menu {
    name: String,
    parent: Option<MenuId>,
    commands: Vec<CommandDescriptor>,
}

impl Menu {
    /// Name shown in the prompt.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The menu `^` returns to, `None` for a top-level menu.
    pub fn parent(&self) -> Option<MenuId> {
        self.parent
    }

    /// Commands in registration order.
    pub fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }
}

/// Immutable menu tree.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    builder: u32,
    menus: Vec<Menu>,
    root: MenuId,
}

impl CommandRegistry {
    /// The menu active when the console starts.
    pub fn root(&self) -> MenuId {
        self.root
    }

    pub fn menu(&self, id: MenuId) -> Option<&Menu> {
        if id.builder != self.builder {
            return None;
        }
        self.menus.get(id.index as usize)
    }

    pub fn root_menu(&self) -> &Menu {
        // `build` guarantees the root exists.
        &self.menus[self.root.index as usize]
    }

    pub fn len(&self) -> usize {
        self.menus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.menus.is_empty()
    }
}

/// Builds a [`CommandRegistry`].
///
/// ```
/// use txcon_console::{CallbackArgs, RegistryBuilder};
///
/// fn reboot(args: &CallbackArgs<'_>) {
///     let _ = args.comms().write_str("done\r\n", args.write_timeout());
/// }
///
/// let mut builder = RegistryBuilder::new();
/// let root = builder.menu("#");
/// let system = builder.submenu(root, "system");
/// builder.command(system, "reboot", "Restart the board", reboot);
/// builder.enter(root, "system", "System commands", system);
/// let registry = builder.build().unwrap();
/// assert_eq!(registry.root(), root);
/// ```
#[derive(Debug)]
pub struct RegistryBuilder {
    id: u32,
    menus: Vec<Menu>,
    error: Option<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        RegistryBuilder {
            id: NEXT_BUILDER_ID.fetch_add(1, Ordering::Relaxed),
            menus: Vec::new(),
            error: None,
        }
    }

    /// Add a top-level menu. The first menu added is the registry root.
    pub fn menu(&mut self, name: impl Into<String>) -> MenuId {
        self.push_menu(name.into(), None)
    }

    /// Add a menu whose `^` returns to `parent`.
    pub fn submenu(&mut self, parent: MenuId, name: impl Into<String>) -> MenuId {
        let parent = self.check(parent).then_some(parent);
        self.push_menu(name.into(), parent)
    }

    /// Register a handler in `menu`.
    pub fn command(
        &mut self,
        menu: MenuId,
        command: impl Into<String>,
        help: impl Into<String>,
        callback: Callback,
    ) -> &mut Self {
        self.push_command(menu, command.into(), help.into(), CommandAction::Callback(callback), None)
    }

    /// Register a handler that receives `context` as a borrow on every call.
    pub fn command_with_context<T: Any + Send + Sync>(
        &mut self,
        menu: MenuId,
        command: impl Into<String>,
        help: impl Into<String>,
        callback: Callback,
        context: Arc<T>,
    ) -> &mut Self {
        let context: Arc<dyn Any + Send + Sync> = context;
        self.push_command(
            menu,
            command.into(),
            help.into(),
            CommandAction::Callback(callback),
            Some(context),
        )
    }

    /// Register a command in `menu` that makes `target` the active menu.
    pub fn enter(
        &mut self,
        menu: MenuId,
        command: impl Into<String>,
        help: impl Into<String>,
        target: MenuId,
    ) -> &mut Self {
        if !self.check(target) {
            return self;
        }
        self.push_command(menu, command.into(), help.into(), CommandAction::Menu(target), None)
    }

    /// Finish the registry. Fails if no menu was added or a foreign
    /// [`MenuId`] was passed to any builder method.
    pub fn build(self) -> ConsoleResult<CommandRegistry> {
        if let Some(error) = self.error {
            return Err(ConsoleError::InvalidRegistry(error));
        }
        if self.menus.is_empty() {
            return Err(ConsoleError::InvalidRegistry("no menus".into()));
        }
        Ok(CommandRegistry {
            builder: self.id,
            menus: self.menus,
            root: MenuId {
                builder: self.id,
                index: 0,
            },
        })
    }

    fn push_menu(&mut self, name: String, parent: Option<MenuId>) -> MenuId {
        let id = MenuId {
            builder: self.id,
            index: self.menus.len() as u32,
        };
        self.menus.push(Menu {
            name,
            parent,
            commands: Vec::new(),
        });
        id
    }

    fn push_command(
        &mut self,
        menu: MenuId,
        command: String,
        help: String,
        action: CommandAction,
        context: Option<Arc<dyn Any + Send + Sync>>,
    ) -> &mut Self {
        if self.check(menu) {
            self.menus[menu.index as usize].commands.push(CommandDescriptor {
                command,
                help,
                action,
                context,
            });
        }
        self
    }

    /// Record an error unless `id` names a menu of this builder.
    fn check(&mut self, id: MenuId) -> bool {
        let ok = id.builder == self.id && (id.index as usize) < self.menus.len();
        if !ok && self.error.is_none() {
            self.error = Some(format!("menu {:?} does not belong to this registry", id));
        }
        ok
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// What a handler receives.
pub struct CallbackArgs<'a> {
    command: &'a str,
    remainder: &'a str,
    context: Option<&'a (dyn Any + Send + Sync)>,
    comms: &'a CommsInstance,
    write_timeout: Timeout,
}

impl<'a> CallbackArgs<'a> {
    pub(crate) fn new(
        descriptor: &'a CommandDescriptor,
        remainder: &'a str,
        comms: &'a CommsInstance,
        write_timeout: Timeout,
    ) -> Self {
        CallbackArgs {
            command: &descriptor.command,
            remainder,
            context: descriptor.context.as_deref(),
            comms,
            write_timeout,
        }
    }

    /// The matched command text.
    pub fn command(&self) -> &'a str {
        self.command
    }

    /// Trimmed text after the command.
    pub fn remainder(&self) -> &'a str {
        self.remainder
    }

    pub fn remainder_bytes(&self) -> &'a [u8] {
        self.remainder.as_bytes()
    }

    /// The descriptor's context, if it has one of type `T`.
    pub fn context<T: Any + Send + Sync>(&self) -> Option<&'a T> {
        self.context.and_then(|ctx| ctx.downcast_ref::<T>())
    }

    /// The console's transport.
    pub fn comms(&self) -> &'a CommsInstance {
        self.comms
    }

    /// Bound applied to console writes.
    pub fn write_timeout(&self) -> Timeout {
        self.write_timeout
    }

    /// A line-ending-translating writer over the transport.
    pub fn out(&self) -> CommsWriter<'a> {
        self.comms.writer(self.write_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &CallbackArgs<'_>) {}

    #[test]
    fn test_registration_order() {
        let mut builder = RegistryBuilder::new();
        let root = builder.menu("#");
        builder
            .command(root, "feature start", "Start", noop)
            .command(root, "feature stop", "Stop", noop)
            .command(root, "custom", "Custom", noop);
        let registry = builder.build().unwrap();

        let names: Vec<_> = registry.root_menu().commands().iter().map(|c| c.command()).collect();
        assert_eq!(names, ["feature start", "feature stop", "custom"]);
        assert_eq!(registry.root_menu().name(), "#");
        assert!(registry.root_menu().parent().is_none());
    }

    #[test]
    fn test_submenu_links() {
        let mut builder = RegistryBuilder::new();
        let root = builder.menu("#");
        let diag = builder.submenu(root, "diag");
        builder.enter(root, "diag", "Diagnostics", diag);
        let registry = builder.build().unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.menu(diag).unwrap().parent(), Some(root));
        assert!(matches!(
            registry.root_menu().commands()[0].action(),
            CommandAction::Menu(id) if id == diag
        ));
    }

    #[test]
    fn test_foreign_menu_rejected() {
        let mut other = RegistryBuilder::new();
        let foreign = other.menu("other");

        let mut builder = RegistryBuilder::new();
        let root = builder.menu("#");
        builder.enter(root, "away", "Somewhere else", foreign);
        assert!(matches!(builder.build(), Err(ConsoleError::InvalidRegistry(_))));

        let registry = other.build().unwrap();
        assert!(registry.menu(root).is_none());
    }

    #[test]
    fn test_empty_builder() {
        assert!(matches!(RegistryBuilder::new().build(), Err(ConsoleError::InvalidRegistry(_))));
    }

    #[test]
    fn test_context_attached() {
        let mut builder = RegistryBuilder::new();
        let root = builder.menu("#");
        builder.command_with_context(root, "status", "Status", noop, Arc::new(7u32));
        let registry = builder.build().unwrap();
        assert!(registry.root_menu().commands()[0].has_context());
    }
}
