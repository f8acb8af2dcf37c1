//! The command contract shared by every mission-sequence node.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use mcs_config::RunSettings;
use mcs_objects::ObjectStore;

use crate::branch::BranchBehavior;
use crate::publisher::Publisher;
use crate::solver::Solver;
use crate::{CommandError, ElementWrapper};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a command node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u64);

impl CommandId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of one `execute` call, telling the driver where control goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// Finished; advance to the successor.
    Done,
    /// Still running; call `execute` again.
    Continue,
    /// Still running, and the driver should poll for interrupts first.
    Yield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenMode {
    Full,
    NoComments,
}

/// Indentation added per nesting level in generated script.
pub const INDENT: &str = "   ";

/// State every command carries regardless of type.
#[derive(Debug, Clone)]
pub struct CommandBase {
    id: CommandId,
    type_name: &'static str,
    keyword: &'static str,
    label: Option<String>,
    comment: Option<String>,
    initialized: bool,
}

impl CommandBase {
    pub fn new(type_name: &'static str) -> Self {
        Self::with_keyword(type_name, type_name)
    }

    /// `keyword` is what starts the command's script line when it differs from the type.
    pub fn with_keyword(type_name: &'static str, keyword: &'static str) -> Self {
        Self {
            id: CommandId::next(),
            type_name,
            keyword,
            label: None,
            comment: None,
            initialized: false,
        }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn keyword(&self) -> &'static str {
        self.keyword
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    /// Split a script line into its optional `'label'` and the remaining text.
    ///
    /// The keyword must lead the line; a trailing `;` is dropped.
    pub fn split_line<'l>(&mut self, line: &'l str) -> Result<&'l str, CommandError> {
        let text = line.trim().trim_end_matches(';').trim_end();
        let rest = text
            .strip_prefix(self.keyword)
            .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
            .ok_or_else(|| {
                CommandError::parse(self.type_name, format!("expected `{}` in `{text}`", self.keyword))
            })?
            .trim_start();
        if let Some(quoted) = rest.strip_prefix('\'') {
            let end = quoted
                .find('\'')
                .ok_or_else(|| CommandError::parse(self.type_name, "unterminated command label"))?;
            self.label = Some(quoted[..end].to_string());
            Ok(quoted[end + 1..].trim_start())
        } else {
            self.label = None;
            Ok(rest)
        }
    }

    /// Compose one generated script line from the command's action text.
    pub fn compose(&self, mode: GenMode, prefix: &str, use_name: bool, action: &str) -> String {
        let mut out = String::new();
        if mode == GenMode::Full {
            if let Some(comment) = &self.comment {
                for line in comment.lines() {
                    out.push_str(prefix);
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        out.push_str(prefix);
        out.push_str(self.keyword);
        if use_name {
            if let Some(label) = &self.label {
                out.push_str(&format!(" '{label}'"));
            }
        }
        if !action.is_empty() {
            out.push(' ');
            out.push_str(action);
        }
        out.push(';');
        out
    }
}

/// Mutable solver handle lent to commands nested in a solver branch.
pub type SolverRef<'a> = &'a mut (dyn Solver + 'static);

/// Everything a command may touch while initializing.
pub struct InitContext<'a> {
    pub store: &'a mut ObjectStore,
    pub publisher: &'a mut Publisher,
    pub settings: &'a RunSettings,
    pub solver: Option<SolverRef<'a>>,
}

impl<'a> InitContext<'a> {
    pub fn new(store: &'a mut ObjectStore, publisher: &'a mut Publisher, settings: &'a RunSettings) -> Self {
        Self {
            store,
            publisher,
            settings,
            solver: None,
        }
    }

    /// Shorter-lived context lending `solver` to nested commands.
    pub fn with_solver<'b>(&'b mut self, solver: SolverRef<'b>) -> InitContext<'b> {
        InitContext {
            store: &mut *self.store,
            publisher: &mut *self.publisher,
            settings: self.settings,
            solver: Some(solver),
        }
    }
}

/// Everything a command may touch while executing.
pub struct RunContext<'a> {
    pub store: &'a mut ObjectStore,
    pub publisher: &'a mut Publisher,
    pub settings: &'a RunSettings,
    pub solver: Option<SolverRef<'a>>,
    /// Non-fatal diagnostics collected for the run summary.
    pub warnings: &'a mut Vec<String>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        store: &'a mut ObjectStore,
        publisher: &'a mut Publisher,
        settings: &'a RunSettings,
        warnings: &'a mut Vec<String>,
    ) -> Self {
        Self {
            store,
            publisher,
            settings,
            solver: None,
            warnings,
        }
    }

    pub fn with_solver<'b>(&'b mut self, solver: SolverRef<'b>) -> RunContext<'b> {
        RunContext {
            store: &mut *self.store,
            publisher: &mut *self.publisher,
            settings: self.settings,
            solver: Some(solver),
            warnings: &mut *self.warnings,
        }
    }

    pub fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }
}

/// A node of the mission control sequence.
pub trait GmatCommand: fmt::Debug + Send {
    fn base(&self) -> &CommandBase;

    fn base_mut(&mut self) -> &mut CommandBase;

    fn type_name(&self) -> &'static str {
        self.base().type_name()
    }

    fn id(&self) -> CommandId {
        self.base().id()
    }

    /// Parse the command's script line, replacing any earlier configuration.
    fn interpret_action(&mut self, line: &str) -> Result<(), CommandError>;

    /// Script text following the keyword and label.
    fn action_text(&self) -> String;

    /// Names the command needs bound to element wrappers before initializing.
    fn wrapper_object_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Install `wrapper` in every slot described by `name`, returning the replaced one.
    fn set_element_wrapper(
        &mut self,
        _wrapper: ElementWrapper,
        name: &str,
    ) -> Result<Option<ElementWrapper>, CommandError> {
        Err(CommandError::NoSuchSlot {
            command: self.type_name().to_string(),
            name: name.to_string(),
        })
    }

    fn clear_wrappers(&mut self) {}

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), CommandError>;

    fn execute(&mut self, ctx: &mut RunContext<'_>) -> Result<ExecStatus, CommandError>;

    /// Drop transient run state so the command can run again.
    fn run_complete(&mut self) {
        if let Some(branch) = self.branch_mut() {
            branch.run_complete();
        }
    }

    fn generating_string(&self, mode: GenMode, prefix: &str, use_name: bool) -> String {
        let mut out = self
            .base()
            .compose(mode, prefix, use_name, &self.action_text());
        if let Some(branch) = self.branch() {
            branch.append_generating_lines(&mut out, mode, prefix, use_name);
        }
        out
    }

    /// Rewrite references to object `old`; true when anything changed.
    fn rename_ref_object(&mut self, old: &str, new: &str) -> bool {
        self.branch_mut()
            .is_some_and(|branch| branch.rename_ref_object(old, new))
    }

    fn branch(&self) -> Option<&BranchBehavior> {
        None
    }

    fn branch_mut(&mut self) -> Option<&mut BranchBehavior> {
        None
    }

    /// End markers (and `Else`) terminate the branch they sit in.
    fn is_branch_end(&self) -> bool {
        false
    }

    /// Nesting change this node introduces: +1 for branches, -1 for end markers.
    fn depth_change(&self) -> i32 {
        if self.branch().is_some() {
            1
        } else if self.is_branch_end() && self.type_name() != "Else" {
            -1
        } else {
            0
        }
    }

    /// Human-readable state report; failures are reported inline.
    fn build_command_summary(&self, store: &ObjectStore) -> String {
        let mut out = format!(
            "{} command {}\n",
            self.type_name(),
            self.generating_string(GenMode::NoComments, "", true)
        );
        for handle in store.spacecraft_handles() {
            match store.spacecraft(handle) {
                Ok(sc) => out.push_str(&format!(
                    "  {} at {}: [{:.6}, {:.6}, {:.6}] km, [{:.9}, {:.9}, {:.9}] km/s\n",
                    sc.name,
                    sc.epoch,
                    sc.state[0],
                    sc.state[1],
                    sc.state[2],
                    sc.state[3],
                    sc.state[4],
                    sc.state[5]
                )),
                Err(err) => out.push_str(&format!("  <unavailable: {err}>\n")),
            }
        }
        out
    }

    /// Restore per-loop state ahead of another solver pass.
    fn reset_loop_data(&mut self) {
        if let Some(branch) = self.branch_mut() {
            branch.reset_loop_data();
        }
    }
}

/// Bind wrappers for `command` and initialize it, annotating failures with its script line.
pub fn initialize_command(
    command: &mut dyn GmatCommand,
    ctx: &mut InitContext<'_>,
) -> Result<(), CommandError> {
    command.clear_wrappers();
    command.base_mut().set_initialized(false);
    for name in command.wrapper_object_names() {
        let bound = ElementWrapper::create(&name, ctx.store)
            .map_err(CommandError::from)
            .and_then(|wrapper| command.set_element_wrapper(wrapper, &name));
        if let Err(err) = bound {
            return Err(annotate(&*command, err));
        }
    }
    if let Err(err) = command.initialize(ctx) {
        return Err(annotate(&*command, err));
    }
    command.base_mut().set_initialized(true);
    Ok(())
}

fn annotate(command: &dyn GmatCommand, err: CommandError) -> CommandError {
    err.in_command(command.generating_string(GenMode::NoComments, "", false))
}
