//! Typed operation requests.
//!
//! Each operation has an options struct built fluently by the caller. Fields
//! that the executor can default are `Option`s: `None` inherits the executor
//! default, `Some` overrides it.

use std::collections::BTreeMap;
use std::time::Duration;

/// Executor-level defaults merged under every per-call option set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Defaults {
    pub parallelism: Option<u32>,
    pub var_files: Vec<String>,
    pub vars: BTreeMap<String, String>,
    pub targets: Vec<String>,
    pub replace: Vec<String>,
    pub backend_config: BTreeMap<String, String>,
    pub lock_timeout: Option<Duration>,
    pub auto_approve: bool,
    pub backup_file: Option<String>,
    pub state_file: Option<String>,
    pub plan_file: Option<String>,
    pub refresh_only: bool,
    pub reconfigure: bool,
    pub migrate_state: bool,
    pub upgrade: bool,
    pub compact_warnings: bool,
    pub json: bool,
}

macro_rules! option_setters {
    ($($(#[$doc:meta])* $name:ident: $field:ident => $ty:ty;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(mut self, value: impl Into<$ty>) -> Self {
                self.$field = Some(value.into());
                self
            }
        )*
    };
}

macro_rules! list_setters {
    ($($(#[$doc:meta])* $name:ident: $field:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(mut self, value: impl Into<String>) -> Self {
                self.$field.get_or_insert_with(Vec::new).push(value.into());
                self
            }
        )*
    };
}

macro_rules! var_setters {
    () => {
        /// Add a `-var-file`. Replaces the executor's default var files.
        pub fn var_file(mut self, path: impl Into<String>) -> Self {
            self.var_files.get_or_insert_with(Vec::new).push(path.into());
            self
        }

        /// Add a `-var`. Merged over the executor's default vars.
        pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
            self.vars
                .get_or_insert_with(BTreeMap::new)
                .insert(key.into(), value.into());
            self
        }

        pub fn no_lock(mut self) -> Self {
            self.lock = false;
            self
        }

        pub fn lock_timeout(mut self, timeout: Duration) -> Self {
            self.lock_timeout = Some(timeout);
            self
        }
    };
}

/// Options for `init`.
#[derive(Debug, Clone, PartialEq)]
pub struct InitOptions {
    pub backend: bool,
    pub backend_config: Option<BTreeMap<String, String>>,
    pub from_module: Option<String>,
    pub get: bool,
    pub lockfile: Option<String>,
    pub lock_timeout: Option<Duration>,
    pub plugin_dir: Option<String>,
    pub reconfigure: Option<bool>,
    pub migrate_state: Option<bool>,
    pub upgrade: Option<bool>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            backend: true,
            backend_config: None,
            from_module: None,
            get: true,
            lockfile: None,
            lock_timeout: None,
            plugin_dir: None,
            reconfigure: None,
            migrate_state: None,
            upgrade: None,
        }
    }
}

impl InitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_backend(mut self) -> Self {
        self.backend = false;
        self
    }

    pub fn backend_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.backend_config
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn no_get(mut self) -> Self {
        self.get = false;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn reconfigure(mut self, enabled: bool) -> Self {
        self.reconfigure = Some(enabled);
        self
    }

    pub fn migrate_state(mut self, enabled: bool) -> Self {
        self.migrate_state = Some(enabled);
        self
    }

    pub fn upgrade(mut self, enabled: bool) -> Self {
        self.upgrade = Some(enabled);
        self
    }

    option_setters! {
        from_module: from_module => String;
        lockfile: lockfile => String;
        plugin_dir: plugin_dir => String;
    }
}

/// Options for `plan`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOptions {
    pub destroy: bool,
    pub detailed_exit_code: bool,
    pub lock: bool,
    pub lock_timeout: Option<Duration>,
    pub out: Option<String>,
    pub parallelism: Option<u32>,
    pub refresh: bool,
    pub refresh_only: Option<bool>,
    pub replace: Option<Vec<String>>,
    pub state: Option<String>,
    pub targets: Option<Vec<String>>,
    pub var_files: Option<Vec<String>>,
    pub vars: Option<BTreeMap<String, String>>,
    pub compact_warnings: Option<bool>,
    pub json: Option<bool>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            destroy: false,
            detailed_exit_code: true,
            lock: true,
            lock_timeout: None,
            out: None,
            parallelism: None,
            refresh: true,
            refresh_only: None,
            replace: None,
            state: None,
            targets: None,
            var_files: None,
            vars: None,
            compact_warnings: None,
            json: None,
        }
    }
}

impl PlanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn destroy(mut self) -> Self {
        self.destroy = true;
        self
    }

    pub fn without_detailed_exit_code(mut self) -> Self {
        self.detailed_exit_code = false;
        self
    }

    pub fn no_refresh(mut self) -> Self {
        self.refresh = false;
        self
    }

    pub fn refresh_only(mut self, enabled: bool) -> Self {
        self.refresh_only = Some(enabled);
        self
    }

    pub fn parallelism(mut self, n: u32) -> Self {
        self.parallelism = Some(n);
        self
    }

    pub fn compact_warnings(mut self, enabled: bool) -> Self {
        self.compact_warnings = Some(enabled);
        self
    }

    pub fn json(mut self, enabled: bool) -> Self {
        self.json = Some(enabled);
        self
    }

    option_setters! {
        /// Save the plan to a file (`-out`).
        out: out => String;
        state: state => String;
    }

    list_setters! {
        /// Add a `-target`. Replaces the executor's default targets.
        target: targets;
        replace: replace;
    }

    var_setters!();
}

/// Options for `apply`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOptions {
    pub auto_approve: Option<bool>,
    pub backup: Option<String>,
    pub compact_warnings: Option<bool>,
    pub lock: bool,
    pub lock_timeout: Option<Duration>,
    pub parallelism: Option<u32>,
    pub plan_file: Option<String>,
    pub refresh: bool,
    pub refresh_only: Option<bool>,
    pub replace: Option<Vec<String>>,
    pub state: Option<String>,
    pub state_out: Option<String>,
    pub targets: Option<Vec<String>>,
    pub var_files: Option<Vec<String>>,
    pub vars: Option<BTreeMap<String, String>>,
    pub json: Option<bool>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            auto_approve: None,
            backup: None,
            compact_warnings: None,
            lock: true,
            lock_timeout: None,
            parallelism: None,
            plan_file: None,
            refresh: true,
            refresh_only: None,
            replace: None,
            state: None,
            state_out: None,
            targets: None,
            var_files: None,
            vars: None,
            json: None,
        }
    }
}

impl ApplyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_approve(mut self, enabled: bool) -> Self {
        self.auto_approve = Some(enabled);
        self
    }

    pub fn no_refresh(mut self) -> Self {
        self.refresh = false;
        self
    }

    pub fn refresh_only(mut self, enabled: bool) -> Self {
        self.refresh_only = Some(enabled);
        self
    }

    pub fn parallelism(mut self, n: u32) -> Self {
        self.parallelism = Some(n);
        self
    }

    pub fn compact_warnings(mut self, enabled: bool) -> Self {
        self.compact_warnings = Some(enabled);
        self
    }

    pub fn json(mut self, enabled: bool) -> Self {
        self.json = Some(enabled);
        self
    }

    option_setters! {
        /// Apply a saved plan. Cannot be combined with per-call vars or var files.
        plan_file: plan_file => String;
        backup: backup => String;
        state: state => String;
        state_out: state_out => String;
    }

    list_setters! {
        target: targets;
        replace: replace;
    }

    var_setters!();
}

/// Options for `destroy`.
#[derive(Debug, Clone, PartialEq)]
pub struct DestroyOptions {
    pub auto_approve: Option<bool>,
    pub backup: Option<String>,
    pub compact_warnings: Option<bool>,
    pub lock: bool,
    pub lock_timeout: Option<Duration>,
    pub parallelism: Option<u32>,
    pub refresh: bool,
    pub state: Option<String>,
    pub state_out: Option<String>,
    pub targets: Option<Vec<String>>,
    pub var_files: Option<Vec<String>>,
    pub vars: Option<BTreeMap<String, String>>,
    pub json: Option<bool>,
}

impl Default for DestroyOptions {
    fn default() -> Self {
        Self {
            auto_approve: None,
            backup: None,
            compact_warnings: None,
            lock: true,
            lock_timeout: None,
            parallelism: None,
            refresh: true,
            state: None,
            state_out: None,
            targets: None,
            var_files: None,
            vars: None,
            json: None,
        }
    }
}

impl DestroyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_approve(mut self, enabled: bool) -> Self {
        self.auto_approve = Some(enabled);
        self
    }

    pub fn no_refresh(mut self) -> Self {
        self.refresh = false;
        self
    }

    pub fn parallelism(mut self, n: u32) -> Self {
        self.parallelism = Some(n);
        self
    }

    option_setters! {
        backup: backup => String;
        state: state => String;
        state_out: state_out => String;
    }

    list_setters! {
        target: targets;
    }

    var_setters!();
}

/// Options for `refresh`.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOptions {
    pub backup: Option<String>,
    pub compact_warnings: Option<bool>,
    pub lock: bool,
    pub lock_timeout: Option<Duration>,
    pub state: Option<String>,
    pub state_out: Option<String>,
    pub targets: Option<Vec<String>>,
    pub var_files: Option<Vec<String>>,
    pub vars: Option<BTreeMap<String, String>>,
    pub json: Option<bool>,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            backup: None,
            compact_warnings: None,
            lock: true,
            lock_timeout: None,
            state: None,
            state_out: None,
            targets: None,
            var_files: None,
            vars: None,
            json: None,
        }
    }
}

impl RefreshOptions {
    pub fn new() -> Self {
        Self::default()
    }

    option_setters! {
        backup: backup => String;
        state: state => String;
        state_out: state_out => String;
    }

    list_setters! {
        target: targets;
    }

    var_setters!();
}

/// Options for `validate`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidateOptions {
    /// Request machine-readable diagnostics. Without it only the exit code
    /// determines validity.
    pub json: bool,
    pub test_directory: Option<String>,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            json: true,
            test_directory: None,
        }
    }
}

impl ValidateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(mut self, enabled: bool) -> Self {
        self.json = enabled;
        self
    }

    option_setters! {
        test_directory: test_directory => String;
    }
}

/// Options for `output`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputOptions {
    /// A single output to read. `None` reads all outputs.
    pub name: Option<String>,
    pub json: bool,
    pub raw: bool,
    pub state: Option<String>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            name: None,
            json: true,
            raw: false,
            state: None,
        }
    }
}

impl OutputOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print the bare value of a single string output (`-raw`).
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self.json = false;
        self
    }

    option_setters! {
        name: name => String;
        state: state => String;
    }
}

/// Options for `show`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowOptions {
    pub json: bool,
    pub plan_file: Option<String>,
    pub state: Option<String>,
}

impl Default for ShowOptions {
    fn default() -> Self {
        Self {
            json: true,
            plan_file: None,
            state: None,
        }
    }
}

impl ShowOptions {
    pub fn new() -> Self {
        Self::default()
    }

    option_setters! {
        plan_file: plan_file => String;
        state: state => String;
    }
}

/// Options for `import`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    pub address: String,
    pub id: String,
    pub allow_missing_config: bool,
    pub backup: Option<String>,
    pub config: Option<String>,
    pub lock: bool,
    pub lock_timeout: Option<Duration>,
    pub parallelism: Option<u32>,
    pub provider: Option<String>,
    pub state: Option<String>,
    pub state_out: Option<String>,
    pub var_files: Option<Vec<String>>,
    pub vars: Option<BTreeMap<String, String>>,
}

impl ImportOptions {
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: id.into(),
            allow_missing_config: false,
            backup: None,
            config: None,
            lock: true,
            lock_timeout: None,
            parallelism: None,
            provider: None,
            state: None,
            state_out: None,
            var_files: None,
            vars: None,
        }
    }

    pub fn allow_missing_config(mut self) -> Self {
        self.allow_missing_config = true;
        self
    }

    option_setters! {
        backup: backup => String;
        /// Directory holding the configuration (`-config`).
        config: config => String;
        provider: provider => String;
        state: state => String;
        state_out: state_out => String;
    }

    var_setters!();
}

/// Options for `state list`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateListOptions {
    pub addresses: Vec<String>,
    pub state: Option<String>,
    pub id: Option<String>,
}

impl StateListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.addresses.push(address.into());
        self
    }

    option_setters! {
        state: state => String;
        id: id => String;
    }
}

/// Options for `state show`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateShowOptions {
    pub address: String,
    pub state: Option<String>,
}

impl StateShowOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: None,
        }
    }

    option_setters! {
        state: state => String;
    }
}

/// Options for `state mv`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMvOptions {
    pub source: String,
    pub destination: String,
    pub backup: Option<String>,
    pub backup_out: Option<String>,
    /// The tool's own `-dry-run`, distinct from executor dry-run.
    pub dry_run: bool,
    pub lock: bool,
    pub lock_timeout: Option<Duration>,
    pub state: Option<String>,
    pub state_out: Option<String>,
    pub ignore_remote_version: bool,
}

impl StateMvOptions {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            backup: None,
            backup_out: None,
            dry_run: false,
            lock: true,
            lock_timeout: None,
            state: None,
            state_out: None,
            ignore_remote_version: false,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn ignore_remote_version(mut self) -> Self {
        self.ignore_remote_version = true;
        self
    }

    pub fn no_lock(mut self) -> Self {
        self.lock = false;
        self
    }

    option_setters! {
        backup: backup => String;
        backup_out: backup_out => String;
        state: state => String;
        state_out: state_out => String;
    }
}

/// Options for `state rm`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateRmOptions {
    pub addresses: Vec<String>,
    pub backup: Option<String>,
    pub dry_run: bool,
    pub lock: bool,
    pub lock_timeout: Option<Duration>,
    pub state: Option<String>,
    pub ignore_remote_version: bool,
}

impl StateRmOptions {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
            lock: true,
            ..Default::default()
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn ignore_remote_version(mut self) -> Self {
        self.ignore_remote_version = true;
        self
    }

    option_setters! {
        backup: backup => String;
        state: state => String;
    }
}

/// A `workspace` subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceCommand {
    List,
    Show,
    New(String),
    Select(String),
    Delete(String),
}

impl WorkspaceCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceCommand::List => "list",
            WorkspaceCommand::Show => "show",
            WorkspaceCommand::New(_) => "new",
            WorkspaceCommand::Select(_) => "select",
            WorkspaceCommand::Delete(_) => "delete",
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            WorkspaceCommand::New(name)
            | WorkspaceCommand::Select(name)
            | WorkspaceCommand::Delete(name) => Some(name),
            WorkspaceCommand::List | WorkspaceCommand::Show => None,
        }
    }
}

/// Options for `workspace`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceOptions {
    pub command: WorkspaceCommand,
    pub lock: bool,
    pub lock_timeout: Option<Duration>,
    /// Seed state for `workspace new` (`-state`).
    pub state: Option<String>,
    /// Delete even when the workspace still tracks resources (`-force`).
    pub force: bool,
}

impl WorkspaceOptions {
    pub fn new(command: WorkspaceCommand) -> Self {
        Self {
            command,
            lock: true,
            lock_timeout: None,
            state: None,
            force: false,
        }
    }

    pub fn list() -> Self {
        Self::new(WorkspaceCommand::List)
    }

    pub fn show() -> Self {
        Self::new(WorkspaceCommand::Show)
    }

    pub fn create(name: impl Into<String>) -> Self {
        Self::new(WorkspaceCommand::New(name.into()))
    }

    pub fn select(name: impl Into<String>) -> Self {
        Self::new(WorkspaceCommand::Select(name.into()))
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Self::new(WorkspaceCommand::Delete(name.into()))
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn no_lock(mut self) -> Self {
        self.lock = false;
        self
    }

    option_setters! {
        state: state => String;
    }
}

/// Options for `fmt`.
#[derive(Debug, Clone, PartialEq)]
pub struct FmtOptions {
    pub paths: Vec<String>,
    pub list: bool,
    pub write: bool,
    pub diff: bool,
    pub check: bool,
    pub recursive: bool,
}

impl Default for FmtOptions {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            list: true,
            write: false,
            diff: false,
            check: false,
            recursive: true,
        }
    }
}

impl FmtOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report unformatted files without touching them.
    pub fn check() -> Self {
        Self {
            check: true,
            ..Self::default()
        }
    }

    /// Rewrite files in place.
    pub fn write() -> Self {
        Self {
            write: true,
            ..Self::default()
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn diff(mut self) -> Self {
        self.diff = true;
        self
    }

    pub fn non_recursive(mut self) -> Self {
        self.recursive = false;
        self
    }
}

/// Options for `graph`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphOptions {
    pub graph_type: Option<String>,
    pub draw_cycles: bool,
    pub module_depth: Option<u32>,
    pub plan_file: Option<String>,
}

impl GraphOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw_cycles(mut self) -> Self {
        self.draw_cycles = true;
        self
    }

    pub fn module_depth(mut self, depth: u32) -> Self {
        self.module_depth = Some(depth);
        self
    }

    option_setters! {
        graph_type: graph_type => String;
        plan_file: plan_file => String;
    }
}

/// Options for `providers`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvidersOptions {
    /// e.g. `schema`, `lock`, `mirror`. `None` lists provider requirements.
    pub subcommand: Option<String>,
    pub args: Vec<String>,
}

impl ProvidersOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    option_setters! {
        subcommand: subcommand => String;
    }
}

/// Options for `test`.
#[derive(Debug, Clone, PartialEq)]
pub struct TestOptions {
    pub filters: Vec<String>,
    pub json: bool,
    pub test_directory: Option<String>,
    pub verbose: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            json: true,
            test_directory: None,
            verbose: false,
        }
    }
}

impl TestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, file: impl Into<String>) -> Self {
        self.filters.push(file.into());
        self
    }

    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub fn json(mut self, enabled: bool) -> Self {
        self.json = enabled;
        self
    }

    option_setters! {
        test_directory: test_directory => String;
    }
}

/// A typed request for one invocation of the provisioning tool.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRequest {
    Init(InitOptions),
    Plan(PlanOptions),
    Apply(ApplyOptions),
    Destroy(DestroyOptions),
    Refresh(RefreshOptions),
    Validate(ValidateOptions),
    Output(OutputOptions),
    Show(ShowOptions),
    Import(ImportOptions),
    StateList(StateListOptions),
    StateShow(StateShowOptions),
    StateMv(StateMvOptions),
    StateRm(StateRmOptions),
    StatePull,
    Workspace(WorkspaceOptions),
    Fmt(FmtOptions),
    Graph(GraphOptions),
    Providers(ProvidersOptions),
    Test(TestOptions),
}

/// How an operation's output is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Forwarded to the sink only; the caller gets success or failure.
    Streamed,
    /// Captured for parsing and also forwarded to the sink.
    Mirrored,
    /// Captured for parsing.
    Captured,
}

impl OperationRequest {
    /// Subcommand as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            OperationRequest::Init(_) => "init",
            OperationRequest::Plan(_) => "plan",
            OperationRequest::Apply(_) => "apply",
            OperationRequest::Destroy(_) => "destroy",
            OperationRequest::Refresh(_) => "refresh",
            OperationRequest::Validate(_) => "validate",
            OperationRequest::Output(_) => "output",
            OperationRequest::Show(_) => "show",
            OperationRequest::Import(_) => "import",
            OperationRequest::StateList(_) => "state list",
            OperationRequest::StateShow(_) => "state show",
            OperationRequest::StateMv(_) => "state mv",
            OperationRequest::StateRm(_) => "state rm",
            OperationRequest::StatePull => "state pull",
            OperationRequest::Workspace(_) => "workspace",
            OperationRequest::Fmt(_) => "fmt",
            OperationRequest::Graph(_) => "graph",
            OperationRequest::Providers(_) => "providers",
            OperationRequest::Test(_) => "test",
        }
    }

    /// Whether the operation can change infrastructure, state or files.
    /// Mutating operations are skipped entirely in dry-run mode.
    pub fn is_mutating(&self) -> bool {
        match self {
            OperationRequest::Init(_)
            | OperationRequest::Apply(_)
            | OperationRequest::Destroy(_)
            | OperationRequest::Refresh(_)
            | OperationRequest::Import(_)
            | OperationRequest::StateMv(_)
            | OperationRequest::StateRm(_) => true,
            OperationRequest::Workspace(opts) => !matches!(
                opts.command,
                WorkspaceCommand::List | WorkspaceCommand::Show
            ),
            OperationRequest::Fmt(opts) => opts.write,
            _ => false,
        }
    }

    pub fn output_mode(&self) -> OutputMode {
        match self {
            OperationRequest::Init(_)
            | OperationRequest::Apply(_)
            | OperationRequest::Destroy(_)
            | OperationRequest::Refresh(_)
            | OperationRequest::Import(_)
            | OperationRequest::StateMv(_)
            | OperationRequest::StateRm(_) => OutputMode::Streamed,
            OperationRequest::Plan(_) => OutputMode::Mirrored,
            _ => OutputMode::Captured,
        }
    }

    /// Exit codes other than 0 that mean success for this request.
    pub fn accepted_exit_codes(&self) -> &'static [i32] {
        match self {
            OperationRequest::Plan(opts) if opts.detailed_exit_code => &[2],
            OperationRequest::Fmt(opts) if opts.check => &[3],
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutating_classification() {
        assert!(OperationRequest::Apply(ApplyOptions::new()).is_mutating());
        assert!(OperationRequest::StateRm(StateRmOptions::new(["a.b"])).is_mutating());
        assert!(OperationRequest::Workspace(WorkspaceOptions::select("dev")).is_mutating());
        assert!(OperationRequest::Fmt(FmtOptions::write()).is_mutating());

        assert!(!OperationRequest::Plan(PlanOptions::new()).is_mutating());
        assert!(!OperationRequest::Workspace(WorkspaceOptions::list()).is_mutating());
        assert!(!OperationRequest::Fmt(FmtOptions::check()).is_mutating());
        assert!(!OperationRequest::StatePull.is_mutating());
    }

    #[test]
    fn test_accepted_exit_codes() {
        assert_eq!(OperationRequest::Plan(PlanOptions::new()).accepted_exit_codes(), &[2]);
        assert!(OperationRequest::Plan(PlanOptions::new().without_detailed_exit_code())
            .accepted_exit_codes()
            .is_empty());
        assert_eq!(OperationRequest::Fmt(FmtOptions::check()).accepted_exit_codes(), &[3]);
        assert!(OperationRequest::Fmt(FmtOptions::new()).accepted_exit_codes().is_empty());
    }

    #[test]
    fn test_per_call_lists_start_empty_and_accumulate() {
        let opts = PlanOptions::new()
            .target("module.a")
            .target("module.b")
            .var("region", "eu")
            .var("env", "dev");

        assert_eq!(
            opts.targets,
            Some(vec!["module.a".to_string(), "module.b".to_string()])
        );
        assert_eq!(opts.vars.as_ref().map(|v| v.len()), Some(2));
        assert!(opts.var_files.is_none());
    }
}
