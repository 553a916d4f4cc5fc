//! Command Builder: renders typed requests into argument vectors.
//!
//! Rendering is deterministic. Map-valued options are emitted in key order,
//! and boolean flags only appear when they differ from the tool's default.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{ExecError, ExecResult};
use crate::options::*;

/// Renders [`OperationRequest`]s against executor defaults.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    defaults: &'a Defaults,
    color: bool,
}

/// Ordered argument accumulator.
#[derive(Debug, Default)]
struct Args(Vec<String>);

impl Args {
    fn new(command: &[&str]) -> Self {
        Self(command.iter().map(|s| s.to_string()).collect())
    }

    fn flag(&mut self, flag: &str) {
        self.0.push(flag.to_string());
    }

    fn flag_if(&mut self, cond: bool, flag: &str) {
        if cond {
            self.flag(flag);
        }
    }

    fn value(&mut self, name: &str, value: impl std::fmt::Display) {
        self.0.push(format!("-{}={}", name, value));
    }

    fn value_opt(&mut self, name: &str, value: Option<&String>) {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.value(name, v);
        }
    }

    fn each(&mut self, name: &str, values: &[String]) {
        for v in values {
            self.value(name, v);
        }
    }

    fn pairs(&mut self, name: &str, pairs: &BTreeMap<String, String>) {
        for (k, v) in pairs {
            self.0.push(format!("-{}={}={}", name, k, v));
        }
    }

    fn lock(&mut self, lock: bool, timeout: Option<Duration>) {
        self.flag_if(!lock, "-lock=false");
        if let Some(t) = timeout.filter(|t| !t.is_zero()) {
            self.value("lock-timeout", format_duration(t));
        }
    }

    fn positional(&mut self, value: impl Into<String>) {
        self.0.push(value.into());
    }
}

/// `30s`, or `1500ms` when not a whole number of seconds.
pub fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

fn pick<T: Clone>(call: &Option<T>, default: &T) -> T {
    call.clone().unwrap_or_else(|| default.clone())
}

fn pick_opt<'a>(call: &'a Option<String>, default: &'a Option<String>) -> Option<&'a String> {
    call.as_ref().or(default.as_ref())
}

fn merge_map(
    call: &Option<BTreeMap<String, String>>,
    default: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = default.clone();
    if let Some(call) = call {
        merged.extend(call.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

fn invalid(message: impl Into<String>) -> ExecError {
    ExecError::InvalidArguments(message.into())
}

impl<'a> CommandBuilder<'a> {
    pub fn new(defaults: &'a Defaults, color: bool) -> Self {
        Self { defaults, color }
    }

    /// Render `request` into the arguments passed after the binary name.
    pub fn build(&self, request: &OperationRequest) -> ExecResult<Vec<String>> {
        let args = match request {
            OperationRequest::Init(opts) => self.init(opts),
            OperationRequest::Plan(opts) => self.plan(opts)?,
            OperationRequest::Apply(opts) => self.apply(opts)?,
            OperationRequest::Destroy(opts) => self.destroy(opts),
            OperationRequest::Refresh(opts) => self.refresh(opts),
            OperationRequest::Validate(opts) => self.validate(opts),
            OperationRequest::Output(opts) => self.output(opts),
            OperationRequest::Show(opts) => self.show(opts),
            OperationRequest::Import(opts) => self.import(opts),
            OperationRequest::StateList(opts) => self.state_list(opts),
            OperationRequest::StateShow(opts) => self.state_show(opts),
            OperationRequest::StateMv(opts) => self.state_mv(opts),
            OperationRequest::StateRm(opts) => self.state_rm(opts),
            OperationRequest::StatePull => Args::new(&["state", "pull"]),
            OperationRequest::Workspace(opts) => self.workspace(opts),
            OperationRequest::Fmt(opts) => self.fmt(opts),
            OperationRequest::Graph(opts) => self.graph(opts),
            OperationRequest::Providers(opts) => self.providers(opts),
            OperationRequest::Test(opts) => self.test(opts),
        };
        Ok(args.0)
    }

    fn no_color(&self, args: &mut Args) {
        args.flag_if(!self.color, "-no-color");
    }

    fn lock_timeout(&self, call: Option<Duration>) -> Option<Duration> {
        call.or(self.defaults.lock_timeout)
    }

    fn parallelism(&self, call: Option<u32>) -> Option<u32> {
        call.or(self.defaults.parallelism).filter(|n| *n > 0)
    }

    fn init(&self, opts: &InitOptions) -> Args {
        let d = self.defaults;
        let mut args = Args::new(&["init"]);

        args.flag_if(!opts.backend, "-backend=false");
        args.pairs("backend-config", &merge_map(&opts.backend_config, &d.backend_config));
        args.value_opt("from-module", opts.from_module.as_ref());
        args.flag_if(!opts.get, "-get=false");
        args.value_opt("lockfile", opts.lockfile.as_ref());
        args.lock(true, self.lock_timeout(opts.lock_timeout));
        args.value_opt("plugin-dir", opts.plugin_dir.as_ref());
        args.flag_if(pick(&opts.reconfigure, &d.reconfigure), "-reconfigure");
        args.flag_if(pick(&opts.migrate_state, &d.migrate_state), "-migrate-state");
        args.flag_if(pick(&opts.upgrade, &d.upgrade), "-upgrade");
        self.no_color(&mut args);
        args.flag("-input=false");
        args
    }

    fn plan(&self, opts: &PlanOptions) -> ExecResult<Args> {
        let d = self.defaults;
        let refresh_only = pick(&opts.refresh_only, &d.refresh_only);
        if refresh_only && !opts.refresh {
            return Err(invalid("plan: refresh disabled together with refresh-only"));
        }
        if refresh_only && opts.destroy {
            return Err(invalid("plan: destroy cannot be combined with refresh-only"));
        }

        let mut args = Args::new(&["plan"]);
        args.flag_if(opts.destroy, "-destroy");
        args.flag_if(opts.detailed_exit_code, "-detailed-exitcode");
        args.lock(opts.lock, self.lock_timeout(opts.lock_timeout));
        args.value_opt("out", pick_opt(&opts.out, &d.plan_file));
        if let Some(n) = self.parallelism(opts.parallelism) {
            args.value("parallelism", n);
        }
        args.flag_if(!opts.refresh, "-refresh=false");
        args.flag_if(refresh_only, "-refresh-only");
        args.each("replace", &pick(&opts.replace, &d.replace));
        args.value_opt("state", pick_opt(&opts.state, &d.state_file));
        args.each("target", &pick(&opts.targets, &d.targets));
        args.each("var-file", &pick(&opts.var_files, &d.var_files));
        args.pairs("var", &merge_map(&opts.vars, &d.vars));
        args.flag_if(pick(&opts.compact_warnings, &d.compact_warnings), "-compact-warnings");
        args.flag_if(pick(&opts.json, &d.json), "-json");
        self.no_color(&mut args);
        args.flag("-input=false");
        Ok(args)
    }

    fn apply(&self, opts: &ApplyOptions) -> ExecResult<Args> {
        let d = self.defaults;
        let call_has_vars = opts.var_files.as_ref().is_some_and(|v| !v.is_empty())
            || opts.vars.as_ref().is_some_and(|v| !v.is_empty());
        if opts.plan_file.is_some() && call_has_vars {
            return Err(invalid(
                "apply: a plan file cannot be combined with var files or vars",
            ));
        }
        let refresh_only = pick(&opts.refresh_only, &d.refresh_only);
        if refresh_only && !opts.refresh {
            return Err(invalid("apply: refresh disabled together with refresh-only"));
        }

        // Per-call vars take precedence over a default plan file.
        let plan_file = match &opts.plan_file {
            Some(file) => Some(file),
            None if call_has_vars => None,
            None => d.plan_file.as_ref(),
        }
        .filter(|f| !f.is_empty());

        let mut args = Args::new(&["apply"]);
        args.flag_if(pick(&opts.auto_approve, &d.auto_approve), "-auto-approve");
        args.value_opt("backup", pick_opt(&opts.backup, &d.backup_file));
        args.flag_if(pick(&opts.compact_warnings, &d.compact_warnings), "-compact-warnings");
        args.lock(opts.lock, self.lock_timeout(opts.lock_timeout));
        if let Some(n) = self.parallelism(opts.parallelism) {
            args.value("parallelism", n);
        }
        args.flag_if(!opts.refresh, "-refresh=false");
        args.flag_if(refresh_only, "-refresh-only");
        args.each("replace", &pick(&opts.replace, &d.replace));
        args.value_opt("state", pick_opt(&opts.state, &d.state_file));
        args.value_opt("state-out", opts.state_out.as_ref());
        args.each("target", &pick(&opts.targets, &d.targets));
        if plan_file.is_none() {
            args.each("var-file", &pick(&opts.var_files, &d.var_files));
            args.pairs("var", &merge_map(&opts.vars, &d.vars));
        }
        args.flag_if(pick(&opts.json, &d.json), "-json");
        self.no_color(&mut args);
        args.flag("-input=false");
        if let Some(file) = plan_file {
            args.positional(file.as_str());
        }
        Ok(args)
    }

    fn destroy(&self, opts: &DestroyOptions) -> Args {
        let d = self.defaults;
        let mut args = Args::new(&["destroy"]);
        args.flag_if(pick(&opts.auto_approve, &d.auto_approve), "-auto-approve");
        args.value_opt("backup", pick_opt(&opts.backup, &d.backup_file));
        args.flag_if(pick(&opts.compact_warnings, &d.compact_warnings), "-compact-warnings");
        args.lock(opts.lock, self.lock_timeout(opts.lock_timeout));
        if let Some(n) = self.parallelism(opts.parallelism) {
            args.value("parallelism", n);
        }
        args.flag_if(!opts.refresh, "-refresh=false");
        args.value_opt("state", pick_opt(&opts.state, &d.state_file));
        args.value_opt("state-out", opts.state_out.as_ref());
        args.each("target", &pick(&opts.targets, &d.targets));
        args.each("var-file", &pick(&opts.var_files, &d.var_files));
        args.pairs("var", &merge_map(&opts.vars, &d.vars));
        args.flag_if(pick(&opts.json, &d.json), "-json");
        self.no_color(&mut args);
        args.flag("-input=false");
        args
    }

    fn refresh(&self, opts: &RefreshOptions) -> Args {
        let d = self.defaults;
        let mut args = Args::new(&["refresh"]);
        args.value_opt("backup", pick_opt(&opts.backup, &d.backup_file));
        args.flag_if(pick(&opts.compact_warnings, &d.compact_warnings), "-compact-warnings");
        args.lock(opts.lock, self.lock_timeout(opts.lock_timeout));
        args.value_opt("state", pick_opt(&opts.state, &d.state_file));
        args.value_opt("state-out", opts.state_out.as_ref());
        args.each("target", &pick(&opts.targets, &d.targets));
        args.each("var-file", &pick(&opts.var_files, &d.var_files));
        args.pairs("var", &merge_map(&opts.vars, &d.vars));
        args.flag_if(pick(&opts.json, &d.json), "-json");
        self.no_color(&mut args);
        args.flag("-input=false");
        args
    }

    fn validate(&self, opts: &ValidateOptions) -> Args {
        let mut args = Args::new(&["validate"]);
        args.flag_if(opts.json, "-json");
        self.no_color(&mut args);
        args.value_opt("test-directory", opts.test_directory.as_ref());
        args
    }

    fn output(&self, opts: &OutputOptions) -> Args {
        let mut args = Args::new(&["output"]);
        args.flag_if(opts.json && !opts.raw, "-json");
        args.flag_if(opts.raw, "-raw");
        self.no_color(&mut args);
        args.value_opt("state", pick_opt(&opts.state, &self.defaults.state_file));
        if let Some(name) = opts.name.as_ref().filter(|n| !n.is_empty()) {
            args.positional(name.as_str());
        }
        args
    }

    fn show(&self, opts: &ShowOptions) -> Args {
        let mut args = Args::new(&["show"]);
        args.flag_if(opts.json, "-json");
        self.no_color(&mut args);
        let target = opts
            .plan_file
            .as_ref()
            .or(opts.state.as_ref())
            .filter(|p| !p.is_empty());
        if let Some(path) = target {
            args.positional(path.as_str());
        }
        args
    }

    fn import(&self, opts: &ImportOptions) -> Args {
        let d = self.defaults;
        let mut args = Args::new(&["import"]);
        args.flag_if(opts.allow_missing_config, "-allow-missing-config");
        args.value_opt("backup", pick_opt(&opts.backup, &d.backup_file));
        args.value_opt("config", opts.config.as_ref());
        args.lock(opts.lock, self.lock_timeout(opts.lock_timeout));
        self.no_color(&mut args);
        if let Some(n) = self.parallelism(opts.parallelism) {
            args.value("parallelism", n);
        }
        args.value_opt("provider", opts.provider.as_ref());
        args.value_opt("state", pick_opt(&opts.state, &d.state_file));
        args.value_opt("state-out", opts.state_out.as_ref());
        args.each("var-file", &pick(&opts.var_files, &d.var_files));
        args.pairs("var", &merge_map(&opts.vars, &d.vars));
        args.flag("-input=false");
        args.positional(opts.address.as_str());
        args.positional(opts.id.as_str());
        args
    }

    fn state_list(&self, opts: &StateListOptions) -> Args {
        let mut args = Args::new(&["state", "list"]);
        args.value_opt("state", pick_opt(&opts.state, &self.defaults.state_file));
        args.value_opt("id", opts.id.as_ref());
        for address in &opts.addresses {
            args.positional(address.as_str());
        }
        args
    }

    fn state_show(&self, opts: &StateShowOptions) -> Args {
        let mut args = Args::new(&["state", "show"]);
        args.value_opt("state", pick_opt(&opts.state, &self.defaults.state_file));
        args.positional(opts.address.as_str());
        args
    }

    fn state_mv(&self, opts: &StateMvOptions) -> Args {
        let d = self.defaults;
        let mut args = Args::new(&["state", "mv"]);
        args.value_opt("backup", pick_opt(&opts.backup, &d.backup_file));
        args.value_opt("backup-out", opts.backup_out.as_ref());
        args.flag_if(opts.dry_run, "-dry-run");
        args.lock(opts.lock, self.lock_timeout(opts.lock_timeout));
        args.value_opt("state", pick_opt(&opts.state, &d.state_file));
        args.value_opt("state-out", opts.state_out.as_ref());
        args.flag_if(opts.ignore_remote_version, "-ignore-remote-version");
        args.positional(opts.source.as_str());
        args.positional(opts.destination.as_str());
        args
    }

    fn state_rm(&self, opts: &StateRmOptions) -> Args {
        let d = self.defaults;
        let mut args = Args::new(&["state", "rm"]);
        args.value_opt("backup", pick_opt(&opts.backup, &d.backup_file));
        args.flag_if(opts.dry_run, "-dry-run");
        args.lock(opts.lock, self.lock_timeout(opts.lock_timeout));
        args.value_opt("state", pick_opt(&opts.state, &d.state_file));
        args.flag_if(opts.ignore_remote_version, "-ignore-remote-version");
        for address in &opts.addresses {
            args.positional(address.as_str());
        }
        args
    }

    fn workspace(&self, opts: &WorkspaceOptions) -> Args {
        let mut args = Args::new(&["workspace", opts.command.as_str()]);
        let Some(name) = opts.command.name() else {
            return args;
        };

        if !matches!(opts.command, WorkspaceCommand::Select(_)) {
            args.lock(opts.lock, self.lock_timeout(opts.lock_timeout));
        }
        if let WorkspaceCommand::New(_) = opts.command {
            args.value_opt("state", opts.state.as_ref());
        }
        if let WorkspaceCommand::Delete(_) = opts.command {
            args.flag_if(opts.force, "-force");
        }
        args.positional(name);
        args
    }

    fn fmt(&self, opts: &FmtOptions) -> Args {
        let mut args = Args::new(&["fmt"]);
        args.flag_if(!opts.list, "-list=false");
        args.flag_if(!opts.write, "-write=false");
        args.flag_if(opts.diff, "-diff");
        args.flag_if(opts.check, "-check");
        self.no_color(&mut args);
        args.flag_if(opts.recursive, "-recursive");
        for path in &opts.paths {
            args.positional(path.as_str());
        }
        args
    }

    fn graph(&self, opts: &GraphOptions) -> Args {
        let mut args = Args::new(&["graph"]);
        args.value_opt("type", opts.graph_type.as_ref());
        args.flag_if(opts.draw_cycles, "-draw-cycles");
        if let Some(depth) = opts.module_depth {
            args.value("module-depth", depth);
        }
        args.value_opt("plan", pick_opt(&opts.plan_file, &self.defaults.plan_file));
        args
    }

    fn providers(&self, opts: &ProvidersOptions) -> Args {
        let mut args = Args::new(&["providers"]);
        if let Some(sub) = opts.subcommand.as_ref().filter(|s| !s.is_empty()) {
            args.positional(sub.as_str());
        }
        for arg in &opts.args {
            args.positional(arg.as_str());
        }
        args
    }

    fn test(&self, opts: &TestOptions) -> Args {
        let mut args = Args::new(&["test"]);
        args.each("filter", &opts.filters);
        args.flag_if(opts.json, "-json");
        args.value_opt("test-directory", opts.test_directory.as_ref());
        args.flag_if(opts.verbose, "-verbose");
        self.no_color(&mut args);
        args
    }
}
