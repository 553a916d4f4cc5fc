//! Typed results parsed from tool output.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use terrakit_state::StateResource;

use crate::error::{ExecError, ExecResult};

static PLAN_COUNTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Plan: (\d+) to add, (\d+) to change, (\d+) to destroy").expect("valid regex")
});

static RESOURCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(-/\+|\+/-|\+-|[#~+-])\s+(\S+)\s+(?:will|must) be\s+(.+?)\s*$")
        .expect("valid regex")
});

static OUTPUT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*([~+-])\s+output\s+"([^"]+)""#).expect("valid regex")
});

static SUMMARY_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) to (add|change|destroy|replace)").expect("valid regex")
});

static STATE_SHOW_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(resource|data) "([^"]+)" "([^"]+)"\s*\{$"#).expect("valid regex")
});

static PROVIDER_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"provider\[([^\]]+)\]").expect("valid regex"));

static SEMVER_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+\.\d+)").expect("valid regex"));

static TEST_TEXT_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) passed, (\d+) failed(?:, (\d+) skipped)?").expect("valid regex")
});

// =============================================================================
// Plan
// =============================================================================

/// Kind of change planned for a resource or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    Replace,
    Read,
    NoOp,
}

impl ChangeAction {
    fn from_symbol(symbol: &str) -> Self {
        match symbol {
            "+" => ChangeAction::Create,
            "-" => ChangeAction::Delete,
            "~" => ChangeAction::Update,
            "-/+" | "+/-" | "+-" => ChangeAction::Replace,
            "#" => ChangeAction::Read,
            _ => ChangeAction::NoOp,
        }
    }

    fn from_verb(verb: &str) -> Option<Self> {
        let verb = verb.to_ascii_lowercase();
        if verb.starts_with("created") {
            Some(ChangeAction::Create)
        } else if verb.starts_with("destroyed") {
            Some(ChangeAction::Delete)
        } else if verb.starts_with("updated") {
            Some(ChangeAction::Update)
        } else if verb.starts_with("replaced") {
            Some(ChangeAction::Replace)
        } else if verb.starts_with("read") {
            Some(ChangeAction::Read)
        } else {
            None
        }
    }
}

/// A planned change to one resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceChange {
    pub address: String,
    pub action: ChangeAction,
    /// Module path, empty for the root module.
    pub module: String,
    pub resource_type: String,
    pub name: String,
    /// `managed` or `data`.
    pub mode: String,
}

impl ResourceChange {
    pub fn new(address: impl Into<String>, action: ChangeAction) -> Self {
        let address = address.into();
        let parts = AddressParts::parse(&address);
        Self {
            module: parts.module,
            resource_type: parts.resource_type,
            name: parts.name,
            mode: parts.mode,
            address,
            action,
        }
    }

    pub fn is_create(&self) -> bool {
        self.action == ChangeAction::Create
    }

    pub fn is_update(&self) -> bool {
        self.action == ChangeAction::Update
    }

    pub fn is_delete(&self) -> bool {
        self.action == ChangeAction::Delete
    }

    pub fn is_replace(&self) -> bool {
        self.action == ChangeAction::Replace
    }

    pub fn is_noop(&self) -> bool {
        self.action == ChangeAction::NoOp
    }
}

/// A planned change to a root module output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputChange {
    pub name: String,
    pub action: ChangeAction,
}

/// Counts of planned changes by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub create: u32,
    pub update: u32,
    pub delete: u32,
    pub replace: u32,
    pub no_op: u32,
}

impl ChangeSummary {
    /// Parse a summary line such as `Plan: 1 to add, 0 to change, 2 to destroy.`
    ///
    /// Any of the counts may be missing. `No changes` and
    /// `Infrastructure is up-to-date` yield `no_op = 1`.
    pub fn parse(text: &str) -> Self {
        let mut summary = Self::default();
        for caps in SUMMARY_COUNT.captures_iter(text) {
            let count = caps[1].parse().unwrap_or(0);
            match &caps[2] {
                "add" => summary.create = count,
                "change" => summary.update = count,
                "destroy" => summary.delete = count,
                "replace" => summary.replace = count,
                _ => {}
            }
        }
        if text.contains("No changes") || text.contains("Infrastructure is up-to-date") {
            summary.no_op = 1;
        }
        summary
    }

    pub fn total(&self) -> u32 {
        self.create + self.update + self.delete + self.replace
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Parsed result of `plan`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanResult {
    pub has_changes: bool,
    pub add_count: u32,
    pub change_count: u32,
    pub destroy_count: u32,
    pub resource_changes: Vec<ResourceChange>,
    pub output_changes: BTreeMap<String, OutputChange>,
    pub stdout: String,
    pub stderr: String,
}

impl PlanResult {
    /// Parse human-readable plan output.
    pub fn parse(stdout: &str, stderr: &str) -> Self {
        let mut result = Self {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            ..Self::default()
        };

        if let Some(caps) = PLAN_COUNTS.captures(stdout) {
            result.add_count = caps[1].parse().unwrap_or(0);
            result.change_count = caps[2].parse().unwrap_or(0);
            result.destroy_count = caps[3].parse().unwrap_or(0);
        }

        for caps in RESOURCE_LINE.captures_iter(stdout) {
            let action = ChangeAction::from_verb(&caps[3])
                .unwrap_or_else(|| ChangeAction::from_symbol(&caps[1]));
            result
                .resource_changes
                .push(ResourceChange::new(&caps[2], action));
        }

        for caps in OUTPUT_LINE.captures_iter(stdout) {
            let name = caps[2].to_string();
            let action = ChangeAction::from_symbol(&caps[1]);
            result
                .output_changes
                .insert(name.clone(), OutputChange { name, action });
        }

        result.has_changes = result.add_count + result.change_count + result.destroy_count > 0
            || !result.output_changes.is_empty();
        result
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary::parse(&self.stdout)
    }
}

// =============================================================================
// Validate
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub byte: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRange {
    pub filename: String,
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub range: Option<DiagnosticRange>,
}

/// Parsed result of `validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResult {
    pub valid: bool,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    pub warning_count: u32,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidateResult {
    /// Parse `validate -json` output.
    pub fn from_json(stdout: &str) -> ExecResult<Self> {
        serde_json::from_str(stdout.trim()).map_err(|e| ExecError::Parse {
            what: "validate",
            message: e.to_string(),
        })
    }

    /// Build a result from plain-text validation, which reports only an exit
    /// status and `Error:`/`Warning:` headed blocks.
    pub fn from_text(exit_code: i32, output: &str) -> Self {
        let mut diagnostics = Vec::new();
        for line in output.lines().map(str::trim_start) {
            let parsed = if let Some(rest) = line.strip_prefix("Error: ") {
                Some((Severity::Error, rest))
            } else {
                line.strip_prefix("Warning: ")
                    .map(|rest| (Severity::Warning, rest))
            };
            if let Some((severity, summary)) = parsed {
                diagnostics.push(Diagnostic {
                    severity,
                    summary: summary.trim().to_string(),
                    detail: String::new(),
                    range: None,
                });
            }
        }

        let count = |severity: Severity| diagnostics.iter().filter(|d| d.severity == severity).count() as u32;
        Self {
            valid: exit_code == 0,
            error_count: count(Severity::Error),
            warning_count: count(Severity::Warning),
            diagnostics,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.valid || self.error_count > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count > 0
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }
}

// =============================================================================
// Output / show
// =============================================================================

/// One root module output as reported by `output -json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    pub value: Value,
    #[serde(rename = "type", default)]
    pub value_type: Option<Value>,
    #[serde(default)]
    pub sensitive: bool,
}

/// Parsed result of `output`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputResult {
    /// `output -json <name>`: the bare value.
    Single { name: String, value: Value },
    /// `output -json`: every output with its metadata.
    All {
        outputs: BTreeMap<String, OutputValue>,
    },
    /// Text or `-raw` output.
    Raw { name: Option<String>, text: String },
}

impl OutputResult {
    pub fn parse(name: Option<&str>, json: bool, stdout: &str) -> ExecResult<Self> {
        if !json {
            return Ok(OutputResult::Raw {
                name: name.map(str::to_string),
                text: stdout.trim_end_matches('\n').to_string(),
            });
        }

        let err = |e: serde_json::Error| ExecError::Parse {
            what: "output",
            message: e.to_string(),
        };
        match name {
            Some(name) => Ok(OutputResult::Single {
                name: name.to_string(),
                value: serde_json::from_str(stdout.trim()).map_err(err)?,
            }),
            None => {
                let trimmed = stdout.trim();
                let outputs = if trimmed.is_empty() {
                    BTreeMap::new()
                } else {
                    serde_json::from_str(trimmed).map_err(err)?
                };
                Ok(OutputResult::All { outputs })
            }
        }
    }

    /// Value of `name`, whichever form the result took.
    pub fn value(&self, name: &str) -> Option<Value> {
        match self {
            OutputResult::Single { name: n, value } if n == name => Some(value.clone()),
            OutputResult::All { outputs } => outputs.get(name).map(|o| o.value.clone()),
            OutputResult::Raw {
                name: Some(n),
                text,
            } if n == name => Some(Value::String(text.clone())),
            _ => None,
        }
    }
}

/// Parsed result of `show`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowResult {
    pub format_version: String,
    pub terraform_version: String,
    /// Present when showing a state.
    pub values: Option<Value>,
    pub planned_values: Option<Value>,
    pub resource_changes: Vec<Value>,
    pub output_changes: BTreeMap<String, Value>,
    pub prior_state: Option<Value>,
    pub configuration: Option<Value>,
    #[serde(skip)]
    pub raw: String,
}

impl ShowResult {
    pub fn parse(json: bool, stdout: &str) -> ExecResult<Self> {
        let mut result = if json && !stdout.trim().is_empty() {
            serde_json::from_str(stdout.trim()).map_err(|e| ExecError::Parse {
                what: "show",
                message: e.to_string(),
            })?
        } else {
            Self::default()
        };
        result.raw = stdout.to_string();
        Ok(result)
    }

    pub fn is_plan(&self) -> bool {
        self.planned_values.is_some()
    }
}

// =============================================================================
// State list / state show
// =============================================================================

pub fn parse_state_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse the HCL-like rendering of `state show` into a resource.
///
/// Only top-level scalar attributes are kept; nested blocks, maps and lists
/// are skipped.
pub fn parse_state_show(address: &str, stdout: &str) -> StateResource {
    let mut resource = StateResource::new("", "");
    resource.address = address.to_string();
    let mut depth = 0usize;

    for raw in stdout.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if depth == 0 {
            if let Some(header) = line.strip_prefix("# ") {
                let (addr, rest) = header.split_once(':').unwrap_or((header, ""));
                resource.address = addr.trim().to_string();
                resource.tainted = rest.contains("(tainted)");
            } else if let Some(caps) = STATE_SHOW_HEADER.captures(line) {
                if &caps[1] == "data" {
                    resource.mode = "data".to_string();
                }
                resource.resource_type = caps[2].to_string();
                resource.name = caps[3].to_string();
                depth = 1;
            }
            continue;
        }

        if depth == 1 {
            if line == "}" {
                depth = 0;
            } else if opens_block(line) {
                depth += 1;
            } else if let Some((key, value)) = line.split_once(" = ") {
                let key = key.trim().trim_matches('"').to_string();
                let value = parse_attribute_value(value);
                if key == "id" {
                    resource.id = value.as_str().map(str::to_string);
                }
                resource.attributes.insert(key, value);
            }
            continue;
        }

        if line.starts_with(['}', ']', ')']) {
            depth -= 1;
        }
        if opens_block(line) {
            depth += 1;
        }
    }

    resource.module = AddressParts::parse(&resource.address).module;
    resource
}

fn opens_block(line: &str) -> bool {
    line.ends_with('{') || line.ends_with('[') || line.ends_with('(')
}

fn parse_attribute_value(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.starts_with('"') {
        return serde_json::from_str(raw)
            .unwrap_or_else(|_| Value::String(raw.trim_matches('"').to_string()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Bool(_) | Value::Number(_) | Value::Null)) => v,
        _ => Value::String(raw.to_string()),
    }
}

/// Split a resource address into module path, mode, type and name.
struct AddressParts {
    module: String,
    mode: String,
    resource_type: String,
    name: String,
}

impl AddressParts {
    fn parse(address: &str) -> Self {
        let mut rest = address;
        let mut module_end = 0;
        while let Some(after) = rest.strip_prefix("module.") {
            let Some(dot) = after.find('.') else {
                break;
            };
            module_end += "module.".len() + dot + 1;
            rest = &after[dot + 1..];
        }
        let module = address[..module_end].trim_end_matches('.').to_string();

        let (mode, rest) = match rest.strip_prefix("data.") {
            Some(r) => ("data", r),
            None => ("managed", rest),
        };
        let (resource_type, name) = rest.split_once('.').unwrap_or((rest, ""));
        let name = name.split('[').next().unwrap_or(name);

        Self {
            module,
            mode: mode.to_string(),
            resource_type: resource_type.to_string(),
            name: name.to_string(),
        }
    }
}

// =============================================================================
// Workspace / fmt / providers / test
// =============================================================================

/// Parsed result of a `workspace` subcommand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceResult {
    pub current: Option<String>,
    pub workspaces: Vec<String>,
}

impl WorkspaceResult {
    pub fn parse_list(stdout: &str) -> Self {
        let mut result = Self::default();
        for line in stdout.lines() {
            let line = line.trim();
            if let Some(name) = line.strip_prefix("* ") {
                let name = name.trim().to_string();
                result.current = Some(name.clone());
                result.workspaces.push(name);
            } else if !line.is_empty() {
                result.workspaces.push(line.to_string());
            }
        }
        result
    }

    pub fn parse_show(stdout: &str) -> Self {
        let current = stdout.trim();
        Self {
            current: (!current.is_empty()).then(|| current.to_string()),
            workspaces: Vec::new(),
        }
    }
}

/// Parsed result of `fmt`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatResult {
    /// False when `-check` found files that need formatting.
    pub success: bool,
    pub changed_files: Vec<String>,
    pub diff: Option<String>,
}

impl FormatResult {
    pub fn parse(success: bool, list: bool, diff: bool, stdout: &str) -> Self {
        let changed_files = if list {
            stdout
                .lines()
                .filter(|l| !diff || is_formatted_file_line(l))
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };

        Self {
            success,
            changed_files,
            diff: (diff && !stdout.is_empty()).then(|| stdout.to_string()),
        }
    }

    pub fn needs_formatting(&self) -> bool {
        !self.success || !self.changed_files.is_empty()
    }
}

fn is_formatted_file_line(line: &str) -> bool {
    !line.starts_with(['+', '-', '@', ' ', '\\'])
        && (line.ends_with(".tf") || line.ends_with(".tfvars") || line.ends_with(".hcl"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    /// Full source address, e.g. `registry.terraform.io/hashicorp/google`.
    pub source: String,
    pub namespace: String,
    pub name: String,
    pub version: Option<String>,
}

/// Parsed result of `providers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvidersResult {
    pub providers: Vec<ProviderInfo>,
    pub raw: String,
}

impl ProvidersResult {
    pub fn parse(stdout: &str) -> Self {
        let mut providers: Vec<ProviderInfo> = Vec::new();
        for line in stdout.lines() {
            let Some(caps) = PROVIDER_REF.captures(line) else {
                continue;
            };
            let source = caps[1].to_string();
            if providers.iter().any(|p| p.source == source) {
                continue;
            }
            let mut segments = source.rsplit('/');
            let name = segments.next().unwrap_or_default().to_string();
            let namespace = segments.next().unwrap_or_default().to_string();
            let version = SEMVER_LIKE
                .captures(&line[caps.get(0).map_or(0, |m| m.end())..])
                .map(|v| v[1].to_string());
            providers.push(ProviderInfo {
                source,
                namespace,
                name,
                version,
            });
        }
        Self {
            providers,
            raw: stdout.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub name: String,
    /// Test file the run block belongs to.
    pub path: String,
    pub status: String,
}

impl TestCase {
    pub fn is_passed(&self) -> bool {
        matches!(self.status.as_str(), "pass" | "passed" | "success")
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self.status.as_str(),
            "fail" | "failed" | "error" | "errored"
        )
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status.as_str(), "skip" | "skipped")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSummary {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errored: u32,
}

impl TestSummary {
    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.skipped + self.errored
    }
}

/// Parsed result of `test`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub success: bool,
    pub tests: Vec<TestCase>,
    pub summary: TestSummary,
}

impl TestResult {
    /// Parse `test` output. JSON mode reads one event per line; unknown or
    /// malformed lines are ignored.
    pub fn parse(success: bool, json: bool, stdout: &str) -> Self {
        let mut result = Self {
            success,
            ..Self::default()
        };

        if !json {
            if let Some(caps) = TEST_TEXT_SUMMARY.captures(stdout) {
                result.summary.passed = caps[1].parse().unwrap_or(0);
                result.summary.failed = caps[2].parse().unwrap_or(0);
                result.summary.skipped = caps
                    .get(3)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(0);
            }
            return result;
        }

        #[derive(Deserialize)]
        struct Event {
            #[serde(rename = "type", default)]
            kind: String,
            #[serde(default)]
            test_run: Option<RunEvent>,
            #[serde(default)]
            test_summary: Option<TestSummary>,
        }

        #[derive(Deserialize)]
        struct RunEvent {
            #[serde(default)]
            path: String,
            #[serde(default)]
            run: String,
            #[serde(default)]
            progress: String,
            #[serde(default)]
            status: String,
        }

        let mut summary = None;
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            let Ok(event) = serde_json::from_str::<Event>(line) else {
                continue;
            };
            match (event.kind.as_str(), event.test_run, event.test_summary) {
                ("test_run", Some(run), _) if run.progress == "complete" => {
                    result.tests.push(TestCase {
                        name: run.run,
                        path: run.path,
                        status: run.status,
                    });
                }
                ("test_summary", _, Some(s)) => summary = Some(s),
                _ => {}
            }
        }

        result.summary = summary.unwrap_or_else(|| {
            let mut s = TestSummary::default();
            for case in &result.tests {
                match case.status.as_str() {
                    "error" | "errored" => s.errored += 1,
                    _ if case.is_passed() => s.passed += 1,
                    _ if case.is_failed() => s.failed += 1,
                    _ if case.is_skipped() => s.skipped += 1,
                    _ => {}
                }
            }
            s
        });
        result
    }

    pub fn failed(&self) -> impl Iterator<Item = &TestCase> {
        self.tests.iter().filter(|t| t.is_failed())
    }
}
