use std::path::PathBuf;

pub const CLAUDE_CODE: &str = "claude-code";
pub const CODEX: &str = "codex";

/// How a provider lays out its session files on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirLayout {
    /// `<root>/<project-dir>/<session>.jsonl`
    ProjectSessions,
    /// `<root>/<yyyy>/<mm>/<dd>/<session>.jsonl`
    DateTree,
}

/// Which parser understands a provider's session content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Whole-file scan for message markers and token fields
    MarkerScan,
    /// Newline-delimited JSON event records
    EventStream,
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub id: &'static str,
    pub name: &'static str,
    /// Root relative to `$HOME`
    pub default_root: &'static str,
    /// Env var naming the agent's home dir; `root_subdir` is appended
    pub root_env: &'static str,
    pub root_subdir: &'static str,
    pub layout: DirLayout,
    pub format: LogFormat,
    pub has_cost_data: bool,
}

const PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        id: CLAUDE_CODE,
        name: "Claude Code",
        default_root: ".claude/projects",
        root_env: "CLAUDE_CONFIG_DIR",
        root_subdir: "projects",
        layout: DirLayout::ProjectSessions,
        format: LogFormat::MarkerScan,
        has_cost_data: true,
    },
    ProviderSpec {
        id: CODEX,
        name: "Codex CLI",
        default_root: ".codex/sessions",
        root_env: "CODEX_HOME",
        root_subdir: "sessions",
        layout: DirLayout::DateTree,
        format: LogFormat::EventStream,
        has_cost_data: false,
    },
];

pub fn all_providers() -> &'static [ProviderSpec] {
    PROVIDERS
}

pub fn provider_spec(id: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|p| p.id == id)
}

impl ProviderSpec {
    /// Resolve the session root, preferring the agent's own env override.
    pub fn resolve_root(&self, home: &str) -> PathBuf {
        match std::env::var(self.root_env) {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir).join(self.root_subdir),
            _ => PathBuf::from(home).join(self.default_root),
        }
    }
}

/// A registered provider bound to the directory it is scanned from.
#[derive(Debug, Clone)]
pub struct ProviderSource {
    pub spec: &'static ProviderSpec,
    pub root: PathBuf,
}

impl ProviderSource {
    pub fn new(spec: &'static ProviderSpec, root: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            root: root.into(),
        }
    }

    pub fn id(&self) -> &'static str {
        self.spec.id
    }
}
