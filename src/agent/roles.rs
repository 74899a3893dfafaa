//! Agent roles: permission sets plus a canned system-prompt fragment per
//! role.
//!
//! Grounded in `original_source/strix/tools/registry.py`'s `AgentRole` /
//! `TOOL_PROFILES` for the permission side (spec.md §4.7 only specifies
//! role-gated permissions; the system-prompt fragment is supplemented from
//! `original_source/strix/llm/roles.py`'s role-routing concept, restated
//! here as a per-role prompt rather than a per-role model, since model
//! routing itself is out of scope).

use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Coordinator,
    Reconnaissance,
    VulnerabilityTester,
    Validator,
    Reporter,
    FixGenerator,
    FullAccess,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Coordinator => "coordinator",
            Role::Reconnaissance => "reconnaissance",
            Role::VulnerabilityTester => "vulnerability_tester",
            Role::Validator => "validator",
            Role::Reporter => "reporter",
            Role::FixGenerator => "fix_generator",
            Role::FullAccess => "full_access",
        };
        write!(f, "{s}")
    }
}

impl Role {
    /// Action modules this role may invoke. An empty set paired with
    /// `FullAccess` means "all modules", matching the Python registry's
    /// `TOOL_PROFILES[AgentRole.FULL_ACCESS] = set()` special case.
    pub fn allowed_modules(&self) -> HashSet<&'static str> {
        let modules: &[&'static str] = match self {
            Role::Coordinator => &["agents", "finish", "thinking", "notes"],
            Role::Reconnaissance => &["terminal", "proxy", "browser", "web_search", "notes", "thinking", "python"],
            Role::VulnerabilityTester => &[
                "terminal", "proxy", "browser", "python", "file_edit", "notes", "thinking",
                "reporting", "agents",
            ],
            Role::Validator => &["terminal", "proxy", "browser", "python", "notes", "thinking"],
            Role::Reporter => &["notes", "reporting", "thinking", "file_edit"],
            Role::FixGenerator => &["file_edit", "notes", "thinking", "python"],
            Role::FullAccess => &[],
        };
        modules.iter().copied().collect()
    }

    /// Whether this role may invoke an action registered under `module`.
    pub fn allows_module(&self, module: &str) -> bool {
        if *self == Role::FullAccess {
            return true;
        }
        self.allowed_modules().contains(module)
    }

    /// Any role that is granted the `terminal`/`browser`/`python` modules
    /// can reach the sandbox dispatcher at all; gating for a *specific*
    /// action still goes through [`Role::allows_module`].
    pub fn may_use_sandbox(&self) -> bool {
        if *self == Role::FullAccess {
            return true;
        }
        let modules = self.allowed_modules();
        ["terminal", "browser", "python", "proxy", "file_edit"]
            .iter()
            .any(|m| modules.contains(m))
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Role::Coordinator => {
                "You are the coordinating agent. Break the task into subtasks, spawn child \
                 agents to pursue them, and synthesize their findings. You do not execute \
                 tools directly beyond spawning and messaging agents."
            }
            Role::Reconnaissance => {
                "You are a reconnaissance agent. Map the target's surface area, enumerate \
                 assets, and record what you discover as notes for other agents to build on."
            }
            Role::VulnerabilityTester => {
                "You are a vulnerability-testing agent. Given the current recon notes, attempt \
                 to reproduce and confirm weaknesses, recording each attempt and its outcome."
            }
            Role::Validator => {
                "You are a validation agent. Independently reproduce a reported finding before \
                 it is accepted; report whether it holds up under your own attempt."
            }
            Role::Reporter => {
                "You are a reporting agent. Turn confirmed findings into a clear, structured \
                 report without re-running the tests that already confirmed them."
            }
            Role::FixGenerator => {
                "You are a fix-generation agent. Given a confirmed finding, propose and, where \
                 possible, implement a concrete remediation."
            }
            Role::FullAccess => {
                "You have unrestricted access to every registered action."
            }
        }
    }
}
